//! Error types for the buffer store.
use snafu::{Backtrace, Snafu};

/// The main error type for buffer store operations.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The allocation policy could not provide the requested memory.
    #[snafu(display("Could not allocate {} bytes using the {} policy", size, policy))]
    AllocationFailure {
        /// the requested size in bytes
        size: usize,
        /// the name of the allocation policy
        policy: &'static str,
        /// where the error was raised
        backtrace: Backtrace,
    },

    /// The manager cannot make room for the request
    /// without going over its memory cap.
    #[snafu(display(
        "Request of {} bytes does not fit in the memory cap of {} bytes",
        requested,
        cap
    ))]
    CapExceeded {
        /// the number of bytes requested
        requested: usize,
        /// the memory cap of the manager
        cap: usize,
        /// where the error was raised
        backtrace: Backtrace,
    },

    /// The buffer adopted memory it does not own,
    /// so it cannot be resized.
    #[snafu(display("Buffer memory is not owned and cannot be reallocated"))]
    NotReallocatable {
        /// where the error was raised
        backtrace: Backtrace,
    },

    /// The buffer is not resident and has nowhere to load its content from.
    #[snafu(display("Buffer {} has no content source", id))]
    NoContentSource {
        /// the buffer identifier
        id: u64,
        /// where the error was raised
        backtrace: Backtrace,
    },

    /// The stream factory could not open its source.
    #[snafu(display("Could not open buffer stream"))]
    OpenStream {
        /// the I/O error
        source: std::io::Error,
    },

    /// Reading content from a stream or spill file failed.
    #[snafu(display("Could not read {} bytes of buffer content", size))]
    ReadStream {
        /// the number of bytes to read
        size: usize,
        /// the I/O error
        source: std::io::Error,
    },

    /// The spill directory could not be created.
    #[snafu(display("Could not create spill directory"))]
    CreateSpillDir {
        /// the I/O error
        source: std::io::Error,
    },

    /// A buffer could not be written to its spill file.
    #[snafu(display("Could not spill buffer {} to disk", id))]
    Spill {
        /// the buffer identifier
        id: u64,
        /// the I/O error
        source: std::io::Error,
    },

    /// The manager worker thread could not be started.
    #[snafu(display("Could not spawn buffer manager worker"))]
    SpawnWorker {
        /// the I/O error
        source: std::io::Error,
    },

    /// The manager worker thread is no longer taking requests.
    #[snafu(display("Buffer manager is no longer running"))]
    ManagerGone {
        /// where the error was raised
        backtrace: Backtrace,
    },
}

/// Type alias for a result from this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
