#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]
//! Managed storage for large binary payloads,
//! such as the pixel data of DICOM instances.
//!
//! - [`BufferObject`] is a block of memory with a swappable
//!   [allocation policy](policy),
//!   optionally populated lazily from a [stream](stream).
//! - [`BufferManager`] keeps track of every buffer,
//!   serializes their lifecycle changes through a worker thread,
//!   and spills idle buffers to disk when a memory cap is set.
//! - [`BufferLock`] and [`ConstBufferLock`] are the only way to reach the
//!   bytes, and keep the buffer resident while they live.
//!
//! # Example
//!
//! ```
//! use dcmanon_buffer::{BufferManager, BufferObject, MallocPolicy};
//! # fn run() -> Result<(), dcmanon_buffer::Error> {
//! let manager = BufferManager::new()?;
//! let buffer = BufferObject::new(&manager)?;
//! buffer.allocate(4, MallocPolicy::shared())?;
//! buffer.lock()?.copy_from_slice(&[1, 2, 3, 4]);
//! assert_eq!(&buffer.lock_const()?[..], &[1, 2, 3, 4]);
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
pub mod error;
pub mod lock;
pub mod manager;
pub mod object;
pub mod policy;
pub mod stream;

pub use error::{Error, Result};
pub use lock::{BufferLock, ConstBufferLock};
pub use manager::{BufferId, BufferManager, BufferManagerOptions, ManagerStats, Pending};
pub use object::{BufferObject, ExternalMemory};
pub use policy::{AllocationPolicy, MallocPolicy, NoAllocPolicy};
pub use stream::{FileFormat, FileStreamFactory, StreamFactory, StreamInfo};
