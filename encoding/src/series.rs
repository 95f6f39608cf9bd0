//! Reading and writing instance sets.
//!
//! These adapters sit at the boundary between files on disk
//! and the instance sets processed by filter pipelines.
use crate::file::{open_file, write_file};
use crate::read::{ReadError, ReadOptions};
use crate::write::WriteError;
use dcmanon_core::{tags, InstanceSet};
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An error which may occur when reading or writing an instance set.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum SeriesError {
    /// an instance could not be read
    #[snafu(display("Could not read instance {}", path.display()))]
    ReadInstance {
        /// the file of the instance
        path: PathBuf,
        /// the underlying error
        #[snafu(backtrace)]
        source: ReadError,
    },
    /// an instance could not be written
    #[snafu(display("Could not write instance {}", path.display()))]
    WriteInstance {
        /// the file of the instance
        path: PathBuf,
        /// the underlying error
        #[snafu(backtrace)]
        source: WriteError,
    },
    /// the output directory could not be created
    #[snafu(display("Could not create directory {}", path.display()))]
    CreateDirectory {
        /// the directory
        path: PathBuf,
        /// the underlying error
        source: std::io::Error,
    },
}

/// Read the given files, in order, into one instance set.
///
/// Large values are placed in the buffer store configured in `options`
/// and are loaded from their files on first access.
pub fn read_instance_set<I, P>(paths: I, options: &ReadOptions) -> Result<InstanceSet, SeriesError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .map(|path| {
            let path = path.as_ref();
            debug!("Reading {}", path.display());
            open_file(path, options).context(ReadInstanceSnafu { path })
        })
        .collect()
}

/// Whether a UID is well formed enough to name a file,
/// which also keeps the file inside its directory.
fn is_file_safe_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && uid.bytes().any(|b| b.is_ascii_digit())
}

/// Write each instance of the set to its own file in `dir`,
/// creating the directory if needed.
///
/// Files are named after the instance's SOP instance UID,
/// or after its position in the set if it has none
/// or if it is not made of digits and dots.
/// Returns the paths written, in the order of the set.
pub fn write_instance_set(set: &InstanceSet, dir: &Path) -> Result<Vec<PathBuf>, SeriesError> {
    std::fs::create_dir_all(dir).context(CreateDirectorySnafu { path: dir })?;
    set.iter()
        .enumerate()
        .map(|(index, instance)| {
            let name = match instance.get_str(tags::SOP_INSTANCE_UID) {
                Some(uid) if is_file_safe_uid(uid) => format!("{}.dcm", uid),
                _ => format!("{:06}.dcm", index),
            };
            let path = dir.join(name);
            write_file(&path, instance).context(WriteInstanceSnafu { path: &path })?;
            Ok(path)
        })
        .collect()
}
