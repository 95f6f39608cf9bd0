//! Anonymization of whole directory trees.
//!
//! The input tree is never modified:
//! [`anonymize_tree`] first copies it to a new output directory
//! and then rewrites the files of the copy in place.
//! A file which cannot be read, anonymized or written
//! is reported and the batch carries on with the next file.
use crate::anonymizer::{AnonymizeError, Anonymizer};
use crate::context::AnonymizationContext;
use dcmanon_encoding::{open_file, write_file, ReadError, ReadOptions, WriteError};
use snafu::{ensure, Backtrace, ResultExt, Snafu};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// An error which prevents a batch from running.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum BatchError {
    /// The input path does not name a directory.
    #[snafu(display("Input path {} is not a directory", path.display()))]
    InputNotDirectory {
        /// the input path
        path: PathBuf,
        /// where the error was raised
        backtrace: Backtrace,
    },
    /// The output path already exists.
    #[snafu(display("Output path {} already exists", path.display()))]
    OutputExists {
        /// the output path
        path: PathBuf,
        /// where the error was raised
        backtrace: Backtrace,
    },
    /// The input and output paths name the same directory.
    #[snafu(display("Input and output are the same directory {}", path.display()))]
    SameDirectory {
        /// the directory
        path: PathBuf,
        /// where the error was raised
        backtrace: Backtrace,
    },
    /// The output directory would be inside the input tree.
    #[snafu(display("Output directory {} is inside the input directory", path.display()))]
    OutputInsideInput {
        /// the output path
        path: PathBuf,
        /// where the error was raised
        backtrace: Backtrace,
    },
    /// A directory could not be traversed.
    #[snafu(display("Could not list directory contents"))]
    ListDirectory {
        /// the traversal error
        source: walkdir::Error,
    },
    /// A directory of the output tree could not be created.
    #[snafu(display("Could not create directory {}", path.display()))]
    CreateDirectory {
        /// the directory
        path: PathBuf,
        /// the I/O error
        source: std::io::Error,
    },
    /// A file could not be copied to the output tree.
    #[snafu(display("Could not copy {} to {}", from.display(), to.display()))]
    CopyFile {
        /// the source file
        from: PathBuf,
        /// the destination file
        to: PathBuf,
        /// the I/O error
        source: std::io::Error,
    },
    /// The batch was cancelled while copying.
    #[snafu(display("Cancelled"))]
    Cancelled {
        /// where the error was raised
        backtrace: Backtrace,
    },
}

/// An error anonymizing one file of a batch.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum FileError {
    /// The file could not be read as a DICOM file.
    #[snafu(display("Could not read {}", path.display()))]
    Read {
        /// the file
        path: PathBuf,
        #[snafu(backtrace)]
        /// the reader error
        source: ReadError,
    },
    /// The data set could not be anonymized.
    #[snafu(display("Could not anonymize {}", path.display()))]
    Anonymize {
        /// the file
        path: PathBuf,
        #[snafu(backtrace)]
        /// the anonymizer error
        source: AnonymizeError,
    },
    /// The anonymized data set could not be written back.
    #[snafu(display("Could not write {}", path.display()))]
    Write {
        /// the file
        path: PathBuf,
        #[snafu(backtrace)]
        /// the writer error
        source: WriteError,
    },
}

impl FileError {
    /// The file which could not be anonymized.
    pub fn path(&self) -> &Path {
        match self {
            FileError::Read { path, .. }
            | FileError::Anonymize { path, .. }
            | FileError::Write { path, .. } => path,
        }
    }
}

/// A flag for cooperatively cancelling a batch from another thread.
///
/// The batch checks the flag between files,
/// so the file being processed when the flag is raised is completed.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token which is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the batches holding a clone of this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for anonymizing a batch of files.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// How to read each file.
    /// Give it a buffer store to avoid holding pixel data in memory.
    pub read: ReadOptions,
    /// Raised to stop the batch before the next file.
    pub cancel: CancellationToken,
}

/// The outcome of a batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// The files which were anonymized.
    pub anonymized: Vec<PathBuf>,
    /// The files which could not be anonymized, and why.
    pub failures: Vec<FileError>,
    /// Whether the batch was cancelled before processing every file.
    pub cancelled: bool,
}

impl BatchReport {
    /// Whether every file was anonymized.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// The number of files processed, successfully or not.
    pub fn processed(&self) -> usize {
        self.anonymized.len() + self.failures.len()
    }
}

/// Check the preconditions of anonymizing `input` into `output`.
///
/// The input must be a directory and the output must not exist.
/// Neither can be inside the other.
pub fn check_directories(input: &Path, output: &Path) -> Result<(), BatchError> {
    ensure!(input.is_dir(), InputNotDirectorySnafu { path: input });
    let input_real = fs::canonicalize(input).unwrap_or_else(|_| input.to_path_buf());
    let output_real = resolve(output);
    ensure!(input_real != output_real, SameDirectorySnafu { path: input });
    ensure!(!output.exists(), OutputExistsSnafu { path: output });
    ensure!(
        !output_real.starts_with(&input_real),
        OutputInsideInputSnafu { path: output }
    );
    Ok(())
}

/// Resolve a path which may not exist yet
/// through its nearest existing ancestor.
fn resolve(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        if let Ok(real) = fs::canonicalize(current) {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// List the regular files of a directory tree, sorted by path.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.context(ListDirectorySnafu)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Copy a directory tree to a new location.
///
/// Returns the number of files copied.
pub fn copy_directory(
    input: &Path,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<usize, BatchError> {
    fs::create_dir_all(output).context(CreateDirectorySnafu { path: output })?;
    let mut count = 0;
    for entry in WalkDir::new(input).min_depth(1).sort_by_file_name() {
        ensure!(!cancel.is_cancelled(), CancelledSnafu);
        let entry = entry.context(ListDirectorySnafu)?;
        let relative = match entry.path().strip_prefix(input) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = output.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).context(CreateDirectorySnafu { path: &target })?;
        } else {
            fs::copy(entry.path(), &target).context(CopyFileSnafu {
                from: entry.path(),
                to: &target,
            })?;
            count += 1;
        }
    }
    debug!("Copied {} files from {} to {}", count, input.display(), output.display());
    Ok(count)
}

/// Anonymize a DICOM file in place.
///
/// The file is replaced only once the anonymized data set
/// was written in full.
pub fn anonymize_file(
    path: &Path,
    anonymizer: &Anonymizer,
    ctx: &mut AnonymizationContext,
    read_options: &ReadOptions,
) -> Result<(), FileError> {
    let dataset = open_file(path, read_options).context(ReadSnafu { path })?;
    let dataset = anonymizer
        .anonymize(ctx, dataset)
        .context(AnonymizeSnafu { path })?;
    write_file(path, &dataset).context(WriteSnafu { path })?;
    Ok(())
}

/// Anonymize the given files in place, in order,
/// calling `on_file` after each one.
pub fn anonymize_files<I, P>(
    files: I,
    anonymizer: &Anonymizer,
    ctx: &mut AnonymizationContext,
    options: &BatchOptions,
    mut on_file: impl FnMut(&Path),
) -> BatchReport
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut report = BatchReport::default();
    for file in files {
        if options.cancel.is_cancelled() {
            info!("Batch cancelled");
            report.cancelled = true;
            break;
        }
        let path = file.as_ref();
        match anonymize_file(path, anonymizer, ctx, &options.read) {
            Ok(()) => {
                debug!("Anonymized {}", path.display());
                report.anonymized.push(path.to_path_buf());
            }
            Err(e) => {
                warn!("{}", snafu::Report::from_error(&e));
                report.failures.push(e);
            }
        }
        on_file(path);
    }
    report
}

/// Anonymize every file of a directory tree in place.
///
/// All files share the given job context.
pub fn anonymize_directory(
    dir: &Path,
    anonymizer: &Anonymizer,
    ctx: &mut AnonymizationContext,
    options: &BatchOptions,
) -> Result<BatchReport, BatchError> {
    let files = list_files(dir)?;
    Ok(anonymize_files(files, anonymizer, ctx, options, |_| {}))
}

/// Copy the `input` tree to a new `output` directory
/// and anonymize the copy, as one job.
pub fn anonymize_tree(
    input: &Path,
    output: &Path,
    anonymizer: &Anonymizer,
    options: &BatchOptions,
) -> Result<BatchReport, BatchError> {
    check_directories(input, output)?;
    copy_directory(input, output, &options.cancel)?;
    let mut ctx = AnonymizationContext::new();
    anonymize_directory(output, anonymizer, &mut ctx, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preconditions() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir(&input).unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"hello").unwrap();

        assert!(check_directories(&input, &dir.path().join("out")).is_ok());
        assert!(matches!(
            check_directories(&file, &dir.path().join("out")),
            Err(BatchError::InputNotDirectory { .. })
        ));
        assert!(matches!(
            check_directories(&input, &input),
            Err(BatchError::SameDirectory { .. })
        ));
        assert!(matches!(
            check_directories(&input, &input.join("..").join("in")),
            Err(BatchError::SameDirectory { .. })
        ));
        assert!(matches!(
            check_directories(&input, &file),
            Err(BatchError::OutputExists { .. })
        ));
        assert!(matches!(
            check_directories(&input, &input.join("nested").join("out")),
            Err(BatchError::OutputInsideInput { .. })
        ));
    }

    #[test]
    fn copy_keeps_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(input.join("a").join("b")).unwrap();
        fs::write(input.join("one"), b"1").unwrap();
        fs::write(input.join("a").join("b").join("two"), b"2").unwrap();

        let output = dir.path().join("out");
        let count = copy_directory(&input, &output, &CancellationToken::new()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(fs::read(output.join("a").join("b").join("two")).unwrap(), b"2");
        assert_eq!(list_files(&output).unwrap().len(), 2);
    }

    #[test]
    fn cancelled_copy_stops() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("one"), b"1").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            copy_directory(&input, &dir.path().join("out"), &token),
            Err(BatchError::Cancelled { .. })
        ));
    }
}
