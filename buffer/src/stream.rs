//! Lazy population of buffers from byte streams.
//!
//! A buffer configured with a [`StreamFactory`] stays empty
//! until it is first locked,
//! at which point the factory is asked for a reader
//! and the content is materialized according to its [`FileFormat`].
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Encoding of the bytes produced by a stream factory.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// The stream yields the buffer content as is.
    #[default]
    Raw,
    /// The stream yields raw deflate data (RFC 1951) of the buffer content.
    Deflated,
    /// The stream yields the buffer content
    /// after decoding performed by the factory itself.
    Other,
}

/// Producer of readable byte streams for a buffer's content.
pub trait StreamFactory: fmt::Debug + Send + Sync {
    /// Open a new stream positioned at the start of the content.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// Stream factory reading a file from a given byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStreamFactory {
    path: PathBuf,
    offset: u64,
}

impl FileStreamFactory {
    /// Stream the file from its beginning.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_offset(path, 0)
    }

    /// Stream the file starting at `offset` bytes.
    pub fn with_offset(path: impl Into<PathBuf>, offset: u64) -> Self {
        FileStreamFactory {
            path: path.into(),
            offset,
        }
    }

    /// The file being streamed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The byte position where the content starts.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl StreamFactory for FileStreamFactory {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        let mut file = File::open(&self.path)?;
        if self.offset > 0 {
            file.seek(SeekFrom::Start(self.offset))?;
        }
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Information about where a buffer's content is streamed from.
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    /// The factory producing the content, if any
    pub factory: Option<Arc<dyn StreamFactory>>,
    /// The size of the buffer content in bytes
    pub size: usize,
    /// The file backing the stream, if known
    pub source_file: Option<PathBuf>,
    /// The encoding of the streamed bytes
    pub format: FileFormat,
}

impl StreamInfo {
    /// Whether this describes an actual content source.
    pub fn has_source(&self) -> bool {
        self.factory.is_some()
    }

    /// Open the stream, decoding it according to the format.
    pub(crate) fn open_decoded(&self) -> io::Result<Option<Box<dyn Read + Send>>> {
        let Some(factory) = &self.factory else {
            return Ok(None);
        };
        let reader = factory.open()?;
        Ok(Some(match self.format {
            FileFormat::Deflated => Box::new(flate2::read::DeflateDecoder::new(reader)),
            FileFormat::Raw | FileFormat::Other => reader,
        }))
    }
}
