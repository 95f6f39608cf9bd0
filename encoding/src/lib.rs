#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]
//! A minimal DICOM Part-10 file reader and writer.
//!
//! This crate reads and writes DICOM files into and from
//! [`Dataset`](dcmanon_core::Dataset) values,
//! without transcoding or decompressing pixel data.
//! Supported transfer syntaxes are
//! implicit VR little endian, explicit VR little endian,
//! deflated explicit VR little endian,
//! and encapsulated transfer syntaxes (with opaque fragments).
//!
//! - [`file`] reads and writes whole files.
//! - [`meta`] handles the file meta group.
//! - [`series`] reads and writes whole instance sets.
//! - [`transfer_syntax`] resolves transfer syntax UIDs.
pub mod file;
pub mod meta;
pub mod read;
pub mod series;
pub mod transfer_syntax;
pub mod write;

pub use file::{open_file, read_from, write_file, write_to};
pub use read::{ReadError, ReadOptions, DEFAULT_BUFFER_THRESHOLD, MAX_NESTING_DEPTH};
pub use series::{read_instance_set, write_instance_set, SeriesError};
pub use transfer_syntax::TransferSyntax;
pub use write::WriteError;
