#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]
//! The tag data set model of the DICOM anonymization engine.
//!
//! - [`header`] comprises the [`Tag`] and [`VR`] types.
//! - [`value`] holds the [`TagValue`] union of attribute values.
//!   Large blobs are kept in the buffer store
//!   and referenced through a [`dcmanon_buffer::BufferObject`] handle.
//! - [`dataset`] defines the ordered [`Dataset`] mapping
//!   from tag to [`Element`].
//! - [`instance`] defines [`InstanceSet`],
//!   the unit of work of filter pipelines.
//! - [`dictionary`] is a built-in attribute dictionary
//!   with tag constants in [`dictionary::tags`].
//!
//! # Example
//!
//! ```
//! use dcmanon_core::{Dataset, dictionary::tags};
//!
//! let mut ds = Dataset::new();
//! ds.set(tags::PATIENT_NAME, "DOE^JOHN");
//! ds.set(tags::INSTANCE_NUMBER, "3");
//! assert_eq!(ds.get_str(tags::PATIENT_NAME), Some("DOE^JOHN"));
//! assert_eq!(ds.get_int(tags::INSTANCE_NUMBER), Some(3));
//! ```
pub mod dataset;
pub mod dictionary;
pub mod header;
pub mod instance;
pub mod value;

pub use dataset::{Dataset, Element};
pub use dictionary::tags;
pub use header::{ParseTagError, Tag, VR};
pub use instance::InstanceSet;
pub use value::TagValue;
