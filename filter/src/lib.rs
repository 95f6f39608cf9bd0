#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]
//! Pipelines of stages which sort, split and filter instance sets.
//!
//! A stage implements [`Filter`].
//! It takes ownership of an [`InstanceSet`](dcmanon_core::InstanceSet)
//! and returns the sets it produced:
//!
//! - a [sorter](FilterKind::Sorter) returns exactly one set,
//!   with the same instances in a new order;
//! - a [splitter](FilterKind::Splitter) returns one or more sets,
//!   partitioning the input without reordering it;
//! - a [custom](FilterKind::Custom) stage may drop or merge instances.
//!
//! Stages are chained with a [`Pipeline`],
//! or created by name through the [registry](registry()).
//!
//! ```
//! use dcmanon_core::{tags, Dataset, InstanceSet};
//! use dcmanon_filter::{FilterLog, InstanceNumberSorter, Pipeline, SopClassUidSplitter};
//!
//! let mut set = InstanceSet::new();
//! for number in [2_i64, 1] {
//!     let mut instance = Dataset::new();
//!     instance.set(tags::SOP_CLASS_UID, "1.2.840.10008.5.1.4.1.1.2");
//!     instance.set(tags::INSTANCE_NUMBER, number);
//!     set.push(instance);
//! }
//!
//! let mut pipeline = Pipeline::new()
//!     .with_stage(SopClassUidSplitter)
//!     .with_stage(InstanceNumberSorter);
//! let output = pipeline.run(set, &mut FilterLog::new())?;
//! assert_eq!(output.sets.len(), 1);
//! assert_eq!(output.sets[0].get(0).and_then(|i| i.get_int(tags::INSTANCE_NUMBER)), Some(1));
//! # Ok::<(), dcmanon_filter::FilterError>(())
//! ```
pub mod custom;
pub mod filter;
pub mod pipeline;
pub mod registry;
pub mod sorter;
pub mod splitter;

#[cfg(feature = "inventory-registry")]
#[doc(hidden)]
pub use inventory;

pub use crate::custom::{CompositeFilter, TagValueFilter};
pub use crate::filter::{Filter, FilterError, FilterKind, FilterLog, LogEntry, LogLevel};
pub use crate::pipeline::{FailurePolicy, Pipeline, PipelineOutput, Skipped};
pub use crate::registry::{create_filter, registry, FilterFactory, FilterRegistry, DEFAULT_DICOM_FILTER};
pub use crate::sorter::{ImagePositionPatientSorter, InstanceNumberSorter, TagValueSorter};
pub use crate::splitter::{AcquisitionNumberSplitter, SopClassUidSplitter, TagValueSplitter};
