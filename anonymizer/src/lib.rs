#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]
//! De-identification of DICOM data sets.
//!
//! An [`Anonymizer`] applies an [`AnonymizationPolicy`]
//! to one data set at a time.
//! The UIDs it regenerates are recorded in an [`AnonymizationContext`],
//! which the caller keeps for the duration of a job
//! so that references between the data sets of the job stay consistent.
//!
//! ```
//! use dcmanon_anonymizer::{Action, AnonymizationContext, AnonymizationPolicy, Anonymizer};
//! use dcmanon_core::{tags, Dataset};
//!
//! let policy = AnonymizationPolicy::new()
//!     .with(tags::PATIENT_NAME, Action::ReplaceWithEmpty)
//!     .with(tags::PATIENT_ID, Action::Remove)
//!     .with(tags::SERIES_INSTANCE_UID, Action::RegenerateUid);
//! let anonymizer = Anonymizer::new(policy);
//! let mut ctx = AnonymizationContext::new();
//!
//! let mut dataset = Dataset::new();
//! dataset.set(tags::PATIENT_NAME, "DOE^JOHN");
//! dataset.set(tags::PATIENT_ID, "12345");
//! dataset.set(tags::SERIES_INSTANCE_UID, "1.2.3");
//!
//! let anonymized = anonymizer.anonymize(&mut ctx, dataset)?;
//! assert_eq!(anonymized.get_str(tags::PATIENT_NAME), Some(""));
//! assert!(!anonymized.contains(tags::PATIENT_ID));
//! assert_ne!(anonymized.get_str(tags::SERIES_INSTANCE_UID), Some("1.2.3"));
//! # Ok::<(), dcmanon_anonymizer::AnonymizeError>(())
//! ```
//!
//! Whole directory trees are anonymized with [`anonymize_tree`](batch::anonymize_tree).
pub mod anonymizer;
pub mod batch;
pub mod context;
pub mod policy;
pub mod stage;

pub use crate::anonymizer::{AnonymizeError, Anonymizer};
pub use crate::batch::{
    anonymize_directory, anonymize_file, anonymize_files, anonymize_tree, check_directories,
    copy_directory, list_files, BatchError, BatchOptions, BatchReport, CancellationToken,
    FileError,
};
pub use crate::context::{generate_uid, AnonymizationContext};
pub use crate::policy::{Action, AnonymizationPolicy, PolicyError};
pub use crate::stage::{AnonymizerFilter, BASIC_PROFILE_FILTER};
