//! A process-wide index of filter constructors by name.
//!
//! The built-in stages are always registered.
//! With the `inventory-registry` feature,
//! other crates can add their own stages with [`submit_filter!`](crate::submit_filter),
//! and they become available through [`create_filter`].
use crate::custom::{CompositeFilter, TagValueFilter};
use crate::filter::Filter;
use crate::sorter::{ImagePositionPatientSorter, InstanceNumberSorter, TagValueSorter};
use crate::splitter::{AcquisitionNumberSplitter, SopClassUidSplitter, TagValueSplitter};
use dcmanon_core::tags;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// The name of the default stage for organizing DICOM files into series:
/// a split by SOP class UID followed by a split by series instance UID.
pub const DEFAULT_DICOM_FILTER: &str = "dcmanon::filter::default_dicom_filter";

/// A named constructor of filter stages.
#[derive(Clone, Copy)]
pub struct FilterFactory {
    /// The unique name of the stage.
    pub name: &'static str,
    /// Creates a new instance of the stage.
    pub create: fn() -> Box<dyn Filter>,
}

impl fmt::Debug for FilterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterFactory")
            .field("name", &self.name)
            .finish()
    }
}

impl FilterFactory {
    /// Create a factory entry.
    pub const fn new(name: &'static str, create: fn() -> Box<dyn Filter>) -> Self {
        FilterFactory { name, create }
    }
}

#[cfg(feature = "inventory-registry")]
// Collect filter factories from other crates.
inventory::collect!(FilterFactory);

#[cfg(feature = "inventory-registry")]
#[macro_export]
/// Submit a filter factory to the program's filter registry.
///
/// This macro does not "run" anything,
/// so place it outside of a function body.
macro_rules! submit_filter {
    ($factory: expr) => {
        $crate::inventory::submit! {
            $factory
        }
    };
}

#[cfg(not(feature = "inventory-registry"))]
#[macro_export]
/// Submit a filter factory to the program's filter registry.
///
/// This macro does not "run" anything,
/// so place it outside of a function body.
///
/// Without the `inventory-registry` feature, this request is ignored.
macro_rules! submit_filter {
    ($factory: expr) => {
        // ignore request
    };
}

/// Main implementation of a registry of filter stages.
pub struct FilterRegistry {
    m: HashMap<&'static str, fn() -> Box<dyn Filter>>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.m.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry")
            .field("filters", &names)
            .finish()
    }
}

impl FilterRegistry {
    /// Create a new instance of the stage registered under this name.
    pub fn create(&self, name: &str) -> Option<Box<dyn Filter>> {
        self.m.get(name.trim()).map(|create| create())
    }

    /// Whether a stage is registered under this name.
    pub fn contains(&self, name: &str) -> bool {
        self.m.contains_key(name.trim())
    }

    /// The names of all registered stages, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.m.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Register a factory.
    ///
    /// Returns false if another factory with the same name
    /// was already registered, in which case it is kept.
    fn register(&mut self, factory: FilterFactory) -> bool {
        match self.m.entry(factory.name) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(factory.create);
                true
            }
        }
    }
}

fn default_dicom_filter() -> Box<dyn Filter> {
    Box::new(
        CompositeFilter::new("Default DICOM filter")
            .with(SopClassUidSplitter)
            .with(TagValueSplitter::with_tag(tags::SERIES_INSTANCE_UID)),
    )
}

fn sop_class_uid_splitter() -> Box<dyn Filter> {
    Box::new(SopClassUidSplitter)
}

fn acquisition_number_splitter() -> Box<dyn Filter> {
    Box::new(AcquisitionNumberSplitter)
}

fn tag_value_splitter() -> Box<dyn Filter> {
    Box::new(TagValueSplitter::new())
}

fn instance_number_sorter() -> Box<dyn Filter> {
    Box::new(InstanceNumberSorter)
}

fn image_position_patient_sorter() -> Box<dyn Filter> {
    Box::new(ImagePositionPatientSorter)
}

fn tag_value_sorter() -> Box<dyn Filter> {
    Box::new(TagValueSorter::new())
}

fn tag_value_filter() -> Box<dyn Filter> {
    Box::new(TagValueFilter::new())
}

static BUILT_IN: &[FilterFactory] = &[
    FilterFactory::new(DEFAULT_DICOM_FILTER, default_dicom_filter),
    FilterFactory::new("dcmanon::filter::sop_class_uid_splitter", sop_class_uid_splitter),
    FilterFactory::new("dcmanon::filter::acquisition_number_splitter", acquisition_number_splitter),
    FilterFactory::new("dcmanon::filter::tag_value_splitter", tag_value_splitter),
    FilterFactory::new("dcmanon::filter::instance_number_sorter", instance_number_sorter),
    FilterFactory::new("dcmanon::filter::image_position_patient_sorter", image_position_patient_sorter),
    FilterFactory::new("dcmanon::filter::tag_value_sorter", tag_value_sorter),
    FilterFactory::new("dcmanon::filter::tag_value_filter", tag_value_filter),
];

static REGISTRY: Lazy<FilterRegistry> = Lazy::new(|| {
    let mut registry = FilterRegistry { m: HashMap::new() };
    for factory in BUILT_IN {
        registry.register(*factory);
    }

    #[cfg(feature = "inventory-registry")]
    for factory in inventory::iter::<FilterFactory> {
        if !registry.register(*factory) {
            tracing::warn!("Filter `{}` is already registered, ignoring", factory.name);
        }
    }

    registry
});

/// Retrieve the program's filter registry.
pub fn registry() -> &'static FilterRegistry {
    &REGISTRY
}

/// Create a new instance of the stage registered under this name.
pub fn create_filter(name: &str) -> Option<Box<dyn Filter>> {
    registry().create(name)
}
