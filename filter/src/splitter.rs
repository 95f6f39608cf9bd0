//! Splitters: stages which partition an instance set by attribute value.
use crate::filter::{Filter, FilterKind, FilterLog, MissingTagSnafu, NotConfiguredSnafu, Result, UnsupportedValueSnafu};
use dcmanon_core::{tags, Dataset, InstanceSet, Tag};
use snafu::OptionExt;
use std::collections::HashMap;
use tracing::debug;

/// Partitions an instance set by the textual value of one attribute.
///
/// The partition is stable:
/// instances keep their relative order within each output set,
/// and the output sets appear in the order in which
/// their value was first seen.
/// An empty input yields a single empty set.
#[derive(Debug, Clone, Default)]
pub struct TagValueSplitter {
    tag: Option<Tag>,
}

impl TagValueSplitter {
    /// Create a splitter which still needs its attribute.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a splitter on the given attribute.
    pub fn with_tag(tag: Tag) -> Self {
        TagValueSplitter { tag: Some(tag) }
    }

    /// Set the attribute to split on.
    pub fn set_tag(&mut self, tag: Tag) {
        self.tag = Some(tag);
    }

    /// The attribute to split on, if configured.
    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }
}

/// Split a set by the textual value of `tag`.
pub(crate) fn split_by(tag: Tag, set: InstanceSet) -> Result<Vec<InstanceSet>> {
    if set.is_empty() {
        return Ok(vec![set]);
    }
    let mut keys = Vec::with_capacity(set.len());
    for (i, instance) in set.iter().enumerate() {
        keys.push(group_key(instance, tag, i)?);
    }

    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<InstanceSet> = Vec::new();
    for (key, instance) in keys.into_iter().zip(set) {
        let next = groups.len();
        let position = *positions.entry(key).or_insert(next);
        if position == next {
            groups.push(InstanceSet::new());
        }
        groups[position].push(instance);
    }
    Ok(groups)
}

fn group_key(instance: &Dataset, tag: Tag, index: usize) -> Result<String> {
    let value = instance.get(tag).context(MissingTagSnafu {
        tag,
        instance: index,
    })?;
    let text = value.to_text().context(UnsupportedValueSnafu {
        tag,
        instance: index,
    })?;
    Ok(text.trim_end_matches([' ', '\0']).to_string())
}

impl Filter for TagValueSplitter {
    fn name(&self) -> &str {
        "Tag value splitter"
    }

    fn description(&self) -> &str {
        "Splits instances by the value of a configurable attribute."
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Splitter
    }

    fn is_configuration_required(&self) -> bool {
        true
    }

    fn apply(&mut self, set: InstanceSet, log: &mut FilterLog) -> Result<Vec<InstanceSet>> {
        let tag = self.tag.context(NotConfiguredSnafu { name: self.name() })?;
        let count = set.len();
        let groups = split_by(tag, set)?;
        debug!("split {} instances by {} into {} sets", count, tag, groups.len());
        if groups.len() > 1 {
            log.info(
                self.name(),
                format!("{} distinct values of {}", groups.len(), tag),
            );
        }
        Ok(groups)
    }
}

macro_rules! fixed_splitter {
    ($(#[$meta:meta])* $name:ident, $tag:expr, $label:literal, $description:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Filter for $name {
            fn name(&self) -> &str {
                $label
            }

            fn description(&self) -> &str {
                $description
            }

            fn kind(&self) -> FilterKind {
                FilterKind::Splitter
            }

            fn apply(&mut self, set: InstanceSet, _log: &mut FilterLog) -> Result<Vec<InstanceSet>> {
                split_by($tag, set)
            }
        }
    };
}

fixed_splitter!(
    /// Splits instances by SOP class UID,
    /// so that each output set holds a single kind of object.
    SopClassUidSplitter,
    tags::SOP_CLASS_UID,
    "SOP class UID splitter",
    "Splits instances by SOP class UID."
);

fixed_splitter!(
    /// Splits instances by acquisition number.
    AcquisitionNumberSplitter,
    tags::ACQUISITION_NUMBER,
    "Acquisition number splitter",
    "Splits instances by acquisition number."
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilterError;
    use dcmanon_core::dictionary::uids;
    use pretty_assertions::assert_eq;

    fn instance(uid: &str, class: &str) -> Dataset {
        let mut ds = Dataset::new();
        ds.set(tags::SOP_INSTANCE_UID, uid);
        ds.set(tags::SOP_CLASS_UID, class);
        ds
    }

    fn uids_of(set: &InstanceSet) -> Vec<&str> {
        set.iter()
            .filter_map(|ds| ds.get_str(tags::SOP_INSTANCE_UID))
            .collect()
    }

    #[test]
    fn split_is_stable() {
        let set: InstanceSet = vec![
            instance("1", uids::CT_IMAGE_STORAGE),
            instance("2", uids::MR_IMAGE_STORAGE),
            instance("3", uids::CT_IMAGE_STORAGE),
        ]
        .into();
        let out = SopClassUidSplitter
            .apply(set, &mut FilterLog::new())
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(uids_of(&out[0]), vec!["1", "3"]);
        assert_eq!(uids_of(&out[1]), vec!["2"]);
    }

    #[test]
    fn empty_input_yields_one_empty_set() {
        let out = AcquisitionNumberSplitter
            .apply(InstanceSet::new(), &mut FilterLog::new())
            .unwrap();
        assert_eq!(out, vec![InstanceSet::new()]);
    }

    #[test]
    fn numeric_values_are_grouped_by_text() {
        let mut a = Dataset::new();
        a.set(tags::ACQUISITION_NUMBER, "1 ");
        let mut b = Dataset::new();
        b.set(tags::ACQUISITION_NUMBER, "2");
        let mut c = Dataset::new();
        c.set(tags::ACQUISITION_NUMBER, "1");
        let out = AcquisitionNumberSplitter
            .apply(vec![a, b, c].into(), &mut FilterLog::new())
            .unwrap();
        assert_eq!(out.iter().map(InstanceSet::len).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn missing_attribute_names_the_instance() {
        let set: InstanceSet = vec![
            instance("1", uids::CT_IMAGE_STORAGE),
            Dataset::new(),
        ]
        .into();
        let err = SopClassUidSplitter
            .apply(set, &mut FilterLog::new())
            .unwrap_err();
        assert!(matches!(
            err,
            FilterError::MissingTag { tag: tags::SOP_CLASS_UID, instance: 1, .. }
        ));
    }

    #[test]
    fn unconfigured_splitter_fails() {
        let mut splitter = TagValueSplitter::new();
        assert!(splitter.is_configuration_required());
        let err = splitter
            .apply(InstanceSet::new(), &mut FilterLog::new())
            .unwrap_err();
        assert!(matches!(err, FilterError::NotConfigured { .. }));

        splitter.set_tag(tags::SOP_CLASS_UID);
        assert_eq!(splitter.tag(), Some(tags::SOP_CLASS_UID));
        let out = splitter
            .apply(vec![instance("1", uids::CT_IMAGE_STORAGE)].into(), &mut FilterLog::new())
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn blob_values_cannot_be_split_on() {
        let mut ds = Dataset::new();
        ds.set(tags::PIXEL_DATA, vec![1_u8, 2]);
        let err = TagValueSplitter::with_tag(tags::PIXEL_DATA)
            .apply(vec![ds].into(), &mut FilterLog::new())
            .unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedValue { instance: 0, .. }));
    }
}
