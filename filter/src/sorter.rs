//! Sorters: stages which reorder the instances of a set.
use crate::filter::{Filter, FilterKind, FilterLog, MissingTagSnafu, NotConfiguredSnafu, Result, UnsupportedValueSnafu};
use dcmanon_core::{tags, Dataset, InstanceSet, Tag};
use snafu::{ensure, OptionExt};
use std::cmp::Ordering;

/// Sorts instances by the value of one attribute.
///
/// Values are compared as numbers if every instance has a numeric value,
/// and as text otherwise.
/// The sort is stable.
#[derive(Debug, Clone, Default)]
pub struct TagValueSorter {
    tag: Option<Tag>,
}

impl TagValueSorter {
    /// Create a sorter which still needs its attribute.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sorter on the given attribute.
    pub fn with_tag(tag: Tag) -> Self {
        TagValueSorter { tag: Some(tag) }
    }

    /// Set the attribute to sort by.
    pub fn set_tag(&mut self, tag: Tag) {
        self.tag = Some(tag);
    }

    /// The attribute to sort by, if configured.
    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }
}

enum Keys {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

fn sort_keys(set: &InstanceSet, tag: Tag) -> Result<Keys> {
    let mut texts = Vec::with_capacity(set.len());
    for (i, instance) in set.iter().enumerate() {
        let value = instance.get(tag).context(MissingTagSnafu { tag, instance: i })?;
        let text = value
            .to_text()
            .context(UnsupportedValueSnafu { tag, instance: i })?;
        texts.push(text.trim().to_string());
    }
    let numbers: Option<Vec<f64>> = texts
        .iter()
        .map(|text| text.split('\\').next().and_then(|n| n.trim().parse().ok()))
        .collect();
    Ok(match numbers {
        Some(numbers) => Keys::Numeric(numbers),
        None => Keys::Text(texts),
    })
}

/// Reorder the instances of a set by a key per instance, stably.
fn reorder<K>(set: InstanceSet, keys: Vec<K>, compare: impl Fn(&K, &K) -> Ordering) -> InstanceSet {
    let mut keyed: Vec<(K, Dataset)> = keys.into_iter().zip(set).collect();
    keyed.sort_by(|(a, _), (b, _)| compare(a, b));
    keyed.into_iter().map(|(_, instance)| instance).collect()
}

pub(crate) fn sort_by(tag: Tag, set: InstanceSet) -> Result<InstanceSet> {
    Ok(match sort_keys(&set, tag)? {
        Keys::Numeric(keys) => reorder(set, keys, f64::total_cmp),
        Keys::Text(keys) => reorder(set, keys, Ord::cmp),
    })
}

impl Filter for TagValueSorter {
    fn name(&self) -> &str {
        "Tag value sorter"
    }

    fn description(&self) -> &str {
        "Sorts instances by the value of a configurable attribute."
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Sorter
    }

    fn is_configuration_required(&self) -> bool {
        true
    }

    fn apply(&mut self, set: InstanceSet, _log: &mut FilterLog) -> Result<Vec<InstanceSet>> {
        let tag = self.tag.context(NotConfiguredSnafu { name: self.name() })?;
        Ok(vec![sort_by(tag, set)?])
    }
}

/// Sorts instances by instance number.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceNumberSorter;

impl Filter for InstanceNumberSorter {
    fn name(&self) -> &str {
        "Instance number sorter"
    }

    fn description(&self) -> &str {
        "Sorts instances by instance number."
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Sorter
    }

    fn apply(&mut self, set: InstanceSet, _log: &mut FilterLog) -> Result<Vec<InstanceSet>> {
        Ok(vec![sort_by(tags::INSTANCE_NUMBER, set)?])
    }
}

/// Sorts image slices along their stacking direction.
///
/// The position of each slice is projected
/// on the normal of the image plane,
/// which is the cross product of the row and column directions
/// of the image orientation.
/// The orientation of the first instance which has one
/// is used for the whole set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImagePositionPatientSorter;

fn vector<const N: usize>(instance: &Dataset, tag: Tag, index: usize) -> Result<[f64; N]> {
    let value = instance.get(tag).context(MissingTagSnafu { tag, instance: index })?;
    let numbers = value
        .to_floats()
        .context(UnsupportedValueSnafu { tag, instance: index })?;
    ensure!(
        numbers.len() == N,
        UnsupportedValueSnafu { tag, instance: index }
    );
    let mut out = [0.; N];
    out.copy_from_slice(&numbers);
    Ok(out)
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl Filter for ImagePositionPatientSorter {
    fn name(&self) -> &str {
        "Image position patient sorter"
    }

    fn description(&self) -> &str {
        "Sorts slices by their position along the normal of the image plane."
    }

    fn kind(&self) -> FilterKind {
        FilterKind::Sorter
    }

    fn apply(&mut self, set: InstanceSet, log: &mut FilterLog) -> Result<Vec<InstanceSet>> {
        if set.is_empty() {
            return Ok(vec![set]);
        }
        let tag = tags::IMAGE_ORIENTATION_PATIENT;
        let (index, first) = set
            .iter()
            .enumerate()
            .find(|(_, ds)| ds.contains(tag))
            .context(MissingTagSnafu { tag, instance: 0_usize })?;
        let orientation: [f64; 6] = vector(first, tag, index)?;
        let row = [orientation[0], orientation[1], orientation[2]];
        let column = [orientation[3], orientation[4], orientation[5]];
        let normal = cross(row, column);

        let mut keys = Vec::with_capacity(set.len());
        for (i, instance) in set.iter().enumerate() {
            let position: [f64; 3] = vector(instance, tags::IMAGE_POSITION_PATIENT, i)?;
            keys.push(dot(position, normal));
        }
        let distinct = {
            let mut sorted = keys.clone();
            sorted.sort_by(f64::total_cmp);
            sorted.dedup();
            sorted.len()
        };
        if distinct < keys.len() {
            log.warning(
                self.name(),
                format!("{} slices share a position", keys.len() - distinct + 1),
            );
        }
        Ok(vec![reorder(set, keys, f64::total_cmp)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::LogLevel;
    use crate::FilterError;
    use pretty_assertions::assert_eq;

    fn numbers(set: &InstanceSet) -> Vec<i64> {
        set.iter()
            .filter_map(|ds| ds.get_int(tags::INSTANCE_NUMBER))
            .collect()
    }

    fn numbered(n: &str) -> Dataset {
        let mut ds = Dataset::new();
        ds.set(tags::INSTANCE_NUMBER, n);
        ds
    }

    #[test]
    fn sorts_by_instance_number_numerically() {
        let set: InstanceSet = vec![numbered("10"), numbered("2"), numbered("1")].into();
        let out = InstanceNumberSorter
            .apply(set, &mut FilterLog::new())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(numbers(&out[0]), vec![1, 2, 10]);
    }

    #[test]
    fn text_values_sort_lexicographically() {
        let mut set = InstanceSet::new();
        for name in ["b", "a", "c"] {
            let mut ds = Dataset::new();
            ds.set(tags::SERIES_DESCRIPTION, name);
            set.push(ds);
        }
        let out = TagValueSorter::with_tag(tags::SERIES_DESCRIPTION)
            .apply(set, &mut FilterLog::new())
            .unwrap();
        let names: Vec<_> = out[0]
            .iter()
            .filter_map(|ds| ds.get_str(tags::SERIES_DESCRIPTION))
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn equal_keys_keep_their_order() {
        let mut a = numbered("1");
        a.set(tags::SOP_INSTANCE_UID, "a");
        let mut b = numbered("1");
        b.set(tags::SOP_INSTANCE_UID, "b");
        let out = InstanceNumberSorter
            .apply(vec![a, numbered("0"), b].into(), &mut FilterLog::new())
            .unwrap();
        let uids: Vec<_> = out[0]
            .iter()
            .map(|ds| ds.get_str(tags::SOP_INSTANCE_UID).unwrap_or("-"))
            .collect();
        assert_eq!(uids, vec!["-", "a", "b"]);
    }

    #[test]
    fn missing_number_names_the_instance() {
        let err = InstanceNumberSorter
            .apply(vec![numbered("1"), Dataset::new()].into(), &mut FilterLog::new())
            .unwrap_err();
        assert_eq!(err.instance(), Some(1));
        assert!(matches!(err, FilterError::MissingTag { .. }));
    }

    fn slice(number: i64, position: &str) -> Dataset {
        let mut ds = Dataset::new();
        ds.set(tags::INSTANCE_NUMBER, number);
        ds.set(tags::IMAGE_ORIENTATION_PATIENT, "1\\0\\0\\0\\1\\0");
        ds.set(tags::IMAGE_POSITION_PATIENT, position);
        ds
    }

    #[test]
    fn slices_sort_along_the_normal() {
        let set: InstanceSet = vec![
            slice(1, "0\\0\\20"),
            slice(2, "0\\0\\-5"),
            slice(3, "5\\5\\7.5"),
        ]
        .into();
        let mut log = FilterLog::new();
        let out = ImagePositionPatientSorter.apply(set, &mut log).unwrap();
        assert_eq!(numbers(&out[0]), vec![2, 3, 1]);
        assert!(log.is_empty());
    }

    #[test]
    fn coincident_slices_are_reported() {
        let set: InstanceSet = vec![slice(1, "0\\0\\1"), slice(2, "3\\0\\1")].into();
        let mut log = FilterLog::new();
        let out = ImagePositionPatientSorter.apply(set, &mut log).unwrap();
        assert_eq!(numbers(&out[0]), vec![1, 2]);
        assert_eq!(log.at_least(LogLevel::Warning).count(), 1);
    }

    #[test]
    fn malformed_position_is_unsupported() {
        let set: InstanceSet = vec![slice(1, "0\\0\\1"), slice(2, "0\\1")].into();
        let err = ImagePositionPatientSorter
            .apply(set, &mut FilterLog::new())
            .unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedValue { instance: 1, .. }));
    }
}
