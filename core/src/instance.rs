//! Ordered collections of data sets.
use crate::header::Tag;
use crate::Dataset;

/// An ordered sequence of data sets
/// believed to belong to the same logical series.
///
/// Instance sets are what flows between the stages of a filter pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceSet {
    instances: Vec<Dataset>,
}

impl InstanceSet {
    /// Create an empty instance set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the set has no instances.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Append an instance to the end of the set.
    pub fn push(&mut self, instance: Dataset) {
        self.instances.push(instance);
    }

    /// The instance at this position.
    pub fn get(&self, index: usize) -> Option<&Dataset> {
        self.instances.get(index)
    }

    /// Iterate over the instances in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Dataset> {
        self.instances.iter()
    }

    /// Iterate mutably over the instances in order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Dataset> {
        self.instances.iter_mut()
    }

    /// Mutable access to the underlying sequence,
    /// for reordering instances in place.
    pub fn instances_mut(&mut self) -> &mut Vec<Dataset> {
        &mut self.instances
    }

    /// The position of the first instance without the given attribute.
    pub fn find_missing(&self, tag: Tag) -> Option<usize> {
        self.instances.iter().position(|ds| !ds.contains(tag))
    }

    /// Take the instances out of the set.
    pub fn into_vec(self) -> Vec<Dataset> {
        self.instances
    }
}

impl From<Vec<Dataset>> for InstanceSet {
    fn from(instances: Vec<Dataset>) -> Self {
        InstanceSet { instances }
    }
}

impl FromIterator<Dataset> for InstanceSet {
    fn from_iter<T: IntoIterator<Item = Dataset>>(iter: T) -> Self {
        InstanceSet {
            instances: iter.into_iter().collect(),
        }
    }
}

impl Extend<Dataset> for InstanceSet {
    fn extend<T: IntoIterator<Item = Dataset>>(&mut self, iter: T) {
        self.instances.extend(iter);
    }
}

impl IntoIterator for InstanceSet {
    type Item = Dataset;
    type IntoIter = std::vec::IntoIter<Dataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.into_iter()
    }
}

impl<'a> IntoIterator for &'a InstanceSet {
    type Item = &'a Dataset;
    type IntoIter = std::slice::Iter<'a, Dataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::tags;

    #[test]
    fn finds_instances_missing_an_attribute() {
        let mut a = Dataset::new();
        a.set(tags::SOP_CLASS_UID, "1.2.840.10008.5.1.4.1.1.2");
        let b = Dataset::new();
        let set: InstanceSet = vec![a.clone(), b, a].into();
        assert_eq!(set.len(), 3);
        assert_eq!(set.find_missing(tags::SOP_CLASS_UID), Some(1));
        assert_eq!(set.find_missing(tags::PATIENT_ID), Some(0));
        assert_eq!(InstanceSet::new().find_missing(tags::PATIENT_ID), None);
    }
}
