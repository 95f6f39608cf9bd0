//! The in-memory data set of one DICOM instance.
use crate::dictionary;
use crate::header::{Tag, VR};
use crate::value::TagValue;
use std::collections::HashMap;
use std::fmt;

/// A value together with its value representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    vr: VR,
    value: TagValue,
}

impl Element {
    /// Create an element from its parts.
    pub fn new(vr: VR, value: impl Into<TagValue>) -> Self {
        Element {
            vr,
            value: value.into(),
        }
    }

    /// The value representation of the element.
    #[inline]
    pub fn vr(&self) -> VR {
        self.vr
    }

    /// The element's value.
    #[inline]
    pub fn value(&self) -> &TagValue {
        &self.value
    }

    /// Mutable access to the element's value.
    #[inline]
    pub fn value_mut(&mut self) -> &mut TagValue {
        &mut self.value
    }

    /// Replace the value, keeping the value representation,
    /// and return the previous value.
    pub fn replace_value(&mut self, value: impl Into<TagValue>) -> TagValue {
        std::mem::replace(&mut self.value, value.into())
    }

    /// Take the value out of the element.
    pub fn into_value(self) -> TagValue {
        self.value
    }
}

/// An ordered mapping from tag to element.
///
/// Each tag appears at most once, and setting a tag again replaces
/// its element in place. Iteration follows insertion order.
/// Serializers are expected to sort by tag where the format requires it.
///
/// Cloning a data set copies its whole structure,
/// except for blobs held in the buffer store:
/// the clone refers to the same buffers as the original,
/// and a write through either one is visible to both.
#[derive(Clone, Default)]
pub struct Dataset {
    entries: Vec<(Tag, Element)>,
    index: HashMap<Tag, usize>,
}

impl Dataset {
    /// Create an empty data set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of elements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the data set has no elements.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the data set has an element with this tag.
    pub fn contains(&self, tag: Tag) -> bool {
        self.index.contains_key(&tag)
    }

    /// The value of the element with this tag.
    pub fn get(&self, tag: Tag) -> Option<&TagValue> {
        self.element(tag).map(Element::value)
    }

    /// The element with this tag.
    pub fn element(&self, tag: Tag) -> Option<&Element> {
        self.index.get(&tag).map(|&i| &self.entries[i].1)
    }

    /// Mutable access to the element with this tag.
    pub fn element_mut(&mut self, tag: Tag) -> Option<&mut Element> {
        let i = *self.index.get(&tag)?;
        Some(&mut self.entries[i].1)
    }

    /// Insert an element, replacing any previous element with the same tag.
    ///
    /// A replaced element keeps its position in the iteration order.
    pub fn put(&mut self, tag: Tag, element: Element) -> Option<Element> {
        match self.index.get(&tag) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, element)),
            None => {
                self.index.insert(tag, self.entries.len());
                self.entries.push((tag, element));
                None
            }
        }
    }

    /// Set the value of an attribute, and return the previous value.
    ///
    /// The value representation is kept if the tag is already present.
    /// Otherwise it is looked up in the [dictionary],
    /// falling back to a representation fitting the kind of value.
    pub fn set(&mut self, tag: Tag, value: impl Into<TagValue>) -> Option<TagValue> {
        let value = value.into();
        if let Some(element) = self.element_mut(tag) {
            return Some(element.replace_value(value));
        }
        let vr = dictionary::vr_of(tag).unwrap_or_else(|| default_vr(&value));
        self.put(tag, Element::new(vr, value));
        None
    }

    /// Remove an element, keeping the order of the remaining elements.
    pub fn remove(&mut self, tag: Tag) -> Option<Element> {
        let i = self.index.remove(&tag)?;
        let (_, element) = self.entries.remove(i);
        for position in self.index.values_mut() {
            if *position > i {
                *position -= 1;
            }
        }
        Some(element)
    }

    /// Keep only the elements for which the predicate holds.
    pub fn retain(&mut self, mut keep: impl FnMut(Tag, &Element) -> bool) {
        self.entries.retain(|(tag, element)| keep(*tag, element));
        self.reindex();
    }

    /// The items of the sequence with this tag.
    pub fn get_sequence(&self, tag: Tag) -> Option<&[Dataset]> {
        self.get(tag)?.as_sequence()
    }

    /// Mutable access to the items of the sequence with this tag.
    pub fn get_sequence_mut(&mut self, tag: Tag) -> Option<&mut Vec<Dataset>> {
        self.element_mut(tag)?.value_mut().as_sequence_mut()
    }

    /// The text of the string element with this tag.
    pub fn get_str(&self, tag: Tag) -> Option<&str> {
        self.get(tag)?.as_str()
    }

    /// The first value of the element with this tag as an integer.
    pub fn get_int(&self, tag: Tag) -> Option<i64> {
        self.get(tag)?.to_int()
    }

    /// Iterate over the elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Tag, &Element)> + '_ {
        self.entries.iter().map(|(tag, element)| (*tag, element))
    }

    /// Iterate mutably over the elements in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Tag, &mut Element)> + '_ {
        self.entries.iter_mut().map(|(tag, element)| (*tag, element))
    }

    /// The tags of the data set, in insertion order.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.entries.iter().map(|(tag, _)| *tag)
    }

    /// The tags of the data set in ascending order.
    pub fn sorted_tags(&self) -> Vec<Tag> {
        let mut tags: Vec<_> = self.tags().collect();
        tags.sort_unstable();
        tags
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (tag, _))| (*tag, i))
            .collect();
    }
}

fn default_vr(value: &TagValue) -> VR {
    match value {
        TagValue::Str(_) => VR::LO,
        TagValue::Int(_) => VR::SL,
        TagValue::Decimal(_) => VR::FD,
        TagValue::Bytes(_) | TagValue::Buffer(_) | TagValue::PixelSequence { .. } => VR::OB,
        TagValue::Sequence(_) => VR::SQ,
    }
}

/// Two data sets are equal when they have the same elements,
/// regardless of order.
impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(tag, element)| other.element(tag) == Some(element))
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(tag, e)| (tag, e)))
            .finish()
    }
}

impl FromIterator<(Tag, Element)> for Dataset {
    fn from_iter<T: IntoIterator<Item = (Tag, Element)>>(iter: T) -> Self {
        let mut dataset = Dataset::new();
        dataset.extend(iter);
        dataset
    }
}

impl Extend<(Tag, Element)> for Dataset {
    fn extend<T: IntoIterator<Item = (Tag, Element)>>(&mut self, iter: T) {
        for (tag, element) in iter {
            self.put(tag, element);
        }
    }
}

impl IntoIterator for Dataset {
    type Item = (Tag, Element);
    type IntoIter = std::vec::IntoIter<(Tag, Element)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::tags;
    use dcmanon_buffer::{BufferManager, BufferObject};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn patient() -> Dataset {
        let mut ds = Dataset::new();
        ds.set(tags::PATIENT_NAME, "DOE^JOHN");
        ds.set(tags::PATIENT_ID, "12345");
        ds.set(tags::MODALITY, "CT");
        ds
    }

    #[test]
    fn last_set_wins_and_keeps_position() {
        let mut ds = patient();
        assert_eq!(ds.set(tags::PATIENT_NAME, "ROE^JANE"), Some("DOE^JOHN".into()));
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.get_str(tags::PATIENT_NAME), Some("ROE^JANE"));
        assert_eq!(
            ds.tags().collect::<Vec<_>>(),
            vec![tags::PATIENT_NAME, tags::PATIENT_ID, tags::MODALITY]
        );
    }

    #[test]
    fn set_uses_dictionary_vr() {
        let mut ds = patient();
        assert_eq!(ds.element(tags::PATIENT_NAME).map(Element::vr), Some(VR::PN));
        ds.set(Tag(0x0009, 0x1001), 3_i64);
        assert_eq!(ds.element(Tag(0x0009, 0x1001)).map(Element::vr), Some(VR::SL));
    }

    #[test]
    fn remove_preserves_order_of_the_rest() {
        let mut ds = patient();
        assert!(ds.remove(tags::PATIENT_ID).is_some());
        assert!(ds.remove(tags::PATIENT_ID).is_none());
        assert_eq!(ds.get(tags::PATIENT_ID), None);
        assert_eq!(ds.get_str(tags::MODALITY), Some("CT"));
        assert_eq!(
            ds.tags().collect::<Vec<_>>(),
            vec![tags::PATIENT_NAME, tags::MODALITY]
        );
        ds.retain(|tag, _| tag != tags::PATIENT_NAME);
        assert_eq!(ds.get_str(tags::MODALITY), Some("CT"));
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn sequences_can_be_navigated() {
        let mut item = Dataset::new();
        item.set(tags::REFERENCED_SOP_INSTANCE_UID, "1.2.3.4");
        let mut ds = patient();
        ds.set(tags::REFERENCED_IMAGE_SEQUENCE, vec![item.clone(), item]);

        let items = ds.get_sequence(tags::REFERENCED_IMAGE_SEQUENCE).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].get_str(tags::REFERENCED_SOP_INSTANCE_UID), Some("1.2.3.4"));
        assert_eq!(ds.get_sequence(tags::PATIENT_NAME), None);

        ds.get_sequence_mut(tags::REFERENCED_IMAGE_SEQUENCE)
            .unwrap()
            .pop();
        assert_eq!(ds.get_sequence(tags::REFERENCED_IMAGE_SEQUENCE).unwrap().len(), 1);
    }

    #[test]
    fn clones_share_buffers() {
        let manager = BufferManager::new().unwrap();
        let pixels = Arc::new(BufferObject::from_vec(&manager, vec![0; 16]).unwrap());
        let mut ds = patient();
        ds.set(tags::PIXEL_DATA, pixels.clone());

        let mut copy = ds.clone();
        copy.set(tags::PATIENT_NAME, "ANON");
        assert_eq!(ds.get_str(tags::PATIENT_NAME), Some("DOE^JOHN"));

        pixels.lock().unwrap()[0] = 0xFF;
        match copy.get(tags::PIXEL_DATA) {
            Some(TagValue::Buffer(shared)) => {
                assert!(Arc::ptr_eq(shared, &pixels));
                assert_eq!(shared.lock_const().unwrap()[0], 0xFF);
            }
            other => panic!("unexpected pixel data {:?}", other),
        }
    }

    #[test]
    fn equality_ignores_order() {
        let a = patient();
        let b: Dataset = a.clone().into_iter().rev().collect();
        assert_eq!(a, b);
        let mut c = b.clone();
        c.set(tags::MODALITY, "MR");
        assert_ne!(a, c);
    }
}
