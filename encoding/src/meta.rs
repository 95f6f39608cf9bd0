//! File meta information group.
//!
//! The meta group (group `0002`) is kept in the same [`Dataset`]
//! as the rest of the attributes.
//! When writing, the group is completed from the main data set
//! and its group length is recomputed.
use crate::write::{Encoder, Result, WritePreambleSnafu};
use dcmanon_core::{tags, Dataset, Element, Tag, TagValue, VR};
use snafu::ResultExt;
use std::io::Write;

/// The size of the file preamble, which precedes the magic code.
pub const PREAMBLE_LENGTH: usize = 128;

/// The magic code of DICOM files, right after the preamble.
pub const DICM_MAGIC_CODE: [u8; 4] = *b"DICM";

/// The implementation class UID written to new file meta groups.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.262695938812069858393287124856314207781";

/// The implementation version name written to new file meta groups.
pub const IMPLEMENTATION_VERSION_NAME: &str = "DCMANON_030";

/// Collect the file meta group of a data set for writing,
/// filling in missing required attributes.
///
/// The media storage SOP class and instance UIDs
/// fall back to the SOP class and instance UIDs of the main data set,
/// and the transfer syntax to `default_transfer_syntax`.
pub fn file_meta_group(dataset: &Dataset, default_transfer_syntax: &str) -> Dataset {
    let mut meta: Dataset = dataset
        .iter()
        .filter(|(tag, _)| tag.is_meta() && !tag.is_group_length())
        .map(|(tag, element)| (tag, element.clone()))
        .collect();

    if !meta.contains(tags::FILE_META_INFORMATION_VERSION) {
        meta.put(
            tags::FILE_META_INFORMATION_VERSION,
            Element::new(VR::OB, vec![0x00, 0x01]),
        );
    }
    fill_from(&mut meta, tags::MEDIA_STORAGE_SOP_CLASS_UID, dataset, tags::SOP_CLASS_UID);
    fill_from(&mut meta, tags::MEDIA_STORAGE_SOP_INSTANCE_UID, dataset, tags::SOP_INSTANCE_UID);
    if !meta.contains(tags::TRANSFER_SYNTAX_UID) {
        meta.put(
            tags::TRANSFER_SYNTAX_UID,
            Element::new(VR::UI, default_transfer_syntax),
        );
    }
    if !meta.contains(tags::IMPLEMENTATION_CLASS_UID) {
        meta.put(
            tags::IMPLEMENTATION_CLASS_UID,
            Element::new(VR::UI, IMPLEMENTATION_CLASS_UID),
        );
        meta.put(
            tags::IMPLEMENTATION_VERSION_NAME,
            Element::new(VR::SH, IMPLEMENTATION_VERSION_NAME),
        );
    }
    meta
}

fn fill_from(meta: &mut Dataset, meta_tag: Tag, dataset: &Dataset, tag: Tag) {
    if meta.contains(meta_tag) {
        return;
    }
    if let Some(uid) = dataset.get_str(tag) {
        meta.put(meta_tag, Element::new(VR::UI, uid));
    }
}

/// Write the preamble, the magic code and the given meta group,
/// preceded by its group length.
pub(crate) fn write_meta<W: Write>(mut sink: W, meta: &Dataset) -> Result<W> {
    let mut encoder = Encoder::new(Vec::new(), true);
    encoder.write_dataset(meta)?;
    let group = encoder.into_inner();

    sink.write_all(&[0; PREAMBLE_LENGTH])
        .context(WritePreambleSnafu)?;
    sink.write_all(&DICM_MAGIC_CODE)
        .context(WritePreambleSnafu)?;

    let mut encoder = Encoder::new(sink, true);
    encoder.write_element(
        tags::FILE_META_INFORMATION_GROUP_LENGTH,
        &Element::new(VR::UL, TagValue::from(group.len() as i64)),
    )?;
    let mut sink = encoder.into_inner();
    sink.write_all(&group).context(WritePreambleSnafu)?;
    Ok(sink)
}
