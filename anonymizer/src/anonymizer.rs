//! Per data set anonymization.
use crate::context::AnonymizationContext;
use crate::policy::{Action, AnonymizationPolicy};
use dcmanon_core::{tags, Dataset, Element, Tag, TagValue, VR};
use sha2::{Digest, Sha256};
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, trace};

/// An error anonymizing a data set.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum AnonymizeError {
    /// The value of a buffer could not be loaded for hashing.
    #[snafu(display("Could not load value of {} for hashing", tag))]
    LoadBuffer {
        /// the attribute
        tag: Tag,
        /// the buffer store error
        source: dcmanon_buffer::Error,
    },
    /// A fixed replacement does not fit the value representation.
    #[snafu(display("Cannot replace {} ({}) with {:?}", tag, vr, value))]
    InvalidReplacement {
        /// the attribute
        tag: Tag,
        /// its value representation
        vr: VR,
        /// the replacement
        value: String,
        /// where the error was raised
        backtrace: Backtrace,
    },
    /// The value of an attribute to hash has no byte representation.
    #[snafu(display("Cannot hash the value of {}", tag))]
    Unhashable {
        /// the attribute
        tag: Tag,
        /// where the error was raised
        backtrace: Backtrace,
    },
    /// The value of an attribute to regenerate is not a UID.
    #[snafu(display("The value of {} is not a UID", tag))]
    NotAUid {
        /// the attribute
        tag: Tag,
        /// where the error was raised
        backtrace: Backtrace,
    },
}

/// Type alias for the result of anonymizing a data set.
pub type Result<T, E = AnonymizeError> = std::result::Result<T, E>;

/// Strips or replaces identifying information in data sets
/// according to a policy.
///
/// The anonymizer itself holds no job state:
/// the UID replacements live in the [`AnonymizationContext`]
/// given to each call, which makes one anonymizer
/// usable by any number of jobs, even concurrently.
#[derive(Debug, Clone)]
pub struct Anonymizer {
    policy: Arc<AnonymizationPolicy>,
}

/// File meta UIDs and the data set UIDs they must stay equal to.
const MIRRORED_UIDS: [(Tag, Tag); 2] = [
    (tags::MEDIA_STORAGE_SOP_INSTANCE_UID, tags::SOP_INSTANCE_UID),
    (tags::MEDIA_STORAGE_SOP_CLASS_UID, tags::SOP_CLASS_UID),
];

impl Anonymizer {
    /// Create an anonymizer following the given policy.
    pub fn new(policy: AnonymizationPolicy) -> Self {
        Anonymizer {
            policy: Arc::new(policy),
        }
    }

    /// Create an anonymizer following a shared policy.
    pub fn with_shared_policy(policy: Arc<AnonymizationPolicy>) -> Self {
        Anonymizer { policy }
    }

    /// The policy of this anonymizer.
    pub fn policy(&self) -> &AnonymizationPolicy {
        &self.policy
    }

    /// Anonymize a data set.
    ///
    /// Every attribute is transformed by the action which the policy
    /// resolves for it, and the items of kept sequences are anonymized
    /// with the same policy and the same context.
    /// Group length attributes are dropped,
    /// since they would no longer be accurate.
    /// If the policy says so, the result is marked as de-identified.
    ///
    /// The media storage SOP instance and class UIDs of the file meta group
    /// follow the SOP instance and class UIDs they mirror:
    /// when the policy regenerates the latter,
    /// the former go through the same UID map whatever their own rule is.
    pub fn anonymize(&self, ctx: &mut AnonymizationContext, dataset: Dataset) -> Result<Dataset> {
        let mirrors: Vec<(Tag, Element)> = MIRRORED_UIDS
            .iter()
            .filter(|(_, uid)| *self.policy.action_for(*uid) == Action::RegenerateUid)
            .filter_map(|(meta, _)| dataset.element(*meta).map(|e| (*meta, e.clone())))
            .collect();
        let mut out = self.anonymize_items(ctx, dataset)?;
        for (tag, element) in mirrors {
            let value = regenerate_uids(ctx, tag, element.value())?;
            out.put(tag, Element::new(element.vr(), value));
        }
        if self.policy.mark_deidentified() {
            out.put(tags::PATIENT_IDENTITY_REMOVED, Element::new(VR::CS, "YES"));
            out.put(
                tags::DEIDENTIFICATION_METHOD,
                Element::new(VR::LO, self.policy.method()),
            );
        }
        ctx.count_dataset();
        Ok(out)
    }

    fn anonymize_items(&self, ctx: &mut AnonymizationContext, dataset: Dataset) -> Result<Dataset> {
        let mut out = Dataset::new();
        for (tag, element) in dataset {
            if tag.is_group_length() {
                continue;
            }
            let vr = element.vr();
            let action = self.policy.action_for(tag);
            trace!("{} {:?}", tag, action);
            let value = match action {
                Action::Keep => match element.into_value() {
                    TagValue::Sequence(items) => TagValue::Sequence(
                        items
                            .into_iter()
                            .map(|item| self.anonymize_items(ctx, item))
                            .collect::<Result<_>>()?,
                    ),
                    value => value,
                },
                Action::Remove => {
                    debug!("Removing {}", tag);
                    continue;
                }
                Action::ReplaceWithEmpty => element.value().empty_like(),
                Action::ReplaceWithFixed(text) => fixed_value(tag, vr, element.value(), text)?,
                Action::Hash => hash_value(tag, vr, element.value(), self.policy.salt())?,
                Action::RegenerateUid => regenerate_uids(ctx, tag, element.value())?,
            };
            out.put(tag, Element::new(vr, value));
        }
        Ok(out)
    }
}

/// Convert a fixed replacement to a value of the given VR.
fn fixed_value(tag: Tag, vr: VR, original: &TagValue, text: &str) -> Result<TagValue> {
    let invalid = || {
        InvalidReplacementSnafu {
            tag,
            vr,
            value: text,
        }
    };
    if text.is_empty() {
        return Ok(original.empty_like());
    }
    if vr == VR::SQ || matches!(original, TagValue::Sequence(_)) {
        return invalid().fail();
    }
    if vr.is_text() {
        return Ok(TagValue::Str(text.to_string()));
    }
    if vr.int_width().is_some() {
        let values = text
            .split('\\')
            .map(|v| v.trim().parse().ok())
            .collect::<Option<_>>()
            .with_context(invalid)?;
        return Ok(TagValue::Int(values));
    }
    if vr.float_width().is_some() {
        let values = text
            .split('\\')
            .map(|v| v.trim().parse().ok())
            .collect::<Option<_>>()
            .with_context(invalid)?;
        return Ok(TagValue::Decimal(values));
    }
    Ok(TagValue::Bytes(text.as_bytes().to_vec()))
}

/// Replace a value with a digest of the original value
/// which fits the value representation.
///
/// - UIDs become a UID in the `2.25` arc;
/// - integer strings (`IS`, `DS`) become a non-negative decimal number;
/// - other text becomes upper case hexadecimal,
///   truncated to the maximum length of the VR;
/// - binary numbers become a non-negative number in range;
/// - blobs become the raw digest.
fn hash_value(tag: Tag, vr: VR, original: &TagValue, salt: &str) -> Result<TagValue> {
    if original.is_empty() {
        return Ok(original.empty_like());
    }
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    match original {
        TagValue::Str(s) => hasher.update(s.as_bytes()),
        TagValue::Int(_) | TagValue::Decimal(_) => {
            let text = original.to_text().unwrap_or(Cow::Borrowed(""));
            hasher.update(text.as_bytes());
        }
        TagValue::Bytes(bytes) => hasher.update(bytes),
        TagValue::Buffer(buffer) => {
            let lock = buffer.lock_const().context(LoadBufferSnafu { tag })?;
            hasher.update(&lock[..]);
        }
        TagValue::PixelSequence { fragments, .. } => {
            for fragment in fragments {
                hasher.update(fragment);
            }
        }
        TagValue::Sequence(_) => return UnhashableSnafu { tag }.fail(),
    }
    let digest = hasher.finalize();

    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    let number = u128::from_be_bytes(head);

    Ok(match vr {
        VR::UI => TagValue::Str(format!("2.25.{}", number)),
        VR::IS | VR::DS => TagValue::Str((number % 1_000_000_000).to_string()),
        vr if vr.is_text() => {
            let mut hex = format!("{:X}", digest);
            if let Some(max) = vr.max_length() {
                hex.truncate(max);
            }
            TagValue::Str(hex)
        }
        vr => match (vr.int_width(), vr.float_width()) {
            (Some(width), _) => {
                let mask = (1u128 << (width * 8 - 1)) - 1;
                TagValue::Int(std::iter::once((number & mask) as i64).collect())
            }
            (None, Some(_)) => {
                TagValue::Decimal(std::iter::once((number % 1_000_000) as f64).collect())
            }
            (None, None) => TagValue::Bytes(digest.to_vec()),
        },
    })
}

/// Map every UID of a value through the job's UID map.
fn regenerate_uids(ctx: &mut AnonymizationContext, tag: Tag, original: &TagValue) -> Result<TagValue> {
    match original {
        TagValue::Str(uids) => {
            let mapped: Vec<String> = uids.split('\\').map(|uid| ctx.map_uid(uid)).collect();
            Ok(TagValue::Str(mapped.join("\\")))
        }
        value if value.is_empty() => Ok(value.clone()),
        _ => NotAUidSnafu { tag }.fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcmanon_buffer::BufferManager;
    use dcmanon_core::dictionary::uids;
    use pretty_assertions::assert_eq;

    fn patient() -> Dataset {
        let mut ds = Dataset::new();
        ds.set(tags::SOP_CLASS_UID, uids::CT_IMAGE_STORAGE);
        ds.set(tags::SOP_INSTANCE_UID, "1.2.3.100");
        ds.set(tags::PATIENT_NAME, "DOE^JOHN");
        ds.set(tags::PATIENT_ID, "12345");
        ds.set(tags::SERIES_INSTANCE_UID, "1.2.3");
        ds
    }

    fn scenario_policy() -> AnonymizationPolicy {
        AnonymizationPolicy::new()
            .with(tags::PATIENT_NAME, Action::ReplaceWithEmpty)
            .with(tags::PATIENT_ID, Action::Remove)
            .with(tags::SERIES_INSTANCE_UID, Action::RegenerateUid)
    }

    #[test]
    fn doe_john_scenario() {
        let anonymizer = Anonymizer::new(scenario_policy());
        let mut ctx = AnonymizationContext::new();

        let first = anonymizer.anonymize(&mut ctx, patient()).unwrap();
        assert_eq!(first.get_str(tags::PATIENT_NAME), Some(""));
        assert_eq!(first.element(tags::PATIENT_NAME).map(Element::vr), Some(VR::PN));
        assert!(!first.contains(tags::PATIENT_ID));
        let series = first.get_str(tags::SERIES_INSTANCE_UID).unwrap().to_string();
        assert_ne!(series, "1.2.3");
        assert_eq!(first.get_str(tags::SOP_CLASS_UID), Some(uids::CT_IMAGE_STORAGE));

        let mut second_input = patient();
        second_input.set(tags::SOP_INSTANCE_UID, "1.2.3.101");
        let second = anonymizer.anonymize(&mut ctx, second_input).unwrap();
        assert_eq!(second.get_str(tags::SERIES_INSTANCE_UID), Some(series.as_str()));
        assert_eq!(ctx.datasets_processed(), 2);
        assert!(!first.contains(tags::PATIENT_IDENTITY_REMOVED));
    }

    #[test]
    fn nested_items_share_the_uid_map() {
        let policy = AnonymizationPolicy::basic_profile();
        let anonymizer = Anonymizer::new(policy);
        let mut ctx = AnonymizationContext::new();

        let mut reference = Dataset::new();
        reference.set(tags::REFERENCED_SOP_CLASS_UID, uids::CT_IMAGE_STORAGE);
        reference.set(tags::REFERENCED_SOP_INSTANCE_UID, "1.2.3.100");
        reference.set(tags::PATIENT_NAME, "DOE^JOHN");
        let mut fiducials = Dataset::new();
        fiducials.set(tags::SOP_INSTANCE_UID, "1.2.3.200");
        fiducials.set(tags::REFERENCED_IMAGE_SEQUENCE, vec![reference]);

        let image = anonymizer.anonymize(&mut ctx, patient()).unwrap();
        let fiducials = anonymizer.anonymize(&mut ctx, fiducials).unwrap();

        let items = fiducials.get_sequence(tags::REFERENCED_IMAGE_SEQUENCE).unwrap();
        assert_eq!(
            items[0].get_str(tags::REFERENCED_SOP_INSTANCE_UID),
            image.get_str(tags::SOP_INSTANCE_UID)
        );
        assert_eq!(items[0].get_str(tags::PATIENT_NAME), Some(""));
        assert_eq!(
            items[0].get_str(tags::REFERENCED_SOP_CLASS_UID),
            Some(uids::CT_IMAGE_STORAGE)
        );
        assert!(!items[0].contains(tags::PATIENT_IDENTITY_REMOVED));
        assert_eq!(fiducials.get_str(tags::PATIENT_IDENTITY_REMOVED), Some("YES"));
    }

    #[test]
    fn fixed_replacements_follow_the_vr() {
        let policy = AnonymizationPolicy::new()
            .with(tags::INSTITUTION_NAME, Action::ReplaceWithFixed("ANONYMOUS".into()))
            .with(tags::ROWS, Action::ReplaceWithFixed("8".into()))
            .with(tags::COLUMNS, Action::ReplaceWithFixed("eight".into()));
        let anonymizer = Anonymizer::new(policy);
        let mut ds = Dataset::new();
        ds.set(tags::INSTITUTION_NAME, "General Hospital");
        ds.set(tags::ROWS, 512_i64);

        let out = anonymizer
            .anonymize(&mut AnonymizationContext::new(), ds.clone())
            .unwrap();
        assert_eq!(out.get_str(tags::INSTITUTION_NAME), Some("ANONYMOUS"));
        assert_eq!(out.get_int(tags::ROWS), Some(8));

        ds.set(tags::COLUMNS, 512_i64);
        let err = anonymizer
            .anonymize(&mut AnonymizationContext::new(), ds)
            .unwrap_err();
        assert!(matches!(err, AnonymizeError::InvalidReplacement { vr: VR::US, .. }));
    }

    #[test]
    fn hashes_are_deterministic_and_fit_the_vr() {
        let mut policy = AnonymizationPolicy::new()
            .with(tags::PATIENT_ID, Action::Hash)
            .with(tags::PATIENT_NAME, Action::Hash)
            .with(tags::STUDY_INSTANCE_UID, Action::Hash)
            .with(tags::ROWS, Action::Hash)
            .with(tags::PIXEL_DATA, Action::Hash)
            .with(tags::ACCESSION_NUMBER, Action::Hash);
        let mut ds = patient();
        ds.set(tags::STUDY_INSTANCE_UID, "1.2.3.4");
        ds.set(tags::ROWS, 512_i64);
        ds.set(tags::PIXEL_DATA, vec![1_u8, 2, 3, 4]);
        ds.set(tags::ACCESSION_NUMBER, "");

        let a = Anonymizer::new(policy.clone())
            .anonymize(&mut AnonymizationContext::new(), ds.clone())
            .unwrap();
        let b = Anonymizer::new(policy.clone())
            .anonymize(&mut AnonymizationContext::new(), ds.clone())
            .unwrap();
        assert_eq!(a, b);

        let id = a.get_str(tags::PATIENT_ID).unwrap();
        assert_ne!(id, "12345");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(a.get_str(tags::STUDY_INSTANCE_UID).unwrap().starts_with("2.25."));
        let rows = a.get_int(tags::ROWS).unwrap();
        assert!((0..=i64::from(i16::MAX)).contains(&rows));
        assert!(matches!(a.get(tags::PIXEL_DATA), Some(TagValue::Bytes(b)) if b.len() == 32));
        assert_eq!(a.get_str(tags::ACCESSION_NUMBER), Some(""));

        policy.set_salt("pepper");
        let salted = Anonymizer::new(policy)
            .anonymize(&mut AnonymizationContext::new(), ds)
            .unwrap();
        assert_ne!(salted.get_str(tags::PATIENT_ID), Some(id));
    }

    #[test]
    fn buffers_are_hashed_by_content() {
        let manager = BufferManager::new().unwrap();
        let buffer = dcmanon_buffer::BufferObject::from_vec(&manager, vec![1, 2, 3, 4]).unwrap();
        let policy = AnonymizationPolicy::new().with(tags::PIXEL_DATA, Action::Hash);
        let anonymizer = Anonymizer::new(policy);

        let mut in_buffer = Dataset::new();
        in_buffer.set(tags::PIXEL_DATA, Arc::new(buffer));
        let mut inline = Dataset::new();
        inline.set(tags::PIXEL_DATA, vec![1_u8, 2, 3, 4]);

        let mut ctx = AnonymizationContext::new();
        let a = anonymizer.anonymize(&mut ctx, in_buffer).unwrap();
        let b = anonymizer.anonymize(&mut ctx, inline).unwrap();
        assert_eq!(a.get(tags::PIXEL_DATA), b.get(tags::PIXEL_DATA));
    }

    #[test]
    fn group_lengths_and_private_groups() {
        let anonymizer = Anonymizer::new(AnonymizationPolicy::basic_profile());
        let mut ds = patient();
        ds.set(Tag(0x0010, 0x0000), 42_i64);
        ds.put(Tag(0x0009, 0x0010), Element::new(VR::LO, "ACME"));
        ds.put(Tag(0x0009, 0x1001), Element::new(VR::LO, "DOE"));
        ds.put(Tag(0x6000, 0x3000), Element::new(VR::OW, vec![0_u8; 8]));
        ds.set(tags::MEDIA_STORAGE_SOP_INSTANCE_UID, "1.2.3.100");

        let out = anonymizer
            .anonymize(&mut AnonymizationContext::new(), ds)
            .unwrap();
        assert!(!out.contains(Tag(0x0010, 0x0000)));
        assert!(!out.contains(Tag(0x0009, 0x0010)));
        assert!(!out.contains(Tag(0x0009, 0x1001)));
        assert!(!out.contains(Tag(0x6000, 0x3000)));
        assert_eq!(
            out.get_str(tags::MEDIA_STORAGE_SOP_INSTANCE_UID),
            out.get_str(tags::SOP_INSTANCE_UID)
        );
        assert_eq!(out.get_str(tags::DEIDENTIFICATION_METHOD), Some(crate::policy::DEFAULT_METHOD));
    }

    #[test]
    fn meta_uids_follow_the_sop_uids() {
        let policy = AnonymizationPolicy::new().with(tags::SOP_INSTANCE_UID, Action::RegenerateUid);
        let anonymizer = Anonymizer::new(policy);
        let mut ctx = AnonymizationContext::new();
        let mut ds = patient();
        ds.set(tags::MEDIA_STORAGE_SOP_CLASS_UID, uids::CT_IMAGE_STORAGE);
        ds.set(tags::MEDIA_STORAGE_SOP_INSTANCE_UID, "1.2.3.100");

        let out = anonymizer.anonymize(&mut ctx, ds).unwrap();
        let sop = out.get_str(tags::SOP_INSTANCE_UID);
        assert_ne!(sop, Some("1.2.3.100"));
        assert_eq!(out.get_str(tags::MEDIA_STORAGE_SOP_INSTANCE_UID), sop);
        assert_eq!(
            out.element(tags::MEDIA_STORAGE_SOP_INSTANCE_UID).map(Element::vr),
            Some(VR::UI)
        );
        // the class is kept, so its mirror is too
        assert_eq!(
            out.get_str(tags::MEDIA_STORAGE_SOP_CLASS_UID),
            Some(uids::CT_IMAGE_STORAGE)
        );
    }

    #[test]
    fn meta_uids_are_regenerated_even_when_removed_by_rule() {
        let policy = AnonymizationPolicy::new()
            .with(tags::SOP_INSTANCE_UID, Action::RegenerateUid)
            .with(tags::SOP_CLASS_UID, Action::RegenerateUid)
            .with(tags::MEDIA_STORAGE_SOP_INSTANCE_UID, Action::Keep)
            .with(tags::MEDIA_STORAGE_SOP_CLASS_UID, Action::Remove);
        let anonymizer = Anonymizer::new(policy);
        let mut ctx = AnonymizationContext::new();
        let mut ds = patient();
        ds.set(tags::MEDIA_STORAGE_SOP_CLASS_UID, uids::CT_IMAGE_STORAGE);
        ds.set(tags::MEDIA_STORAGE_SOP_INSTANCE_UID, "1.2.3.100");

        let out = anonymizer.anonymize(&mut ctx, ds).unwrap();
        assert_eq!(
            out.get_str(tags::MEDIA_STORAGE_SOP_INSTANCE_UID),
            out.get_str(tags::SOP_INSTANCE_UID)
        );
        assert_eq!(
            out.get_str(tags::MEDIA_STORAGE_SOP_CLASS_UID),
            out.get_str(tags::SOP_CLASS_UID)
        );
        assert_ne!(out.get_str(tags::SOP_CLASS_UID), Some(uids::CT_IMAGE_STORAGE));
    }

    #[test]
    fn multi_valued_uids_are_mapped_one_by_one() {
        let policy = AnonymizationPolicy::new()
            .with(tags::FAILED_SOP_INSTANCE_UID_LIST, Action::RegenerateUid)
            .with(tags::SOP_INSTANCE_UID, Action::RegenerateUid);
        let anonymizer = Anonymizer::new(policy);
        let mut ds = Dataset::new();
        ds.set(tags::SOP_INSTANCE_UID, "1.1");
        ds.set(tags::FAILED_SOP_INSTANCE_UID_LIST, "1.2\\1.1");
        let mut ctx = AnonymizationContext::new();
        let out = anonymizer.anonymize(&mut ctx, ds).unwrap();
        let list: Vec<_> = out
            .get_str(tags::FAILED_SOP_INSTANCE_UID_LIST)
            .unwrap()
            .split('\\')
            .collect();
        assert_eq!(list.len(), 2);
        assert_eq!(Some(list[1]), out.get_str(tags::SOP_INSTANCE_UID));
        assert_eq!(ctx.mapped_uid("1.2"), Some(list[0]));
    }
}
