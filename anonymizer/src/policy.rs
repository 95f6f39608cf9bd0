//! Anonymization policies: what to do with each attribute.
use dcmanon_core::dictionary::{self, tags};
use dcmanon_core::header::GroupNumber;
use dcmanon_core::Tag;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

/// What to do with an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Pass the attribute through unchanged.
    Keep,
    /// Drop the attribute.
    Remove,
    /// Keep the attribute with an empty value of the same kind.
    ReplaceWithEmpty,
    /// Replace the value with a fixed one, keeping the value representation.
    /// Multiple values are separated by a backslash.
    ReplaceWithFixed(String),
    /// Replace the value with a one-way digest of the original value.
    Hash,
    /// Replace each UID with a new one,
    /// consistently across the data sets of a job.
    RegenerateUid,
}

/// An error loading a policy.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum PolicyError {
    /// The policy document is not valid JSON
    /// or does not have the expected structure.
    #[snafu(display("Could not parse policy document"))]
    ParseDocument {
        /// the JSON error
        source: serde_json::Error,
    },
    /// A key of the `tags` table is neither a known keyword nor a tag.
    #[snafu(display("Unknown attribute `{}` in policy", key))]
    UnknownAttribute {
        /// the offending key
        key: String,
    },
    /// A key of the `groups` table is not a group number.
    #[snafu(display("Invalid group `{}` in policy", key))]
    InvalidGroup {
        /// the offending key
        key: String,
    },
    /// A rule was given for private attributes other than keep or remove.
    #[snafu(display("Private attributes can only be kept or removed, not {:?}", action))]
    InvalidPrivateAction {
        /// the offending action
        action: Action,
    },
}

static KEEP: Action = Action::Keep;

/// The default de-identification method recorded in anonymized data sets.
pub const DEFAULT_METHOD: &str = "dcmanon basic profile";

/// A mapping from attributes to anonymization actions.
///
/// The action for an attribute is resolved in this order:
///
/// 1. the rule for the exact tag;
/// 2. the rule for its group,
///    where curve (`50xx`) and overlay (`60xx`) groups
///    are matched by their base group (`5000` and `6000`);
/// 3. the private attribute rule, for private attributes;
/// 4. [`Action::Keep`].
///
/// Policies are immutable while an anonymizer uses them.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymizationPolicy {
    tags: HashMap<Tag, Action>,
    groups: HashMap<GroupNumber, Action>,
    private_tags: Action,
    mark_deidentified: bool,
    method: String,
    salt: String,
}

impl Default for AnonymizationPolicy {
    fn default() -> Self {
        AnonymizationPolicy {
            tags: HashMap::new(),
            groups: HashMap::new(),
            private_tags: Action::Keep,
            mark_deidentified: false,
            method: DEFAULT_METHOD.to_string(),
            salt: String::new(),
        }
    }
}

/// Attributes replaced with an empty value by the basic profile.
static EMPTIED: &[Tag] = &[
    tags::PATIENT_NAME,
    tags::PATIENT_ID,
    tags::PATIENT_BIRTH_DATE,
    tags::PATIENT_SEX,
    tags::REFERRING_PHYSICIAN_NAME,
    tags::STUDY_DATE,
    tags::STUDY_TIME,
    tags::ACCESSION_NUMBER,
    tags::STUDY_ID,
    tags::CONTENT_DATE,
    tags::CONTENT_TIME,
    tags::VERIFYING_OBSERVER_NAME,
    tags::PERSON_NAME,
];

/// Attributes removed by the basic profile.
static REMOVED: &[Tag] = &[
    tags::INSTANCE_CREATION_DATE,
    tags::INSTANCE_CREATION_TIME,
    tags::SERIES_DATE,
    tags::ACQUISITION_DATE,
    tags::ACQUISITION_DATE_TIME,
    tags::SERIES_TIME,
    tags::ACQUISITION_TIME,
    tags::INSTITUTION_NAME,
    tags::INSTITUTION_ADDRESS,
    tags::INSTITUTION_CODE_SEQUENCE,
    tags::REFERRING_PHYSICIAN_ADDRESS,
    tags::REFERRING_PHYSICIAN_TELEPHONE_NUMBERS,
    tags::REFERRING_PHYSICIAN_IDENTIFICATION_SEQUENCE,
    tags::TIMEZONE_OFFSET_FROM_UTC,
    tags::STATION_NAME,
    tags::STUDY_DESCRIPTION,
    tags::SERIES_DESCRIPTION,
    tags::INSTITUTIONAL_DEPARTMENT_NAME,
    tags::PHYSICIANS_OF_RECORD,
    tags::PHYSICIANS_OF_RECORD_IDENTIFICATION_SEQUENCE,
    tags::PERFORMING_PHYSICIAN_NAME,
    tags::PERFORMING_PHYSICIAN_IDENTIFICATION_SEQUENCE,
    tags::NAME_OF_PHYSICIANS_READING_STUDY,
    tags::PHYSICIANS_READING_STUDY_IDENTIFICATION_SEQUENCE,
    tags::OPERATORS_NAME,
    tags::OPERATOR_IDENTIFICATION_SEQUENCE,
    tags::ADMITTING_DIAGNOSES_DESCRIPTION,
    tags::REFERENCED_PATIENT_SEQUENCE,
    tags::DERIVATION_DESCRIPTION,
    tags::IDENTIFYING_COMMENTS,
    tags::ISSUER_OF_PATIENT_ID,
    tags::PATIENT_BIRTH_TIME,
    tags::PATIENT_INSURANCE_PLAN_CODE_SEQUENCE,
    tags::PATIENT_PRIMARY_LANGUAGE_CODE_SEQUENCE,
    tags::OTHER_PATIENT_IDS,
    tags::OTHER_PATIENT_NAMES,
    tags::OTHER_PATIENT_IDS_SEQUENCE,
    tags::PATIENT_BIRTH_NAME,
    tags::PATIENT_AGE,
    tags::PATIENT_SIZE,
    tags::PATIENT_WEIGHT,
    tags::PATIENT_ADDRESS,
    tags::PATIENT_MOTHER_BIRTH_NAME,
    tags::MEDICAL_RECORD_LOCATOR,
    tags::COUNTRY_OF_RESIDENCE,
    tags::REGION_OF_RESIDENCE,
    tags::PATIENT_TELEPHONE_NUMBERS,
    tags::ETHNIC_GROUP,
    tags::OCCUPATION,
    tags::ADDITIONAL_PATIENT_HISTORY,
    tags::IMAGE_COMMENTS,
    tags::FRAME_COMMENTS,
    tags::IMAGE_PRESENTATION_COMMENTS,
    tags::REQUESTING_PHYSICIAN,
    tags::REQUESTED_PROCEDURE_DESCRIPTION,
    tags::STUDY_COMMENTS,
    tags::ADMISSION_ID,
    tags::CURRENT_PATIENT_LOCATION,
    tags::PATIENT_INSTITUTION_RESIDENCE,
    tags::VISIT_COMMENTS,
    tags::PERFORMED_STATION_AE_TITLE,
    tags::PERFORMED_STATION_NAME,
    tags::PERFORMED_LOCATION,
    tags::PERFORMED_PROCEDURE_STEP_START_DATE,
    tags::PERFORMED_PROCEDURE_STEP_ID,
    tags::PERFORMED_PROCEDURE_STEP_DESCRIPTION,
    tags::REQUEST_ATTRIBUTES_SEQUENCE,
    tags::REQUESTED_PROCEDURE_ID,
    tags::PLACER_ORDER_NUMBER_IMAGING_SERVICE_REQUEST,
    tags::FILLER_ORDER_NUMBER_IMAGING_SERVICE_REQUEST,
    tags::VERIFYING_ORGANIZATION,
    tags::SOURCE_APPLICATION_ENTITY_TITLE,
    tags::PRIVATE_INFORMATION_CREATOR_UID,
    tags::PRIVATE_INFORMATION,
    tags::DIGITAL_SIGNATURE_UID,
];

/// Attributes whose UIDs are regenerated by the basic profile.
static REGENERATED: &[Tag] = &[
    tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
    tags::REFERENCED_SOP_INSTANCE_UID_IN_FILE,
    tags::INSTANCE_CREATOR_UID,
    tags::SOP_INSTANCE_UID,
    tags::FAILED_SOP_INSTANCE_UID_LIST,
    tags::REFERENCED_SOP_INSTANCE_UID,
    tags::IRRADIATION_EVENT_UID,
    tags::CREATOR_VERSION_UID,
    tags::STUDY_INSTANCE_UID,
    tags::SERIES_INSTANCE_UID,
    tags::FRAME_OF_REFERENCE_UID,
    tags::SYNCHRONIZATION_FRAME_OF_REFERENCE_UID,
    tags::CONCATENATION_UID,
    tags::DIMENSION_ORGANIZATION_UID,
    tags::PALETTE_COLOR_LOOKUP_TABLE_UID,
    tags::LARGE_PALETTE_COLOR_LOOKUP_TABLE_UID,
    tags::REFERENCED_GENERAL_PURPOSE_SCHEDULED_PROCEDURE_STEP_TRANSACTION_UID,
    tags::UID,
    tags::TEMPLATE_EXTENSION_ORGANIZATION_UID,
    tags::TEMPLATE_EXTENSION_CREATOR_UID,
    tags::FIDUCIAL_UID,
    tags::STORAGE_MEDIA_FILE_SET_UID,
    tags::REFERENCED_FRAME_OF_REFERENCE_UID,
    tags::RELATED_FRAME_OF_REFERENCE_UID,
];

impl AnonymizationPolicy {
    /// A policy which keeps everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy after the basic application level confidentiality profile.
    ///
    /// Direct identifiers are emptied or removed,
    /// instance UIDs are regenerated,
    /// curve and overlay groups and private attributes are removed,
    /// and the data set is marked as de-identified.
    pub fn basic_profile() -> Self {
        let mut policy = AnonymizationPolicy {
            mark_deidentified: true,
            private_tags: Action::Remove,
            ..Self::default()
        };
        for &tag in EMPTIED {
            policy.set(tag, Action::ReplaceWithEmpty);
        }
        for &tag in REMOVED {
            policy.set(tag, Action::Remove);
        }
        for &tag in REGENERATED {
            policy.set(tag, Action::RegenerateUid);
        }
        policy.set_group(0x5000, Action::Remove);
        policy.set_group(0x6000, Action::Remove);
        policy
    }

    /// Set the action for an attribute.
    pub fn set(&mut self, tag: Tag, action: Action) -> &mut Self {
        self.tags.insert(tag, action);
        self
    }

    /// Set the action for an attribute, builder style.
    pub fn with(mut self, tag: Tag, action: Action) -> Self {
        self.set(tag, action);
        self
    }

    /// Set the action for all attributes of a group.
    ///
    /// Rules for group `5000` and `6000`
    /// apply to all the repeating curve and overlay groups.
    pub fn set_group(&mut self, group: GroupNumber, action: Action) -> &mut Self {
        self.groups.insert(group, action);
        self
    }

    /// Set the action for private attributes without a rule of their own.
    ///
    /// # Panics
    ///
    /// Private attributes can only be kept or removed.
    pub fn set_private_tags(&mut self, action: Action) -> &mut Self {
        assert!(
            matches!(action, Action::Keep | Action::Remove),
            "private attributes can only be kept or removed"
        );
        self.private_tags = action;
        self
    }

    /// Whether anonymized data sets are marked as de-identified.
    pub fn mark_deidentified(&self) -> bool {
        self.mark_deidentified
    }

    /// Set whether anonymized data sets are marked as de-identified,
    /// and the method to record.
    pub fn set_deidentification(&mut self, mark: bool, method: impl Into<String>) -> &mut Self {
        self.mark_deidentified = mark;
        self.method = method.into();
        self
    }

    /// The de-identification method recorded in anonymized data sets.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The secret prepended to values before hashing.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Set the secret prepended to values before hashing.
    ///
    /// Without a salt, short values such as dates
    /// can be recovered by hashing every candidate.
    pub fn set_salt(&mut self, salt: impl Into<String>) -> &mut Self {
        self.salt = salt.into();
        self
    }

    /// Resolve the action for an attribute.
    pub fn action_for(&self, tag: Tag) -> &Action {
        if let Some(action) = self.tags.get(&tag) {
            return action;
        }
        let group = tag.repeating_group_base().unwrap_or(tag.group());
        if let Some(action) = self.groups.get(&group) {
            return action;
        }
        if tag.is_private() {
            return &self.private_tags;
        }
        &KEEP
    }

    /// The attributes with a rule of their own, sorted.
    pub fn rules(&self) -> impl Iterator<Item = (Tag, &Action)> + '_ {
        let sorted: BTreeMap<_, _> = self.tags.iter().map(|(t, a)| (*t, a)).collect();
        sorted.into_iter()
    }

    /// Load a policy from a JSON document.
    ///
    /// The document is an object with these optional members:
    ///
    /// - `base`: `"basic_profile"` to start from [`basic_profile`](Self::basic_profile),
    ///   or `"empty"` (the default) to start from a policy which keeps everything;
    /// - `tags`: an object mapping attribute keywords or tags
    ///   (`"PatientName"`, `"(0010,0010)"`, `"00100010"`) to actions;
    /// - `groups`: an object mapping group numbers (`"0019"`, `"60xx"`) to actions;
    /// - `private_tags`: `"Keep"` or `"Remove"`;
    /// - `mark_deidentified`, `deidentification_method`, `salt`.
    ///
    /// Actions are written as `"Keep"`, `"Remove"`, `"ReplaceWithEmpty"`,
    /// `"Hash"`, `"RegenerateUid"` or `{"ReplaceWithFixed": "value"}`.
    pub fn from_json_reader(reader: impl Read) -> Result<Self, PolicyError> {
        let document: PolicyDocument =
            serde_json::from_reader(reader).context(ParseDocumentSnafu)?;
        document.into_policy()
    }

    /// Load a policy from a JSON string.
    /// See [`from_json_reader`](Self::from_json_reader).
    pub fn from_json_str(text: &str) -> Result<Self, PolicyError> {
        Self::from_json_reader(text.as_bytes())
    }
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum Base {
    #[default]
    Empty,
    BasicProfile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
    #[serde(default)]
    base: Base,
    #[serde(default)]
    tags: BTreeMap<String, Action>,
    #[serde(default)]
    groups: BTreeMap<String, Action>,
    private_tags: Option<Action>,
    mark_deidentified: Option<bool>,
    deidentification_method: Option<String>,
    salt: Option<String>,
}

impl PolicyDocument {
    fn into_policy(self) -> Result<AnonymizationPolicy, PolicyError> {
        let mut policy = match self.base {
            Base::Empty => AnonymizationPolicy::new(),
            Base::BasicProfile => AnonymizationPolicy::basic_profile(),
        };
        for (key, action) in self.tags {
            let tag = dictionary::parse_tag(&key).context(UnknownAttributeSnafu { key })?;
            policy.set(tag, action);
        }
        for (key, action) in self.groups {
            let group = parse_group(&key).context(InvalidGroupSnafu { key })?;
            policy.set_group(group, action);
        }
        if let Some(action) = self.private_tags {
            ensure!(
                matches!(action, Action::Keep | Action::Remove),
                InvalidPrivateActionSnafu { action }
            );
            policy.private_tags = action;
        }
        if let Some(mark) = self.mark_deidentified {
            policy.mark_deidentified = mark;
        }
        if let Some(method) = self.deidentification_method {
            policy.method = method;
        }
        if let Some(salt) = self.salt {
            policy.salt = salt;
        }
        Ok(policy)
    }
}

/// Parse a group number such as `0019` or `60xx`.
fn parse_group(key: &str) -> Option<GroupNumber> {
    let key = key.trim();
    if key.len() != 4 {
        return None;
    }
    let digits = key.replace(['x', 'X'], "0");
    u16::from_str_radix(&digits, 16).ok()
}
