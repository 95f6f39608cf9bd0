//! A built-in attribute dictionary.
//!
//! The dictionary covers the attributes relevant to de-identification
//! and to the organization of instances into series.
//! It resolves the value representation of elements
//! encoded with implicit VR, and translates attribute keywords
//! (such as `PatientName`) to tags.
//!
//! Group length elements resolve to `UL`
//! and private creator elements to `LO`.
//! Curve (`50xx`) and overlay (`60xx`) attributes
//! are resolved through their base group.
use crate::header::{Tag, VR};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// An entry of the attribute dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryEntry {
    /// The attribute tag.
    pub tag: Tag,
    /// The attribute keyword.
    pub alias: &'static str,
    /// The attribute's value representation.
    pub vr: VR,
}

macro_rules! dictionary {
    ($($name:ident = ($group:literal, $elem:literal) $alias:literal $vr:ident;)*) => {
        /// Tag constants of the attributes in the dictionary.
        pub mod tags {
            use crate::header::Tag;
            $(
                #[doc = concat!("`", $alias, "`")]
                pub const $name: Tag = Tag($group, $elem);
            )*
        }

        /// All entries of the dictionary.
        pub static ENTRIES: &[DictionaryEntry] = &[
            $(
                DictionaryEntry { tag: Tag($group, $elem), alias: $alias, vr: VR::$vr },
            )*
        ];
    };
}

dictionary! {
    FILE_META_INFORMATION_GROUP_LENGTH = (0x0002, 0x0000) "FileMetaInformationGroupLength" UL;
    FILE_META_INFORMATION_VERSION = (0x0002, 0x0001) "FileMetaInformationVersion" OB;
    MEDIA_STORAGE_SOP_CLASS_UID = (0x0002, 0x0002) "MediaStorageSOPClassUID" UI;
    MEDIA_STORAGE_SOP_INSTANCE_UID = (0x0002, 0x0003) "MediaStorageSOPInstanceUID" UI;
    TRANSFER_SYNTAX_UID = (0x0002, 0x0010) "TransferSyntaxUID" UI;
    IMPLEMENTATION_CLASS_UID = (0x0002, 0x0012) "ImplementationClassUID" UI;
    IMPLEMENTATION_VERSION_NAME = (0x0002, 0x0013) "ImplementationVersionName" SH;
    SOURCE_APPLICATION_ENTITY_TITLE = (0x0002, 0x0016) "SourceApplicationEntityTitle" AE;
    PRIVATE_INFORMATION_CREATOR_UID = (0x0002, 0x0100) "PrivateInformationCreatorUID" UI;
    PRIVATE_INFORMATION = (0x0002, 0x0102) "PrivateInformation" OB;
    REFERENCED_SOP_INSTANCE_UID_IN_FILE = (0x0004, 0x1511) "ReferencedSOPInstanceUIDInFile" UI;
    SPECIFIC_CHARACTER_SET = (0x0008, 0x0005) "SpecificCharacterSet" CS;
    IMAGE_TYPE = (0x0008, 0x0008) "ImageType" CS;
    INSTANCE_CREATION_DATE = (0x0008, 0x0012) "InstanceCreationDate" DA;
    INSTANCE_CREATION_TIME = (0x0008, 0x0013) "InstanceCreationTime" TM;
    INSTANCE_CREATOR_UID = (0x0008, 0x0014) "InstanceCreatorUID" UI;
    SOP_CLASS_UID = (0x0008, 0x0016) "SOPClassUID" UI;
    SOP_INSTANCE_UID = (0x0008, 0x0018) "SOPInstanceUID" UI;
    STUDY_DATE = (0x0008, 0x0020) "StudyDate" DA;
    SERIES_DATE = (0x0008, 0x0021) "SeriesDate" DA;
    ACQUISITION_DATE = (0x0008, 0x0022) "AcquisitionDate" DA;
    CONTENT_DATE = (0x0008, 0x0023) "ContentDate" DA;
    ACQUISITION_DATE_TIME = (0x0008, 0x002A) "AcquisitionDateTime" DT;
    STUDY_TIME = (0x0008, 0x0030) "StudyTime" TM;
    SERIES_TIME = (0x0008, 0x0031) "SeriesTime" TM;
    ACQUISITION_TIME = (0x0008, 0x0032) "AcquisitionTime" TM;
    CONTENT_TIME = (0x0008, 0x0033) "ContentTime" TM;
    ACCESSION_NUMBER = (0x0008, 0x0050) "AccessionNumber" SH;
    FAILED_SOP_INSTANCE_UID_LIST = (0x0008, 0x0058) "FailedSOPInstanceUIDList" UI;
    MODALITY = (0x0008, 0x0060) "Modality" CS;
    MANUFACTURER = (0x0008, 0x0070) "Manufacturer" LO;
    INSTITUTION_NAME = (0x0008, 0x0080) "InstitutionName" LO;
    INSTITUTION_ADDRESS = (0x0008, 0x0081) "InstitutionAddress" ST;
    INSTITUTION_CODE_SEQUENCE = (0x0008, 0x0082) "InstitutionCodeSequence" SQ;
    REFERRING_PHYSICIAN_NAME = (0x0008, 0x0090) "ReferringPhysicianName" PN;
    REFERRING_PHYSICIAN_ADDRESS = (0x0008, 0x0092) "ReferringPhysicianAddress" ST;
    REFERRING_PHYSICIAN_TELEPHONE_NUMBERS = (0x0008, 0x0094) "ReferringPhysicianTelephoneNumbers" SH;
    REFERRING_PHYSICIAN_IDENTIFICATION_SEQUENCE = (0x0008, 0x0096) "ReferringPhysicianIdentificationSequence" SQ;
    CODE_VALUE = (0x0008, 0x0100) "CodeValue" SH;
    CODING_SCHEME_DESIGNATOR = (0x0008, 0x0102) "CodingSchemeDesignator" SH;
    CODE_MEANING = (0x0008, 0x0104) "CodeMeaning" LO;
    TIMEZONE_OFFSET_FROM_UTC = (0x0008, 0x0201) "TimezoneOffsetFromUTC" SH;
    STATION_NAME = (0x0008, 0x1010) "StationName" SH;
    STUDY_DESCRIPTION = (0x0008, 0x1030) "StudyDescription" LO;
    PROCEDURE_CODE_SEQUENCE = (0x0008, 0x1032) "ProcedureCodeSequence" SQ;
    SERIES_DESCRIPTION = (0x0008, 0x103E) "SeriesDescription" LO;
    INSTITUTIONAL_DEPARTMENT_NAME = (0x0008, 0x1040) "InstitutionalDepartmentName" LO;
    PHYSICIANS_OF_RECORD = (0x0008, 0x1048) "PhysiciansOfRecord" PN;
    PHYSICIANS_OF_RECORD_IDENTIFICATION_SEQUENCE = (0x0008, 0x1049) "PhysiciansOfRecordIdentificationSequence" SQ;
    PERFORMING_PHYSICIAN_NAME = (0x0008, 0x1050) "PerformingPhysicianName" PN;
    PERFORMING_PHYSICIAN_IDENTIFICATION_SEQUENCE = (0x0008, 0x1052) "PerformingPhysicianIdentificationSequence" SQ;
    NAME_OF_PHYSICIANS_READING_STUDY = (0x0008, 0x1060) "NameOfPhysiciansReadingStudy" PN;
    PHYSICIANS_READING_STUDY_IDENTIFICATION_SEQUENCE = (0x0008, 0x1062) "PhysiciansReadingStudyIdentificationSequence" SQ;
    OPERATORS_NAME = (0x0008, 0x1070) "OperatorsName" PN;
    OPERATOR_IDENTIFICATION_SEQUENCE = (0x0008, 0x1072) "OperatorIdentificationSequence" SQ;
    ADMITTING_DIAGNOSES_DESCRIPTION = (0x0008, 0x1080) "AdmittingDiagnosesDescription" LO;
    MANUFACTURER_MODEL_NAME = (0x0008, 0x1090) "ManufacturerModelName" LO;
    REFERENCED_STUDY_SEQUENCE = (0x0008, 0x1110) "ReferencedStudySequence" SQ;
    REFERENCED_PERFORMED_PROCEDURE_STEP_SEQUENCE = (0x0008, 0x1111) "ReferencedPerformedProcedureStepSequence" SQ;
    REFERENCED_SERIES_SEQUENCE = (0x0008, 0x1115) "ReferencedSeriesSequence" SQ;
    REFERENCED_PATIENT_SEQUENCE = (0x0008, 0x1120) "ReferencedPatientSequence" SQ;
    REFERENCED_IMAGE_SEQUENCE = (0x0008, 0x1140) "ReferencedImageSequence" SQ;
    REFERENCED_SOP_CLASS_UID = (0x0008, 0x1150) "ReferencedSOPClassUID" UI;
    REFERENCED_SOP_INSTANCE_UID = (0x0008, 0x1155) "ReferencedSOPInstanceUID" UI;
    DERIVATION_DESCRIPTION = (0x0008, 0x2111) "DerivationDescription" ST;
    IRRADIATION_EVENT_UID = (0x0008, 0x3010) "IrradiationEventUID" UI;
    IDENTIFYING_COMMENTS = (0x0008, 0x4000) "IdentifyingComments" LT;
    CREATOR_VERSION_UID = (0x0008, 0x9123) "CreatorVersionUID" UI;
    PATIENT_NAME = (0x0010, 0x0010) "PatientName" PN;
    PATIENT_ID = (0x0010, 0x0020) "PatientID" LO;
    ISSUER_OF_PATIENT_ID = (0x0010, 0x0021) "IssuerOfPatientID" LO;
    PATIENT_BIRTH_DATE = (0x0010, 0x0030) "PatientBirthDate" DA;
    PATIENT_BIRTH_TIME = (0x0010, 0x0032) "PatientBirthTime" TM;
    PATIENT_SEX = (0x0010, 0x0040) "PatientSex" CS;
    PATIENT_INSURANCE_PLAN_CODE_SEQUENCE = (0x0010, 0x0050) "PatientInsurancePlanCodeSequence" SQ;
    PATIENT_PRIMARY_LANGUAGE_CODE_SEQUENCE = (0x0010, 0x0101) "PatientPrimaryLanguageCodeSequence" SQ;
    OTHER_PATIENT_IDS = (0x0010, 0x1000) "OtherPatientIDs" LO;
    OTHER_PATIENT_NAMES = (0x0010, 0x1001) "OtherPatientNames" PN;
    OTHER_PATIENT_IDS_SEQUENCE = (0x0010, 0x1002) "OtherPatientIDsSequence" SQ;
    PATIENT_BIRTH_NAME = (0x0010, 0x1005) "PatientBirthName" PN;
    PATIENT_AGE = (0x0010, 0x1010) "PatientAge" AS;
    PATIENT_SIZE = (0x0010, 0x1020) "PatientSize" DS;
    PATIENT_WEIGHT = (0x0010, 0x1030) "PatientWeight" DS;
    PATIENT_ADDRESS = (0x0010, 0x1040) "PatientAddress" LO;
    PATIENT_MOTHER_BIRTH_NAME = (0x0010, 0x1060) "PatientMotherBirthName" PN;
    MEDICAL_RECORD_LOCATOR = (0x0010, 0x1090) "MedicalRecordLocator" LO;
    COUNTRY_OF_RESIDENCE = (0x0010, 0x2150) "CountryOfResidence" LO;
    REGION_OF_RESIDENCE = (0x0010, 0x2152) "RegionOfResidence" LO;
    PATIENT_TELEPHONE_NUMBERS = (0x0010, 0x2154) "PatientTelephoneNumbers" SH;
    ETHNIC_GROUP = (0x0010, 0x2160) "EthnicGroup" SH;
    OCCUPATION = (0x0010, 0x2180) "Occupation" SH;
    ADDITIONAL_PATIENT_HISTORY = (0x0010, 0x21B0) "AdditionalPatientHistory" LT;
    PATIENT_RELIGIOUS_PREFERENCE = (0x0010, 0x21F0) "PatientReligiousPreference" LO;
    PATIENT_COMMENTS = (0x0010, 0x4000) "PatientComments" LT;
    PATIENT_IDENTITY_REMOVED = (0x0012, 0x0062) "PatientIdentityRemoved" CS;
    DEIDENTIFICATION_METHOD = (0x0012, 0x0063) "DeidentificationMethod" LO;
    DEIDENTIFICATION_METHOD_CODE_SEQUENCE = (0x0012, 0x0064) "DeidentificationMethodCodeSequence" SQ;
    BODY_PART_EXAMINED = (0x0018, 0x0015) "BodyPartExamined" CS;
    SLICE_THICKNESS = (0x0018, 0x0050) "SliceThickness" DS;
    DEVICE_SERIAL_NUMBER = (0x0018, 0x1000) "DeviceSerialNumber" LO;
    DEVICE_UID = (0x0018, 0x1002) "DeviceUID" UI;
    PLATE_ID = (0x0018, 0x1004) "PlateID" LO;
    GENERATOR_ID = (0x0018, 0x1005) "GeneratorID" LO;
    CASSETTE_ID = (0x0018, 0x1007) "CassetteID" LO;
    GANTRY_ID = (0x0018, 0x1008) "GantryID" LO;
    SOFTWARE_VERSIONS = (0x0018, 0x1020) "SoftwareVersions" LO;
    PROTOCOL_NAME = (0x0018, 0x1030) "ProtocolName" LO;
    ACQUISITION_DEVICE_PROCESSING_DESCRIPTION = (0x0018, 0x1400) "AcquisitionDeviceProcessingDescription" LO;
    ACQUISITION_COMMENTS = (0x0018, 0x4000) "AcquisitionComments" LT;
    DETECTOR_ID = (0x0018, 0x700A) "DetectorID" SH;
    ACQUISITION_PROTOCOL_DESCRIPTION = (0x0018, 0x9424) "AcquisitionProtocolDescription" LT;
    CONTRIBUTION_DESCRIPTION = (0x0018, 0xA003) "ContributionDescription" ST;
    STUDY_INSTANCE_UID = (0x0020, 0x000D) "StudyInstanceUID" UI;
    SERIES_INSTANCE_UID = (0x0020, 0x000E) "SeriesInstanceUID" UI;
    STUDY_ID = (0x0020, 0x0010) "StudyID" SH;
    SERIES_NUMBER = (0x0020, 0x0011) "SeriesNumber" IS;
    ACQUISITION_NUMBER = (0x0020, 0x0012) "AcquisitionNumber" IS;
    INSTANCE_NUMBER = (0x0020, 0x0013) "InstanceNumber" IS;
    IMAGE_POSITION_PATIENT = (0x0020, 0x0032) "ImagePositionPatient" DS;
    IMAGE_ORIENTATION_PATIENT = (0x0020, 0x0037) "ImageOrientationPatient" DS;
    FRAME_OF_REFERENCE_UID = (0x0020, 0x0052) "FrameOfReferenceUID" UI;
    TEMPORAL_POSITION_IDENTIFIER = (0x0020, 0x0100) "TemporalPositionIdentifier" IS;
    SYNCHRONIZATION_FRAME_OF_REFERENCE_UID = (0x0020, 0x0200) "SynchronizationFrameOfReferenceUID" UI;
    IMAGE_COMMENTS = (0x0020, 0x4000) "ImageComments" LT;
    FRAME_COMMENTS = (0x0020, 0x9158) "FrameComments" LT;
    CONCATENATION_UID = (0x0020, 0x9161) "ConcatenationUID" UI;
    DIMENSION_ORGANIZATION_UID = (0x0020, 0x9164) "DimensionOrganizationUID" UI;
    SAMPLES_PER_PIXEL = (0x0028, 0x0002) "SamplesPerPixel" US;
    PHOTOMETRIC_INTERPRETATION = (0x0028, 0x0004) "PhotometricInterpretation" CS;
    NUMBER_OF_FRAMES = (0x0028, 0x0008) "NumberOfFrames" IS;
    ROWS = (0x0028, 0x0010) "Rows" US;
    COLUMNS = (0x0028, 0x0011) "Columns" US;
    PIXEL_SPACING = (0x0028, 0x0030) "PixelSpacing" DS;
    BITS_ALLOCATED = (0x0028, 0x0100) "BitsAllocated" US;
    BITS_STORED = (0x0028, 0x0101) "BitsStored" US;
    HIGH_BIT = (0x0028, 0x0102) "HighBit" US;
    PIXEL_REPRESENTATION = (0x0028, 0x0103) "PixelRepresentation" US;
    WINDOW_CENTER = (0x0028, 0x1050) "WindowCenter" DS;
    WINDOW_WIDTH = (0x0028, 0x1051) "WindowWidth" DS;
    RESCALE_INTERCEPT = (0x0028, 0x1052) "RescaleIntercept" DS;
    RESCALE_SLOPE = (0x0028, 0x1053) "RescaleSlope" DS;
    PALETTE_COLOR_LOOKUP_TABLE_UID = (0x0028, 0x1199) "PaletteColorLookupTableUID" UI;
    LARGE_PALETTE_COLOR_LOOKUP_TABLE_UID = (0x0028, 0x1214) "LargePaletteColorLookupTableUID" UI;
    IMAGE_PRESENTATION_COMMENTS = (0x0028, 0x4000) "ImagePresentationComments" LT;
    REQUESTING_PHYSICIAN = (0x0032, 0x1032) "RequestingPhysician" PN;
    REQUESTED_PROCEDURE_DESCRIPTION = (0x0032, 0x1060) "RequestedProcedureDescription" LO;
    REQUESTED_PROCEDURE_CODE_SEQUENCE = (0x0032, 0x1064) "RequestedProcedureCodeSequence" SQ;
    STUDY_COMMENTS = (0x0032, 0x4000) "StudyComments" LT;
    ADMISSION_ID = (0x0038, 0x0010) "AdmissionID" LO;
    CURRENT_PATIENT_LOCATION = (0x0038, 0x0300) "CurrentPatientLocation" LO;
    PATIENT_INSTITUTION_RESIDENCE = (0x0038, 0x0400) "PatientInstitutionResidence" LO;
    VISIT_COMMENTS = (0x0038, 0x4000) "VisitComments" LT;
    PERFORMED_STATION_AE_TITLE = (0x0040, 0x0241) "PerformedStationAETitle" AE;
    PERFORMED_STATION_NAME = (0x0040, 0x0242) "PerformedStationName" SH;
    PERFORMED_LOCATION = (0x0040, 0x0243) "PerformedLocation" SH;
    PERFORMED_PROCEDURE_STEP_START_DATE = (0x0040, 0x0244) "PerformedProcedureStepStartDate" DA;
    PERFORMED_PROCEDURE_STEP_ID = (0x0040, 0x0253) "PerformedProcedureStepID" SH;
    PERFORMED_PROCEDURE_STEP_DESCRIPTION = (0x0040, 0x0254) "PerformedProcedureStepDescription" LO;
    REQUEST_ATTRIBUTES_SEQUENCE = (0x0040, 0x0275) "RequestAttributesSequence" SQ;
    REQUESTED_PROCEDURE_ID = (0x0040, 0x1001) "RequestedProcedureID" SH;
    PLACER_ORDER_NUMBER_IMAGING_SERVICE_REQUEST = (0x0040, 0x2016) "PlacerOrderNumberImagingServiceRequest" LO;
    FILLER_ORDER_NUMBER_IMAGING_SERVICE_REQUEST = (0x0040, 0x2017) "FillerOrderNumberImagingServiceRequest" LO;
    REFERENCED_GENERAL_PURPOSE_SCHEDULED_PROCEDURE_STEP_TRANSACTION_UID = (0x0040, 0x4023) "ReferencedGeneralPurposeScheduledProcedureStepTransactionUID" UI;
    RELATIONSHIP_TYPE = (0x0040, 0xA010) "RelationshipType" CS;
    VERIFYING_ORGANIZATION = (0x0040, 0xA027) "VerifyingOrganization" LO;
    VALUE_TYPE = (0x0040, 0xA040) "ValueType" CS;
    CONCEPT_NAME_CODE_SEQUENCE = (0x0040, 0xA043) "ConceptNameCodeSequence" SQ;
    VERIFYING_OBSERVER_SEQUENCE = (0x0040, 0xA073) "VerifyingObserverSequence" SQ;
    VERIFYING_OBSERVER_NAME = (0x0040, 0xA075) "VerifyingObserverName" PN;
    VERIFYING_OBSERVER_IDENTIFICATION_CODE_SEQUENCE = (0x0040, 0xA088) "VerifyingObserverIdentificationCodeSequence" SQ;
    DATE_TIME = (0x0040, 0xA120) "DateTime" DT;
    DATE = (0x0040, 0xA121) "Date" DA;
    TIME = (0x0040, 0xA122) "Time" TM;
    PERSON_NAME = (0x0040, 0xA123) "PersonName" PN;
    UID = (0x0040, 0xA124) "UID" UI;
    TEXT_VALUE = (0x0040, 0xA160) "TextValue" UT;
    CONTENT_SEQUENCE = (0x0040, 0xA730) "ContentSequence" SQ;
    TEMPLATE_EXTENSION_ORGANIZATION_UID = (0x0040, 0xDB0C) "TemplateExtensionOrganizationUID" UI;
    TEMPLATE_EXTENSION_CREATOR_UID = (0x0040, 0xDB0D) "TemplateExtensionCreatorUID" UI;
    FIDUCIAL_UID = (0x0070, 0x031A) "FiducialUID" UI;
    STORAGE_MEDIA_FILE_SET_UID = (0x0088, 0x0140) "StorageMediaFileSetUID" UI;
    REFERENCED_FRAME_OF_REFERENCE_UID = (0x3006, 0x0024) "ReferencedFrameOfReferenceUID" UI;
    RELATED_FRAME_OF_REFERENCE_UID = (0x3006, 0x00C2) "RelatedFrameOfReferenceUID" UI;
    DIGITAL_SIGNATURE_UID = (0x0400, 0x0100) "DigitalSignatureUID" UI;
    CURVE_DIMENSIONS = (0x5000, 0x0005) "CurveDimensions" US;
    CURVE_DATA = (0x5000, 0x3000) "CurveData" OB;
    OVERLAY_ROWS = (0x6000, 0x0010) "OverlayRows" US;
    OVERLAY_COLUMNS = (0x6000, 0x0011) "OverlayColumns" US;
    OVERLAY_TYPE = (0x6000, 0x0040) "OverlayType" CS;
    OVERLAY_ORIGIN = (0x6000, 0x0050) "OverlayOrigin" SS;
    OVERLAY_BITS_ALLOCATED = (0x6000, 0x0100) "OverlayBitsAllocated" US;
    OVERLAY_BIT_POSITION = (0x6000, 0x0102) "OverlayBitPosition" US;
    OVERLAY_DATA = (0x6000, 0x3000) "OverlayData" OW;
    PIXEL_DATA = (0x7FE0, 0x0010) "PixelData" OW;
}

/// Well-known unique identifiers.
pub mod uids {
    /// Implicit VR Little Endian
    pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
    /// Explicit VR Little Endian
    pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
    /// Deflated Explicit VR Little Endian
    pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";
    /// Explicit VR Big Endian (retired)
    pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
    /// CT Image Storage
    pub const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
    /// MR Image Storage
    pub const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";
    /// Secondary Capture Image Storage
    pub const SECONDARY_CAPTURE_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.7";
    /// Spatial Fiducials Storage
    pub const SPATIAL_FIDUCIALS_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.66.2";
}

struct Registry {
    by_tag: HashMap<Tag, &'static DictionaryEntry>,
    by_alias: HashMap<&'static str, &'static DictionaryEntry>,
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry {
        by_tag: HashMap::with_capacity(ENTRIES.len()),
        by_alias: HashMap::with_capacity(ENTRIES.len()),
    };
    for entry in ENTRIES {
        registry.by_tag.insert(entry.tag, entry);
        registry.by_alias.insert(entry.alias, entry);
    }
    registry
});

/// Look up the dictionary entry of a tag.
///
/// Curve and overlay attributes in any of their repeating groups
/// resolve to the entry of the base group.
pub fn by_tag(tag: Tag) -> Option<&'static DictionaryEntry> {
    let registry = &*REGISTRY;
    registry.by_tag.get(&tag).copied().or_else(|| {
        let base = tag.repeating_group_base()?;
        registry.by_tag.get(&Tag(base, tag.1)).copied()
    })
}

/// Look up the dictionary entry of an attribute keyword.
pub fn by_alias(alias: &str) -> Option<&'static DictionaryEntry> {
    REGISTRY.by_alias.get(alias).copied()
}

/// Resolve the value representation of an attribute.
pub fn vr_of(tag: Tag) -> Option<VR> {
    if let Some(entry) = by_tag(tag) {
        return Some(entry.vr);
    }
    if tag.is_group_length() {
        Some(VR::UL)
    } else if tag.is_private_creator() {
        Some(VR::LO)
    } else {
        None
    }
}

/// Parse a tag from either a keyword (`PatientName`)
/// or a tag expression (`(0010,0010)`, `0010,0010` or `00100010`).
pub fn parse_tag(text: &str) -> Option<Tag> {
    let text = text.trim();
    by_alias(text)
        .map(|entry| entry.tag)
        .or_else(|| text.parse().ok())
}

/// The keyword of a tag, if it is in the dictionary.
pub fn alias_of(tag: Tag) -> Option<&'static str> {
    by_tag(tag).map(|entry| entry.alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_unique() {
        assert_eq!(REGISTRY.by_tag.len(), ENTRIES.len());
        assert_eq!(REGISTRY.by_alias.len(), ENTRIES.len());
    }

    #[test]
    fn lookups() {
        assert_eq!(by_alias("PatientName").map(|e| e.tag), Some(tags::PATIENT_NAME));
        assert_eq!(vr_of(tags::SERIES_INSTANCE_UID), Some(VR::UI));
        assert_eq!(alias_of(Tag(0x0020, 0x0013)), Some("InstanceNumber"));
        assert_eq!(vr_of(Tag(0x6002, 0x3000)), Some(VR::OW));
        assert_eq!(alias_of(Tag(0x6002, 0x0010)), Some("OverlayRows"));
        assert_eq!(vr_of(Tag(0x0028, 0x0000)), Some(VR::UL));
        assert_eq!(vr_of(Tag(0x0029, 0x0010)), Some(VR::LO));
        assert_eq!(vr_of(Tag(0x0029, 0x1010)), None);
    }

    #[test]
    fn parse_by_alias_or_expression() {
        assert_eq!(parse_tag("PatientID"), Some(tags::PATIENT_ID));
        assert_eq!(parse_tag("(0010,0020)"), Some(tags::PATIENT_ID));
        assert_eq!(parse_tag("00100020"), Some(tags::PATIENT_ID));
        assert_eq!(parse_tag("NoSuchAttribute"), None);
    }
}
