//! The transfer syntaxes understood by the reader and writer.
use dcmanon_core::dictionary::uids;
use std::fmt;

/// A supported transfer syntax.
///
/// All supported transfer syntaxes are little endian.
/// Encapsulated (compressed) transfer syntaxes are supported
/// without decoding the pixel data:
/// their data set is explicit VR little endian
/// and the compressed fragments are carried over as they are.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransferSyntax {
    /// Implicit VR Little Endian
    ImplicitVrLittleEndian,
    /// Explicit VR Little Endian
    ExplicitVrLittleEndian,
    /// Deflated Explicit VR Little Endian
    DeflatedExplicitVrLittleEndian,
    /// An encapsulated transfer syntax, identified by its UID
    Encapsulated(String),
}

impl TransferSyntax {
    /// Resolve a transfer syntax from its UID.
    ///
    /// Returns `None` for Explicit VR Big Endian
    /// and for UIDs which are not transfer syntaxes.
    pub fn from_uid(uid: &str) -> Option<Self> {
        let uid = uid.trim_end_matches(|c: char| c == '\0' || c == ' ');
        match uid {
            uids::IMPLICIT_VR_LITTLE_ENDIAN => Some(TransferSyntax::ImplicitVrLittleEndian),
            uids::EXPLICIT_VR_LITTLE_ENDIAN => Some(TransferSyntax::ExplicitVrLittleEndian),
            uids::DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN => {
                Some(TransferSyntax::DeflatedExplicitVrLittleEndian)
            }
            uids::EXPLICIT_VR_BIG_ENDIAN => None,
            // JPEG family, RLE and the video / HTJ2K families
            uid if uid.starts_with("1.2.840.10008.1.2.4.")
                || uid.starts_with("1.2.840.10008.1.2.5")
                || uid.starts_with("1.2.840.10008.1.2.8") =>
            {
                Some(TransferSyntax::Encapsulated(uid.to_string()))
            }
            _ => None,
        }
    }

    /// The UID of the transfer syntax.
    pub fn uid(&self) -> &str {
        match self {
            TransferSyntax::ImplicitVrLittleEndian => uids::IMPLICIT_VR_LITTLE_ENDIAN,
            TransferSyntax::ExplicitVrLittleEndian => uids::EXPLICIT_VR_LITTLE_ENDIAN,
            TransferSyntax::DeflatedExplicitVrLittleEndian => {
                uids::DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN
            }
            TransferSyntax::Encapsulated(uid) => uid,
        }
    }

    /// Whether the data set is encoded with explicit value representations.
    pub fn is_explicit_vr(&self) -> bool {
        !matches!(self, TransferSyntax::ImplicitVrLittleEndian)
    }

    /// Whether the data set is compressed with deflate.
    pub fn is_deflated(&self) -> bool {
        matches!(self, TransferSyntax::DeflatedExplicitVrLittleEndian)
    }
}

impl fmt::Display for TransferSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_uids() {
        assert_eq!(
            TransferSyntax::from_uid("1.2.840.10008.1.2\0"),
            Some(TransferSyntax::ImplicitVrLittleEndian)
        );
        assert_eq!(
            TransferSyntax::from_uid("1.2.840.10008.1.2.4.50"),
            Some(TransferSyntax::Encapsulated("1.2.840.10008.1.2.4.50".into()))
        );
        assert_eq!(TransferSyntax::from_uid("1.2.840.10008.1.2.2"), None);
        assert_eq!(TransferSyntax::from_uid("1.2.840.10008.5.1.4.1.1.2"), None);
        assert!(TransferSyntax::DeflatedExplicitVrLittleEndian.is_explicit_vr());
        assert!(!TransferSyntax::ImplicitVrLittleEndian.is_explicit_vr());
    }
}
