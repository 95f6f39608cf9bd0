//! Attribute tags and value representations.
use snafu::{ensure, OptionExt, Snafu};
use std::fmt;
use std::str::{from_utf8, FromStr};

/// Idiomatic alias for a tag's group number.
pub type GroupNumber = u16;
/// Idiomatic alias for a tag's element number.
pub type ElementNumber = u16;

/// The data type for DICOM attribute tags.
///
/// Tags are totally ordered by group, then by element,
/// which is also the order in which elements are serialized.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub struct Tag(pub GroupNumber, pub ElementNumber);

impl Tag {
    /// Item start marker.
    pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
    /// Item delimitation marker.
    pub const ITEM_DELIMITER: Tag = Tag(0xFFFE, 0xE00D);
    /// Sequence delimitation marker.
    pub const SEQUENCE_DELIMITER: Tag = Tag(0xFFFE, 0xE0DD);

    /// Getter for the tag's group value.
    #[inline]
    pub fn group(self) -> GroupNumber {
        self.0
    }

    /// Getter for the tag's element value.
    #[inline]
    pub fn element(self) -> ElementNumber {
        self.1
    }

    /// Whether the tag belongs to a private group (odd group number).
    #[inline]
    pub fn is_private(self) -> bool {
        self.0 % 2 == 1
    }

    /// Whether the tag is a private creator element,
    /// which reserves a block of elements in a private group.
    #[inline]
    pub fn is_private_creator(self) -> bool {
        self.is_private() && (0x0010..=0x00FF).contains(&self.1)
    }

    /// Whether the tag is a group length element `(gggg,0000)`.
    #[inline]
    pub fn is_group_length(self) -> bool {
        self.1 == 0x0000
    }

    /// Whether the tag belongs to the file meta information group.
    #[inline]
    pub fn is_meta(self) -> bool {
        self.0 == 0x0002
    }

    /// Whether the tag is one of the item or delimitation markers
    /// of group `FFFE`, which never carry a value representation.
    #[inline]
    pub fn is_delimiter(self) -> bool {
        self.0 == 0xFFFE
    }

    /// The repeating group base of this tag:
    /// the curve (`50xx`) and overlay (`60xx`) groups
    /// are collapsed to `5000` and `6000` respectively.
    pub fn repeating_group_base(self) -> Option<GroupNumber> {
        match self.0 & 0xFF00 {
            base @ (0x5000 | 0x6000) if self.0 % 2 == 0 => Some(base),
            _ => None,
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Tag({:#06X?}, {:#06X?})", self.0, self.1)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

impl PartialEq<(u16, u16)> for Tag {
    fn eq(&self, other: &(u16, u16)) -> bool {
        self.0 == other.0 && self.1 == other.1
    }
}

impl From<(u16, u16)> for Tag {
    #[inline]
    fn from(value: (u16, u16)) -> Tag {
        Tag(value.0, value.1)
    }
}

impl From<Tag> for u32 {
    #[inline]
    fn from(tag: Tag) -> u32 {
        (u32::from(tag.0) << 16) | u32::from(tag.1)
    }
}

impl From<u32> for Tag {
    #[inline]
    fn from(value: u32) -> Tag {
        Tag((value >> 16) as u16, (value & 0xFFFF) as u16)
    }
}

/// An error which may occur when parsing a tag from text.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[non_exhaustive]
pub enum ParseTagError {
    /// the tag should start with `(`
    #[snafu(display("tag should start with `(`"))]
    Start,
    /// the group and element parts should be separated with a `,`
    #[snafu(display("group and element should be separated with `,`"))]
    Separator,
    /// the tag should end with `)`
    #[snafu(display("tag should end with `)`"))]
    End,
    /// the group or element part is not 4 hexadecimal digits
    #[snafu(display("invalid number `{}`, expected 4 hexadecimal digits", text))]
    Number {
        /// the offending part of the text
        text: String,
    },
}

fn parse_part(text: &str) -> Result<u16, ParseTagError> {
    ensure!(
        text.len() == 4,
        NumberSnafu {
            text: text.to_string()
        }
    );
    u16::from_str_radix(text, 16).map_err(|_| ParseTagError::Number {
        text: text.to_string(),
    })
}

/// Parse a tag in one of the forms
/// `(GGGG,EEEE)`, `GGGG,EEEE` or `GGGGEEEE`.
impl FromStr for Tag {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let inner = if let Some(rest) = s.strip_prefix('(') {
            rest.strip_suffix(')').context(EndSnafu)?
        } else {
            ensure!(!s.ends_with(')'), StartSnafu);
            s
        };

        if let Some((group, element)) = inner.split_once(',') {
            return Ok(Tag(parse_part(group.trim())?, parse_part(element.trim())?));
        }
        ensure!(!s.starts_with('('), SeparatorSnafu);
        ensure!(
            inner.len() == 8 && inner.is_char_boundary(4),
            NumberSnafu {
                text: inner.to_string()
            }
        );
        Ok(Tag(parse_part(&inner[..4])?, parse_part(&inner[4..])?))
    }
}

/// An enum type for a DICOM value representation.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Ord, PartialOrd)]
pub enum VR {
    /// Application Entity
    AE,
    /// Age String
    AS,
    /// Attribute Tag
    AT,
    /// Code String
    CS,
    /// Date
    DA,
    /// Decimal String
    DS,
    /// Date Time
    DT,
    /// Floating Point Single
    FL,
    /// Floating Point Double
    FD,
    /// Integer String
    IS,
    /// Long String
    LO,
    /// Long Text
    LT,
    /// Other Byte
    OB,
    /// Other Double
    OD,
    /// Other Float
    OF,
    /// Other Long
    OL,
    /// Other Very Long
    OV,
    /// Other Word
    OW,
    /// Person Name
    PN,
    /// Short String
    SH,
    /// Signed Long
    SL,
    /// Sequence of Items
    SQ,
    /// Signed Short
    SS,
    /// Short Text
    ST,
    /// Signed Very Long
    SV,
    /// Time
    TM,
    /// Unlimited Characters
    UC,
    /// Unique Identifier (UID)
    UI,
    /// Unsigned Long
    UL,
    /// Unknown
    UN,
    /// Universal Resource Identifier or Universal Resource Locator (URI/URL)
    UR,
    /// Unsigned Short
    US,
    /// Unlimited Text
    UT,
    /// Unsigned Very Long
    UV,
}

impl VR {
    /// Obtain the value representation corresponding to the given two bytes.
    /// Each byte should represent an alphabetic character in upper case.
    pub fn from_binary(chars: [u8; 2]) -> Option<Self> {
        from_utf8(chars.as_ref())
            .ok()
            .and_then(|s| VR::from_str(s).ok())
    }

    /// Retrieve a string representation of this VR.
    pub fn to_string(self) -> &'static str {
        use VR::*;
        match self {
            AE => "AE",
            AS => "AS",
            AT => "AT",
            CS => "CS",
            DA => "DA",
            DS => "DS",
            DT => "DT",
            FL => "FL",
            FD => "FD",
            IS => "IS",
            LO => "LO",
            LT => "LT",
            OB => "OB",
            OD => "OD",
            OF => "OF",
            OL => "OL",
            OV => "OV",
            OW => "OW",
            PN => "PN",
            SH => "SH",
            SL => "SL",
            SQ => "SQ",
            SS => "SS",
            ST => "ST",
            SV => "SV",
            TM => "TM",
            UC => "UC",
            UI => "UI",
            UL => "UL",
            UN => "UN",
            UR => "UR",
            US => "US",
            UT => "UT",
            UV => "UV",
        }
    }

    /// Retrieve a copy of this VR's byte representation.
    /// The function returns two alphabetic characters in upper case.
    pub fn to_bytes(self) -> [u8; 2] {
        let bytes = self.to_string().as_bytes();
        [bytes[0], bytes[1]]
    }

    /// Whether values of this VR are character strings.
    pub fn is_text(self) -> bool {
        use VR::*;
        matches!(
            self,
            AE | AS | CS | DA | DS | DT | IS | LO | LT | PN | SH | ST | TM | UC | UI | UR | UT
        )
    }

    /// The width in bytes of each binary integer of this VR,
    /// if values of this VR are binary integers.
    ///
    /// `AT` counts as a pair of 16-bit numbers read as one 32-bit value.
    pub fn int_width(self) -> Option<usize> {
        use VR::*;
        match self {
            SS | US => Some(2),
            SL | UL | AT => Some(4),
            SV | UV => Some(8),
            _ => None,
        }
    }

    /// The width in bytes of each binary floating point number
    /// of this VR, if values of this VR are floating point numbers.
    pub fn float_width(self) -> Option<usize> {
        match self {
            VR::FL => Some(4),
            VR::FD => Some(8),
            _ => None,
        }
    }

    /// Whether the explicit VR encoding of an element with this VR
    /// uses a 2-byte length field.
    /// The remaining VRs are followed by 2 reserved bytes
    /// and a 4-byte length.
    pub fn has_short_length(self) -> bool {
        use VR::*;
        matches!(
            self,
            AE | AS
                | AT
                | CS
                | DA
                | DS
                | DT
                | FL
                | FD
                | IS
                | LO
                | LT
                | PN
                | SH
                | SL
                | SS
                | ST
                | TM
                | UI
                | UL
                | US
        )
    }

    /// The maximum length in characters of a single value of this VR,
    /// for textual VRs with a bounded length.
    pub fn max_length(self) -> Option<usize> {
        use VR::*;
        match self {
            AE => Some(16),
            AS => Some(4),
            CS => Some(16),
            DA => Some(8),
            DS => Some(16),
            DT => Some(26),
            IS => Some(12),
            LO => Some(64),
            LT => Some(10240),
            PN => Some(64),
            SH => Some(16),
            ST => Some(1024),
            TM => Some(14),
            UI => Some(64),
            _ => None,
        }
    }

    /// The byte used to pad values of this VR to an even length.
    pub fn padding(self) -> u8 {
        if self.is_text() && self != VR::UI {
            b' '
        } else {
            0
        }
    }
}

/// Obtain the value representation corresponding to the given string.
/// The string should hold exactly two UTF-8 encoded alphabetic characters
/// in upper case, otherwise no match is made.
impl FromStr for VR {
    type Err = &'static str;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use VR::*;
        match string {
            "AE" => Ok(AE),
            "AS" => Ok(AS),
            "AT" => Ok(AT),
            "CS" => Ok(CS),
            "DA" => Ok(DA),
            "DS" => Ok(DS),
            "DT" => Ok(DT),
            "FL" => Ok(FL),
            "FD" => Ok(FD),
            "IS" => Ok(IS),
            "LO" => Ok(LO),
            "LT" => Ok(LT),
            "OB" => Ok(OB),
            "OD" => Ok(OD),
            "OF" => Ok(OF),
            "OL" => Ok(OL),
            "OV" => Ok(OV),
            "OW" => Ok(OW),
            "PN" => Ok(PN),
            "SH" => Ok(SH),
            "SL" => Ok(SL),
            "SQ" => Ok(SQ),
            "SS" => Ok(SS),
            "ST" => Ok(ST),
            "SV" => Ok(SV),
            "TM" => Ok(TM),
            "UC" => Ok(UC),
            "UI" => Ok(UI),
            "UL" => Ok(UL),
            "UN" => Ok(UN),
            "UR" => Ok(UR),
            "US" => Ok(US),
            "UT" => Ok(UT),
            "UV" => Ok(UV),
            _ => Err("no such value representation"),
        }
    }
}

impl fmt::Display for VR {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(VR::to_string(*self))
    }
}
