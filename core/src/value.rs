//! Attribute values.
//!
//! A [`TagValue`] is one of a few broad kinds of value.
//! The precise encoding of a value is determined by the
//! [value representation](crate::VR) kept next to it in each [`Element`](crate::Element).
use crate::Dataset;
use dcmanon_buffer::BufferObject;
use itertools::Itertools;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A list of numbers, which rarely holds more than a couple of values.
pub type C<T> = SmallVec<[T; 2]>;

/// The value of a DICOM attribute.
///
/// Cloning a value is a deep copy of its structure,
/// except for [`TagValue::Buffer`],
/// whose clones refer to the same [`BufferObject`].
/// Writing to the buffer through one clone is visible through all of them.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// Text, with multiple values separated by a backslash.
    /// Trailing padding is not part of the value.
    Str(String),
    /// Binary integers (`US`, `SS`, `UL`, `SL`, `UV`, `SV`, `AT`).
    /// An `AT` value is `group << 16 | element`.
    Int(C<i64>),
    /// Binary floating point numbers (`FL`, `FD`).
    Decimal(C<f64>),
    /// A small binary blob held inline.
    Bytes(Vec<u8>),
    /// A binary blob held in the buffer store.
    Buffer(Arc<BufferObject>),
    /// A sequence of nested data sets.
    Sequence(Vec<Dataset>),
    /// Encapsulated pixel data, kept as opaque fragments.
    PixelSequence {
        /// The basic offset table.
        offset_table: C<u32>,
        /// The compressed fragments.
        fragments: Vec<Vec<u8>>,
    },
}

impl TagValue {
    /// An empty value of the same kind as this one.
    pub fn empty_like(&self) -> TagValue {
        match self {
            TagValue::Str(_) => TagValue::Str(String::new()),
            TagValue::Int(_) => TagValue::Int(C::new()),
            TagValue::Decimal(_) => TagValue::Decimal(C::new()),
            TagValue::Bytes(_) | TagValue::Buffer(_) => TagValue::Bytes(Vec::new()),
            TagValue::Sequence(_) => TagValue::Sequence(Vec::new()),
            TagValue::PixelSequence { .. } => TagValue::PixelSequence {
                offset_table: C::new(),
                fragments: Vec::new(),
            },
        }
    }

    /// Whether the value holds nothing.
    ///
    /// For buffers, this looks at the buffer's size.
    pub fn is_empty(&self) -> bool {
        match self {
            TagValue::Str(s) => s.is_empty(),
            TagValue::Int(v) => v.is_empty(),
            TagValue::Decimal(v) => v.is_empty(),
            TagValue::Bytes(v) => v.is_empty(),
            TagValue::Buffer(b) => b.is_empty(),
            TagValue::Sequence(items) => items.is_empty(),
            TagValue::PixelSequence { fragments, .. } => fragments.is_empty(),
        }
    }

    /// The number of values.
    ///
    /// Blobs and pixel sequences always count as one value when not empty.
    pub fn multiplicity(&self) -> usize {
        match self {
            TagValue::Str(s) if s.is_empty() => 0,
            TagValue::Str(s) => s.split('\\').count(),
            TagValue::Int(v) => v.len(),
            TagValue::Decimal(v) => v.len(),
            TagValue::Sequence(items) => items.len(),
            other => usize::from(!other.is_empty()),
        }
    }

    /// The text of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The binary integers of an integer value.
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            TagValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The first value as an integer,
    /// parsing it from text if necessary (`IS`, `DS` with integral value).
    pub fn to_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(v) => v.first().copied(),
            TagValue::Str(s) => s.split('\\').next()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// All values as floating point numbers,
    /// parsing them from text if necessary (`DS`, `IS`).
    pub fn to_floats(&self) -> Option<C<f64>> {
        match self {
            TagValue::Decimal(v) => Some(v.clone()),
            TagValue::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            TagValue::Str(s) if !s.is_empty() => {
                s.split('\\').map(|part| part.trim().parse().ok()).collect()
            }
            _ => None,
        }
    }

    /// The nested data sets of a sequence value.
    pub fn as_sequence(&self) -> Option<&[Dataset]> {
        match self {
            TagValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Mutable access to the nested data sets of a sequence value.
    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Dataset>> {
        match self {
            TagValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// A textual rendition of the value,
    /// used for comparisons and grouping by value.
    ///
    /// Strings are borrowed as they are, numbers are joined with `\`.
    /// Blobs and sequences have no textual form.
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        match self {
            TagValue::Str(s) => Some(Cow::Borrowed(s)),
            TagValue::Int(v) => Some(Cow::Owned(v.iter().join("\\"))),
            TagValue::Decimal(v) => Some(Cow::Owned(v.iter().join("\\"))),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => write!(f, "{:?}", s),
            TagValue::Int(v) => write!(f, "[{}]", v.iter().join(", ")),
            TagValue::Decimal(v) => write!(f, "[{}]", v.iter().join(", ")),
            TagValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            TagValue::Buffer(b) => write!(f, "<buffer {}, {} bytes>", b.id(), b.size()),
            TagValue::Sequence(items) => write!(f, "<sequence of {} items>", items.len()),
            TagValue::PixelSequence { fragments, .. } => {
                write!(f, "<pixel sequence of {} fragments>", fragments.len())
            }
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Str(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Str(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(smallvec::smallvec![value])
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Decimal(smallvec::smallvec![value])
    }
}

impl From<Vec<u8>> for TagValue {
    fn from(value: Vec<u8>) -> Self {
        TagValue::Bytes(value)
    }
}

impl From<Arc<BufferObject>> for TagValue {
    fn from(value: Arc<BufferObject>) -> Self {
        TagValue::Buffer(value)
    }
}

impl From<Vec<Dataset>> for TagValue {
    fn from(value: Vec<Dataset>) -> Self {
        TagValue::Sequence(value)
    }
}
