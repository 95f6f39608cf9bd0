//! Encoding of data sets in little endian transfer syntaxes.
//!
//! Elements are written in ascending tag order.
//! Sequences and items are always written with undefined length.
use byteordered::byteorder::{ByteOrder, LittleEndian};
use dcmanon_core::{Dataset, Element, Tag, TagValue, VR};
use snafu::{ensure, Backtrace, ResultExt, Snafu};
use std::io::{self, Write};
use std::path::PathBuf;

/// An error which may occur when writing a DICOM file.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
#[allow(missing_docs)]
pub enum WriteError {
    #[snafu(display("Could not write element {}", tag))]
    WriteElement {
        tag: Tag,
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not write the file preamble"))]
    WritePreamble {
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Value of element {} is too long for {} ({} bytes)", tag, vr, length))]
    ValueTooLong {
        tag: Tag,
        vr: VR,
        length: usize,
        backtrace: Backtrace,
    },
    #[snafu(display("Value of element {} cannot be encoded as {}", tag, vr))]
    IncompatibleValue {
        tag: Tag,
        vr: VR,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not load buffer of element {}", tag))]
    LoadBuffer {
        tag: Tag,
        source: dcmanon_buffer::Error,
    },
    #[snafu(display("Unsupported transfer syntax `{}`", uid))]
    UnsupportedTransferSyntax { uid: String, backtrace: Backtrace },
    #[snafu(display("Could not finish the deflated data set"))]
    Deflate {
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not create temporary file next to {}", path.display()))]
    CreateTempFile {
        path: PathBuf,
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not flush data to {}", path.display()))]
    Flush {
        path: PathBuf,
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not move written file to {}", path.display()))]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
        backtrace: Backtrace,
    },
}

/// Type alias for a result from writing DICOM data.
pub type Result<T, E = WriteError> = std::result::Result<T, E>;

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// A data set encoder over a byte sink.
pub(crate) struct Encoder<W> {
    sink: W,
    explicit: bool,
}

impl<W: Write> Encoder<W> {
    pub(crate) fn new(sink: W, explicit: bool) -> Self {
        Encoder { sink, explicit }
    }

    pub(crate) fn into_inner(self) -> W {
        self.sink
    }

    /// Write all elements of the data set in ascending tag order.
    pub(crate) fn write_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        let mut elements: Vec<_> = dataset.iter().collect();
        elements.sort_unstable_by_key(|(tag, _)| *tag);
        for (tag, element) in elements {
            self.write_element(tag, element)?;
        }
        Ok(())
    }

    pub(crate) fn write_element(&mut self, tag: Tag, element: &Element) -> Result<()> {
        let vr = element.vr();
        match element.value() {
            TagValue::Sequence(items) => {
                self.write_header(tag, VR::SQ, UNDEFINED_LENGTH)?;
                for item in items {
                    self.write_marker(tag, Tag::ITEM, UNDEFINED_LENGTH)?;
                    self.write_dataset(item)?;
                    self.write_marker(tag, Tag::ITEM_DELIMITER, 0)?;
                }
                self.write_marker(tag, Tag::SEQUENCE_DELIMITER, 0)
            }
            TagValue::PixelSequence {
                offset_table,
                fragments,
            } => {
                self.write_header(tag, VR::OB, UNDEFINED_LENGTH)?;
                let mut table = vec![0; offset_table.len() * 4];
                LittleEndian::write_u32_into(offset_table, &mut table);
                self.write_item(tag, &table)?;
                for fragment in fragments {
                    self.write_item(tag, fragment)?;
                }
                self.write_marker(tag, Tag::SEQUENCE_DELIMITER, 0)
            }
            TagValue::Buffer(buffer) => {
                let content = buffer.lock_const().context(LoadBufferSnafu { tag })?;
                self.write_value(tag, vr, &content)
            }
            value => {
                let bytes = encode_value(tag, vr, value)?;
                self.write_value(tag, vr, &bytes)
            }
        }
    }

    /// Write a complete element, padding the value to an even length.
    fn write_value(&mut self, tag: Tag, vr: VR, bytes: &[u8]) -> Result<()> {
        let padded = bytes.len() + bytes.len() % 2;
        let short = self.explicit && vr.has_short_length();
        let limit = if short {
            usize::from(u16::MAX)
        } else {
            UNDEFINED_LENGTH as usize - 1
        };
        ensure!(
            padded <= limit,
            ValueTooLongSnafu {
                tag,
                vr,
                length: padded
            }
        );
        self.write_header(tag, vr, padded as u32)?;
        self.sink
            .write_all(bytes)
            .context(WriteElementSnafu { tag })?;
        if padded != bytes.len() {
            self.sink
                .write_all(&[vr.padding()])
                .context(WriteElementSnafu { tag })?;
        }
        Ok(())
    }

    fn write_header(&mut self, tag: Tag, vr: VR, len: u32) -> Result<()> {
        let mut buf = [0u8; 12];
        LittleEndian::write_u16(&mut buf[0..2], tag.0);
        LittleEndian::write_u16(&mut buf[2..4], tag.1);
        let header = if !self.explicit {
            LittleEndian::write_u32(&mut buf[4..8], len);
            &buf[..8]
        } else if vr.has_short_length() {
            buf[4..6].copy_from_slice(&vr.to_bytes());
            // only values up to u16::MAX reach this point
            LittleEndian::write_u16(&mut buf[6..8], len as u16);
            &buf[..8]
        } else {
            buf[4..6].copy_from_slice(&vr.to_bytes());
            LittleEndian::write_u32(&mut buf[8..12], len);
            &buf[..12]
        };
        self.sink
            .write_all(header)
            .context(WriteElementSnafu { tag })
    }

    /// Write an item or delimiter of group `FFFE`.
    /// `context` is the element being written, for error reporting.
    fn write_marker(&mut self, context: Tag, marker: Tag, len: u32) -> Result<()> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u16(&mut buf[0..2], marker.0);
        LittleEndian::write_u16(&mut buf[2..4], marker.1);
        LittleEndian::write_u32(&mut buf[4..8], len);
        self.sink
            .write_all(&buf)
            .context(WriteElementSnafu { tag: context })
    }

    fn write_item(&mut self, context: Tag, bytes: &[u8]) -> Result<()> {
        let padded = bytes.len() + bytes.len() % 2;
        self.write_marker(context, Tag::ITEM, padded as u32)?;
        self.sink
            .write_all(bytes)
            .context(WriteElementSnafu { tag: context })?;
        if padded != bytes.len() {
            self.sink
                .write_all(&[0])
                .context(WriteElementSnafu { tag: context })?;
        }
        Ok(())
    }
}

/// Encode a primitive value according to its value representation.
fn encode_value(tag: Tag, vr: VR, value: &TagValue) -> Result<Vec<u8>> {
    if let TagValue::Bytes(bytes) = value {
        return Ok(bytes.clone());
    }
    if vr.is_text() {
        return value
            .to_text()
            .map(|text| text.into_owned().into_bytes())
            .ok_or_else(|| IncompatibleValueSnafu { tag, vr }.build());
    }
    if let Some(width) = vr.int_width() {
        let ints: Vec<i64> = match value {
            TagValue::Int(v) => v.to_vec(),
            TagValue::Str(s) if s.is_empty() => Vec::new(),
            TagValue::Str(s) => s
                .split('\\')
                .map(|part| part.trim().parse().ok())
                .collect::<Option<_>>()
                .ok_or_else(|| IncompatibleValueSnafu { tag, vr }.build())?,
            _ => return IncompatibleValueSnafu { tag, vr }.fail(),
        };
        let mut bytes = vec![0; ints.len() * width];
        for (chunk, &v) in bytes.chunks_exact_mut(width).zip(&ints) {
            match vr {
                VR::US | VR::SS => LittleEndian::write_u16(chunk, v as u16),
                VR::UL | VR::SL => LittleEndian::write_u32(chunk, v as u32),
                VR::AT => {
                    LittleEndian::write_u16(&mut chunk[0..2], (v >> 16) as u16);
                    LittleEndian::write_u16(&mut chunk[2..4], v as u16);
                }
                _ => LittleEndian::write_u64(chunk, v as u64),
            }
        }
        return Ok(bytes);
    }
    if let Some(width) = vr.float_width() {
        let floats = value
            .to_floats()
            .ok_or_else(|| IncompatibleValueSnafu { tag, vr }.build())?;
        let mut bytes = vec![0; floats.len() * width];
        for (chunk, &v) in bytes.chunks_exact_mut(width).zip(&floats) {
            if width == 4 {
                LittleEndian::write_f32(chunk, v as f32);
            } else {
                LittleEndian::write_f64(chunk, v);
            }
        }
        return Ok(bytes);
    }
    match value {
        TagValue::Str(s) => Ok(s.as_bytes().to_vec()),
        _ => IncompatibleValueSnafu { tag, vr }.fail(),
    }
}
