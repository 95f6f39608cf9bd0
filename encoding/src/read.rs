//! Decoding of data sets in little endian transfer syntaxes.
use byteordered::byteorder::{ByteOrder, LittleEndian};
use dcmanon_buffer::{BufferManager, BufferObject, FileFormat, FileStreamFactory, MallocPolicy};
use dcmanon_core::value::C;
use dcmanon_core::{dictionary, tags, Dataset, Element, Tag, TagValue, VR};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// An error which may occur when reading a DICOM file.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
#[allow(missing_docs)]
pub enum ReadError {
    #[snafu(display("Could not open file {}", path.display()))]
    OpenFile {
        path: PathBuf,
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not read the file preamble"))]
    ReadPreamble {
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Not a DICOM file: missing `DICM` magic code"))]
    NotDicom { backtrace: Backtrace },
    #[snafu(display("Could not read element header at position {}", position))]
    ReadHeader {
        position: u64,
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not read value of element {}", tag))]
    ReadValue {
        tag: Tag,
        source: io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Unexpected end of data while reading a nested data set"))]
    UnexpectedEnd { backtrace: Backtrace },
    #[snafu(display("Unexpected element {} at position {}", tag, position))]
    UnexpectedTag {
        tag: Tag,
        position: u64,
        backtrace: Backtrace,
    },
    #[snafu(display("Undefined value length for element {}", tag))]
    UndefinedLength { tag: Tag, backtrace: Backtrace },
    #[snafu(display("Missing file meta element `{}`", alias))]
    MissingMeta {
        alias: &'static str,
        backtrace: Backtrace,
    },
    #[snafu(display("Unsupported transfer syntax `{}`", uid))]
    UnsupportedTransferSyntax { uid: String, backtrace: Backtrace },
    #[snafu(display("Sequences nested deeper than {} levels", depth))]
    NestingTooDeep { depth: usize, backtrace: Backtrace },
    #[snafu(display("Could not place value of element {} in the buffer store", tag))]
    StoreBuffer {
        tag: Tag,
        source: dcmanon_buffer::Error,
    },
}

/// Type alias for a result from reading DICOM data.
pub type Result<T, E = ReadError> = std::result::Result<T, E>;

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// How deep sequences may be nested in a data set.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Default size above which binary values are held in the buffer store.
pub const DEFAULT_BUFFER_THRESHOLD: usize = 64 * 1024;

/// Options for reading DICOM files.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    buffer_threshold: usize,
    manager: Option<Arc<BufferManager>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            buffer_threshold: DEFAULT_BUFFER_THRESHOLD,
            manager: None,
        }
    }
}

impl ReadOptions {
    /// Options with the default threshold and no buffer store.
    ///
    /// Without a buffer store, all values are held inline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold binary values larger than `threshold` bytes in the buffer store.
    pub fn buffer_threshold(mut self, threshold: usize) -> Self {
        self.buffer_threshold = threshold;
        self
    }

    /// Use this buffer store for large binary values.
    ///
    /// Values read from a file which is not deflated
    /// are loaded lazily on first access.
    pub fn buffer_manager(mut self, manager: Arc<BufferManager>) -> Self {
        self.manager = Some(manager);
        self
    }
}

struct Header {
    tag: Tag,
    vr: VR,
    len: u32,
}

/// A data set decoder over a byte source,
/// which keeps track of its position to reference values lazily.
pub(crate) struct Decoder<'o, R> {
    source: R,
    position: u64,
    explicit: bool,
    lazy_source: Option<PathBuf>,
    options: &'o ReadOptions,
    depth: usize,
}

impl<'o, R: Read> Decoder<'o, R> {
    pub(crate) fn new(source: R, position: u64, explicit: bool, options: &'o ReadOptions) -> Self {
        Decoder {
            source,
            position,
            explicit,
            lazy_source: None,
            options,
            depth: 0,
        }
    }

    pub(crate) fn set_explicit(&mut self, explicit: bool) {
        self.explicit = explicit;
    }

    /// Reference large values at their offset in this file
    /// instead of reading them.
    pub(crate) fn set_lazy_source(&mut self, path: &Path) {
        self.lazy_source = Some(path.to_path_buf());
    }

    pub(crate) fn into_inner(self) -> R {
        self.source
    }

    /// Read elements until the end of the source.
    pub(crate) fn read_dataset(&mut self) -> Result<Dataset> {
        self.read_items_body(None, false)
    }

    fn fill_or_eof(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let mut read = 0;
        while read < buf.len() {
            match self.source.read(&mut buf[read..]) {
                Ok(0) if read == 0 => return Ok(false),
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.position += buf.len() as u64;
        Ok(true)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.source.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn read_header(&mut self) -> Result<Option<Header>> {
        let position = self.position;
        let mut buf = [0u8; 4];
        if !self
            .fill_or_eof(&mut buf)
            .context(ReadHeaderSnafu { position })?
        {
            return Ok(None);
        }
        let tag = Tag(
            LittleEndian::read_u16(&buf[0..2]),
            LittleEndian::read_u16(&buf[2..4]),
        );

        if tag.is_delimiter() {
            // items and delimiters carry no value representation
            self.read_exact(&mut buf)
                .context(ReadHeaderSnafu { position })?;
            let len = LittleEndian::read_u32(&buf);
            return Ok(Some(Header {
                tag,
                vr: VR::UN,
                len,
            }));
        }

        if !self.explicit {
            self.read_exact(&mut buf)
                .context(ReadHeaderSnafu { position })?;
            let vr = dictionary::vr_of(tag).unwrap_or(VR::UN);
            let len = LittleEndian::read_u32(&buf);
            return Ok(Some(Header { tag, vr, len }));
        }

        self.read_exact(&mut buf)
            .context(ReadHeaderSnafu { position })?;
        let vr = VR::from_binary([buf[0], buf[1]]).unwrap_or(VR::UN);
        let len = if vr.has_short_length() {
            u32::from(LittleEndian::read_u16(&buf[2..4]))
        } else {
            // 2 reserved bytes, then a 4-byte length
            self.read_exact(&mut buf)
                .context(ReadHeaderSnafu { position })?;
            LittleEndian::read_u32(&buf)
        };
        Ok(Some(Header { tag, vr, len }))
    }

    /// Read the elements of a data set
    /// up to `end` (defined length), an item delimiter,
    /// or the end of the source if the data set is not nested.
    fn read_items_body(&mut self, end: Option<u64>, nested: bool) -> Result<Dataset> {
        let mut dataset = Dataset::new();
        loop {
            if matches!(end, Some(end) if self.position >= end) {
                break;
            }
            let header = match self.read_header()? {
                Some(header) => header,
                None if nested => return UnexpectedEndSnafu.fail(),
                None => break,
            };
            if header.tag == Tag::ITEM_DELIMITER {
                break;
            }
            ensure!(
                !header.tag.is_delimiter(),
                UnexpectedTagSnafu {
                    tag: header.tag,
                    position: self.position,
                }
            );
            let (vr, value) = self.read_value(&header)?;
            dataset.put(header.tag, Element::new(vr, value));
        }
        Ok(dataset)
    }

    fn read_value(&mut self, header: &Header) -> Result<(VR, TagValue)> {
        let Header { tag, vr, len } = *header;

        if vr == VR::SQ {
            return Ok((VR::SQ, self.read_sequence(len)?));
        }
        if len == UNDEFINED_LENGTH {
            if tag == tags::PIXEL_DATA {
                return Ok((VR::OB, self.read_fragments()?));
            }
            if vr == VR::UN {
                // a sequence of unknown type, whose items are implicit VR
                let explicit = self.explicit;
                self.explicit = false;
                let value = self.read_sequence(len);
                self.explicit = explicit;
                return Ok((VR::SQ, value?));
            }
            return UndefinedLengthSnafu { tag }.fail();
        }

        if vr.is_text() {
            let bytes = self.read_bytes(tag, len)?;
            return Ok((vr, decode_text(vr, bytes)));
        }
        if let Some(width) = vr.int_width() {
            let bytes = self.read_bytes(tag, len)?;
            return Ok((vr, decode_ints(tag, vr, width, bytes)));
        }
        if let Some(width) = vr.float_width() {
            let bytes = self.read_bytes(tag, len)?;
            return Ok((vr, decode_floats(tag, width, bytes)));
        }
        Ok((vr, self.read_blob(tag, len)?))
    }

    fn read_sequence(&mut self, len: u32) -> Result<TagValue> {
        ensure!(
            self.depth < MAX_NESTING_DEPTH,
            NestingTooDeepSnafu {
                depth: MAX_NESTING_DEPTH
            }
        );
        self.depth += 1;
        let value = self.read_sequence_items(len);
        self.depth -= 1;
        value
    }

    fn read_sequence_items(&mut self, len: u32) -> Result<TagValue> {
        let end = (len != UNDEFINED_LENGTH).then(|| self.position + u64::from(len));
        let mut items = Vec::new();
        loop {
            if matches!(end, Some(end) if self.position >= end) {
                break;
            }
            let header = self.read_header()?.context(UnexpectedEndSnafu)?;
            match header.tag {
                Tag::ITEM => {
                    let item_end = (header.len != UNDEFINED_LENGTH)
                        .then(|| self.position + u64::from(header.len));
                    items.push(self.read_items_body(item_end, true)?);
                }
                Tag::SEQUENCE_DELIMITER => break,
                tag => {
                    return UnexpectedTagSnafu {
                        tag,
                        position: self.position,
                    }
                    .fail()
                }
            }
        }
        Ok(TagValue::Sequence(items))
    }

    fn read_fragments(&mut self) -> Result<TagValue> {
        let mut offset_table: Option<C<u32>> = None;
        let mut fragments = Vec::new();
        loop {
            let header = self.read_header()?.context(UnexpectedEndSnafu)?;
            match header.tag {
                Tag::ITEM => {
                    let bytes = self.read_bytes(Tag::ITEM, header.len)?;
                    if offset_table.is_none() {
                        offset_table = Some(
                            bytes
                                .chunks_exact(4)
                                .map(LittleEndian::read_u32)
                                .collect(),
                        );
                    } else {
                        fragments.push(bytes);
                    }
                }
                Tag::SEQUENCE_DELIMITER => break,
                tag => {
                    return UnexpectedTagSnafu {
                        tag,
                        position: self.position,
                    }
                    .fail()
                }
            }
        }
        Ok(TagValue::PixelSequence {
            offset_table: offset_table.unwrap_or_default(),
            fragments,
        })
    }

    fn read_bytes(&mut self, tag: Tag, len: u32) -> Result<Vec<u8>> {
        ensure!(len != UNDEFINED_LENGTH, UndefinedLengthSnafu { tag });
        // never trust the declared length for the allocation size
        let mut bytes = Vec::new();
        let read = (&mut self.source)
            .take(u64::from(len))
            .read_to_end(&mut bytes)
            .context(ReadValueSnafu { tag })?;
        self.position += read as u64;
        if read as u64 != u64::from(len) {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof))
                .context(ReadValueSnafu { tag });
        }
        Ok(bytes)
    }

    fn read_blob(&mut self, tag: Tag, len: u32) -> Result<TagValue> {
        let options = self.options;
        let manager = match &options.manager {
            Some(manager) if len as usize > options.buffer_threshold => manager.clone(),
            _ => return Ok(TagValue::Bytes(self.read_bytes(tag, len)?)),
        };

        let buffer = match self.lazy_source.clone() {
            Some(path) => {
                let offset = self.position;
                let mut value = (&mut self.source).take(u64::from(len));
                let skipped =
                    io::copy(&mut value, &mut io::sink()).context(ReadValueSnafu { tag })?;
                self.position += skipped;
                if skipped != u64::from(len) {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof))
                        .context(ReadValueSnafu { tag });
                }
                let buffer = BufferObject::new(&manager).context(StoreBufferSnafu { tag })?;
                buffer
                    .set_istream_factory(
                        Arc::new(FileStreamFactory::with_offset(&path, offset)),
                        len as usize,
                        Some(path),
                        FileFormat::Raw,
                        MallocPolicy::shared(),
                    )
                    .context(StoreBufferSnafu { tag })?;
                debug!("Value of {} ({} bytes) deferred at offset {}", tag, len, offset);
                buffer
            }
            None => {
                let bytes = self.read_bytes(tag, len)?;
                BufferObject::from_vec(&manager, bytes).context(StoreBufferSnafu { tag })?
            }
        };
        Ok(TagValue::Buffer(Arc::new(buffer)))
    }
}

impl<'o, R: BufRead> Decoder<'o, R> {
    /// Read the file meta group, which is always explicit VR little endian.
    ///
    /// Elements are read for as long as the next tag belongs to group 2,
    /// so the group length element is not required.
    pub(crate) fn read_meta_group(&mut self) -> Result<Dataset> {
        let mut meta = Dataset::new();
        let explicit = self.explicit;
        self.explicit = true;
        loop {
            let position = self.position;
            let next = self.source.fill_buf().context(ReadHeaderSnafu { position })?;
            if next.len() < 2 || LittleEndian::read_u16(&next[0..2]) != 0x0002 {
                break;
            }
            let header = self.read_header()?.context(UnexpectedEndSnafu)?;
            let (vr, value) = self.read_value(&header)?;
            meta.put(header.tag, Element::new(vr, value));
        }
        self.explicit = explicit;
        Ok(meta)
    }
}

fn decode_text(vr: VR, bytes: Vec<u8>) -> TagValue {
    let end = bytes
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |i| i + 1);
    let mut bytes = bytes;
    bytes.truncate(end);
    match String::from_utf8(bytes) {
        Ok(text) => TagValue::Str(text),
        Err(e) => {
            debug!("Keeping non UTF-8 {} value as bytes", vr);
            TagValue::Bytes(e.into_bytes())
        }
    }
}

fn decode_ints(tag: Tag, vr: VR, width: usize, bytes: Vec<u8>) -> TagValue {
    if bytes.len() % width != 0 {
        warn!("Length {} of element {} is not a multiple of {}", bytes.len(), tag, width);
        return TagValue::Bytes(bytes);
    }
    let values = bytes
        .chunks_exact(width)
        .map(|chunk| match vr {
            VR::US => i64::from(LittleEndian::read_u16(chunk)),
            VR::SS => i64::from(LittleEndian::read_i16(chunk)),
            VR::UL => i64::from(LittleEndian::read_u32(chunk)),
            VR::SL => i64::from(LittleEndian::read_i32(chunk)),
            VR::AT => i64::from(
                (u32::from(LittleEndian::read_u16(&chunk[0..2])) << 16)
                    | u32::from(LittleEndian::read_u16(&chunk[2..4])),
            ),
            // UV values above i64::MAX wrap around, and are written back as they were
            VR::UV => LittleEndian::read_u64(chunk) as i64,
            _ => LittleEndian::read_i64(chunk),
        })
        .collect();
    TagValue::Int(values)
}

fn decode_floats(tag: Tag, width: usize, bytes: Vec<u8>) -> TagValue {
    if bytes.len() % width != 0 {
        warn!("Length {} of element {} is not a multiple of {}", bytes.len(), tag, width);
        return TagValue::Bytes(bytes);
    }
    let values = bytes
        .chunks_exact(width)
        .map(|chunk| {
            if width == 4 {
                f64::from(LittleEndian::read_f32(chunk))
            } else {
                LittleEndian::read_f64(chunk)
            }
        })
        .collect();
    TagValue::Decimal(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode(bytes: &[u8], explicit: bool) -> Result<Dataset> {
        let options = ReadOptions::default();
        Decoder::new(bytes, 0, explicit, &options).read_dataset()
    }

    #[test]
    fn explicit_vr_elements() {
        #[rustfmt::skip]
        let bytes: &[u8] = &[
            // (0008,0060) CS 2 "CT"
            0x08, 0x00, 0x60, 0x00, b'C', b'S', 0x02, 0x00, b'C', b'T',
            // (0010,0010) PN 10 "DOE^JOHN  "
            0x10, 0x00, 0x10, 0x00, b'P', b'N', 0x0A, 0x00,
            b'D', b'O', b'E', b'^', b'J', b'O', b'H', b'N', b' ', b' ',
            // (0028,0010) US 2 512
            0x28, 0x00, 0x10, 0x00, b'U', b'S', 0x02, 0x00, 0x00, 0x02,
            // (0029,1010) OB 3 bytes with 4-byte length
            0x29, 0x00, 0x10, 0x10, b'O', b'B', 0x00, 0x00, 0x03, 0x00, 0x00, 0x00,
            0x01, 0x02, 0x03,
        ];
        let ds = decode(bytes, true).unwrap();
        assert_eq!(ds.get_str(tags::MODALITY), Some("CT"));
        assert_eq!(ds.get_str(tags::PATIENT_NAME), Some("DOE^JOHN"));
        assert_eq!(ds.get_int(tags::ROWS), Some(512));
        assert_eq!(ds.get(Tag(0x0029, 0x1010)), Some(&TagValue::Bytes(vec![1, 2, 3])));
        assert_eq!(ds.element(Tag(0x0029, 0x1010)).map(Element::vr), Some(VR::OB));
    }

    #[test]
    fn implicit_vr_uses_the_dictionary() {
        #[rustfmt::skip]
        let bytes: &[u8] = &[
            // (0020,000E) len 6 "1.2.3\0"
            0x20, 0x00, 0x0E, 0x00, 0x06, 0x00, 0x00, 0x00,
            b'1', b'.', b'2', b'.', b'3', 0x00,
            // (0011,1001) unknown, len 2
            0x11, 0x00, 0x01, 0x10, 0x02, 0x00, 0x00, 0x00, 0xAB, 0xCD,
        ];
        let ds = decode(bytes, false).unwrap();
        let uid = ds.element(tags::SERIES_INSTANCE_UID).unwrap();
        assert_eq!(uid.vr(), VR::UI);
        assert_eq!(uid.value(), &TagValue::from("1.2.3"));
        let unknown = ds.element(Tag(0x0011, 0x1001)).unwrap();
        assert_eq!(unknown.vr(), VR::UN);
        assert_eq!(unknown.value(), &TagValue::Bytes(vec![0xAB, 0xCD]));
    }

    #[test]
    fn sequences_of_undefined_and_defined_length() {
        #[rustfmt::skip]
        let bytes: &[u8] = &[
            // (0008,1140) SQ undefined length
            0x08, 0x00, 0x40, 0x11, b'S', b'Q', 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF,
            // item of undefined length
            0xFE, 0xFF, 0x00, 0xE0, 0xFF, 0xFF, 0xFF, 0xFF,
            // (0008,1155) UI 4 "1.2"
            0x08, 0x00, 0x55, 0x11, b'U', b'I', 0x04, 0x00, b'1', b'.', b'2', 0x00,
            // item delimiter
            0xFE, 0xFF, 0x0D, 0xE0, 0x00, 0x00, 0x00, 0x00,
            // item of defined length 12
            0xFE, 0xFF, 0x00, 0xE0, 0x0C, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x55, 0x11, b'U', b'I', 0x04, 0x00, b'4', b'.', b'5', 0x00,
            // sequence delimiter
            0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00,
            // (0020,0013) IS 2 "7 "
            0x20, 0x00, 0x13, 0x00, b'I', b'S', 0x02, 0x00, b'7', b' ',
        ];
        let ds = decode(bytes, true).unwrap();
        let items = ds.get_sequence(tags::REFERENCED_IMAGE_SEQUENCE).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get_str(tags::REFERENCED_SOP_INSTANCE_UID), Some("1.2"));
        assert_eq!(items[1].get_str(tags::REFERENCED_SOP_INSTANCE_UID), Some("4.5"));
        assert_eq!(ds.get_int(tags::INSTANCE_NUMBER), Some(7));
    }

    /// Sequences of one undefined length item each, `depth` levels deep.
    fn nested_sequences(depth: usize, closed: bool) -> Vec<u8> {
        #[rustfmt::skip]
        const OPEN: [u8; 20] = [
            0x08, 0x00, 0x40, 0x11, b'S', b'Q', 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF,
            0xFE, 0xFF, 0x00, 0xE0, 0xFF, 0xFF, 0xFF, 0xFF,
        ];
        #[rustfmt::skip]
        const CLOSE: [u8; 16] = [
            0xFE, 0xFF, 0x0D, 0xE0, 0x00, 0x00, 0x00, 0x00,
            0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut bytes = OPEN.repeat(depth);
        if closed {
            bytes.extend(CLOSE.repeat(depth));
        }
        bytes
    }

    #[test]
    fn nesting_up_to_the_limit() {
        let ds = decode(&nested_sequences(MAX_NESTING_DEPTH, true), true).unwrap();
        let mut depth = 0;
        let mut items = ds.get_sequence(tags::REFERENCED_IMAGE_SEQUENCE);
        while let Some([item]) = items {
            depth += 1;
            items = item.get_sequence(tags::REFERENCED_IMAGE_SEQUENCE);
        }
        assert_eq!(depth, MAX_NESTING_DEPTH);
    }

    #[test]
    fn nesting_beyond_the_limit_is_an_error() {
        assert!(matches!(
            decode(&nested_sequences(MAX_NESTING_DEPTH + 1, true), true),
            Err(ReadError::NestingTooDeep { depth: MAX_NESTING_DEPTH, .. })
        ));
        assert!(matches!(
            decode(&nested_sequences(100_000, false), true),
            Err(ReadError::NestingTooDeep { .. })
        ));
    }

    #[test]
    fn truncated_input_is_an_error() {
        #[rustfmt::skip]
        let bytes: &[u8] = &[
            0x10, 0x00, 0x10, 0x00, b'P', b'N', 0x0A, 0x00, b'D', b'O',
        ];
        assert!(matches!(
            decode(bytes, true),
            Err(ReadError::ReadValue { .. })
        ));
    }

    #[test]
    fn large_values_go_to_the_buffer_store() {
        let manager = BufferManager::new().unwrap();
        let options = ReadOptions::new()
            .buffer_threshold(4)
            .buffer_manager(manager.clone());
        #[rustfmt::skip]
        let bytes: &[u8] = &[
            0xE0, 0x7F, 0x10, 0x00, b'O', b'W', 0x00, 0x00, 0x08, 0x00, 0x00, 0x00,
            1, 2, 3, 4, 5, 6, 7, 8,
        ];
        let ds = Decoder::new(bytes, 0, true, &options).read_dataset().unwrap();
        match ds.get(tags::PIXEL_DATA) {
            Some(TagValue::Buffer(buffer)) => {
                assert_eq!(&buffer.lock_const().unwrap()[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
            }
            other => panic!("unexpected pixel data {:?}", other),
        }
    }
}
