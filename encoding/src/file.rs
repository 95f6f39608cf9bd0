//! Reading and writing whole DICOM Part-10 files.
use crate::meta::{self, DICM_MAGIC_CODE, PREAMBLE_LENGTH};
use crate::read::{
    self, Decoder, MissingMetaSnafu, NotDicomSnafu, OpenFileSnafu, ReadOptions,
    ReadPreambleSnafu, UnsupportedTransferSyntaxSnafu,
};
use crate::transfer_syntax::TransferSyntax;
use crate::write::{self, CreateTempFileSnafu, DeflateSnafu, Encoder, FlushSnafu, PersistSnafu};
use dcmanon_core::dictionary::uids;
use dcmanon_core::{tags, Dataset};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use snafu::{ensure, OptionExt, ResultExt};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Open and read a DICOM file.
///
/// The file meta group is part of the returned data set.
/// With a buffer store in `options`,
/// large values are not read until their buffer is first locked.
/// Such buffers refer to the file by path and offset,
/// so they must not be locked for the first time
/// after the file was replaced or modified.
pub fn open_file(path: impl AsRef<Path>, options: &ReadOptions) -> read::Result<Dataset> {
    let path = path.as_ref();
    let file = File::open(path).context(OpenFileSnafu { path })?;
    read_impl(BufReader::new(file), Some(path), options)
}

/// Read a DICOM file from a byte source,
/// starting at the preamble.
pub fn read_from<R: BufRead>(source: R, options: &ReadOptions) -> read::Result<Dataset> {
    read_impl(source, None, options)
}

fn read_impl<R: BufRead>(
    mut source: R,
    path: Option<&Path>,
    options: &ReadOptions,
) -> read::Result<Dataset> {
    let mut preamble = [0u8; PREAMBLE_LENGTH + 4];
    source
        .read_exact(&mut preamble)
        .context(ReadPreambleSnafu)?;
    ensure!(preamble[PREAMBLE_LENGTH..] == DICM_MAGIC_CODE, NotDicomSnafu);

    let mut decoder = Decoder::new(source, preamble.len() as u64, true, options);
    let mut dataset = decoder.read_meta_group()?;
    let uid = dataset
        .get_str(tags::TRANSFER_SYNTAX_UID)
        .context(MissingMetaSnafu {
            alias: "TransferSyntaxUID",
        })?;
    let ts = TransferSyntax::from_uid(uid)
        .context(UnsupportedTransferSyntaxSnafu { uid })?;
    debug!("Reading data set in transfer syntax {}", ts);

    let body = if ts.is_deflated() {
        let inflated = BufReader::new(DeflateDecoder::new(decoder.into_inner()));
        Decoder::new(inflated, 0, true, options).read_dataset()?
    } else {
        decoder.set_explicit(ts.is_explicit_vr());
        if let Some(path) = path {
            decoder.set_lazy_source(path);
        }
        decoder.read_dataset()?
    };
    dataset.extend(body);
    Ok(dataset)
}

/// Write a data set as a DICOM file to a byte sink.
///
/// The file meta group is completed from the data set
/// (see [`meta::file_meta_group`]),
/// and the data set is encoded in the transfer syntax it names,
/// explicit VR little endian by default.
pub fn write_to<W: Write>(sink: W, dataset: &Dataset) -> write::Result<W> {
    let meta = meta::file_meta_group(dataset, uids::EXPLICIT_VR_LITTLE_ENDIAN);
    let uid = meta
        .get_str(tags::TRANSFER_SYNTAX_UID)
        .unwrap_or(uids::EXPLICIT_VR_LITTLE_ENDIAN);
    let ts = TransferSyntax::from_uid(uid)
        .context(write::UnsupportedTransferSyntaxSnafu { uid })?;

    let mut body = Dataset::new();
    body.extend(
        dataset
            .iter()
            .filter(|(tag, _)| !tag.is_meta())
            .map(|(tag, element)| (tag, element.clone())),
    );

    let sink = meta::write_meta(sink, &meta)?;
    if ts.is_deflated() {
        let mut encoder = Encoder::new(DeflateEncoder::new(sink, Compression::fast()), true);
        encoder.write_dataset(&body)?;
        encoder.into_inner().finish().context(DeflateSnafu)
    } else {
        let mut encoder = Encoder::new(sink, ts.is_explicit_vr());
        encoder.write_dataset(&body)?;
        Ok(encoder.into_inner())
    }
}

/// Write a data set as a DICOM file at the given path.
///
/// The file is first written in full to a temporary file
/// in the same directory, which then replaces the destination.
/// This makes it possible to write back a data set
/// whose buffers are still streamed from the destination file.
pub fn write_file(path: impl AsRef<Path>, dataset: &Dataset) -> write::Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).context(CreateTempFileSnafu { path })?;
    {
        let sink = write_to(BufWriter::new(file.as_file_mut()), dataset)?;
        sink.into_inner()
            .map_err(|e| e.into_error())
            .context(FlushSnafu { path })?;
    }
    file.persist(path).context(PersistSnafu { path })?;
    Ok(())
}
