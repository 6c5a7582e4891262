use std::{
    fs,
    io::{self, BufReader, Seek, SeekFrom},
    path::Path,
};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    io::{
        encoding::TextEncoding,
        offset_index::RangeIndex,
        traits::{ImagingFileReader, RasterSource, SeekRead},
    },
    meta::{AcquisitionEntry, XmlTreeError},
    raster::{reshape, Raster, RecordStream, ReshapeError},
};

use super::catalog::AcquisitionCatalog;
use super::decode::{decode_records, is_whole_records, read_range, record_stride};
use super::footer::{find_footer_offset, read_footer};

const BUFFER_SIZE: usize = 1 << 16;

/**
All the ways reading an MCD file can go wrong
*/
#[derive(Debug, Error)]
pub enum McdError {
    #[error("'{path}' does not contain an MCDPublic XML footer under {encoding} (try a different encoding?)")]
    FooterNotFound { path: String, encoding: TextEncoding },
    #[error("Failed to parse the MCDPublic XML footer: {0}")]
    MetadataTree(#[from] XmlTreeError),
    #[error("Malformed <{element}> metadata: {message}")]
    MalformedMetadata { element: String, message: String },
    #[error("Acquisition {id} has an invalid data range [{start}, {end}) in a file of {file_length} bytes")]
    InvalidRecordRange {
        id: String,
        start: u64,
        end: u64,
        file_length: u64,
    },
    #[error("Acquisition {id} holds {length} bytes, which is not a multiple of the {stride} byte record stride")]
    RecordStride { id: String, length: u64, stride: u64 },
    #[error("Acquisition {id} declares unsupported {data_format:?} data with {value_bytes} byte values, expected 4 byte Float")]
    UnsupportedFormat {
        id: String,
        data_format: String,
        value_bytes: u32,
    },
    #[error("Acquisition {id} could not be reshaped: {source}")]
    Reshape {
        id: String,
        #[source]
        source: ReshapeError,
    },
    #[error("No acquisition with ID {0:?}")]
    AcquisitionNotFound(String),
    #[error("An IO error occurred while reading an MCD file: {0}")]
    IOError(#[from] io::Error),
}

impl McdError {
    /// Whether this error means the file is not laid out as expected
    pub fn is_format_error(&self) -> bool {
        match self {
            Self::FooterNotFound { .. }
            | Self::MetadataTree(_)
            | Self::MalformedMetadata { .. }
            | Self::InvalidRecordRange { .. }
            | Self::RecordStride { .. } => true,
            Self::Reshape { source, .. } => !matches!(source, ReshapeError::IncompleteData { .. }),
            _ => false,
        }
    }

    /// Whether this error means the image data has gaps and no fill value was given
    pub fn is_incomplete_data(&self) -> bool {
        matches!(
            self,
            Self::Reshape {
                source: ReshapeError::IncompleteData { .. },
                ..
            }
        )
    }
}

impl From<McdError> for io::Error {
    fn from(value: McdError) -> Self {
        match value {
            McdError::IOError(e) => e,
            McdError::AcquisitionNotFound(_) => io::Error::new(io::ErrorKind::NotFound, value),
            McdError::UnsupportedFormat { .. } => io::Error::new(io::ErrorKind::Unsupported, value),
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

/// Options that control how acquisitions are decoded
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadOptions {
    /// The encoding the metadata footer is written in
    pub encoding: TextEncoding,
    /// The value to give pixels with no data. When `None`, incomplete data is an error.
    pub fill_missing: Option<f32>,
}

/// Configure and open an [`McdReaderType`]
#[derive(Debug, Clone, Default)]
pub struct McdReaderBuilder {
    options: ReadOptions,
    buffer_size: Option<usize>,
}

impl McdReaderBuilder {
    /// Set the text encoding of the metadata footer, UTF-16LE by default
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.options.encoding = encoding;
        self
    }

    /// Pad missing pixels with `value` instead of failing
    pub fn fill_missing(mut self, value: Option<f32>) -> Self {
        self.options.fill_missing = value;
        self
    }

    /// Set the buffer capacity wrapped around the file handle
    pub fn buffer_size(mut self, capacity: usize) -> Self {
        self.buffer_size = Some(capacity);
        self
    }

    /// Open the MCD file at `path`
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<McdReaderType<fs::File>, McdError> {
        let path = path.as_ref();
        let handle = fs::File::open(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        McdReaderType::with_options(
            handle,
            self.options,
            self.buffer_size.unwrap_or(BUFFER_SIZE),
            path.display().to_string(),
            name,
        )
    }

    /// Read an MCD file from anything that supports [`io::Read`] and [`io::Seek`]
    pub fn from_read_seek<R: SeekRead>(self, source: R) -> Result<McdReaderType<R>, McdError> {
        McdReaderType::with_options(
            source,
            self.options,
            self.buffer_size.unwrap_or(BUFFER_SIZE),
            "<stream>".into(),
            String::new(),
        )
    }
}

/**
A reader for Fluidigm/Standard BioTools `.mcd` imaging mass cytometry files.

Opening the reader locates and parses the metadata footer. Each acquisition's
data are only read when it is requested, one acquisition at a time, and
reshaped into a [`Raster`]. The underlying handle is held until the reader, or
the iterator it was turned into, is dropped.
*/
pub struct McdReaderType<R: SeekRead> {
    handle: BufReader<R>,
    catalog: AcquisitionCatalog,
    options: ReadOptions,
    /// Where the data came from, for error messages
    source_name: String,
    /// The prefix of every raster name, usually the file stem
    name: String,
    file_length: u64,
    footer_offset: u64,
}

/// An [`McdReaderType`] over a file on disk
pub type McdReader = McdReaderType<fs::File>;

impl<R: SeekRead> McdReaderType<R> {
    /// Create a reader with the default [`ReadOptions`]
    pub fn new(source: R) -> Result<Self, McdError> {
        McdReaderBuilder::default().from_read_seek(source)
    }

    pub fn builder() -> McdReaderBuilder {
        McdReaderBuilder::default()
    }

    pub fn with_options(
        source: R,
        options: ReadOptions,
        capacity: usize,
        source_name: String,
        name: String,
    ) -> Result<Self, McdError> {
        let mut handle = BufReader::with_capacity(capacity, source);
        let file_length = handle.seek(SeekFrom::End(0))?;
        let footer_offset = match find_footer_offset(&mut handle, options.encoding)? {
            Some(offset) => offset,
            None => {
                return Err(McdError::FooterNotFound {
                    path: source_name,
                    encoding: options.encoding,
                })
            }
        };
        let document = read_footer(&mut handle, footer_offset, options.encoding)?;
        trace!("Read {} characters of metadata from {source_name}", document.len());
        let catalog = AcquisitionCatalog::from_document(&document)?;
        debug!(
            "Opened {source_name} with {} acquisitions, footer at {footer_offset} of {file_length} bytes",
            catalog.len()
        );
        Ok(Self {
            handle,
            catalog,
            options,
            source_name,
            name,
            file_length,
            footer_offset,
        })
    }

    pub fn catalog(&self) -> &AcquisitionCatalog {
        &self.catalog
    }

    pub fn acquisitions(&self) -> &[AcquisitionEntry] {
        self.catalog.entries()
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    pub fn set_fill_missing(&mut self, value: Option<f32>) {
        self.options.fill_missing = value;
    }

    pub fn footer_offset(&self) -> u64 {
        self.footer_offset
    }

    pub fn file_length(&self) -> u64 {
        self.file_length
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Release the reader, returning the underlying handle
    pub fn into_inner(self) -> R {
        self.handle.into_inner()
    }

    fn raster_name(&self, entry: &AcquisitionEntry) -> String {
        if self.name.is_empty() {
            entry.id().to_string()
        } else {
            format!("{}_{}", self.name, entry.id())
        }
    }

    /// Read the long-form records of the `index`-th acquisition without reshaping them
    pub fn read_records(&mut self, index: usize) -> Result<RecordStream, McdError> {
        let entry = self
            .catalog
            .get_index(index)
            .ok_or_else(|| McdError::AcquisitionNotFound(format!("#{index}")))?;
        let id = entry.id().to_string();
        let record = &entry.record;

        let encoding = match record.value_encoding() {
            Some(encoding) => encoding,
            None => {
                return Err(McdError::UnsupportedFormat {
                    id,
                    data_format: record.data_format.clone(),
                    value_bytes: record.value_bytes,
                })
            }
        };

        let (start, end) = (record.data_start_offset, record.data_end_offset);
        if end <= start || end > self.file_length {
            return Err(McdError::InvalidRecordRange {
                id,
                start,
                end,
                file_length: self.file_length,
            });
        }
        let record_width = entry.record_width();
        if !is_whole_records(end - start, record_width, encoding) {
            return Err(McdError::RecordStride {
                id,
                length: end - start,
                stride: record_stride(record_width, encoding) as u64,
            });
        }

        let bytes = read_range(&mut self.handle, start..end)?;
        let records = decode_records(&bytes, record_width, encoding)
            .map_err(|source| McdError::Reshape { id: id.clone(), source })?;
        trace!(
            "Decoded {} records of {} values for acquisition {id}",
            records.len(),
            record_width
        );
        Ok(records)
    }

    /// Decode and reshape the `index`-th acquisition in document order
    pub fn read_acquisition(&mut self, index: usize) -> Result<Raster, McdError> {
        let records = self.read_records(index)?;
        let entry = self
            .catalog
            .get_index(index)
            .ok_or_else(|| McdError::AcquisitionNotFound(format!("#{index}")))?;
        let raster = reshape(&records, entry.channel_names(), self.options.fill_missing)
            .map_err(|source| McdError::Reshape {
                id: entry.id().to_string(),
                source,
            })?;
        debug!(
            "Acquisition {} reshaped to {:?}",
            entry.id(),
            raster.shape()
        );
        Ok(raster
            .with_name(self.raster_name(entry))
            .with_attributes(entry.record.attributes.clone()))
    }

    /// Decode and reshape the acquisition with the given ID
    pub fn read_acquisition_by_id(&mut self, id: &str) -> Result<Raster, McdError> {
        let index = self
            .catalog
            .index_of(id)
            .ok_or_else(|| McdError::AcquisitionNotFound(id.to_string()))?;
        self.read_acquisition(index)
    }

    /// Iterate over every acquisition in document order, borrowing the reader
    pub fn iter(&mut self) -> AcquisitionIter<'_, R> {
        AcquisitionIter::new(self)
    }
}

impl McdReaderType<fs::File> {
    /// Open the MCD file at `path` with the default [`ReadOptions`]
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, McdError> {
        McdReaderBuilder::default().from_path(path)
    }
}

impl<R: SeekRead> RasterSource for McdReaderType<R> {
    type Error = McdError;

    fn len(&self) -> usize {
        self.catalog.len()
    }

    fn get_by_id(&mut self, id: &str) -> Result<Raster, McdError> {
        self.read_acquisition_by_id(id)
    }

    fn get_by_index(&mut self, index: usize) -> Result<Raster, McdError> {
        self.read_acquisition(index)
    }

    fn get_index(&self) -> &RangeIndex {
        self.catalog.range_index()
    }
}

impl ImagingFileReader for McdReaderType<fs::File> {
    fn open_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(McdReader::open_path(path)?)
    }
}

/// A forward-only iterator over the rasters of a borrowed [`McdReaderType`].
///
/// Each item is decoded when it is pulled, and an error for one acquisition
/// does not prevent reading the next.
pub struct AcquisitionIter<'a, R: SeekRead> {
    reader: &'a mut McdReaderType<R>,
    index: usize,
}

impl<'a, R: SeekRead> AcquisitionIter<'a, R> {
    pub fn new(reader: &'a mut McdReaderType<R>) -> Self {
        Self { reader, index: 0 }
    }
}

impl<R: SeekRead> Iterator for AcquisitionIter<'_, R> {
    type Item = Result<Raster, McdError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.reader.catalog.len() {
            return None;
        }
        let item = self.reader.read_acquisition(self.index);
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.reader.catalog.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<R: SeekRead> ExactSizeIterator for AcquisitionIter<'_, R> {}

/// A forward-only iterator that owns its [`McdReaderType`], releasing the
/// underlying handle when it is dropped whether or not it was exhausted.
pub struct IntoAcquisitionIter<R: SeekRead> {
    reader: McdReaderType<R>,
    index: usize,
}

impl<R: SeekRead> Iterator for IntoAcquisitionIter<R> {
    type Item = Result<Raster, McdError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.reader.catalog.len() {
            return None;
        }
        let item = self.reader.read_acquisition(self.index);
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.reader.catalog.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<R: SeekRead> ExactSizeIterator for IntoAcquisitionIter<R> {}

impl<R: SeekRead> IntoIterator for McdReaderType<R> {
    type Item = Result<Raster, McdError>;
    type IntoIter = IntoAcquisitionIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        IntoAcquisitionIter {
            reader: self,
            index: 0,
        }
    }
}

impl<'a, R: SeekRead> IntoIterator for &'a mut McdReaderType<R> {
    type Item = Result<Raster, McdError>;
    type IntoIter = AcquisitionIter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Read every acquisition in the MCD file at `path`, lazily.
///
/// This is a shorthand for building an [`McdReader`] with `encoding` and
/// `fill_missing` and turning it into an iterator.
pub fn read_mcd<P: AsRef<Path>>(
    path: P,
    fill_missing: Option<f32>,
    encoding: TextEncoding,
) -> Result<IntoAcquisitionIter<fs::File>, McdError> {
    Ok(McdReaderBuilder::default()
        .encoding(encoding)
        .fill_missing(fill_missing)
        .from_path(path)?
        .into_iter())
}

/// Check the tail of a buffer for the metadata footer marker in `encoding`
pub fn is_mcd(buf: &[u8], encoding: TextEncoding) -> bool {
    let marker = encoding.encode(super::footer::FOOTER_MARKER);
    memchr::memmem::rfind(buf, &marker).is_some()
}
