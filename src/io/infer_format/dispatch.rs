use std::{fmt::Debug, fs, io, path::Path};

use log::debug;

use crate::io::encoding::TextEncoding;
use crate::io::mcd::{IntoAcquisitionIter, McdReaderBuilder, McdReaderType};
use crate::io::offset_index::RangeIndex;
use crate::io::traits::{ImagingFileReader, RasterSource, SeekRead};
use crate::io::txt::TxtReaderType;
use crate::raster::Raster;

use super::{infer_format, infer_from_stream, ImagingFormat};

/// An explicit file format dispatching ADT that provides the [`RasterSource`]
/// API over any supported format. The preferred means of creating an instance
/// is through the [`ImagingReaderType::open_path`] function.
///
/// Errors from the wrapped readers are converted into [`io::Error`].
#[non_exhaustive]
pub enum ImagingReaderType<R: SeekRead> {
    MCD(McdReaderType<R>),
    Txt(TxtReaderType<R>),
}

/// An [`ImagingReaderType`] over a file on disk
pub type ImagingReader = ImagingReaderType<fs::File>;

impl<R: SeekRead> Debug for ImagingReaderType<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MCD(arg0) => f.debug_tuple("MCD").field(&arg0.source_name()).finish(),
            Self::Txt(arg0) => f.debug_tuple("Txt").field(&arg0.source_name()).finish(),
        }
    }
}

/// A builder type for [`ImagingReaderType`].
///
/// To create an instance, see [`ImagingReaderType::builder`]
#[derive(Debug, Clone, Default)]
pub struct ImagingReaderBuilder {
    encoding: TextEncoding,
    fill_missing: Option<f32>,
}

impl ImagingReaderBuilder {
    /// Set the text encoding of an MCD metadata footer
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Pad missing pixels with `value` instead of failing
    pub fn fill_missing(mut self, value: Option<f32>) -> Self {
        self.fill_missing = value;
        self
    }

    fn mcd_builder(&self) -> McdReaderBuilder {
        McdReaderBuilder::default()
            .encoding(self.encoding)
            .fill_missing(self.fill_missing)
    }

    /// Create a reader from a file on the local file system denoted by `path`.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> io::Result<ImagingReaderType<fs::File>> {
        let path = path.as_ref();
        let format = infer_format(path)?;
        debug!("Inferred {} to be {format}", path.display());
        match format {
            ImagingFormat::MCD => Ok(ImagingReaderType::MCD(self.mcd_builder().from_path(path)?)),
            ImagingFormat::Txt => Ok(ImagingReaderType::Txt(
                TxtReaderType::open_path(path)?.fill_missing(self.fill_missing),
            )),
            ImagingFormat::Unknown => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("Could not infer the format of {}", path.display()),
            )),
        }
    }

    /// Create a reader from a type that supports [`io::Read`] and [`io::Seek`].
    pub fn from_read_seek<R: SeekRead>(self, mut source: R) -> io::Result<ImagingReaderType<R>> {
        match infer_from_stream(&mut source)? {
            ImagingFormat::MCD => Ok(ImagingReaderType::MCD(
                self.mcd_builder().from_read_seek(source)?,
            )),
            ImagingFormat::Txt => Ok(ImagingReaderType::Txt(
                TxtReaderType::new(source).fill_missing(self.fill_missing),
            )),
            ImagingFormat::Unknown => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Could not infer the format of the stream",
            )),
        }
    }
}

impl<R: SeekRead> ImagingReaderType<R> {
    pub fn builder() -> ImagingReaderBuilder {
        ImagingReaderBuilder::default()
    }

    /// Create a reader from a type that supports [`io::Read`] and [`io::Seek`]
    /// with the default options
    pub fn open_read_seek(source: R) -> io::Result<Self> {
        ImagingReaderBuilder::default().from_read_seek(source)
    }

    /// The file format being read
    pub fn as_format(&self) -> ImagingFormat {
        match self {
            Self::MCD(_) => ImagingFormat::MCD,
            Self::Txt(_) => ImagingFormat::Txt,
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            Self::MCD(reader) => reader.source_name(),
            Self::Txt(reader) => reader.source_name(),
        }
    }

    pub fn set_fill_missing(&mut self, value: Option<f32>) {
        match self {
            Self::MCD(reader) => reader.set_fill_missing(value),
            Self::Txt(reader) => reader.set_fill_missing(value),
        }
    }
}

impl ImagingReaderType<fs::File> {
    /// Open the file at `path`, inferring its format, with the default options
    pub fn open_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        ImagingReaderBuilder::default().from_path(path)
    }
}

impl<R: SeekRead> RasterSource for ImagingReaderType<R> {
    type Error = io::Error;

    fn len(&self) -> usize {
        match self {
            Self::MCD(reader) => reader.len(),
            Self::Txt(reader) => reader.len(),
        }
    }

    fn get_by_id(&mut self, id: &str) -> io::Result<Raster> {
        match self {
            Self::MCD(reader) => Ok(reader.get_by_id(id)?),
            Self::Txt(reader) => Ok(reader.get_by_id(id)?),
        }
    }

    fn get_by_index(&mut self, index: usize) -> io::Result<Raster> {
        match self {
            Self::MCD(reader) => Ok(reader.get_by_index(index)?),
            Self::Txt(reader) => Ok(reader.get_by_index(index)?),
        }
    }

    fn get_index(&self) -> &RangeIndex {
        match self {
            Self::MCD(reader) => reader.get_index(),
            Self::Txt(reader) => reader.get_index(),
        }
    }
}

impl ImagingFileReader for ImagingReaderType<fs::File> {
    fn open_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        ImagingReader::open_path(path)
    }
}

/// An iterator over every image of an [`ImagingReaderType`], in the order the
/// source stores them
pub enum ImagingIter<R: SeekRead> {
    MCD(IntoAcquisitionIter<R>),
    Txt(TxtReaderType<R>),
}

impl<R: SeekRead> Iterator for ImagingIter<R> {
    type Item = io::Result<Raster>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::MCD(iter) => iter.next().map(|r| r.map_err(io::Error::from)),
            Self::Txt(reader) => reader.next().map(|r| r.map_err(io::Error::from)),
        }
    }
}

impl<R: SeekRead> IntoIterator for ImagingReaderType<R> {
    type Item = io::Result<Raster>;
    type IntoIter = ImagingIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Self::MCD(reader) => ImagingIter::MCD(reader.into_iter()),
            Self::Txt(reader) => ImagingIter::Txt(reader),
        }
    }
}
