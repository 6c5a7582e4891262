//! Reading imaging mass cytometry data file formats and abstractions over them.
//!
//! The vendor's `.mcd` container holds every acquisition of a run, while its
//! `.txt` export holds a single acquisition. Both are read into [`Raster`](crate::raster::Raster)s
//! through the [`RasterSource`] trait, and [`ImagingReader`] picks the right
//! reader for a file. The [`emit`] module writes rasters back out as TIFF files.

pub mod emit;
pub mod encoding;
mod infer_format;
pub mod mcd;
mod offset_index;
pub mod ome;
pub(crate) mod traits;
pub mod txt;

pub use crate::io::encoding::{TextEncoding, UnknownEncodingError};

pub use crate::io::infer_format::{
    infer_format, infer_from_path, infer_from_stream, ImagingFormat, ImagingIter, ImagingReader,
    ImagingReaderBuilder, ImagingReaderType,
};

pub use crate::io::mcd::{
    read_mcd, AcquisitionCatalog, McdError, McdReader, McdReaderBuilder, McdReaderType,
};

pub use crate::io::txt::{read_txt, TxtError, TxtReader, TxtReaderType};

pub use crate::io::ome::{ome_xml_description, write_summary, OmeError};

pub use crate::io::emit::{
    encode_ome_tiff, encode_tiff, ChannelTiffEmitter, ImageEmitter, OmeTiffEmitter,
    DEFAULT_COMPRESSION,
};

pub use crate::io::offset_index::RangeIndex;
pub use crate::io::traits::{ImagingFileReader, RasterSource, SeekRead};
