use std::io;
use std::path::Path;

use crate::raster::Raster;

use super::offset_index::RangeIndex;

/// A stream that can be both read and repositioned, the minimum an imaging
/// container needs to be read lazily.
pub trait SeekRead: io::Read + io::Seek {}
impl<T: io::Read + io::Seek> SeekRead for T {}

/**
A common interface for sources of [`Raster`] images, addressable by ID or by
position.

Implementors keep their images in the order the source file lists them. Each
access decodes the image anew, nothing is cached.
*/
pub trait RasterSource {
    type Error: std::error::Error + Into<io::Error>;

    /// The number of images in the source
    fn len(&self) -> usize {
        self.get_index().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve an image by its native ID
    fn get_by_id(&mut self, id: &str) -> Result<Raster, Self::Error>;

    /// Retrieve an image by its position in the source
    fn get_by_index(&mut self, index: usize) -> Result<Raster, Self::Error>;

    /// The ID to byte range index of the source
    fn get_index(&self) -> &RangeIndex;

    /// The native IDs of every image in order
    fn ids(&self) -> Vec<String> {
        self.get_index().keys().map(|k| k.to_string()).collect()
    }
}

/// A [`RasterSource`] that can be opened from a path on disk
pub trait ImagingFileReader: RasterSource + Sized {
    fn open_path<P: AsRef<Path>>(path: P) -> io::Result<Self>;
}
