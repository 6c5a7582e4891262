//! Reading Fluidigm/Standard BioTools `.mcd` imaging mass cytometry containers.
//!
//! An MCD file is a run of raw acquisition data segments followed by an XML
//! document, the `<MCDPublic>` footer, which says where each acquisition's
//! bytes live and which channels they hold. Each segment is a dense sequence of
//! little endian `f32` records laid out as `[x, y, z, channel_1, .., channel_n]`.
//!
//! [`McdReader`] locates and parses the footer when it is opened, then reads
//! and reshapes one acquisition at a time into a [`Raster`](crate::raster::Raster).
pub mod catalog;
pub mod decode;
pub mod footer;
mod reader;

pub use catalog::AcquisitionCatalog;
pub use reader::{
    is_mcd, read_mcd, AcquisitionIter, IntoAcquisitionIter, McdError, McdReader,
    McdReaderBuilder, McdReaderType, ReadOptions,
};
