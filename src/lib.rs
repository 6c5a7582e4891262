//! `imcconv` reads imaging mass cytometry data and turns it into dense,
//! channel-labeled images.
//!
//! The Fluidigm/Standard BioTools `.mcd` container stores each acquisition as
//! a long list of `[x, y, z, channel_1, .., channel_n]` float records described
//! by an XML footer at the end of the file. [`McdReader`] finds that footer,
//! catalogs the acquisitions and their channels, and reshapes each one into a
//! [`Raster`] of shape `(height, width, channels)` when it is asked for.
//!
//! ```no_run
//! use imcconv::prelude::*;
//! use imcconv::io::McdReader;
//!
//! # fn main() -> std::io::Result<()> {
//! let reader = McdReader::open_path("slide.mcd")?;
//! for raster in reader {
//!     let raster = raster?;
//!     println!("{} {:?} {:?}", raster.name, raster.shape(), raster.channels);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Missing pixels are an error unless a fill value is given, see
//! [`McdReaderBuilder::fill_missing`].
pub mod io;
pub mod meta;
pub mod prelude;
pub mod raster;

pub use crate::io::{ImagingReader, McdReader, McdReaderBuilder, TxtReader};
pub use crate::raster::Raster;
