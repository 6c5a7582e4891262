//! A set of foundational traits used throughout the library.
pub use crate::io::traits::{ImagingFileReader, RasterSource, SeekRead};
pub use crate::io::emit::ImageEmitter;
pub use std::io::prelude::*;
