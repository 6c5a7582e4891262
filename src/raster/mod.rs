//! The in-memory image model and the long-form to grid reshaping that builds it.
mod raster;
pub mod records;
pub mod reshape;

pub use raster::Raster;
pub use records::{RecordStream, COORDINATE_FIELDS};
pub use reshape::{check_completeness, reshape, Completeness, ReshapeError};
