//! Metadata describing the acquisitions held in an imaging mass cytometry file.
pub mod acquisition;
pub mod tree;

pub use crate::meta::acquisition::{
    AcquisitionEntry, AcquisitionRecord, ChannelRecord, ValueEncoding, COORDINATE_CHANNELS,
};
pub use crate::meta::tree::{parse_document, XmlTreeError, XmlValue};
