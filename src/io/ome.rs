//! Describing and summarizing [`Raster`] images for export.
//!
//! This module renders the OME-XML image description that belongs in the
//! first page of an OME-TIFF, and the tab-separated channel summary the vendor
//! viewer writes next to its exports. The pages themselves are written by the
//! emitters in [`crate::io::emit`].
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Error as XMLError;
use quick_xml::Writer;
use thiserror::Error;
use tiff::TiffError;

use crate::raster::Raster;

const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

macro_rules! bstart {
    ($e:tt) => {
        BytesStart::from_content($e, $e.len())
    };
}

macro_rules! attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        let value: &str = $value.as_ref();
        $elt.push_attribute(($name, value));
    };
}

#[derive(Debug, Error)]
pub enum OmeError {
    #[error("An XML error occurred while writing OME-XML: {0}")]
    XMLError(#[from] XMLError),
    #[error("Failed to encode a TIFF page: {0}")]
    TiffError(#[from] TiffError),
    #[error("A {width}x{height} image cannot be stored in a TIFF page")]
    ImageTooLarge { width: usize, height: usize },
    #[error("Image {0:?} has no channels to write")]
    NoChannels(String),
    #[error("An IO error occurred while writing an image: {0}")]
    IOError(#[from] io::Error),
}

impl From<OmeError> for io::Error {
    fn from(value: OmeError) -> Self {
        match value {
            OmeError::IOError(e) => e,
            OmeError::TiffError(TiffError::IoError(e)) => e,
            OmeError::XMLError(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            _ => io::Error::new(io::ErrorKind::InvalidInput, value),
        }
    }
}

/// Render the OME-XML description of `raster` as a single image named `name`.
///
/// Pixels are declared as `float` in `XYZCT` order, one page per channel.
pub fn ome_xml_description(raster: &Raster, name: &str) -> Result<String, OmeError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut ome = bstart!("OME");
    attrib!("xmlns", OME_NAMESPACE, ome);
    attrib!("xmlns:xsi", XSI_NAMESPACE, ome);
    let schema_location = format!("{OME_NAMESPACE} {OME_NAMESPACE}/ome.xsd");
    attrib!("xsi:schemaLocation", schema_location, ome);
    writer.write_event(Event::Start(ome))?;

    let mut image = bstart!("Image");
    attrib!("ID", "Image:0", image);
    attrib!("Name", name, image);
    writer.write_event(Event::Start(image))?;

    let (height, width, channels) = raster.shape();
    let (size_c, size_x, size_y) = (channels.to_string(), width.to_string(), height.to_string());
    let mut pixels = bstart!("Pixels");
    attrib!("BigEndian", "false", pixels);
    attrib!("DimensionOrder", "XYZCT", pixels);
    attrib!("ID", "Pixels:0", pixels);
    attrib!("Interleaved", "false", pixels);
    attrib!("SizeC", size_c, pixels);
    attrib!("SizeT", "1", pixels);
    attrib!("SizeX", size_x, pixels);
    attrib!("SizeY", size_y, pixels);
    attrib!("SizeZ", "1", pixels);
    attrib!("PhysicalSizeX", "1.0", pixels);
    attrib!("PhysicalSizeY", "1.0", pixels);
    attrib!("Type", "float", pixels);
    writer.write_event(Event::Start(pixels))?;

    writer.write_event(Event::Empty(bstart!("TiffData")))?;
    for (i, label) in raster.channels.iter().enumerate() {
        let channel_id = format!("Channel:0:{i}");
        let mut channel = bstart!("Channel");
        attrib!("ID", channel_id, channel);
        attrib!("Name", label, channel);
        attrib!("SamplesPerPixel", "1", channel);
        writer.write_event(Event::Empty(channel))?;
    }

    writer.write_event(Event::End(BytesEnd::new("Pixels")))?;
    writer.write_event(Event::End(BytesEnd::new("Image")))?;
    writer.write_event(Event::End(BytesEnd::new("OME")))?;

    let buffer = writer.into_inner();
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Split a `Metal(Mass)_label` channel name at its first `_`. Names without a
/// label get an empty one.
pub fn split_channel_name(name: &str) -> (&str, &str) {
    name.split_once('_').unwrap_or((name, ""))
}

fn format_value(value: f32) -> String {
    format!("{value:?}")
}

/// Write the channel summary table of `raster` to `sink`.
///
/// One row per channel with its page, metal, label and the range of its
/// finite values. A channel with no values has empty bounds.
pub fn write_summary<W: Write>(raster: &Raster, mut sink: W) -> io::Result<()> {
    writeln!(sink, "Page\tChannel\tLabel\tMinValue\tMaxValue")?;
    for (page, name) in raster.channels.iter().enumerate() {
        let (channel, label) = split_channel_name(name);
        let (lo, hi) = match raster.channel_range(page) {
            Some((lo, hi)) => (format_value(lo), format_value(hi)),
            None => (String::new(), String::new()),
        };
        writeln!(sink, "{page}\t{channel}\t{label}\t{lo}\t{hi}")?;
    }
    Ok(())
}

/// The bare name of an image path with every extension removed,
/// `slide_1.ome.tiff` becomes `slide_1`.
pub fn image_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Where the summary table for the image at `image_path` goes
pub fn summary_path(image_path: &Path) -> PathBuf {
    image_path.with_file_name(format!("{}_summary.txt", image_stem(image_path)))
}
