//! Writing [`Raster`] images out as TIFF files.
//!
//! Pages are single-sample `f32` images. [`OmeTiffEmitter`] stacks every
//! channel into one multi-page OME-TIFF with the OME-XML description in the
//! first page, [`ChannelTiffEmitter`] writes one plain TIFF per channel.
use std::fs;
use std::io::{self, Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tiff::encoder::compression::{Compression, Deflate, DeflateLevel, Uncompressed};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::TiffError;

use crate::io::ome::{image_stem, ome_xml_description, summary_path, write_summary, OmeError};
use crate::raster::Raster;

/// The deflate level used when none is given, matching the vendor converter
pub const DEFAULT_COMPRESSION: u8 = 6;

/// Something that writes a [`Raster`] out to a path
pub trait ImageEmitter {
    fn emit(&mut self, raster: &Raster, path: &Path) -> io::Result<()>;

    /// Every file written so far
    fn written(&self) -> &[PathBuf];
}

fn write_page_with<W: Write + Seek, D: Compression>(
    encoder: &mut TiffEncoder<W>,
    page: &[f32],
    width: u32,
    height: u32,
    description: Option<&str>,
    compression: D,
) -> Result<(), TiffError> {
    let mut image =
        encoder.new_image_with_compression::<colortype::Gray32Float, D>(width, height, compression)?;
    if let Some(description) = description {
        image.encoder().write_tag(Tag::ImageDescription, description)?;
    }
    image.write_data(page)
}

fn write_page<W: Write + Seek>(
    encoder: &mut TiffEncoder<W>,
    page: &[f32],
    width: u32,
    height: u32,
    description: Option<&str>,
    compression: u8,
) -> Result<(), TiffError> {
    match compression {
        0 => write_page_with(encoder, page, width, height, description, Uncompressed),
        1..=3 => write_page_with(
            encoder,
            page,
            width,
            height,
            description,
            Deflate::with_level(DeflateLevel::Fast),
        ),
        4..=6 => write_page_with(
            encoder,
            page,
            width,
            height,
            description,
            Deflate::with_level(DeflateLevel::Balanced),
        ),
        _ => write_page_with(
            encoder,
            page,
            width,
            height,
            description,
            Deflate::with_level(DeflateLevel::Best),
        ),
    }
}

/// TIFF ASCII fields cannot hold anything else, so escape the rest as XML
/// character references.
fn ascii_description(description: &str) -> String {
    let mut out = String::with_capacity(description.len());
    for c in description.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            out.push_str(&format!("&#x{:X};", c as u32));
        }
    }
    out
}

/**
Encode `pages` of `width` x `height` row-major `f32` values into an in-memory
TIFF file.

`description` goes into the `ImageDescription` tag of the first page.
`compression` is a deflate level from 0, which leaves pages uncompressed, to 9.
*/
pub fn encode_tiff<'a, I>(
    pages: I,
    width: usize,
    height: usize,
    description: Option<&str>,
    compression: u8,
) -> Result<Vec<u8>, OmeError>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let too_large = || OmeError::ImageTooLarge { width, height };
    let w = u32::try_from(width).map_err(|_| too_large())?;
    let h = u32::try_from(height).map_err(|_| too_large())?;
    let description = description.map(ascii_description);

    let mut buffer = Cursor::new(Vec::new());
    let mut encoder = TiffEncoder::new(&mut buffer)?;
    for (i, page) in pages.into_iter().enumerate() {
        let description = if i == 0 { description.as_deref() } else { None };
        write_page(&mut encoder, page, w, h, description, compression)?;
    }
    drop(encoder);
    Ok(buffer.into_inner())
}

/// Encode every channel of `raster` as one page of an OME-TIFF named `name`
pub fn encode_ome_tiff(raster: &Raster, name: &str, compression: u8) -> Result<Vec<u8>, OmeError> {
    let (height, width, channels) = raster.shape();
    if channels == 0 || width == 0 || height == 0 {
        return Err(OmeError::NoChannels(name.to_string()));
    }
    let description = ome_xml_description(raster, name)?;
    let values = raster.to_channel_major();
    encode_tiff(
        values.chunks_exact(width * height),
        width,
        height,
        Some(&description),
        compression,
    )
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/**
An [`ImageEmitter`] that writes a multi-page float32 OME-TIFF, one page per
channel, and optionally the channel summary as `{stem}_summary.txt` next to it.

The image inside the OME-XML description is named after the file stem.
*/
#[derive(Debug, Clone)]
pub struct OmeTiffEmitter {
    pub compression: u8,
    pub summary: bool,
    written: Vec<PathBuf>,
}

impl Default for OmeTiffEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION, false)
    }
}

impl OmeTiffEmitter {
    pub fn new(compression: u8, summary: bool) -> Self {
        Self {
            compression,
            summary,
            written: Vec::new(),
        }
    }
}

impl ImageEmitter for OmeTiffEmitter {
    fn emit(&mut self, raster: &Raster, path: &Path) -> io::Result<()> {
        create_parent(path)?;
        let stem = image_stem(path);
        let bytes = encode_ome_tiff(raster, &stem, self.compression)?;
        fs::write(path, bytes)?;
        debug!("Wrote {} pages to {}", raster.channels.len(), path.display());
        self.written.push(path.to_path_buf());

        if self.summary {
            let target = summary_path(path);
            let mut buffer = Vec::new();
            write_summary(raster, &mut buffer)?;
            fs::write(&target, buffer)?;
            debug!("Wrote channel summary to {}", target.display());
            self.written.push(target);
        }
        Ok(())
    }

    fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

/// The file name a channel is written to, with path separators replaced
pub fn channel_file_name(label: &str) -> String {
    let safe: String = label
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    format!("{safe}.tiff")
}

/**
An [`ImageEmitter`] that treats its path as a directory and writes each channel
into it as a single-page TIFF named after the channel, e.g. `Ir(191)_DNA1.tiff`.
*/
#[derive(Debug, Clone)]
pub struct ChannelTiffEmitter {
    pub compression: u8,
    written: Vec<PathBuf>,
}

impl Default for ChannelTiffEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION)
    }
}

impl ChannelTiffEmitter {
    pub fn new(compression: u8) -> Self {
        Self {
            compression,
            written: Vec::new(),
        }
    }
}

impl ImageEmitter for ChannelTiffEmitter {
    fn emit(&mut self, raster: &Raster, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)?;
        let (height, width, _) = raster.shape();
        for (label, plane) in raster.planes() {
            let values: Vec<f32> = plane.iter().copied().collect();
            let bytes = encode_tiff([values.as_slice()], width, height, None, self.compression)?;
            let target = path.join(channel_file_name(label));
            fs::write(&target, bytes)?;
            self.written.push(target);
        }
        debug!(
            "Wrote {} channel images to {}",
            raster.channels.len(),
            path.display()
        );
        Ok(())
    }

    fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

#[cfg(test)]
mod test {
    use ndarray::Array3;
    use tiff::decoder::{Decoder, DecodingResult};

    use super::*;

    fn two_channel() -> Raster {
        // 2 rows, 3 columns, value = 100*c + 10*y + x
        let mut data = Array3::from_shape_fn((2, 3, 2), |(y, x, c)| (100 * c + 10 * y + x) as f32);
        data[[1, 1, 1]] = f32::NAN;
        Raster::new(data, vec!["Ir(191)_DNA1".into(), "Xe(131)".into()])
    }

    fn read_pages(bytes: Vec<u8>) -> (Vec<Vec<f32>>, String, (u32, u32)) {
        let mut decoder = Decoder::new(Cursor::new(bytes)).unwrap();
        let dimensions = decoder.dimensions().unwrap();
        let description = decoder
            .get_tag_ascii_string(Tag::ImageDescription)
            .unwrap_or_default();
        let mut pages = Vec::new();
        loop {
            match decoder.read_image().unwrap() {
                DecodingResult::F32(values) => pages.push(values),
                _ => panic!("Expected float32 pages"),
            }
            if !decoder.more_images() {
                break;
            }
            decoder.next_image().unwrap();
        }
        (pages, description, dimensions)
    }

    #[test]
    fn test_encode_ome_tiff() {
        let raster = two_channel();
        for compression in [0, 6, 9] {
            let bytes = encode_ome_tiff(&raster, "slide_1", compression).unwrap();
            let (pages, description, dimensions) = read_pages(bytes);
            assert_eq!(dimensions, (3, 2));
            assert_eq!(pages.len(), 2);
            assert_eq!(pages[0], vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
            assert_eq!(pages[1][0], 100.0);
            assert!(pages[1][4].is_nan());
            assert_eq!(pages[1][5], 112.0);
            assert!(description.contains("<Image ID=\"Image:0\" Name=\"slide_1\">"));
            assert!(description.contains("SizeC=\"2\""));
        }
    }

    #[test]
    fn test_description_is_ascii() {
        assert_eq!(ascii_description("CD45_µ"), "CD45_&#xB5;");
        let raster = Raster::new(Array3::zeros((1, 1, 1)), vec!["Sm(152)_CD45µ".into()]);
        let (_, description, _) = read_pages(encode_ome_tiff(&raster, "x", 0).unwrap());
        assert!(description.contains("Name=\"Sm(152)_CD45&#xB5;\""));
    }

    #[test]
    fn test_empty_image() {
        let raster = Raster::new(Array3::zeros((2, 2, 0)), Vec::new());
        assert!(matches!(
            encode_ome_tiff(&raster, "empty", 6),
            Err(OmeError::NoChannels(_))
        ));
    }

    #[test_log::test]
    fn test_ome_tiff_emitter() -> io::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let target = tmpdir.path().join("nested").join("ROI1_tonsil.ome.tiff");
        let mut emitter = OmeTiffEmitter::new(6, true);
        emitter.emit(&two_channel(), &target)?;
        assert_eq!(emitter.written().len(), 2);

        let (pages, description, _) = read_pages(fs::read(&target)?);
        assert_eq!(pages.len(), 2);
        assert!(description.contains("Name=\"ROI1_tonsil\""));
        let summary = fs::read_to_string(tmpdir.path().join("nested/ROI1_tonsil_summary.txt"))?;
        assert_eq!(summary.lines().count(), 3);

        let mut emitter = OmeTiffEmitter::default();
        emitter.emit(&two_channel(), &tmpdir.path().join("other.ome.tiff"))?;
        assert_eq!(emitter.written().len(), 1);
        assert!(!tmpdir.path().join("other_summary.txt").exists());
        Ok(())
    }

    #[test_log::test]
    fn test_channel_tiff_emitter() -> io::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let target = tmpdir.path().join("ROI1_tonsil");
        let mut emitter = ChannelTiffEmitter::new(0);
        emitter.emit(&two_channel(), &target)?;
        assert_eq!(
            emitter.written(),
            &[target.join("Ir(191)_DNA1.tiff"), target.join("Xe(131).tiff")]
        );

        let (pages, description, dimensions) = read_pages(fs::read(target.join("Xe(131).tiff"))?);
        assert_eq!(dimensions, (3, 2));
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0][2], 102.0);
        assert!(description.is_empty());

        assert_eq!(channel_file_name("a/b"), "a_b.tiff");
        Ok(())
    }
}
