use std::{
    fmt::Display,
    fs,
    io::{self, prelude::*, BufReader},
    path,
};

use crate::io::encoding::TextEncoding;
use crate::io::mcd::is_mcd;
use crate::io::txt::is_txt;

/// How far from the end of a stream to look for an MCD metadata footer
const TAIL_PROBE_SIZE: u64 = 8 << 20;

/// Imaging mass cytometry file formats that [`imcconv`](crate) supports
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImagingFormat {
    MCD,
    Txt,
    Unknown,
}

impl Display for ImagingFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Given a path, infer the file format from its extension
pub fn infer_from_path<P: Into<path::PathBuf>>(path: P) -> ImagingFormat {
    let path: path::PathBuf = path.into();
    if path.is_dir() {
        return ImagingFormat::Unknown;
    }
    if let Some(ext) = path.extension() {
        if let Some(ext) = ext.to_ascii_lowercase().to_str() {
            return match ext {
                "mcd" => ImagingFormat::MCD,
                "txt" => ImagingFormat::Txt,
                _ => ImagingFormat::Unknown,
            };
        }
    }
    ImagingFormat::Unknown
}

/// Given a stream of bytes, infer the file format by sniffing its head and tail.
/// The stream is returned to its starting position.
pub fn infer_from_stream<R: Read + Seek>(stream: &mut R) -> io::Result<ImagingFormat> {
    let current_pos = stream.stream_position()?;
    let mut buf = vec![0u8; 500];
    let bytes_read = stream.read(buf.as_mut_slice())?;
    buf.truncate(bytes_read);

    let format = if is_txt(&buf) {
        ImagingFormat::Txt
    } else {
        let end = stream.seek(io::SeekFrom::End(0))?;
        let start = end.saturating_sub(TAIL_PROBE_SIZE).max(current_pos);
        stream.seek(io::SeekFrom::Start(start))?;
        let mut tail = Vec::with_capacity((end - start) as usize);
        (&mut *stream).take(end - start).read_to_end(&mut tail)?;
        if is_mcd(&tail, TextEncoding::Utf16Le) {
            ImagingFormat::MCD
        } else {
            ImagingFormat::Unknown
        }
    };
    stream.seek(io::SeekFrom::Start(current_pos))?;
    Ok(format)
}

/// Given a path, infer the file format using both the file name and by trying
/// to open and read the file's contents
pub fn infer_format<P: Into<path::PathBuf>>(path: P) -> io::Result<ImagingFormat> {
    let path: path::PathBuf = path.into();

    match infer_from_path(&path) {
        ImagingFormat::Unknown => {
            let handle = fs::File::open(path)?;
            let mut stream = BufReader::new(handle);
            infer_from_stream(&mut stream)
        }
        format => Ok(format),
    }
}
