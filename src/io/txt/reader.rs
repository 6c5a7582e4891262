use std::{
    fs,
    io::{self, BufRead, BufReader, Seek},
    path::Path,
    sync::OnceLock,
};

use log::{debug, warn};
use regex::Regex;
use thiserror::Error;

use crate::{
    io::{
        offset_index::RangeIndex,
        traits::{ImagingFileReader, RasterSource, SeekRead},
    },
    raster::{reshape, Raster, RecordStream, ReshapeError},
};

use super::LEADING_COLUMNS;

/// The number of leading push-timing columns that carry no image data
const TIMING_COLUMNS: usize = 3;

#[derive(Debug, Error)]
pub enum TxtError {
    #[error("'{path}' is not valid IMC text data (expected the first 6 columns to be {LEADING_COLUMNS:?}, found {found:?})")]
    InvalidColumns { path: String, found: Vec<String> },
    #[error("'{path}' has a channel column {header:?} that is not of the form label(MetalMassDi)")]
    InvalidChannelHeader { path: String, header: String },
    #[error("'{path}' line {line} has {found} cells but the header has {expected}")]
    RowWidth {
        path: String,
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("'{path}' could not be reshaped: {source}")]
    Reshape {
        path: String,
        #[source]
        source: ReshapeError,
    },
    #[error("No image with ID {0:?}")]
    ImageNotFound(String),
    #[error("An IO error occurred while reading a text export: {0}")]
    IOError(#[from] io::Error),
}

impl From<TxtError> for io::Error {
    fn from(value: TxtError) -> Self {
        match value {
            TxtError::IOError(e) => e,
            TxtError::ImageNotFound(_) => io::Error::new(io::ErrorKind::NotFound, value),
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

fn channel_header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(.+)\(([a-zA-Z]+)(\d+)Di\)").unwrap())
}

/// Turn a text export channel header like `80ArAr(ArAr80Di)` into the
/// `Metal(Mass)_label` form, `ArAr(80)_80ArAr`.
pub fn parse_channel_header(header: &str) -> Option<String> {
    let caps = channel_header_pattern().captures(header)?;
    let label = caps.get(1)?.as_str();
    let metal = caps.get(2)?.as_str();
    let mass = caps.get(3)?.as_str();
    Some(format!("{metal}({mass})_{label}"))
}

fn parse_cell(cell: &str) -> f32 {
    let cell = cell.trim();
    if cell.is_empty() {
        return f32::NAN;
    }
    cell.parse::<f32>().unwrap_or(f32::NAN)
}

/**
A reader for the tab-separated text export of a single acquisition.

The first six columns must be `Start_push`, `End_push`, `Pushes_duration`, `X`,
`Y` and `Z`. The three timing columns are dropped and every column after `Z` is
a channel. Empty and non-numeric cells are read as NaN.

A text export holds exactly one image, so iterating over the reader yields at
most one [`Raster`]. Random access re-reads the file from the start.
*/
pub struct TxtReaderType<R: SeekRead> {
    handle: BufReader<R>,
    fill_missing: Option<f32>,
    source_name: String,
    name: String,
    index: RangeIndex,
    exhausted: bool,
}

/// A [`TxtReaderType`] over a file on disk
pub type TxtReader = TxtReaderType<fs::File>;

const BUFFER_SIZE: usize = 8192;

impl<R: SeekRead> TxtReaderType<R> {
    pub fn new(source: R) -> Self {
        Self::with_name(source, "<stream>".into(), String::new())
    }

    pub fn with_name(source: R, source_name: String, name: String) -> Self {
        let mut index = RangeIndex::new("image".into());
        index.insert(name.as_str(), 0..0);
        Self {
            handle: BufReader::with_capacity(BUFFER_SIZE, source),
            fill_missing: None,
            source_name,
            name,
            index,
            exhausted: false,
        }
    }

    /// Pad missing pixels with `value` instead of failing
    pub fn fill_missing(mut self, value: Option<f32>) -> Self {
        self.fill_missing = value;
        self
    }

    pub fn set_fill_missing(&mut self, value: Option<f32>) {
        self.fill_missing = value;
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    fn read_header(&mut self) -> Result<Vec<String>, TxtError> {
        let mut line = String::new();
        self.handle.read_line(&mut line)?;
        let columns: Vec<String> = line
            .trim_end_matches(['\r', '\n'])
            .split('\t')
            .map(|s| s.trim().to_string())
            .collect();
        if columns.len() < LEADING_COLUMNS.len()
            || columns
                .iter()
                .zip(LEADING_COLUMNS.iter())
                .any(|(found, expected)| found != expected)
        {
            return Err(TxtError::InvalidColumns {
                path: self.source_name.clone(),
                found: columns.into_iter().take(LEADING_COLUMNS.len()).collect(),
            });
        }
        Ok(columns)
    }

    /// Read the channel names and long-form records without reshaping them
    pub fn read_records(&mut self) -> Result<(Vec<String>, RecordStream), TxtError> {
        self.handle.rewind()?;
        let columns = self.read_header()?;
        let channels = columns[LEADING_COLUMNS.len()..]
            .iter()
            .map(|header| {
                parse_channel_header(header).ok_or_else(|| TxtError::InvalidChannelHeader {
                    path: self.source_name.clone(),
                    header: header.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let record_width = columns.len() - TIMING_COLUMNS;
        let mut values: Vec<f32> = Vec::new();
        let mut line = String::new();
        let mut line_number = 1;
        loop {
            line.clear();
            line_number += 1;
            if self.handle.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = trimmed.split('\t').collect();
            if cells.len() > columns.len() {
                return Err(TxtError::RowWidth {
                    path: self.source_name.clone(),
                    line: line_number,
                    expected: columns.len(),
                    found: cells.len(),
                });
            }
            let start = values.len();
            values.extend(cells.iter().skip(TIMING_COLUMNS).map(|c| parse_cell(c)));
            // Short rows are missing their trailing cells
            values.resize(start + record_width, f32::NAN);
        }

        let records = RecordStream::new(values, record_width).map_err(|source| TxtError::Reshape {
            path: self.source_name.clone(),
            source,
        })?;
        debug!(
            "Read {} records with {} channels from {}",
            records.len(),
            channels.len(),
            self.source_name
        );
        Ok((channels, records))
    }

    /// Read and reshape the image
    pub fn read_raster(&mut self) -> Result<Raster, TxtError> {
        let (channels, mut records) = self.read_records()?;
        if let Some(fill) = self.fill_missing {
            let filled = records.fill_nan_channels(fill);
            if filled > 0 {
                warn!("Filled {filled} empty channel cells in {} with {fill}", self.source_name);
            }
        }
        let raster = reshape(&records, channels, self.fill_missing).map_err(|source| {
            TxtError::Reshape {
                path: self.source_name.clone(),
                source,
            }
        })?;
        Ok(raster.with_name(self.name.clone()))
    }

    /// Read the image, once. Subsequent calls return `None` until [`TxtReaderType::reset`]
    pub fn read_next(&mut self) -> Option<Result<Raster, TxtError>> {
        if self.exhausted {
            return None;
        }
        self.exhausted = true;
        Some(self.read_raster())
    }

    pub fn reset(&mut self) {
        self.exhausted = false;
    }
}

impl TxtReaderType<fs::File> {
    /// Open the text export at `path`. The image is named after the file stem.
    pub fn open_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let handle = fs::File::open(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::with_name(handle, path.display().to_string(), name))
    }
}

impl<R: SeekRead> Iterator for TxtReaderType<R> {
    type Item = Result<Raster, TxtError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next()
    }
}

impl<R: SeekRead> RasterSource for TxtReaderType<R> {
    type Error = TxtError;

    fn get_by_id(&mut self, id: &str) -> Result<Raster, TxtError> {
        if id != self.name {
            return Err(TxtError::ImageNotFound(id.to_string()));
        }
        self.read_raster()
    }

    fn get_by_index(&mut self, index: usize) -> Result<Raster, TxtError> {
        if index != 0 {
            return Err(TxtError::ImageNotFound(format!("#{index}")));
        }
        self.read_raster()
    }

    fn get_index(&self) -> &RangeIndex {
        &self.index
    }
}

impl ImagingFileReader for TxtReaderType<fs::File> {
    fn open_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        TxtReader::open_path(path)
    }
}

/// Read the text export at `path` into a [`Raster`]
pub fn read_txt<P: AsRef<Path>>(path: P, fill_missing: Option<f32>) -> io::Result<Raster> {
    let mut reader = TxtReader::open_path(path)?.fill_missing(fill_missing);
    Ok(reader.read_raster()?)
}
