use std::io;

use log::{debug, warn};
use ndarray::Array3;
use thiserror::Error;

use super::raster::Raster;
use super::records::{RecordStream, COORDINATE_FIELDS};

/// When padding, the grid may hold at most this many pixels per record present
pub const MAX_FILL_FACTOR: usize = 16;

/// The largest number of `f32` values a raster can address
const MAX_RASTER_VALUES: usize = isize::MAX as usize / std::mem::size_of::<f32>();

/// All the ways turning long-form records into a raster can fail
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReshapeError {
    #[error("Image data is missing values: expected {expected} pixels, found {found} records with {nan_count} NaN fields. Try specifying a fill value")]
    IncompleteData {
        expected: usize,
        found: usize,
        nan_count: usize,
    },
    #[error("Record width mismatch: expected {expected} fields per record, found {found}")]
    RecordWidth { expected: usize, found: usize },
    #[error("Record {index} has an invalid pixel coordinate ({x}, {y})")]
    InvalidCoordinate { index: usize, x: f32, y: f32 },
    #[error("Record {index} duplicates pixel coordinate ({x}, {y})")]
    DuplicateCoordinate { index: usize, x: usize, y: usize },
    #[error("There are no records with a pixel coordinate to reshape")]
    Empty,
    #[error("A {width}x{height} grid with {channels} channels is too large for the {found} records present")]
    GridTooLarge {
        width: usize,
        height: usize,
        channels: usize,
        found: usize,
    },
}

impl From<ReshapeError> for io::Error {
    fn from(value: ReshapeError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, value)
    }
}

/// The outcome of comparing a record stream against the grid its coordinates span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completeness {
    pub width: usize,
    pub height: usize,
    pub expected: usize,
    pub found: usize,
    pub nan_count: usize,
}

impl Completeness {
    /// Data is incomplete if the record count disagrees with the grid size or
    /// any field anywhere is NaN.
    pub fn is_incomplete(&self) -> bool {
        self.found != self.expected || self.nan_count > 0
    }

    pub fn missing(&self) -> usize {
        self.expected.saturating_sub(self.found)
    }
}

fn coordinate(value: f32, index: usize, x: f32, y: f32) -> Result<Option<usize>, ReshapeError> {
    if value.is_nan() {
        Ok(None)
    } else if value < 0.0 || value.fract() != 0.0 || !value.is_finite() || value > u32::MAX as f32 {
        Err(ReshapeError::InvalidCoordinate { index, x, y })
    } else {
        Ok(Some(value as usize))
    }
}

/// Derive the grid size from the largest `x` and `y` coordinates and compare it
/// against the records present.
pub fn check_completeness(records: &RecordStream) -> Result<Completeness, ReshapeError> {
    let mut max_x: Option<usize> = None;
    let mut max_y: Option<usize> = None;
    for (index, row) in records.rows().enumerate() {
        let (x, y) = (row[0], row[1]);
        if let Some(cx) = coordinate(x, index, x, y)? {
            max_x = Some(max_x.map_or(cx, |m| m.max(cx)));
        }
        if let Some(cy) = coordinate(y, index, x, y)? {
            max_y = Some(max_y.map_or(cy, |m| m.max(cy)));
        }
    }
    let (width, height) = match (max_x, max_y) {
        (Some(mx), Some(my)) => (mx + 1, my + 1),
        _ => return Err(ReshapeError::Empty),
    };
    let expected = width.checked_mul(height).ok_or(ReshapeError::GridTooLarge {
        width,
        height,
        channels: records.channel_count(),
        found: records.len(),
    })?;
    Ok(Completeness {
        width,
        height,
        expected,
        found: records.len(),
        nan_count: records.nan_count(),
    })
}

/**
Reshape long-form `(x, y, z, c_1..c_N)` records into a `(y, x, channel)` raster.

Each record lands at row `y`, column `x`, so the order of `records` has no
effect on the result. When the data are incomplete (see
[`Completeness::is_incomplete`]) this fails with
[`ReshapeError::IncompleteData`] unless `fill_missing` is given, in which case
pixels with no record take the fill value on every channel. NaN values inside
records that are present are copied through unchanged.

Padding is refused with [`ReshapeError::GridTooLarge`] when the grid would
hold more than [`MAX_FILL_FACTOR`] pixels per record, which is what a single
corrupt coordinate far off the grid looks like.
*/
pub fn reshape(
    records: &RecordStream,
    channels: Vec<String>,
    fill_missing: Option<f32>,
) -> Result<Raster, ReshapeError> {
    if records.channel_count() != channels.len() {
        return Err(ReshapeError::RecordWidth {
            expected: channels.len() + COORDINATE_FIELDS,
            found: records.record_width(),
        });
    }
    if records.is_empty() {
        return Err(ReshapeError::Empty);
    }
    let completeness = check_completeness(records)?;
    let Completeness { width, height, .. } = completeness;

    let n_channels = channels.len();
    let too_large = || ReshapeError::GridTooLarge {
        width,
        height,
        channels: n_channels,
        found: completeness.found,
    };
    match completeness.expected.checked_mul(n_channels.max(1)) {
        Some(n) if n <= MAX_RASTER_VALUES => {}
        _ => return Err(too_large()),
    }

    let fill = if completeness.is_incomplete() {
        match fill_missing {
            Some(_) if completeness.expected > completeness.found.saturating_mul(MAX_FILL_FACTOR) => {
                return Err(too_large())
            }
            Some(fill) => {
                debug!(
                    "Padding {} missing pixels of a {width}x{height} grid with {fill} ({} NaN fields present)",
                    completeness.missing(),
                    completeness.nan_count,
                );
                fill
            }
            None => {
                return Err(ReshapeError::IncompleteData {
                    expected: completeness.expected,
                    found: completeness.found,
                    nan_count: completeness.nan_count,
                })
            }
        }
    } else {
        // Every cell is written below, this value is never observed
        f32::NAN
    };

    let mut data = Array3::from_elem((height, width, n_channels), fill);
    let mut covered = vec![false; completeness.expected];
    let mut dropped = 0usize;

    for (index, row) in records.rows().enumerate() {
        let (x, y) = match (row[0].is_nan(), row[1].is_nan()) {
            (false, false) => (row[0] as usize, row[1] as usize),
            _ => {
                dropped += 1;
                continue;
            }
        };
        let cell = y * width + x;
        if covered[cell] {
            return Err(ReshapeError::DuplicateCoordinate { index, x, y });
        }
        covered[cell] = true;
        for (k, value) in row[COORDINATE_FIELDS..].iter().enumerate() {
            data[[y, x, k]] = *value;
        }
    }

    if dropped > 0 {
        warn!("Dropped {dropped} records without a pixel coordinate");
    }

    Ok(Raster::new(data, channels))
}

#[cfg(test)]
mod test {
    use super::*;

    fn grid_rows(width: usize, height: usize, n_channels: usize) -> Vec<Vec<f32>> {
        let mut rows = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let mut row = vec![x as f32, y as f32, 0.0];
                for c in 0..n_channels {
                    row.push((c * 1000 + y * width + x) as f32 + 0.25);
                }
                rows.push(row);
            }
        }
        rows
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("C{i}")).collect()
    }

    #[test]
    fn test_reshape_orientation() {
        let rows = grid_rows(4, 3, 2);
        let stream = RecordStream::from_rows(&rows, 5).unwrap();
        let raster = reshape(&stream, names(2), None).unwrap();
        assert_eq!(raster.shape(), (3, 4, 2));
        // row = y, column = x
        assert_eq!(raster.get(2, 1, 0), Some((2 * 4 + 1) as f32 + 0.25));
        assert_eq!(raster.get(0, 3, 1), Some((1000 + 3) as f32 + 0.25));
        assert_eq!(raster.channels, names(2));
    }

    #[test]
    fn test_row_order_invariance() {
        let rows = grid_rows(5, 4, 3);
        let stream = RecordStream::from_rows(&rows, 6).unwrap();
        let expected = reshape(&stream, names(3), None).unwrap();

        let mut reversed = rows.clone();
        reversed.reverse();
        let stream = RecordStream::from_rows(&reversed, 6).unwrap();
        assert_eq!(reshape(&stream, names(3), None).unwrap(), expected);

        // A fixed stride permutation, coprime with the row count
        let n = rows.len();
        let permuted: Vec<_> = (0..n).map(|i| rows[(i * 7) % n].clone()).collect();
        let stream = RecordStream::from_rows(&permuted, 6).unwrap();
        assert_eq!(reshape(&stream, names(3), None).unwrap(), expected);
    }

    #[test]
    fn test_missing_rows_fail_closed() {
        let mut rows = grid_rows(3, 3, 1);
        rows.remove(4);
        let stream = RecordStream::from_rows(&rows, 4).unwrap();
        let err = reshape(&stream, names(1), None).unwrap_err();
        assert_eq!(
            err,
            ReshapeError::IncompleteData {
                expected: 9,
                found: 8,
                nan_count: 0
            }
        );
    }

    #[test]
    fn test_missing_rows_filled() {
        let mut rows = grid_rows(3, 3, 2);
        rows.remove(4);
        rows.remove(0);
        let stream = RecordStream::from_rows(&rows, 5).unwrap();
        let raster = reshape(&stream, names(2), Some(-1.0)).unwrap();
        assert_eq!(raster.shape(), (3, 3, 2));
        for c in 0..2 {
            assert_eq!(raster.get(1, 1, c), Some(-1.0));
            assert_eq!(raster.get(0, 0, c), Some(-1.0));
        }
        assert_eq!(raster.get(2, 2, 0), Some(8.25));
    }

    #[test]
    fn test_nan_values_fail_closed_and_pass_through_with_fill() {
        let mut rows = grid_rows(2, 2, 2);
        rows[3][4] = f32::NAN;
        let stream = RecordStream::from_rows(&rows, 5).unwrap();
        assert!(matches!(
            reshape(&stream, names(2), None),
            Err(ReshapeError::IncompleteData { expected: 4, found: 4, nan_count: 1 })
        ));

        // The fill value only pads absent pixels, NaNs in present records stay
        let raster = reshape(&stream, names(2), Some(0.0)).unwrap();
        assert!(raster.get(1, 1, 1).unwrap().is_nan());
        assert_eq!(raster.get(1, 1, 0), Some(3.25));
    }

    #[test]
    fn test_nan_coordinate_is_dropped_with_fill() {
        let mut rows = grid_rows(2, 2, 1);
        rows[1][0] = f32::NAN;
        let stream = RecordStream::from_rows(&rows, 4).unwrap();
        let raster = reshape(&stream, names(1), Some(-5.0)).unwrap();
        assert_eq!(raster.shape(), (2, 2, 1));
        assert_eq!(raster.get(0, 1, 0), Some(-5.0));
        assert_eq!(raster.get(0, 0, 0), Some(0.25));
    }

    #[test]
    fn test_duplicates_and_bad_coordinates() {
        let mut rows = grid_rows(2, 2, 1);
        rows.push(rows[0].clone());
        let stream = RecordStream::from_rows(&rows, 4).unwrap();
        assert!(matches!(
            reshape(&stream, names(1), Some(0.0)),
            Err(ReshapeError::DuplicateCoordinate { x: 0, y: 0, .. })
        ));

        let mut rows = grid_rows(2, 2, 1);
        rows[2][0] = 0.5;
        let stream = RecordStream::from_rows(&rows, 4).unwrap();
        assert!(matches!(
            reshape(&stream, names(1), None),
            Err(ReshapeError::InvalidCoordinate { index: 2, .. })
        ));

        let mut rows = grid_rows(2, 2, 1);
        rows[1][1] = -1.0;
        let stream = RecordStream::from_rows(&rows, 4).unwrap();
        assert!(reshape(&stream, names(1), None).is_err());
    }

    #[test_log::test]
    fn test_stray_coordinate_does_not_blow_up_the_grid() {
        let rows = [[0.0, 0.0, 0.0, 1.0], [4e9, 4e9, 0.0, 2.0]];
        let stream = RecordStream::from_rows(&rows, 4).unwrap();
        let err = reshape(&stream, names(1), Some(0.0)).unwrap_err();
        assert!(matches!(err, ReshapeError::GridTooLarge { found: 2, channels: 1, .. }));
        assert!(matches!(
            reshape(&stream, names(1), None),
            Err(ReshapeError::GridTooLarge { .. })
        ));

        // Addressable, but far more pixels than the records could pad sensibly
        let mut rows = grid_rows(2, 2, 1);
        rows.push(vec![5000.0, 5000.0, 0.0, 1.0]);
        let stream = RecordStream::from_rows(&rows, 4).unwrap();
        match reshape(&stream, names(1), Some(0.0)) {
            Err(ReshapeError::GridTooLarge { width, height, found, .. }) => {
                assert_eq!((width, height, found), (5001, 5001, 5));
            }
            other => panic!("Expected a grid size error, got {other:?}"),
        }
        assert!(matches!(
            reshape(&stream, names(1), None),
            Err(ReshapeError::IncompleteData { found: 5, .. })
        ));

        // A sparse but plausible grid still pads
        let rows = [[0.0, 0.0, 0.0, 1.0], [3.0, 3.0, 0.0, 2.0]];
        let stream = RecordStream::from_rows(&rows, 4).unwrap();
        let raster = reshape(&stream, names(1), Some(0.0)).unwrap();
        assert_eq!(raster.shape(), (4, 4, 1));
        assert_eq!(raster.get(3, 3, 0), Some(2.0));
        assert_eq!(raster.get(1, 2, 0), Some(0.0));
    }

    #[test]
    fn test_channel_count_mismatch_and_empty() {
        let stream = RecordStream::from_rows(&grid_rows(2, 2, 2), 5).unwrap();
        assert!(matches!(
            reshape(&stream, names(3), None),
            Err(ReshapeError::RecordWidth { expected: 6, found: 5 })
        ));
        let stream = RecordStream::new(Vec::new(), 5).unwrap();
        assert_eq!(reshape(&stream, names(2), None), Err(ReshapeError::Empty));
    }

    #[test]
    fn test_completeness() {
        let mut rows = grid_rows(4, 2, 1);
        rows.truncate(5);
        let stream = RecordStream::from_rows(&rows, 4).unwrap();
        let c = check_completeness(&stream).unwrap();
        // The last row is only partially present, so the grid is 4 x 2
        assert_eq!((c.width, c.height, c.expected, c.found), (4, 2, 8, 5));
        assert!(c.is_incomplete());
        assert_eq!(c.missing(), 3);
    }
}
