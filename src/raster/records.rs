use std::slice::ChunksExact;

use super::reshape::ReshapeError;

/// The number of leading coordinate fields in every record
pub const COORDINATE_FIELDS: usize = 3;

/**
A long-form table of pixel measurements stored row-major in one flat buffer.

Each record is `record_width` floats: `x, y, z` followed by one value per
channel. Records are kept in the order they were read, which carries no
meaning for the raster they are reshaped into.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct RecordStream {
    values: Vec<f32>,
    record_width: usize,
}

impl RecordStream {
    pub fn new(values: Vec<f32>, record_width: usize) -> Result<Self, ReshapeError> {
        if record_width < COORDINATE_FIELDS || values.len() % record_width != 0 {
            return Err(ReshapeError::RecordWidth {
                expected: record_width,
                found: values.len() % record_width.max(1),
            });
        }
        Ok(Self {
            values,
            record_width,
        })
    }

    /// Build a stream from individual rows, all of which must be `record_width` long
    pub fn from_rows<T: AsRef<[f32]>>(rows: &[T], record_width: usize) -> Result<Self, ReshapeError> {
        let mut values = Vec::with_capacity(rows.len() * record_width);
        for row in rows {
            let row = row.as_ref();
            if row.len() != record_width {
                return Err(ReshapeError::RecordWidth {
                    expected: record_width,
                    found: row.len(),
                });
            }
            values.extend_from_slice(row);
        }
        Self::new(values, record_width)
    }

    pub fn record_width(&self) -> usize {
        self.record_width
    }

    pub fn channel_count(&self) -> usize {
        self.record_width - COORDINATE_FIELDS
    }

    /// The number of records
    pub fn len(&self) -> usize {
        self.values.len() / self.record_width
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn rows(&self) -> ChunksExact<'_, f32> {
        self.values.chunks_exact(self.record_width)
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.record_width)?;
        self.values.get(start..start + self.record_width)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// The number of NaN fields across all records
    pub fn nan_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// Replace every NaN channel value with `value`. Coordinate fields are
    /// left alone, a record without a position stays unplaceable.
    pub fn fill_nan_channels(&mut self, value: f32) -> usize {
        let mut replaced = 0;
        for row in self.values.chunks_exact_mut(self.record_width) {
            for v in row[COORDINATE_FIELDS..].iter_mut().filter(|v| v.is_nan()) {
                *v = value;
                replaced += 1;
            }
        }
        replaced
    }
}
