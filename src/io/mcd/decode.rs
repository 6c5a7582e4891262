use std::io::{self, SeekFrom};
use std::ops::Range;

use crate::io::traits::SeekRead;
use crate::meta::ValueEncoding;
use crate::raster::RecordStream;

/// Reinterpret `bytes` as little endian `f32` values
pub fn decode_f32_le(bytes: &[u8]) -> Vec<f32> {
    let mut values: Vec<f32> = bytemuck::pod_collect_to_vec(bytes);
    if cfg!(target_endian = "big") {
        for v in values.iter_mut() {
            *v = f32::from_bits(v.to_bits().swap_bytes());
        }
    }
    values
}

/// Encode `values` as little endian bytes, the inverse of [`decode_f32_le`]
pub fn encode_f32_le(values: &[f32]) -> Vec<u8> {
    if cfg!(target_endian = "big") {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    } else {
        bytemuck::cast_slice(values).to_vec()
    }
}

/// The byte length of one record of `record_width` values
pub const fn record_stride(record_width: usize, encoding: ValueEncoding) -> usize {
    record_width * encoding.size_of()
}

/// Whether a data segment of `length` bytes holds a whole number of records
pub fn is_whole_records(length: u64, record_width: usize, encoding: ValueEncoding) -> bool {
    let stride = record_stride(record_width, encoding) as u64;
    stride > 0 && length % stride == 0
}

/// Decode a buffer of raw values into records of `record_width` values each.
///
/// The caller is responsible for checking that `bytes` holds whole records.
pub fn decode_records(
    bytes: &[u8],
    record_width: usize,
    encoding: ValueEncoding,
) -> Result<RecordStream, crate::raster::ReshapeError> {
    let values = match encoding {
        ValueEncoding::Float32 => decode_f32_le(bytes),
    };
    RecordStream::new(values, record_width)
}

/// Read exactly the bytes in `range` from `reader`
pub fn read_range<R: SeekRead>(reader: &mut R, range: Range<u64>) -> io::Result<Vec<u8>> {
    let length = range.end.saturating_sub(range.start) as usize;
    reader.seek(SeekFrom::Start(range.start))?;
    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}
