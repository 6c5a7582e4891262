//! Locating the XML metadata footer of an MCD file.
//!
//! The vendor documentation places the `<MCDPublic>` document after the raw
//! acquisition data and recommends searching for it from the end of the file.
use std::io::{self, SeekFrom};

use log::{debug, trace};
use memchr::memmem::FinderRev;

use crate::io::encoding::TextEncoding;
use crate::io::traits::SeekRead;

/// The literal that opens the metadata root element
pub const FOOTER_MARKER: &str = "<MCDPublic";

const SCAN_BLOCK_SIZE: usize = 1 << 20;

/// Scan `reader` backwards in blocks of `block_size` bytes for the last
/// occurrence of `marker`, returning its absolute offset.
///
/// Consecutive blocks overlap by `marker.len() - 1` bytes so a marker that
/// straddles a block boundary is still found.
pub fn rfind_in_reader<R: SeekRead>(
    reader: &mut R,
    marker: &[u8],
    block_size: usize,
) -> io::Result<Option<u64>> {
    if marker.is_empty() {
        return Ok(None);
    }
    let finder = FinderRev::new(marker);
    let overlap = marker.len() - 1;
    let block_size = block_size.max(marker.len()) as u64;

    let mut end = reader.seek(SeekFrom::End(0))?;
    let mut window: Vec<u8> = Vec::new();
    let mut carry: Vec<u8> = Vec::new();

    while end > 0 {
        let start = end.saturating_sub(block_size);
        let n = (end - start) as usize;
        window.clear();
        window.resize(n, 0);
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(&mut window)?;
        let head: Vec<u8> = window[..overlap.min(n)].to_vec();
        window.extend_from_slice(&carry);
        trace!("Scanning [{start}, {end}) for the footer marker");
        if let Some(pos) = finder.rfind(&window[..]) {
            return Ok(Some(start + pos as u64));
        }
        carry = head;
        end = start;
    }
    Ok(None)
}

/// Find the offset of the metadata footer when encoded with `encoding`.
pub fn find_footer_offset<R: SeekRead>(
    reader: &mut R,
    encoding: TextEncoding,
) -> io::Result<Option<u64>> {
    let marker = encoding.encode(FOOTER_MARKER);
    let offset = rfind_in_reader(reader, &marker, SCAN_BLOCK_SIZE)?;
    if let Some(offset) = offset {
        debug!("Found {encoding} metadata footer at byte {offset}");
    }
    Ok(offset)
}

/// Read everything from `offset` to the end of the stream and decode it as text.
pub fn read_footer<R: SeekRead>(
    reader: &mut R,
    offset: u64,
    encoding: TextEncoding,
) -> io::Result<String> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(encoding.decode(&buf).into_owned())
}
