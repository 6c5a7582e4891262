//! Reading the tab-separated per-acquisition text exports written by the
//! vendor's acquisition software.
mod reader;

pub use reader::*;

/// The leading columns every text export starts with
pub const LEADING_COLUMNS: [&str; 6] = ["Start_push", "End_push", "Pushes_duration", "X", "Y", "Z"];

/// Check whether `buf` starts like a text export
pub fn is_txt(buf: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buf);
    let first_line = text.lines().next().unwrap_or_default();
    first_line.starts_with(LEADING_COLUMNS[0]) && first_line.contains('\t')
}
