use std::ops::Range;

use indexmap::map::{Iter, Keys};
use indexmap::IndexMap;

/**
An ordered mapping from acquisition ID to the byte range holding its data in
the source file.

A wrapper around [`indexmap::IndexMap`], so positional lookups follow the order
acquisitions appear in the file's metadata.
*/
#[derive(Default, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeIndex {
    /// The name of the index
    pub name: String,

    /// The mapping from ID to byte range, ordered by occurrence
    #[cfg_attr(feature = "serde", serde(with = "indexmap::map::serde_seq"))]
    pub ranges: IndexMap<Box<str>, Range<u64>>,
}

impl RangeIndex {
    pub fn new(name: String) -> RangeIndex {
        RangeIndex {
            name,
            ..Default::default()
        }
    }

    /// Get the byte range of the specified key
    #[inline]
    pub fn get(&self, key: &str) -> Option<Range<u64>> {
        self.ranges.get(key).cloned()
    }

    /// Get the associated key and range for the specified index position
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<(&str, Range<u64>)> {
        self.ranges
            .get_index(index)
            .map(|(key, range)| (key.as_ref(), range.clone()))
    }

    /// Get the position in the index for a specific key
    #[inline]
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.ranges.get_index_of(key)
    }

    /// Insert `key` into the index with a byte range, returning the previous
    /// range if the key was already present.
    #[inline]
    pub fn insert<T: Into<Box<str>>>(&mut self, key: T, range: Range<u64>) -> Option<Range<u64>> {
        self.ranges.insert(key.into(), range)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn keys(&self) -> Keys<'_, Box<str>, Range<u64>> {
        self.ranges.keys()
    }

    /// Iterate over the keys and ranges
    pub fn iter(&self) -> Iter<'_, Box<str>, Range<u64>> {
        self.ranges.iter()
    }

    /// Check if the key is in the index
    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.ranges.contains_key(key)
    }

    /// The total number of data bytes covered by the index
    pub fn total_bytes(&self) -> u64 {
        self.ranges
            .values()
            .map(|r| r.end.saturating_sub(r.start))
            .sum()
    }
}
