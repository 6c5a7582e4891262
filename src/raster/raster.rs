use std::ops::Range;

use indexmap::IndexMap;
use ndarray::{Array3, ArrayView1, ArrayView2, Axis};

/**
A dense multichannel image indexed by `(row, column, channel)`.

Rows correspond to the `y` pixel coordinate and columns to `x`, both starting
at zero. The channel axis is labeled by [`Raster::channels`] in the order the
acquisition stores them.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    /// A name for the image, typically derived from the source file and acquisition
    pub name: String,
    /// The pixel values with shape `(height, width, channels)`
    pub data: Array3<f32>,
    /// The display name of each channel
    pub channels: Vec<String>,
    /// Free-form metadata carried over from the source
    pub attributes: IndexMap<String, String>,
}

impl Raster {
    pub fn new(data: Array3<f32>, channels: Vec<String>) -> Self {
        debug_assert_eq!(data.shape()[2], channels.len());
        Self {
            name: String::new(),
            data,
            channels,
            attributes: IndexMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_attributes(mut self, attributes: IndexMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn height(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn channel_count(&self) -> usize {
        self.data.shape()[2]
    }

    /// `(height, width, channels)`
    pub fn shape(&self) -> (usize, usize, usize) {
        let (h, w, c) = self.data.dim();
        (h, w, c)
    }

    /// The labels of the column axis
    pub fn x_coords(&self) -> Range<usize> {
        0..self.width()
    }

    /// The labels of the row axis
    pub fn y_coords(&self) -> Range<usize> {
        0..self.height()
    }

    pub fn get(&self, y: usize, x: usize, channel: usize) -> Option<f32> {
        self.data.get([y, x, channel]).copied()
    }

    /// All channel values at one pixel
    pub fn pixel(&self, y: usize, x: usize) -> Option<ArrayView1<'_, f32>> {
        if y < self.height() && x < self.width() {
            Some(self.data.slice(ndarray::s![y, x, ..]))
        } else {
            None
        }
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == name)
    }

    /// A single channel as a `(height, width)` image
    pub fn channel(&self, index: usize) -> Option<ArrayView2<'_, f32>> {
        if index < self.channel_count() {
            Some(self.data.index_axis(Axis(2), index))
        } else {
            None
        }
    }

    pub fn channel_by_name(&self, name: &str) -> Option<ArrayView2<'_, f32>> {
        self.channel_index(name).and_then(|i| self.channel(i))
    }

    /// Iterate over `(label, plane)` pairs, i.e. the raster viewed channel-first
    pub fn planes(&self) -> impl Iterator<Item = (&str, ArrayView2<'_, f32>)> + '_ {
        self.channels
            .iter()
            .map(|s| s.as_str())
            .zip(self.data.axis_iter(Axis(2)))
    }

    /// The smallest and largest non-NaN value of a channel, `None` if the
    /// channel does not exist or holds only NaN.
    pub fn channel_range(&self, index: usize) -> Option<(f32, f32)> {
        self.channel(index)?
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Copy the data out in channel-major `(channel, row, column)` order, the
    /// layout multi-page image containers expect.
    pub fn to_channel_major(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.data.len());
        for (_, plane) in self.planes() {
            out.extend(plane.iter().copied());
        }
        out
    }
}
