use std::fmt::Display;

use indexmap::IndexMap;

/// The names of the per-pixel coordinate columns, which the container lists as
/// channels alongside the measured signals.
pub const COORDINATE_CHANNELS: [&str; 3] = ["X", "Y", "Z"];

/// The numeric encodings a segment of acquisition data may be stored in.
///
/// Only one is supported today. Declarations that do not map onto a variant
/// are rejected by [`ValueEncoding::from_declaration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueEncoding {
    /// IEEE-754 single precision, little endian
    Float32,
}

impl ValueEncoding {
    /// Map a `SegmentDataFormat`/`ValueBytes` pair onto an encoding
    pub fn from_declaration(data_format: &str, value_bytes: u32) -> Option<Self> {
        match (data_format, value_bytes) {
            ("Float", 4) => Some(Self::Float32),
            _ => None,
        }
    }

    pub const fn size_of(&self) -> usize {
        match self {
            Self::Float32 => 4,
        }
    }
}

impl Display for ValueEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One `<Acquisition>` entry of the metadata footer
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AcquisitionRecord {
    pub id: String,
    /// Absolute offset of the first data byte
    pub data_start_offset: u64,
    /// Absolute offset one past the last data byte
    pub data_end_offset: u64,
    /// The declared `SegmentDataFormat`, verbatim
    pub data_format: String,
    /// The declared `ValueBytes`
    pub value_bytes: u32,
    /// Every scalar field of the element in document order
    pub attributes: IndexMap<String, String>,
}

impl AcquisitionRecord {
    pub fn new(id: String, data_start_offset: u64, data_end_offset: u64) -> Self {
        Self {
            id,
            data_start_offset,
            data_end_offset,
            data_format: "Float".into(),
            value_bytes: 4,
            attributes: IndexMap::new(),
        }
    }

    pub fn value_encoding(&self) -> Option<ValueEncoding> {
        ValueEncoding::from_declaration(&self.data_format, self.value_bytes)
    }

    /// The number of bytes the acquisition claims, zero if the range is inverted
    pub fn data_length(&self) -> u64 {
        self.data_end_offset.saturating_sub(self.data_start_offset)
    }

    /// The optional free-text description the operator entered
    pub fn description(&self) -> Option<&str> {
        self.attributes
            .get("Description")
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// One `<AcquisitionChannel>` entry of the metadata footer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelRecord {
    pub acquisition_id: String,
    pub name: String,
    pub label: Option<String>,
    pub order_number: i64,
}

impl ChannelRecord {
    pub fn new(
        acquisition_id: String,
        name: String,
        label: Option<String>,
        order_number: i64,
    ) -> Self {
        Self {
            acquisition_id,
            name,
            label,
            order_number,
        }
    }

    pub fn is_coordinate(&self) -> bool {
        COORDINATE_CHANNELS.contains(&self.name.as_str())
    }

    /// `{name}_{label}` when a label is present, otherwise just the name
    pub fn display_name(&self) -> String {
        match self.label.as_deref() {
            Some(label) if !label.is_empty() => format!("{}_{}", self.name, label),
            _ => self.name.clone(),
        }
    }
}

/// An acquisition paired with the signal channels stored in its data segment,
/// in column order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AcquisitionEntry {
    pub record: AcquisitionRecord,
    pub channels: Vec<ChannelRecord>,
}

impl AcquisitionEntry {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// The number of floats per pixel: three coordinates plus every channel
    pub fn record_width(&self) -> usize {
        self.channels.len() + COORDINATE_CHANNELS.len()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.display_name()).collect()
    }
}
