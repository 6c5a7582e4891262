use log::debug;

use crate::io::offset_index::RangeIndex;
use crate::meta::{parse_document, AcquisitionEntry, AcquisitionRecord, ChannelRecord, XmlValue};

use super::reader::McdError;

/// The root element of the metadata footer
pub const ROOT_ELEMENT: &str = "MCDPublic";
const ACQUISITION: &str = "Acquisition";
const ACQUISITION_CHANNEL: &str = "AcquisitionChannel";

fn malformed(element: &str, message: impl Into<String>) -> McdError {
    McdError::MalformedMetadata {
        element: element.to_string(),
        message: message.into(),
    }
}

fn required_text<'a>(node: &'a XmlValue, element: &str, field: &str) -> Result<&'a str, McdError> {
    node.text_of(field)
        .map(str::trim)
        .ok_or_else(|| malformed(element, format!("missing required field {field}")))
}

fn required_number<T: std::str::FromStr>(
    node: &XmlValue,
    element: &str,
    field: &str,
) -> Result<T, McdError> {
    let text = required_text(node, element, field)?;
    text.parse::<T>()
        .map_err(|_| malformed(element, format!("{field} is not a valid number: {text:?}")))
}

fn parse_acquisition(node: &XmlValue) -> Result<AcquisitionRecord, McdError> {
    let id = required_text(node, ACQUISITION, "ID")?.to_string();
    let data_start_offset: u64 = required_number(node, ACQUISITION, "DataStartOffset")?;
    let data_end_offset: u64 = required_number(node, ACQUISITION, "DataEndOffset")?;
    // Missing or unparsable declarations are reported as unsupported when the
    // acquisition is read, not here.
    let data_format = node.text_of("SegmentDataFormat").unwrap_or_default().trim().to_string();
    let value_bytes = node
        .text_of("ValueBytes")
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);
    Ok(AcquisitionRecord {
        id,
        data_start_offset,
        data_end_offset,
        data_format,
        value_bytes,
        attributes: node.scalar_fields(),
    })
}

fn parse_channel(node: &XmlValue) -> Result<ChannelRecord, McdError> {
    let acquisition_id = required_text(node, ACQUISITION_CHANNEL, "AcquisitionID")?.to_string();
    let name = required_text(node, ACQUISITION_CHANNEL, "ChannelName")?.to_string();
    let label = node.text_of("ChannelLabel").map(|s| s.to_string());
    let order_number = required_number(node, ACQUISITION_CHANNEL, "OrderNumber")?;
    Ok(ChannelRecord::new(acquisition_id, name, label, order_number))
}

/**
The acquisitions described by an MCD metadata footer, each paired with its
ordered signal channels.

Acquisitions keep the order they appear in the document. Each acquisition's
channels are the `<AcquisitionChannel>` entries whose `AcquisitionID` matches,
minus the `X`, `Y` and `Z` coordinate columns, sorted by `OrderNumber`.
*/
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionCatalog {
    entries: Vec<AcquisitionEntry>,
    index: RangeIndex,
}

impl AcquisitionCatalog {
    /// Parse the catalog from the decoded text of the metadata footer
    pub fn from_document(document: &str) -> Result<Self, McdError> {
        let (root_name, root) = parse_document(document)?;
        if root_name != ROOT_ELEMENT {
            return Err(malformed(
                &root_name,
                format!("expected the root element to be <{ROOT_ELEMENT}>"),
            ));
        }
        Self::from_tree(root)
    }

    /// Build the catalog from an already folded `<MCDPublic>` element
    pub fn from_tree(mut root: XmlValue) -> Result<Self, McdError> {
        // A document with a single acquisition or channel folds it into a
        // scalar, so both are coerced before anything iterates over them.
        root.force_list(&[ACQUISITION, ACQUISITION_CHANNEL]);

        let records = root
            .iter_list(ACQUISITION)
            .map(parse_acquisition)
            .collect::<Result<Vec<_>, _>>()?;
        let channels = root
            .iter_list(ACQUISITION_CHANNEL)
            .map(parse_channel)
            .collect::<Result<Vec<_>, _>>()?;

        let mut index = RangeIndex::new("acquisition".into());
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let range = record.data_start_offset..record.data_end_offset;
            if index.insert(record.id.as_str(), range).is_some() {
                return Err(malformed(
                    ACQUISITION,
                    format!("duplicate acquisition ID {}", record.id),
                ));
            }
            let mut selected: Vec<ChannelRecord> = channels
                .iter()
                .filter(|c| c.acquisition_id == record.id && !c.is_coordinate())
                .cloned()
                .collect();
            selected.sort_by_key(|c| c.order_number);
            entries.push(AcquisitionEntry {
                record,
                channels: selected,
            });
        }

        let orphaned = channels
            .iter()
            .filter(|c| !index.contains_key(&c.acquisition_id))
            .count();
        debug!(
            "Catalogued {} acquisitions and {} channel definitions ({orphaned} without an acquisition)",
            entries.len(),
            channels.len()
        );
        Ok(Self { entries, index })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AcquisitionEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[AcquisitionEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&AcquisitionEntry> {
        self.index.index_of(id).and_then(|i| self.entries.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&AcquisitionEntry> {
        self.entries.get(index)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.index_of(id)
    }

    /// The acquisition ID to data byte range index
    pub fn range_index(&self) -> &RangeIndex {
        &self.index
    }
}

impl<'a> IntoIterator for &'a AcquisitionCatalog {
    type Item = &'a AcquisitionEntry;
    type IntoIter = std::slice::Iter<'a, AcquisitionEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
