//! A schema-less view of an XML document.
//!
//! Elements are folded into a mapping from child name to value, the way most
//! dynamic XML-to-dictionary converters do it. A child name that occurs once is
//! stored as a scalar, a name that repeats becomes a [`XmlValue::List`]. Because
//! this cardinality depends on the document and not on the schema, callers
//! should [`XmlValue::force_list`] any element they intend to iterate over.
use std::mem;

use indexmap::IndexMap;
use quick_xml::{events::Event, Error as XMLError, Reader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlTreeError {
    #[error("An XML error {1} was encountered at byte {0}")]
    XMLError(usize, #[source] XMLError),
    #[error("The document ended while <{0}> was still open")]
    Unclosed(String),
    #[error("The document does not contain a root element")]
    NoRoot,
}

/// A node in the folded document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    /// A leaf element. Empty elements like `<ChannelLabel />` are `Text(None)`.
    Text(Option<String>),
    /// An element with children or attributes. Attributes are stored with an
    /// `@` prefix and mixed text content under `#text`.
    Element(IndexMap<String, XmlValue>),
    /// A run of same-named siblings.
    List(Vec<XmlValue>),
}

impl Default for XmlValue {
    fn default() -> Self {
        Self::Text(None)
    }
}

impl XmlValue {
    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        match self {
            Self::Element(children) => children.get(key),
            _ => None,
        }
    }

    /// The text of a leaf, `None` for empty leaves and non-leaves.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => text.as_deref(),
            Self::Element(children) => children.get("#text").and_then(|v| v.as_text()),
            Self::List(_) => None,
        }
    }

    /// The text of the child `key`, if it is present and non-empty.
    pub fn text_of(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_text())
    }

    /// View this value as a sequence. A scalar is a sequence of one.
    pub fn as_list(&self) -> &[XmlValue] {
        match self {
            Self::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    /// Iterate over the child `key` as a sequence, which is empty when the
    /// child is absent.
    pub fn iter_list<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a XmlValue> + 'a {
        self.get(key).map(|v| v.as_list()).unwrap_or(&[]).iter()
    }

    /// Rewrite every child named in `keys`, at any depth, into a
    /// [`XmlValue::List`] so a lone element looks like a run of one.
    pub fn force_list(&mut self, keys: &[&str]) {
        match self {
            Self::Element(children) => {
                for (key, child) in children.iter_mut() {
                    child.force_list(keys);
                    if keys.contains(&key.as_str()) && !matches!(child, Self::List(_)) {
                        let item = mem::take(child);
                        *child = Self::List(vec![item]);
                    }
                }
            }
            Self::List(items) => {
                for item in items.iter_mut() {
                    item.force_list(keys);
                }
            }
            Self::Text(_) => {}
        }
    }

    /// The scalar children of an element, in document order, as strings.
    /// Empty leaves become empty strings and nested elements are skipped.
    pub fn scalar_fields(&self) -> IndexMap<String, String> {
        match self {
            Self::Element(children) => children
                .iter()
                .filter_map(|(k, v)| match v {
                    Self::Text(t) => Some((k.clone(), t.clone().unwrap_or_default())),
                    _ => None,
                })
                .collect(),
            _ => IndexMap::new(),
        }
    }

    fn insert_child(children: &mut IndexMap<String, XmlValue>, key: String, value: XmlValue) {
        match children.get_mut(&key) {
            Some(Self::List(items)) => items.push(value),
            Some(existing) => {
                let first = mem::take(existing);
                *existing = Self::List(vec![first, value]);
            }
            None => {
                children.insert(key, value);
            }
        }
    }
}

#[derive(Debug, Default)]
struct OpenElement {
    name: String,
    children: IndexMap<String, XmlValue>,
    text: String,
}

impl OpenElement {
    fn close(self) -> (String, XmlValue) {
        let text = self.text.trim();
        let value = if self.children.is_empty() {
            XmlValue::Text(if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            })
        } else {
            let mut children = self.children;
            if !text.is_empty() {
                children.insert("#text".into(), XmlValue::Text(Some(text.to_string())));
            }
            XmlValue::Element(children)
        };
        (self.name, value)
    }
}

fn open_element(
    event: &quick_xml::events::BytesStart,
    position: usize,
) -> Result<OpenElement, XmlTreeError> {
    let name = String::from_utf8_lossy(event.local_name().as_ref()).into_owned();
    let mut children = IndexMap::new();
    for attr_parsed in event.attributes() {
        let attr = attr_parsed.map_err(|e| XmlTreeError::XMLError(position, e.into()))?;
        // Namespace declarations carry no data
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = format!("@{}", String::from_utf8_lossy(attr.key.local_name().as_ref()));
        let value = attr
            .unescape_value()
            .map_err(|e| XmlTreeError::XMLError(position, e))?
            .into_owned();
        children.insert(key, XmlValue::Text(Some(value)));
    }
    Ok(OpenElement {
        name,
        children,
        text: String::new(),
    })
}

/// Fold the first root element of `document` into an [`XmlValue`], returning
/// the root's local name alongside it. Anything after the root element closes
/// is ignored.
pub fn parse_document(document: &str) -> Result<(String, XmlValue), XmlTreeError> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);
    let mut stack: Vec<OpenElement> = Vec::new();

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| XmlTreeError::XMLError(position, e))?;
        match event {
            Event::Start(ref e) => {
                stack.push(open_element(e, position)?);
            }
            Event::Empty(ref e) => {
                let (name, value) = open_element(e, position)?.close();
                match stack.last_mut() {
                    Some(parent) => XmlValue::insert_child(&mut parent.children, name, value),
                    None => return Ok((name, value)),
                }
            }
            Event::Text(ref e) => {
                if let Some(current) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| XmlTreeError::XMLError(position, err))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some(done) = stack.pop() {
                    let (name, value) = done.close();
                    match stack.last_mut() {
                        Some(parent) => XmlValue::insert_child(&mut parent.children, name, value),
                        None => return Ok((name, value)),
                    }
                }
            }
            Event::Eof => {
                return match stack.pop() {
                    Some(open) => Err(XmlTreeError::Unclosed(open.name)),
                    None => Err(XmlTreeError::NoRoot),
                };
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fold_scalars_and_lists() {
        let doc = r#"<Root xmlns="http://example.org/ns">
            <Item><ID>1</ID></Item>
            <Item><ID>2</ID></Item>
            <Other><Name>only</Name><Label /></Other>
        </Root>"#;
        let (name, root) = parse_document(doc).unwrap();
        assert_eq!(name, "Root");
        assert!(matches!(root.get("Item"), Some(XmlValue::List(items)) if items.len() == 2));
        let other = root.get("Other").unwrap();
        assert!(matches!(other, XmlValue::Element(_)));
        assert_eq!(other.text_of("Name"), Some("only"));
        assert_eq!(other.text_of("Label"), None);
        assert!(other.get("Label").is_some());
    }

    #[test]
    fn test_force_list() {
        let doc = "<Root><Item><ID>1</ID></Item><Single>x</Single></Root>";
        let (_, mut root) = parse_document(doc).unwrap();
        assert!(matches!(root.get("Item"), Some(XmlValue::Element(_))));
        assert_eq!(root.iter_list("Item").count(), 1);

        root.force_list(&["Item"]);
        assert!(matches!(root.get("Item"), Some(XmlValue::List(items)) if items.len() == 1));
        assert!(matches!(root.get("Single"), Some(XmlValue::Text(_))));
        assert_eq!(root.iter_list("Missing").count(), 0);
    }

    #[test]
    fn test_attributes_and_trailing_content() {
        let doc = "<Root a=\"1\"><Leaf>v</Leaf></Root>\0\0\0garbage";
        let (_, root) = parse_document(doc).unwrap();
        assert_eq!(root.text_of("@a"), Some("1"));
        assert_eq!(root.scalar_fields().get("Leaf").map(|s| s.as_str()), Some("v"));
    }

    #[test]
    fn test_unclosed() {
        let doc = "<Root><Leaf>v</Leaf>";
        assert!(parse_document(doc).is_err());
        assert!(matches!(parse_document(""), Err(XmlTreeError::NoRoot)));
    }
}
