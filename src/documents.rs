//! XML document handling
//!
//! This module provides the owned element tree every other part of the crate
//! reads: the SCL project under validation and the NSD reference documents.
//! Names are kept exactly as written (prefixes included) and looked up by
//! local name.

use crate::error::{Error, Result};
use crate::limits::Limits;
use indexmap::IndexMap;
use std::borrow::Cow;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// XML Element in the document tree
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element name as written, e.g. `DO` or `scl:DO`
    pub name: String,
    /// Element attributes in document order, namespace declarations included
    pub attributes: IndexMap<String, String>,
    /// Text content (if any)
    pub text: Option<String>,
    /// Child elements
    pub children: Vec<Element>,
}

impl Element {
    /// Create a new element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Get the local name of the element
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Get an attribute value by name
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.attributes.get(name) {
            return Some(value);
        }
        self.attributes
            .iter()
            .filter(|(key, _)| !key.starts_with("xmlns"))
            .find(|(key, _)| local_part(key) == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute value, or the empty string when absent
    pub fn attribute_or_empty(&self, name: &str) -> &str {
        self.get_attribute(name).unwrap_or("")
    }

    /// Add a child element
    pub fn add_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Set text content
    pub fn set_text(&mut self, text: String) {
        self.text = Some(text);
    }

    /// Direct children with the given local name
    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children
            .iter()
            .filter(move |e| e.local_name() == local_name)
    }

    /// First direct child with the given local name
    pub fn first_child(&self, local_name: &str) -> Option<&Element> {
        self.children.iter().find(|e| e.local_name() == local_name)
    }

    /// All descendants in document order (pre-order), excluding `self`
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// Descendants with the given local name, in document order
    pub fn descendants_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.descendants()
            .filter(move |e| e.local_name() == local_name)
    }

    /// Trimmed text of the first direct child with the given local name
    pub fn child_text(&self, local_name: &str) -> Option<&str> {
        self.first_child(local_name)
            .and_then(|child| child.text.as_deref())
            .map(str::trim)
    }
}

/// Pre-order iterator over an element's descendants
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// XML Document representation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Root element of the document
    pub root: Option<Element>,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Parse an XML document from a string with default limits
    pub fn from_string(xml: &str) -> Result<Self> {
        Self::parse(xml.as_bytes(), &Limits::default())
    }

    /// Parse an XML document from bytes
    pub fn parse(xml: &[u8], limits: &Limits) -> Result<Self> {
        limits.check_xml_size(xml.len())?;

        let mut reader = Reader::from_reader(xml);
        reader.trim_text(true);

        let mut doc = Document::new();
        let mut element_stack: Vec<Element> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let element = Self::parse_element(&e)?;
                    element_stack.push(element);
                    limits.check_xml_depth(element_stack.len())?;
                }
                Ok(Event::End(_)) => {
                    if let Some(current) = element_stack.pop() {
                        if let Some(parent) = element_stack.last_mut() {
                            parent.add_child(current);
                        } else {
                            doc.root = Some(current);
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    let element = Self::parse_element(&e)?;
                    if let Some(parent) = element_stack.last_mut() {
                        parent.add_child(element);
                    } else {
                        doc.root = Some(element);
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(current) = element_stack.last_mut() {
                        let text = e
                            .unescape()
                            .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?
                            .to_string();
                        if !text.trim().is_empty() {
                            current.set_text(text);
                        }
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(current) = element_stack.last_mut() {
                        let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                        current.set_text(text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Xml(format!(
                        "Error parsing XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {} // comments, processing instructions, doctype
            }
            buf.clear();
        }

        if !element_stack.is_empty() {
            return Err(Error::Xml(format!(
                "Unexpected end of document: {} unclosed element(s)",
                element_stack.len()
            )));
        }

        Ok(doc)
    }

    fn parse_element(start: &BytesStart) -> Result<Element> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
            .to_string();

        let mut element = Element::new(name);

        for attr_result in start.attributes() {
            let attr = attr_result
                .map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;

            let attr_name = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?
                .to_string();

            let attr_value = attr
                .unescape_value()
                .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
                .to_string();

            element.attributes.insert(attr_name, attr_value);
        }

        Ok(element)
    }

    /// Get the root element
    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }

    /// Serialize the document back to XML text, one element per line
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| Error::Xml(format!("Failed to write declaration: {}", e)))?;

        if let Some(root) = &self.root {
            write_element(&mut writer, root)?;
        }

        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::Xml(format!("Serialized document is not UTF-8: {}", e)))
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, elem: &Element) -> Result<()> {
    let write_err = |e: quick_xml::Error| Error::Xml(format!("Failed to write <{}>: {}", elem.name, e));

    let mut start = BytesStart::new(elem.name.as_str());
    for (key, value) in &elem.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if elem.children.is_empty() && elem.text.is_none() {
        return writer.write_event(Event::Empty(start)).map_err(write_err);
    }

    writer.write_event(Event::Start(start)).map_err(write_err)?;
    if let Some(text) = &elem.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(write_err)?;
    }
    for child in &elem.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(elem.name.as_str())))
        .map_err(write_err)
}

/// An SCL project document as handed over by the host editor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SclDocument {
    document: Document,
    /// Text the document was parsed from; line numbers refer to it
    source: Option<String>,
}

impl SclDocument {
    /// Wrap a parsed document
    pub fn new(document: Document) -> Self {
        Self {
            document,
            source: None,
        }
    }

    /// Parse an SCL project from text
    pub fn from_string(xml: &str) -> Result<Self> {
        let document = Document::from_string(xml)?;
        Ok(Self {
            document,
            source: Some(xml.to_string()),
        })
    }

    /// Parse an SCL project from bytes under the given limits
    pub fn parse(xml: &[u8], limits: &Limits) -> Result<Self> {
        let document = Document::parse(xml, limits)?;
        let source = std::str::from_utf8(xml).ok().map(str::to_string);
        Ok(Self { document, source })
    }

    /// The underlying XML document
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The `SCL` root element
    pub fn root(&self) -> Option<&Element> {
        self.document.root()
    }

    /// Declared `version`, empty when the root or attribute is missing
    pub fn version(&self) -> &str {
        self.root_attribute("version")
    }

    /// Declared `revision`, empty when the root or attribute is missing
    pub fn revision(&self) -> &str {
        self.root_attribute("revision")
    }

    /// Declared `release`, empty when the root or attribute is missing
    pub fn release(&self) -> &str {
        self.root_attribute("release")
    }

    fn root_attribute(&self, name: &str) -> &str {
        self.root().map(|r| r.attribute_or_empty(name)).unwrap_or("")
    }

    /// The single `DataTypeTemplates` section, if present
    pub fn data_type_templates(&self) -> Option<&Element> {
        self.root()?.first_child("DataTypeTemplates")
    }

    /// Serialize the parsed tree to XML text
    pub fn to_xml_string(&self) -> Result<String> {
        self.document.to_xml_string()
    }

    /// Text handed to the schema worker: the original source when the
    /// project was parsed from text, otherwise the serialized tree
    pub fn xml_text(&self) -> Result<Cow<'_, str>> {
        match &self.source {
            Some(source) => Ok(Cow::Borrowed(source)),
            None => self.to_xml_string().map(Cow::Owned),
        }
    }
}
