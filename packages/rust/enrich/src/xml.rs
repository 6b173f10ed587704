//! Minimal element tree over `quick-xml` pull events.
//!
//! The lookup response is small (one batch of items), so the whole
//! document is materialized and navigated by name, which keeps the field
//! derivation code free of event-loop bookkeeping.

use std::collections::HashMap;

use quick_xml::events::{BytesRef, Event};
use quick_xml::reader::Reader;

use meeplesync_shared::{MeeplesyncError, Result};

/// One XML element: name, attributes, accumulated text, child elements.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub attrs: HashMap<String, String>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// First direct child with the given name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given name, in document order.
    pub fn findall<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first direct child with the given name, or `""`.
    pub fn findtext(&self, name: &str) -> &str {
        self.find(name).map(|c| c.text.as_str()).unwrap_or("")
    }
}

/// Parse a document and return its root element.
pub fn parse_document(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);

    // Sentinel holder for top-level content; real elements stack on top.
    let mut stack: Vec<Element> = vec![Element::named(String::new())];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let el = element_from_tag(&reader, &e)?;
                stack.push(el);
            }
            Ok(Event::Empty(e)) => {
                let el = element_from_tag(&reader, &e)?;
                attach(&mut stack, el);
            }
            Ok(Event::Text(t)) => {
                // Entity references arrive separately as GeneralRef, so the
                // text event carries plain character data only.
                let text = t
                    .decode()
                    .map_err(|e| MeeplesyncError::parse(format!("bad text node: {e}")))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::GeneralRef(r)) => {
                let resolved = resolve_reference(&r)?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&resolved);
                }
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                let el = stack.pop().expect("balanced events guaranteed by reader");
                attach(&mut stack, el);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(MeeplesyncError::parse(format!(
                    "XML error at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    stack
        .pop()
        .and_then(|holder| holder.children.into_iter().next())
        .ok_or_else(|| MeeplesyncError::parse("empty document"))
}

/// Resolve a `&name;` / `&#dd;` / `&#xhh;` reference to its character data.
fn resolve_reference(r: &BytesRef<'_>) -> Result<String> {
    if let Some(ch) = r
        .resolve_char_ref()
        .map_err(|e| MeeplesyncError::parse(format!("bad character reference: {e}")))?
    {
        return Ok(ch.to_string());
    }

    let name = r
        .decode()
        .map_err(|e| MeeplesyncError::parse(format!("bad entity reference: {e}")))?;
    quick_xml::escape::resolve_predefined_entity(&name)
        .map(str::to_string)
        .ok_or_else(|| MeeplesyncError::parse(format!("unknown entity &{name};")))
}

fn attach(stack: &mut [Element], el: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
    }
}

fn element_from_tag(
    reader: &Reader<&[u8]>,
    tag: &quick_xml::events::BytesStart<'_>,
) -> Result<Element> {
    let name = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();
    let mut el = Element::named(name);

    for attr in tag.attributes() {
        let attr = attr.map_err(|e| MeeplesyncError::parse(format!("bad attribute: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| MeeplesyncError::parse(format!("bad attribute value: {e}")))?
            .into_owned();
        el.attrs.insert(key, value);
    }

    Ok(el)
}
