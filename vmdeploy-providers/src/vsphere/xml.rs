//! Minimal XML element tree over `quick-xml`, enough to walk SOAP replies.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::ProviderError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name, namespace prefix stripped.
    pub name: String,
    /// Attributes keyed by their qualified name (`type`, `xsi:type`, ...).
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<Element, ProviderError> {
        // No trimming: leaf text such as object names must stay byte-exact.
        let mut reader = Reader::from_str(xml);

        // stack[0] is a synthetic document node
        let mut stack: Vec<Element> = vec![Element::default()];
        loop {
            match reader.read_event()? {
                Event::Start(ref e) => stack.push(Element::from_start(e)?),
                Event::Empty(ref e) => {
                    let el = Element::from_start(e)?;
                    current(&mut stack)?.children.push(el);
                }
                Event::End(_) => {
                    if stack.len() < 2 {
                        return Err(ProviderError::Protocol("unbalanced closing tag".into()));
                    }
                    if let Some(mut done) = stack.pop() {
                        // Indentation between child elements is not content.
                        if !done.children.is_empty() && done.text.trim().is_empty() {
                            done.text.clear();
                        }
                        current(&mut stack)?.children.push(done);
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    current(&mut stack)?.text.push_str(&text);
                }
                Event::CData(c) => {
                    let raw = c.into_inner();
                    current(&mut stack)?.text.push_str(&String::from_utf8_lossy(&raw));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if stack.len() != 1 {
            return Err(ProviderError::Protocol("truncated XML document".into()));
        }
        stack
            .pop()
            .and_then(|doc| doc.children.into_iter().next())
            .ok_or_else(|| ProviderError::Protocol("empty XML document".into()))
    }

    fn from_start(e: &BytesStart<'_>) -> Result<Element, ProviderError> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }
        Ok(Element {
            name,
            attrs,
            ..Default::default()
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The `xsi:type` annotation, whatever prefix the server bound it to.
    pub fn xsi_type(&self) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.ends_with(":type"))
            .map(|(_, v)| v.rsplit(':').next().unwrap_or(v))
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Depth-first search for the first descendant called `name`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        for c in &self.children {
            if c.name == name {
                return Some(c);
            }
            if let Some(found) = c.find(name) {
                return Some(found);
            }
        }
        None
    }
}

fn current(stack: &mut [Element]) -> Result<&mut Element, ProviderError> {
    stack
        .last_mut()
        .ok_or_else(|| ProviderError::Protocol("XML parser lost its position".into()))
}
