//! Minimal namespace-aware XML element tree.
//!
//! Elements keep the prefix they were written with and the namespace that
//! prefix resolved to at parse time, so a subtree can be detached from its
//! document and serialized on its own: any binding no longer in scope is
//! re-declared on the element that needs it.

use oaiharvest_common::{Error, Result};
use quick_xml::encoding::Decoder;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::writer::Writer;

/// An attribute as written in the source, including `xmlns` declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name, e.g. `xsi:schemaLocation` or `xmlns:dc`.
    pub name: String,
    /// Namespace of a prefixed, non-declaration attribute.
    pub namespace: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    /// Unprefixed element in `namespace`.
    pub fn new(local_name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            prefix: None,
            local_name: local_name.into(),
            namespace,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Name as it appears in markup.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local_name),
            None => self.local_name.clone(),
        }
    }

    pub fn is(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == namespace
    }

    pub fn push_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.push(Attribute {
            name: name.into(),
            namespace: None,
            value: value.into(),
        });
    }

    pub fn push_element(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    pub fn child_elements(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.child_elements().rev().collect(),
        }
    }

    /// Descendants matching a namespace and local name, in document order.
    pub fn find_all<'a>(
        &'a self,
        namespace: Option<&'a str>,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.descendants().filter(move |e| e.is(namespace, local_name))
    }

    pub fn find<'a>(&'a self, namespace: Option<&'a str>, local_name: &'a str) -> Option<&'a Element> {
        self.find_all(namespace, local_name).next()
    }

    /// Character data before the first child element or comment.
    /// `None` when there is none.
    pub fn text(&self) -> Option<String> {
        let mut text = String::new();
        for node in &self.children {
            match node {
                Node::Text(t) | Node::CData(t) => text.push_str(t),
                _ => break,
            }
        }
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Serialize this element and its subtree as a standalone document.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        let mut scope = Vec::new();
        write_element(&mut writer, self, &mut scope)?;
        Ok(writer.into_inner())
    }

    pub fn to_xml_string(&self) -> Result<String> {
        String::from_utf8(self.to_bytes()?).map_err(|e| Error::MalformedXml(e.to_string()))
    }
}

/// Pre-order iterator over descendant elements.
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.child_elements().rev());
        Some(next)
    }
}

fn malformed(e: impl std::fmt::Display) -> Error {
    Error::MalformedXml(e.to_string())
}

fn decode(decoder: Decoder, bytes: &[u8]) -> Result<String> {
    decoder
        .decode(bytes)
        .map(|text| text.into_owned())
        .map_err(malformed)
}

/// Parse a document into its root element.
///
/// The input is decoded using the encoding named in its XML declaration
/// (or its byte order mark), defaulting to UTF-8.
pub fn parse(xml: &[u8]) -> Result<Element> {
    let mut reader = NsReader::from_reader(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        // The encoding switches once the declaration has been read.
        let decoder = reader.decoder();
        let (resolved, event) = reader.read_resolved_event_into(&mut buf).map_err(malformed)?;
        let namespace = match resolved {
            ResolveResult::Bound(ns) => Some(decode(decoder, ns.as_ref())?),
            ResolveResult::Unbound => None,
            ResolveResult::Unknown(prefix) => {
                return Err(Error::MalformedXml(format!(
                    "unbound namespace prefix '{}'",
                    String::from_utf8_lossy(&prefix)
                )))
            }
        };

        match event {
            Event::Start(start) => {
                stack.push(start_element(&reader, decoder, namespace, &start)?);
            }
            Event::Empty(start) => {
                let element = start_element(&reader, decoder, namespace, &start)?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::MalformedXml("unexpected end tag".to_string()))?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::Text(text) => match stack.last_mut() {
                Some(parent) => {
                    let text = text.unescape().map_err(malformed)?;
                    parent.children.push(Node::Text(text.into_owned()));
                }
                None => {
                    if !text.iter().all(u8::is_ascii_whitespace) {
                        return Err(Error::MalformedXml(
                            "text outside of the root element".to_string(),
                        ));
                    }
                }
            },
            Event::CData(cdata) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::CData(decode(decoder, &cdata)?));
                }
            }
            Event::Comment(comment) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Comment(decode(decoder, &comment)?));
                }
            }
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(Error::MalformedXml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| Error::MalformedXml("document has no root element".to_string()))
}

fn start_element(
    reader: &NsReader<&[u8]>,
    decoder: Decoder,
    namespace: Option<String>,
    start: &BytesStart<'_>,
) -> Result<Element> {
    let name = start.name();
    let prefix = name.prefix().map(|p| decode(decoder, p.as_ref())).transpose()?;
    let local_name = decode(decoder, name.local_name().as_ref())?;

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let attr_name = decode(decoder, attr.key.as_ref())?;
        let raw_value = decode(decoder, &attr.value)?;
        let value = unescape(&raw_value).map_err(malformed)?.into_owned();
        let namespace = if is_declaration(&attr_name).is_some()
            || attr_name.starts_with("xml:")
            || !attr_name.contains(':')
        {
            None
        } else {
            match reader.resolve_attribute(attr.key).0 {
                ResolveResult::Bound(ns) => Some(decode(decoder, ns.as_ref())?),
                ResolveResult::Unbound => None,
                ResolveResult::Unknown(_) => {
                    return Err(Error::MalformedXml(format!(
                        "unbound namespace prefix on attribute '{}'",
                        attr_name
                    )))
                }
            }
        };
        attributes.push(Attribute {
            name: attr_name,
            namespace,
            value,
        });
    }

    Ok(Element {
        prefix,
        local_name,
        namespace,
        attributes,
        children: Vec::new(),
    })
}

fn close_element(
    element: Element,
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.push_element(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(Error::MalformedXml(
                "document has more than one root element".to_string(),
            ))
        }
    }
    Ok(())
}

/// `Some(prefix)` when `name` is a namespace declaration; the inner value is
/// `None` for a default namespace declaration.
fn is_declaration(name: &str) -> Option<Option<&str>> {
    if name == "xmlns" {
        Some(None)
    } else {
        name.strip_prefix("xmlns:").map(Some)
    }
}

struct Binding {
    prefix: Option<String>,
    uri: String,
}

fn lookup<'a>(scope: &'a [Binding], prefix: Option<&str>) -> Option<&'a str> {
    scope
        .iter()
        .rev()
        .find(|b| b.prefix.as_deref() == prefix)
        .map(|b| b.uri.as_str())
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(malformed)
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    scope: &mut Vec<Binding>,
) -> Result<()> {
    let mark = scope.len();
    let name = element.qualified_name();
    let mut start = BytesStart::new(name.as_str());

    for attr in &element.attributes {
        if let Some(prefix) = is_declaration(&attr.name) {
            scope.push(Binding {
                prefix: prefix.map(str::to_string),
                uri: attr.value.clone(),
            });
        }
        start.push_attribute((attr.name.as_str(), attr.value.as_str()));
    }

    let required = element.namespace.as_deref().unwrap_or("");
    let in_scope = lookup(scope, element.prefix.as_deref())
        .or(if element.prefix.is_none() { Some("") } else { None });
    if in_scope != Some(required) {
        declare(&mut start, scope, element.prefix.as_deref(), required);
    }

    for attr in &element.attributes {
        let (Some(ns), Some((prefix, _))) = (&attr.namespace, attr.name.split_once(':')) else {
            continue;
        };
        if lookup(scope, Some(prefix)) != Some(ns.as_str()) {
            declare(&mut start, scope, Some(prefix), ns);
        }
    }

    if element.children.is_empty() {
        write_event(writer, Event::Empty(start))?;
    } else {
        write_event(writer, Event::Start(start))?;
        for child in &element.children {
            match child {
                Node::Element(e) => write_element(writer, e, scope)?,
                Node::Text(t) => write_event(writer, Event::Text(BytesText::new(t)))?,
                Node::CData(t) => write_event(writer, Event::CData(BytesCData::new(t.as_str())))?,
                Node::Comment(t) => {
                    write_event(writer, Event::Comment(BytesText::from_escaped(t.as_str())))?
                }
            }
        }
        write_event(writer, Event::End(BytesEnd::new(name.as_str())))?;
    }

    scope.truncate(mark);
    Ok(())
}

fn declare(start: &mut BytesStart<'_>, scope: &mut Vec<Binding>, prefix: Option<&str>, uri: &str) {
    let attr_name = match prefix {
        Some(p) => format!("xmlns:{}", p),
        None => "xmlns".to_string(),
    };
    start.push_attribute((attr_name.as_str(), uri));
    scope.push(Binding {
        prefix: prefix.map(str::to_string),
        uri: uri.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OAI: &str = "http://www.openarchives.org/OAI/2.0/";

    #[test]
    fn test_parse_resolves_default_namespace() {
        let root = parse(
            br#"<?xml version="1.0"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><a><b>x</b></a></OAI-PMH>"#,
        )
        .unwrap();
        assert!(root.is(Some(OAI), "OAI-PMH"));
        let b = root.find(Some(OAI), "b").unwrap();
        assert_eq!(b.text().as_deref(), Some("x"));
        assert_eq!(b.namespace.as_deref(), Some(OAI));
    }

    #[test]
    fn test_parse_declared_latin1() {
        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<r n=\"\xE9t\xE9\"><t>caf\xE9</t><!--\xE0--></r>";
        let root = parse(xml).unwrap();
        assert_eq!(root.attributes[0].value, "\u{e9}t\u{e9}");
        assert_eq!(root.find(None, "t").unwrap().text().as_deref(), Some("caf\u{e9}"));
        assert_eq!(root.children[1], Node::Comment("\u{e0}".to_string()));
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = parse(b"<r><a><b/><c/></a><d/></r>").unwrap();
        let names: Vec<_> = root.descendants().map(|e| e.local_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse(b"<a><b></a>"), Err(Error::MalformedXml(_))));
        assert!(matches!(parse(b"<a>"), Err(Error::MalformedXml(_))));
        assert!(matches!(parse(b""), Err(Error::MalformedXml(_))));
        assert!(matches!(parse(b"<a/><b/>"), Err(Error::MalformedXml(_))));
        assert!(matches!(parse(b"<x:a/>"), Err(Error::MalformedXml(_))));
    }

    #[test]
    fn test_detached_subtree_redeclares_namespaces() {
        let root = parse(
            br#"<root xmlns="urn:a" xmlns:p="urn:p"><p:item p:kind="k">v</p:item></root>"#,
        )
        .unwrap();
        let item = root.find(Some("urn:p"), "item").unwrap();
        let xml = item.to_xml_string().unwrap();
        assert_eq!(xml, r#"<p:item p:kind="k" xmlns:p="urn:p">v</p:item>"#);

        let reparsed = parse(xml.as_bytes()).unwrap();
        assert!(reparsed.is(Some("urn:p"), "item"));
        assert_eq!(reparsed.attributes[0].namespace.as_deref(), Some("urn:p"));
    }

    #[test]
    fn test_serialization_escapes_text() {
        let root = parse(b"<a t=\"&quot;q&quot;\">1 &lt; 2 &amp; <![CDATA[<raw>]]></a>").unwrap();
        let reparsed = parse(&root.to_bytes().unwrap()).unwrap();
        assert_eq!(root, reparsed);
        assert_eq!(reparsed.text().as_deref(), Some("1 < 2 & <raw>"));
    }

    #[test]
    fn test_no_namespace_child_under_default_namespace() {
        let mut wrapper = Element::new("w", Some("urn:a".to_string()));
        wrapper.push_element(Element::new("plain", None));
        let xml = wrapper.to_xml_string().unwrap();
        assert_eq!(xml, r#"<w xmlns="urn:a"><plain xmlns=""/></w>"#);
    }
}
