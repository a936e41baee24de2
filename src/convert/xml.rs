//! XML reader and writer for the structural converter.
//!
//! Reading walks the token stream once and enforces well-formedness on top
//! of what the tokenizer checks: tags must balance and match, there must be
//! exactly one root element and no text outside of it. The same walk backs
//! format detection (with a sink that discards everything) and tree building.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use crate::error::ConversionError;
use crate::value::{Mapping, StructuredValue, ATTR_PREFIX, TEXT_KEY};

/// Root element used when a mapping has no single natural root.
pub const DOC_ROOT: &str = "doc";

/// Deepest element nesting accepted when reading. Matches the recursion
/// limit serde_json applies on the JSON side.
pub const MAX_DEPTH: usize = 128;

/// Receives the element structure of a document as it is walked.
pub(crate) trait XmlSink {
    fn open(&mut self, _name: &str, _attrs: Vec<(String, String)>) {}
    fn text(&mut self, _text: &str) {}
    fn close(&mut self) {}
}

impl XmlSink for () {}

pub(crate) fn walk<S: XmlSink>(input: &[u8], sink: &mut S) -> Result<(), ConversionError> {
    let source = std::str::from_utf8(input)
        .map_err(|e| ConversionError::Parse(format!("invalid UTF-8: {}", e)))?;
    let mut reader = Reader::from_str(source);
    let mut open: Vec<String> = Vec::new();
    let mut roots = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let (name, attrs) = start_parts(&e)?;
                count_root(&open, &mut roots)?;
                check_depth(&open)?;
                sink.open(&name, attrs);
                open.push(name);
            }
            Event::Empty(e) => {
                let (name, attrs) = start_parts(&e)?;
                count_root(&open, &mut roots)?;
                check_depth(&open)?;
                sink.open(&name, attrs);
                sink.close();
            }
            Event::End(e) => {
                let name = element_name(e.name())?;
                match open.pop() {
                    Some(expected) if expected == name => sink.close(),
                    Some(expected) => {
                        return Err(ConversionError::Parse(format!(
                            "expected </{}>, found </{}>",
                            expected, name
                        )))
                    }
                    None => {
                        return Err(ConversionError::Parse(format!(
                            "unmatched closing tag </{}>",
                            name
                        )))
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                feed_text(&open, &text, sink)?;
            }
            Event::CData(e) => {
                let text = std::str::from_utf8(&e)
                    .map_err(|err| ConversionError::Parse(format!("invalid CDATA: {}", err)))?;
                feed_text(&open, text, sink)?;
            }
            Event::Eof => break,
            // comments, declarations, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(name) = open.last() {
        return Err(ConversionError::Parse(format!(
            "unexpected end of input inside <{}>",
            name
        )));
    }
    if roots == 0 {
        return Err(ConversionError::Parse("no root element".into()));
    }
    Ok(())
}

fn count_root(open: &[String], roots: &mut usize) -> Result<(), ConversionError> {
    if open.is_empty() {
        *roots += 1;
        if *roots > 1 {
            return Err(ConversionError::Parse("multiple root elements".into()));
        }
    }
    Ok(())
}

fn check_depth(open: &[String]) -> Result<(), ConversionError> {
    if open.len() >= MAX_DEPTH {
        return Err(ConversionError::Parse("nesting too deep".into()));
    }
    Ok(())
}

fn feed_text<S: XmlSink>(open: &[String], text: &str, sink: &mut S) -> Result<(), ConversionError> {
    if !open.is_empty() {
        sink.text(text);
    } else if !text.trim().is_empty() {
        return Err(ConversionError::Parse(
            "text content outside of the root element".into(),
        ));
    }
    Ok(())
}

fn element_name(name: QName<'_>) -> Result<String, ConversionError> {
    std::str::from_utf8(name.as_ref())
        .map(str::to_owned)
        .map_err(|e| ConversionError::Parse(e.to_string()))
}

fn start_parts(e: &BytesStart<'_>) -> Result<(String, Vec<(String, String)>), ConversionError> {
    let name = element_name(e.name())?;
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = element_name(attr.key)?;
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok((name, attrs))
}

struct Frame {
    name: String,
    children: Mapping,
    text: String,
}

impl Frame {
    fn into_value(self) -> (String, StructuredValue) {
        let Frame {
            name,
            mut children,
            text,
        } = self;
        let text = text.trim();
        let value = if children.is_empty() {
            StructuredValue::String(text.to_owned())
        } else {
            if !text.is_empty() {
                children.insert(TEXT_KEY, text.into());
            }
            StructuredValue::Mapping(children)
        };
        (name, value)
    }
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Frame>,
    root: Option<(String, StructuredValue)>,
}

impl XmlSink for TreeBuilder {
    fn open(&mut self, name: &str, attrs: Vec<(String, String)>) {
        let mut children = Mapping::new();
        for (key, value) in attrs {
            children.insert(format!("{}{}", ATTR_PREFIX, key), value.into());
        }
        self.stack.push(Frame {
            name: name.to_owned(),
            children,
            text: String::new(),
        });
    }

    fn text(&mut self, text: &str) {
        if let Some(frame) = self.stack.last_mut() {
            frame.text.push_str(text);
        }
    }

    fn close(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let (name, value) = frame.into_value();
        match self.stack.last_mut() {
            Some(parent) => parent.children.append(name, value),
            None => self.root = Some((name, value)),
        }
    }
}

/// Read an XML document into `{ <root name>: <root value> }`.
pub fn read(input: &[u8]) -> Result<StructuredValue, ConversionError> {
    let mut builder = TreeBuilder::default();
    walk(input, &mut builder)?;
    let (name, value) = builder
        .root
        .ok_or_else(|| ConversionError::Parse("no root element".into()))?;
    let mut doc = Mapping::new();
    doc.insert(name, value);
    Ok(StructuredValue::Mapping(doc))
}

/// Write a mapping as an XML document. A mapping with exactly one key whose
/// value is not a sequence supplies the root element; anything else is
/// wrapped in `<doc>`.
pub fn write(value: &StructuredValue) -> Result<Vec<u8>, ConversionError> {
    let map = value.as_mapping().ok_or_else(|| {
        ConversionError::Serialize("top-level value must be an object to become XML".into())
    })?;
    let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
    match natural_root(map) {
        Some((name, root)) => write_element(&mut writer, name, root)?,
        None => write_element(&mut writer, DOC_ROOT, value)?,
    }
    Ok(writer.into_inner())
}

fn natural_root(map: &Mapping) -> Option<(&str, &StructuredValue)> {
    let mut entries = map.iter();
    match (entries.next(), entries.next()) {
        (Some((key, value)), None)
            if !key.starts_with(ATTR_PREFIX)
                && key != TEXT_KEY
                && !matches!(value, StructuredValue::Sequence(_)) =>
        {
            Some((key, value))
        }
        _ => None,
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), ConversionError> {
    writer
        .write_event(event)
        .map_err(|e| ConversionError::Serialize(e.to_string()))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &StructuredValue,
) -> Result<(), ConversionError> {
    check_name(name)?;
    match value {
        StructuredValue::Sequence(items) => {
            for item in items {
                if matches!(item, StructuredValue::Sequence(_)) {
                    return Err(ConversionError::Serialize(format!(
                        "nested array under '{}' has no element mapping",
                        name
                    )));
                }
                write_single(writer, name, item)?;
            }
            Ok(())
        }
        other => write_single(writer, name, other),
    }
}

fn write_single(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &StructuredValue,
) -> Result<(), ConversionError> {
    let StructuredValue::Mapping(map) = value else {
        let text = value.scalar_text().unwrap_or_default();
        if text.is_empty() {
            return emit(writer, Event::Empty(BytesStart::new(name)));
        }
        emit(writer, Event::Start(BytesStart::new(name)))?;
        emit(writer, Event::Text(BytesText::new(&text)))?;
        return emit(writer, Event::End(BytesEnd::new(name)));
    };

    let mut start = BytesStart::new(name);
    let mut text = None;
    let mut children = Vec::new();
    for (key, child) in map.iter() {
        if key == TEXT_KEY {
            text = Some(scalar_or_err(child, key)?);
        } else if let Some(attr) = key.strip_prefix(ATTR_PREFIX) {
            check_name(attr)?;
            let attr_value = scalar_or_err(child, key)?;
            start.push_attribute((attr, attr_value.as_str()));
        } else {
            children.push((key, child));
        }
    }

    let text = text.filter(|t| !t.is_empty());
    if text.is_none() && children.is_empty() {
        return emit(writer, Event::Empty(start));
    }
    emit(writer, Event::Start(start))?;
    if let Some(text) = text {
        emit(writer, Event::Text(BytesText::new(&text)))?;
    }
    for (key, child) in children {
        write_element(writer, key, child)?;
    }
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn scalar_or_err(value: &StructuredValue, key: &str) -> Result<String, ConversionError> {
    value
        .scalar_text()
        .ok_or_else(|| ConversionError::Serialize(format!("'{}' must hold a scalar value", key)))
}

fn check_name(name: &str) -> Result<(), ConversionError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == ':' => {
            chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConversionError::Serialize(format!(
            "'{}' is not a valid XML name",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_str(s: &str) -> StructuredValue {
        read(s.as_bytes()).unwrap()
    }

    fn write_json(json: &str) -> String {
        let value: StructuredValue = serde_json::from_str(json).unwrap();
        String::from_utf8(write(&value).unwrap()).unwrap()
    }

    #[test]
    fn leaf_text_stays_a_string() {
        let v = read_str("<a>1</a>");
        let root = v.as_mapping().unwrap();
        assert_eq!(root.get("a").and_then(|v| v.as_str()), Some("1"));
    }

    #[test]
    fn repeated_siblings_collapse_to_sequence() {
        let v = read_str("<list><item>x</item><item>y</item><name>n</name></list>");
        let list = v.as_mapping().unwrap().get("list").unwrap().as_mapping().unwrap();
        assert_eq!(
            list.get("item"),
            Some(&StructuredValue::Sequence(vec!["x".into(), "y".into()]))
        );
        assert_eq!(list.get("name").and_then(|v| v.as_str()), Some("n"));
    }

    #[test]
    fn attributes_and_text_use_reserved_keys() {
        let v = read_str(r#"<price currency="EUR">10</price>"#);
        let price = v.as_mapping().unwrap().get("price").unwrap().as_mapping().unwrap();
        assert_eq!(price.get("-currency").and_then(|v| v.as_str()), Some("EUR"));
        assert_eq!(price.get("#text").and_then(|v| v.as_str()), Some("10"));
    }

    #[test]
    fn entities_and_cdata_are_text() {
        let v = read_str("<a>x &amp; <![CDATA[<y>]]></a>");
        assert_eq!(
            v.as_mapping().unwrap().get("a").and_then(|v| v.as_str()),
            Some("x & <y>")
        );
    }

    #[test]
    fn prolog_and_comments_are_ignored() {
        let v = read_str("<?xml version=\"1.0\"?>\n<!-- c --><a><!-- inner -->v</a>\n");
        assert_eq!(
            v.as_mapping().unwrap().get("a").and_then(|v| v.as_str()),
            Some("v")
        );
    }

    #[test]
    fn malformed_documents_fail() {
        for doc in [
            "<a>",
            "<a></b>",
            "</a>",
            "<a/><b/>",
            "text",
            "<a>1</a>trailing",
            "<a x=\"1\" x=\"2\"/>",
            "<a>&bogus;</a>",
            "",
        ] {
            assert!(read(doc.as_bytes()).is_err(), "accepted {:?}", doc);
        }
    }

    #[test]
    fn invalid_utf8_fails() {
        assert!(read(&[b'<', b'a', b'>', 0xff, b'<', b'/', b'a', b'>']).is_err());
    }

    #[test]
    fn single_key_object_becomes_root() {
        assert_eq!(write_json(r#"{"a":"1"}"#), "<a>1</a>");
    }

    #[test]
    fn multi_key_object_is_wrapped_in_doc() {
        assert_eq!(
            write_json(r#"{"a":"1","b":2}"#),
            "<doc>\n\t<a>1</a>\n\t<b>2</b>\n</doc>"
        );
    }

    #[test]
    fn arrays_become_repeated_elements() {
        let xml = write_json(r#"{"list":{"item":[1,true,null]}}"#);
        assert_eq!(
            xml,
            "<list>\n\t<item>1</item>\n\t<item>true</item>\n\t<item/>\n</list>"
        );
    }

    #[test]
    fn reserved_keys_become_attributes_and_text() {
        let xml = write_json(r##"{"price":{"-currency":"EUR","#text":"10"}}"##);
        assert_eq!(xml, r#"<price currency="EUR">10</price>"#);
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(write_json(r#"{"a":"x<y&z"}"#), "<a>x&lt;y&amp;z</a>");
    }

    #[test]
    fn unmappable_values_fail_to_write() {
        for json in [
            r#"[1,2]"#,
            r#""scalar""#,
            r#"{"bad name":"1"}"#,
            r#"{"1a":"1"}"#,
            r#"{"a":[[1],[2]]}"#,
            r#"{"a":{"-attr":{"x":1}}}"#,
        ] {
            let value: StructuredValue = serde_json::from_str(json).unwrap();
            assert!(write(&value).is_err(), "wrote {}", json);
        }
    }

    #[test]
    fn nesting_is_capped() {
        let nested = |depth: usize| format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));
        assert!(read(nested(MAX_DEPTH).as_bytes()).is_ok());
        assert!(matches!(
            read(nested(MAX_DEPTH + 1).as_bytes()),
            Err(ConversionError::Parse(msg)) if msg == "nesting too deep"
        ));
        let deep_empty = format!("{}<b/>{}", "<a>".repeat(MAX_DEPTH), "</a>".repeat(MAX_DEPTH));
        assert!(read(deep_empty.as_bytes()).is_err());
    }
}
