//! Flat XML rendering of response data

use crate::domain::errors::HttpError;
use serde_json::{Map, Value};
use std::io::Write;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

const ROOT_ELEMENT: &str = "response";
const ITEM_ELEMENT: &str = "item";

/// Write the data as `<response source="eix">` holding one child element per
/// leaf value. Nested structures are flattened: a leaf is named after its
/// own key, or after the key of the list that contains it.
pub fn write_document(data: &Map<String, Value>) -> Result<Vec<u8>, HttpError> {
    let mut buffer = Vec::new();
    let mut writer = EmitterConfig::new()
        .perform_indent(false)
        .create_writer(&mut buffer);

    emit(&mut writer, XmlEvent::start_element(ROOT_ELEMENT).attr("source", "eix"))?;
    for (key, value) in data {
        write_leaves(&mut writer, &element_name(key), value)?;
    }
    emit(&mut writer, XmlEvent::end_element())?;

    Ok(buffer)
}

fn write_leaves<W: Write>(writer: &mut EventWriter<W>, name: &str, value: &Value) -> Result<(), HttpError> {
    match value {
        Value::Object(members) => {
            for (key, member) in members {
                write_leaves(writer, &element_name(key), member)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                write_leaves(writer, name, item)?;
            }
        }
        leaf => {
            emit(writer, XmlEvent::start_element(name))?;
            let text = match leaf {
                Value::String(text) => text.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            if !text.is_empty() {
                emit(writer, XmlEvent::characters(&text))?;
            }
            emit(writer, XmlEvent::end_element())?;
        }
    }
    Ok(())
}

fn emit<'a, W: Write>(writer: &mut EventWriter<W>, event: impl Into<XmlEvent<'a>>) -> Result<(), HttpError> {
    writer
        .write(event)
        .map_err(|e| HttpError::Internal(format!("XML serialization failed: {}", e)))
}

/// Turn a data key into a valid element name.
fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect();
    match name.chars().next() {
        None => ITEM_ELEMENT.to_string(),
        Some(first) if !(first.is_alphabetic() || first == '_') => {
            name.insert_str(0, ITEM_ELEMENT);
            name
        }
        Some(_) => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(value: Value) -> String {
        let data = value.as_object().cloned().unwrap();
        String::from_utf8(write_document(&data).unwrap()).unwrap()
    }

    #[test]
    fn test_leaves_become_children() {
        let xml = render(json!({"note": {"title": "Hello", "pinned": true}}));
        assert!(xml.contains(r#"<response source="eix">"#));
        assert!(xml.contains("<pinned>true</pinned>"));
        assert!(xml.contains("<title>Hello</title>"));
        assert!(!xml.contains("<note>"));
    }

    #[test]
    fn test_list_items_use_list_key() {
        let xml = render(json!({"tags": ["a", "b"]}));
        assert!(xml.contains("<tags>a</tags><tags>b</tags>"));
    }

    #[test]
    fn test_text_is_escaped() {
        let xml = render(json!({"body": "<b>&</b>"}));
        assert!(xml.contains("<body>&lt;b>&amp;&lt;/b></body>") || xml.contains("<body>&lt;b&gt;&amp;&lt;/b&gt;</body>"));
    }

    #[test]
    fn test_element_names() {
        assert_eq!(element_name("title"), "title");
        assert_eq!(element_name("2nd"), "item2nd");
        assert_eq!(element_name("with space"), "with_space");
        assert_eq!(element_name(""), "item");
    }
}
