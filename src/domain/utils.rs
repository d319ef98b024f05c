//! Helpers for decoding request parameters and cookies

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Decode an `application/x-www-form-urlencoded` string into parameters.
///
/// Keys ending in `[]` accumulate into an array under the bare name, so
/// `ids[]=1&ids[]=2` yields `ids: ["1", "2"]`. Other repeated keys keep the
/// last value.
pub fn parse_form_pairs(input: &str, into: &mut BTreeMap<String, Value>) {
    for (key, value) in url::form_urlencoded::parse(input.as_bytes()) {
        if let Some(name) = key.strip_suffix("[]") {
            let entry = into
                .entry(name.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => items.push(Value::String(value.into_owned())),
                other => *other = Value::Array(vec![Value::String(value.into_owned())]),
            }
        } else {
            into.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }
}

/// Merge the members of a JSON object body into parameters.
pub fn merge_json_object(object: Map<String, Value>, into: &mut BTreeMap<String, Value>) {
    for (key, value) in object {
        into.insert(key, value);
    }
}

/// Parse a `Cookie` header value.
pub fn parse_cookies(header: &str) -> BTreeMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Upper-case the first character, as used for page titles.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
