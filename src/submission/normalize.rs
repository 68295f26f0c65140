//! Flattening of server error payloads.
//!
//! Servers report field errors in several shapes: a nested object of
//! messages, a sequence of messages, or a bare message. Each raw value is
//! classified once into [`RawErrorShape`] at this boundary and reduced to a
//! single message, producing the flat field → message mapping the form
//! state stores.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Shape of one raw error value in a server error bag.
enum RawErrorShape<'a> {
    /// Nested object of messages; the first value wins.
    Nested(&'a Map<String, Value>),
    /// Sequence of messages; the first element wins.
    Sequence(&'a [Value]),
    /// Anything else is used verbatim.
    Scalar(&'a Value),
}

impl<'a> RawErrorShape<'a> {
    fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => RawErrorShape::Nested(map),
            Value::Array(items) => RawErrorShape::Sequence(items),
            other => RawErrorShape::Scalar(other),
        }
    }

    /// The message this shape reduces to. Empty nested objects and empty
    /// sequences reduce to nothing.
    fn first_message(self) -> Option<String> {
        match self {
            RawErrorShape::Nested(map) => map.values().next().map(render_message),
            RawErrorShape::Sequence(items) => items.first().map(render_message),
            RawErrorShape::Scalar(value) => Some(render_message(value)),
        }
    }
}

fn render_message(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Flatten a server error payload into field → message.
///
/// Object bags map field names to raw values; sequence bags use the element
/// index as the field name. Anything else yields an empty mapping.
pub fn normalize_error_bag(bag: &Value) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    match bag {
        Value::Object(map) => {
            for (field, raw) in map {
                if let Some(message) = RawErrorShape::classify(raw).first_message() {
                    flat.insert(field.clone(), message);
                }
            }
        }
        Value::Array(items) => {
            for (index, raw) in items.iter().enumerate() {
                if let Some(message) = RawErrorShape::classify(raw).first_message() {
                    flat.insert(index.to_string(), message);
                }
            }
        }
        _ => {}
    }
    flat
}
