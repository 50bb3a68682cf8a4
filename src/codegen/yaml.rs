//! YAML text for keys and values, produced by serde_yaml.
//!
//! A value is serialized as a one-entry mapping (or a one-item sequence) and
//! the writer splices the lines in at its own indent. Quoting, block scalars
//! and their indentation and chomping indicators are serde_yaml's choices,
//! so a spliced value reads back exactly as it was given.

use serde::Serialize;
use serde_yaml::{Mapping, Value};

/// `key: value` lines, relative to the key's column.
pub fn entry<T: Serialize + ?Sized>(key: &str, value: &T) -> Vec<String> {
    let mut map = Mapping::new();
    map.insert(Value::String(key.to_string()), to_value(value));
    lines(serde_yaml::to_string(&map))
}

/// `- value` lines, relative to the dash's column.
pub fn seq_item<T: Serialize + ?Sized>(value: &T) -> Vec<String> {
    lines(serde_yaml::to_string(&Value::Sequence(vec![to_value(value)])))
}

/// A mapping key as written before `:`.
pub fn key(name: &str) -> String {
    match serde_yaml::to_string(name) {
        Ok(text) => text.trim_end().to_string(),
        Err(e) => {
            log::error!("cannot serialize key '{}': {}", name, e);
            name.to_string()
        }
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_yaml::to_value(value).unwrap_or_else(|e| {
        log::error!("value has no YAML representation: {}", e);
        Value::Null
    })
}

fn lines(text: Result<String, serde_yaml::Error>) -> Vec<String> {
    match text {
        // `...` closes a document after a `|+` block; the splice continues it.
        Ok(text) => text.lines().filter(|l| *l != "...").map(String::from).collect(),
        Err(e) => {
            log::error!("YAML serialization failed: {}", e);
            Vec::new()
        }
    }
}
