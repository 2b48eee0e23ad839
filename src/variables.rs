//! Variable bags of inventory groups and hosts.
//!
//! AWX stores variables as free-form YAML/JSON. They are kept as a
//! [`serde_json::Value`] tree and every lookup is a query that answers
//! "absent" when a key is missing or has an unexpected shape, so a badly
//! formed block never aborts a run.

use serde_json::{Map, Value};

/// The variables of one group or host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableBag(Map<String, Value>);

impl VariableBag {
    /// Builds a bag from a decoded `variable_data` body. `null` is an empty bag.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Null => Ok(Self::default()),
            other => serde_json::from_value(other).map(Self),
        }
    }

    /// Looks up the embedded configuration block stored under `key`.
    pub fn extract(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Renders the scalar stored under `key` as a label value.
    pub fn label(&self, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        self.0.get(key).and_then(label_value)
    }
}

/// Picks the scrape block for one host.
///
/// With `host_override` set, a block stored under `key` in the host's own
/// variables replaces the group's block entirely.
pub fn scrape_block<'a>(
    group_block: &'a Value,
    host: &'a VariableBag,
    key: &str,
    host_override: bool,
) -> &'a Value {
    match host.extract(key) {
        Some(block) if host_override => block,
        _ => group_block,
    }
}

/// Returns the mapping entries of a block, skipping anything else.
pub fn block_entries(block: &Value) -> Vec<&Map<String, Value>> {
    match block {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let entry = item.as_object();
                if entry.is_none() {
                    log::warn!("Skipping non-mapping block entry: {}", item);
                }
                entry
            })
            .collect(),
        Value::Null => Vec::new(),
        other => {
            log::warn!("Expected a list of entries, found: {}", other);
            Vec::new()
        }
    }
}

/// Renders a scalar as text. Lists, mappings and `null` have no label form.
pub fn label_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub fn str_field(entry: &Map<String, Value>, key: &str) -> Option<String> {
    entry.get(key).and_then(label_value)
}

/// Reads a boolean, accepting the string forms `true`/`false`/`yes`/`no`.
pub fn bool_field(entry: &Map<String, Value>, key: &str) -> Option<bool> {
    match entry.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Reads a TCP port given as a number (`9100`, `9100.0`) or numeric string.
pub fn port_field(entry: &Map<String, Value>, key: &str) -> Option<u16> {
    match entry.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn list_field<'a>(entry: &'a Map<String, Value>, key: &str) -> Option<&'a [Value]> {
    entry.get(key)?.as_array().map(Vec::as_slice)
}

pub fn map_field<'a>(entry: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    entry.get(key)?.as_object()
}
