//! The Alertmanager configuration file.
//!
//! Only the fields the reconciler manages are typed. Every other key is
//! carried through the `extra` maps so a load followed by a save keeps
//! the rest of the file intact.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in '{path}': {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize YAML: {0}")]
    SerializeYaml(#[from] serde_yaml::Error),
}

type Extra = Mapping;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertmanagerDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub receivers: Vec<Receiver>,
    #[serde(flatten)]
    pub extra: Extra,
    #[serde(skip)]
    pub(super) key_order: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_configs: Vec<EmailConfig>,
    #[serde(flatten)]
    pub extra: Extra,
    #[serde(skip)]
    pub(super) key_order: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_resolved: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
    #[serde(skip)]
    pub(super) key_order: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(
        default,
        rename = "match",
        skip_serializing_if = "Option::is_none"
    )]
    pub matchers: Option<Mapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(flatten)]
    pub extra: Extra,
    #[serde(skip)]
    pub(super) key_order: Vec<Value>,
}

impl AlertmanagerDocument {
    pub fn parse(content: &str, path: &Path) -> Result<Self, DocumentError> {
        // An empty file is an empty document.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let parse_error = |source| DocumentError::ParseYaml {
            path: path.to_path_buf(),
            source,
        };
        let value: Value = serde_yaml::from_str(content).map_err(parse_error)?;
        let mut document: Self = serde_yaml::from_value(value.clone()).map_err(parse_error)?;
        document.record_key_order(&value);
        Ok(document)
    }

    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path).map_err(|source| DocumentError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Renders the document, keeping every mapping in the key order it was
    /// loaded with. Keys that were not in the loaded file come last.
    pub fn to_yaml(&self) -> Result<String, DocumentError> {
        let mut value = serde_yaml::to_value(self)?;
        self.restore_key_order(&mut value);
        Ok(serde_yaml::to_string(&value)?)
    }

    /// Child routes of the root route, creating the root when missing.
    pub fn routes_mut(&mut self) -> &mut Vec<Route> {
        &mut self.route.get_or_insert_with(Route::default).routes
    }
}

/// Remembers the key order of the mapping a value was read from, so that
/// serializing typed fields ahead of flattened ones does not reshuffle it.
trait KeyOrdered {
    fn record_key_order(&mut self, value: &Value);
    fn restore_key_order(&self, value: &mut Value);
}

impl KeyOrdered for AlertmanagerDocument {
    fn record_key_order(&mut self, value: &Value) {
        self.key_order = mapping_keys(value);
        if let (Some(route), Some(route_value)) = (&mut self.route, value.get("route")) {
            route.record_key_order(route_value);
        }
        record_each(&mut self.receivers, value, "receivers");
    }

    fn restore_key_order(&self, value: &mut Value) {
        reorder(value, &self.key_order);
        if let (Some(route), Some(route_value)) = (&self.route, value.get_mut("route")) {
            route.restore_key_order(route_value);
        }
        restore_each(&self.receivers, value, "receivers");
    }
}

impl KeyOrdered for Receiver {
    fn record_key_order(&mut self, value: &Value) {
        self.key_order = mapping_keys(value);
        record_each(&mut self.email_configs, value, "email_configs");
    }

    fn restore_key_order(&self, value: &mut Value) {
        reorder(value, &self.key_order);
        restore_each(&self.email_configs, value, "email_configs");
    }
}

impl KeyOrdered for EmailConfig {
    fn record_key_order(&mut self, value: &Value) {
        self.key_order = mapping_keys(value);
    }

    fn restore_key_order(&self, value: &mut Value) {
        reorder(value, &self.key_order);
    }
}

impl KeyOrdered for Route {
    fn record_key_order(&mut self, value: &Value) {
        self.key_order = mapping_keys(value);
        record_each(&mut self.routes, value, "routes");
    }

    fn restore_key_order(&self, value: &mut Value) {
        reorder(value, &self.key_order);
        restore_each(&self.routes, value, "routes");
    }
}

fn mapping_keys(value: &Value) -> Vec<Value> {
    value
        .as_mapping()
        .map(|mapping| mapping.keys().cloned().collect())
        .unwrap_or_default()
}

fn record_each<T: KeyOrdered>(items: &mut [T], value: &Value, key: &str) {
    if let Some(Value::Sequence(values)) = value.get(key) {
        for (item, item_value) in items.iter_mut().zip(values) {
            item.record_key_order(item_value);
        }
    }
}

fn restore_each<T: KeyOrdered>(items: &[T], value: &mut Value, key: &str) {
    if let Some(Value::Sequence(values)) = value.get_mut(key) {
        for (item, item_value) in items.iter().zip(values) {
            item.restore_key_order(item_value);
        }
    }
}

/// Sorts the entries of a mapping by their position in `order`. The sort is
/// stable, so keys missing from `order` keep their relative order at the end.
fn reorder(value: &mut Value, order: &[Value]) {
    let Value::Mapping(mapping) = value else {
        return;
    };
    if order.is_empty() {
        return;
    }
    let mut entries: Vec<(Value, Value)> = std::mem::take(mapping).into_iter().collect();
    entries.sort_by_key(|(key, _)| {
        order
            .iter()
            .position(|known| known == key)
            .unwrap_or(order.len())
    });
    *mapping = entries.into_iter().collect();
}

/// Writes `content` to `path` through a temporary file in the same directory
/// and a rename, so readers never observe a partially written file. The
/// temporary file is removed if any step fails.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), DocumentError> {
    let write_error = |source| DocumentError::WriteFile {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;

    // Same mode as a file written with `File::create`.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.as_file().metadata().map_err(write_error)?.permissions();
        perms.set_mode(0o644);
        file.as_file().set_permissions(perms).map_err(write_error)?;
    }

    file.write_all(content.as_bytes()).map_err(write_error)?;
    file.as_file().sync_all().map_err(write_error)?;
    file.persist(path).map_err(|err| write_error(err.error))?;
    Ok(())
}
