//! In-memory inventory that answers the same paths as AWX.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};

use super::{encode_query_value, InventoryError, InventorySource};

struct FakeGroup {
    id: u64,
    name: String,
    variables: Value,
}

struct FakeHost {
    id: u64,
    name: String,
    variables: Value,
    groups: Vec<String>,
}

pub struct FakeInventory {
    groups: Vec<FakeGroup>,
    hosts: Vec<FakeHost>,
    page_size: usize,
    overrides: HashMap<String, Value>,
    failing_pages: HashSet<(String, usize)>,
}

impl Default for FakeInventory {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            hosts: Vec::new(),
            page_size: 25,
            overrides: HashMap::new(),
            failing_pages: HashSet::new(),
        }
    }
}

impl FakeInventory {
    pub fn add_group(&mut self, id: u64, name: &str, variables: Value) {
        self.groups.push(FakeGroup {
            id,
            name: name.into(),
            variables,
        });
    }

    /// Adds a host belonging to `groups`, in that membership order.
    pub fn add_host(&mut self, id: u64, name: &str, variables: Value, groups: &[&str]) {
        self.hosts.push(FakeHost {
            id,
            name: name.into(),
            variables,
            groups: groups.iter().map(|g| g.to_string()).collect(),
        });
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Answers every request for `path` with `body`.
    pub fn with_override(mut self, path: &str, body: Value) -> Self {
        self.overrides.insert(path.to_string(), body);
        self
    }

    /// Makes the given 1-based page of `path` fail with a server error.
    pub fn failing_page(mut self, path: &str, page: usize) -> Self {
        self.failing_pages.insert((path.to_string(), page));
        self
    }

    fn group_json(group: &FakeGroup) -> Value {
        json!({
            "id": group.id,
            "type": "group",
            "name": group.name,
            "related": {
                "variable_data": format!("/api/v2/groups/{}/variable_data/", group.id),
                "hosts": format!("/api/v2/groups/{}/hosts/", group.id),
            },
        })
    }

    fn host_json(&self, host: &FakeHost) -> Value {
        let groups: Vec<Value> = host
            .groups
            .iter()
            .map(|name| {
                let id = self
                    .groups
                    .iter()
                    .find(|g| &g.name == name)
                    .map(|g| g.id)
                    .unwrap_or(0);
                json!({"id": id, "name": name})
            })
            .collect();
        json!({
            "id": host.id,
            "type": "host",
            "name": host.name,
            "related": {
                "variable_data": format!("/api/v2/hosts/{}/variable_data/", host.id),
            },
            "summary_fields": {
                "groups": {"count": groups.len(), "results": groups},
            },
        })
    }

    fn paged(&self, path: &str, params: &[(String, String)], items: Vec<Value>) -> Value {
        let page = page_number(params);
        let start = (page - 1) * self.page_size;
        let end = (start + self.page_size).min(items.len());
        let results = if start < items.len() {
            items[start..end].to_vec()
        } else {
            Vec::new()
        };
        let next = if end < items.len() {
            let mut query = vec![format!("page={}", page + 1)];
            query.extend(
                params
                    .iter()
                    .filter(|(k, _)| k != "page")
                    .map(|(k, v)| format!("{}={}", k, encode_query_value(v))),
            );
            Value::String(format!("{}?{}", path, query.join("&")))
        } else {
            Value::Null
        };
        json!({"count": items.len(), "next": next, "previous": null, "results": results})
    }
}

fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .unwrap_or_default()
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.to_string(), decode(v)),
            None => (p.to_string(), String::new()),
        })
        .collect()
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

fn page_number(params: &[(String, String)]) -> usize {
    params
        .iter()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(1)
}

fn mentions(variables: &Value, needle: Option<&str>) -> bool {
    match needle {
        None => true,
        Some(needle) => variables
            .to_string()
            .to_lowercase()
            .contains(&needle.to_lowercase()),
    }
}

#[async_trait]
impl InventorySource for FakeInventory {
    async fn get(&self, path: &str, query: Option<&str>) -> Result<Value, InventoryError> {
        let params = parse_query(query);
        if self
            .failing_pages
            .contains(&(path.to_string(), page_number(&params)))
        {
            return Err(InventoryError::Status {
                path: path.to_string(),
                status: 500,
            });
        }
        if let Some(body) = self.overrides.get(path) {
            return Ok(body.clone());
        }

        let not_found = || InventoryError::Status {
            path: path.to_string(),
            status: 404,
        };

        if path == "groups/" {
            let needle = params
                .iter()
                .find(|(k, _)| k == "variables__icontains")
                .map(|(_, v)| v.as_str());
            let items = self
                .groups
                .iter()
                .filter(|g| mentions(&g.variables, needle))
                .map(Self::group_json)
                .collect();
            return Ok(self.paged(path, &params, items));
        }
        if path == "hosts/" {
            let needle = params
                .iter()
                .find(|(k, _)| k == "host_filter")
                .and_then(|(_, v)| v.strip_prefix("variables__icontains="));
            let items = self
                .hosts
                .iter()
                .filter(|h| mentions(&h.variables, needle))
                .map(|h| self.host_json(h))
                .collect();
            return Ok(self.paged(path, &params, items));
        }

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["api", "v2", "groups", id, "hosts"] => {
                let group = self
                    .groups
                    .iter()
                    .find(|g| g.id.to_string() == *id)
                    .ok_or_else(not_found)?;
                let items = self
                    .hosts
                    .iter()
                    .filter(|h| h.groups.contains(&group.name))
                    .map(|h| self.host_json(h))
                    .collect();
                Ok(self.paged(path, &params, items))
            }
            ["api", "v2", "groups", id, "variable_data"] => self
                .groups
                .iter()
                .find(|g| g.id.to_string() == *id)
                .map(|g| g.variables.clone())
                .ok_or_else(not_found),
            ["api", "v2", "hosts", id, "variable_data"] => self
                .hosts
                .iter()
                .find(|h| h.id.to_string() == *id)
                .map(|h| h.variables.clone())
                .ok_or_else(not_found),
            _ => Err(not_found()),
        }
    }
}
