//! Access to the AWX inventory.
//!
//! [`InventorySource`] is the only seam to the network: it returns the
//! raw JSON body of one GET request. Everything above it (decoding pages,
//! following cursors, reading variable bags) is shared by the real client
//! and the in-memory fake used by tests.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::variables::VariableBag;
use crate::walker::walk;

pub mod awx;
#[cfg(test)]
pub mod fake;

pub use awx::AwxClient;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Request to '{path}' failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server returned status {status} for '{path}'")]
    Status { path: String, status: u16 },

    #[error("Failed to decode response of '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Next page link '{0}' carries no query")]
    Cursor(String),
}

#[async_trait]
pub trait InventorySource: Send + Sync {
    /// GET `path` with an optional raw query string and return the JSON body.
    ///
    /// `path` is either relative to the API root (`groups/`) or a
    /// server-absolute link taken from a `related` field (`/api/v2/...`).
    async fn get(&self, path: &str, query: Option<&str>) -> Result<Value, InventoryError>;
}

/// One page of a listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Splits the page into its items and the query of the next page.
    pub fn into_parts(self) -> Result<(Vec<T>, Option<String>), InventoryError> {
        let next = match self.next.filter(|n| !n.is_empty()) {
            None => None,
            Some(link) => match link.split_once('?') {
                Some((_, query)) if !query.is_empty() => Some(query.to_string()),
                _ => return Err(InventoryError::Cursor(link)),
            },
        };
        Ok((self.results, next))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupRelated {
    #[serde(default)]
    pub variable_data: String,
    #[serde(default)]
    pub hosts: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub related: GroupRelated,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostRelated {
    #[serde(default)]
    pub variable_data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupSummary {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupsSummary {
    #[serde(default)]
    pub results: Vec<GroupSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostSummaryFields {
    #[serde(default)]
    pub groups: GroupsSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Host {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub related: HostRelated,
    #[serde(default)]
    pub summary_fields: HostSummaryFields,
}

impl Host {
    /// Names of the groups the host belongs to, in inventory order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.summary_fields.groups.results.iter().map(|g| g.name.as_str())
    }
}

async fn fetch_page<T: DeserializeOwned>(
    source: &dyn InventorySource,
    path: &str,
    query: Option<&str>,
) -> Result<(Vec<T>, Option<String>), InventoryError> {
    let body = source.get(path, query).await?;
    let page: Page<T> = serde_json::from_value(body).map_err(|source| InventoryError::Decode {
        path: path.to_string(),
        source,
    })?;
    log::debug!(
        "Fetched {} of {} items from {}",
        page.results.len(),
        page.count,
        path
    );
    page.into_parts()
}

/// Walks every page of the listing at `path`.
pub async fn walk_listing<T: DeserializeOwned>(
    source: &dyn InventorySource,
    path: &str,
    query: Option<String>,
) -> Result<Vec<T>, InventoryError> {
    walk(query, |cursor| async move {
        fetch_page(source, path, cursor.as_deref()).await
    })
    .await
}

/// Characters left unescaped in a query value (RFC 3986 unreserved).
const QUERY_VALUE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE_SET).to_string()
}

/// Returns all groups whose variables mention `key`.
pub async fn groups_with_variable(
    source: &dyn InventorySource,
    key: &str,
) -> Result<Vec<Group>, InventoryError> {
    let query = format!("variables__icontains={}", encode_query_value(key));
    walk_listing(source, "groups/", Some(query)).await
}

/// Returns all hosts whose variables mention `key`.
pub async fn hosts_with_variable(
    source: &dyn InventorySource,
    key: &str,
) -> Result<Vec<Host>, InventoryError> {
    let query = format!("host_filter=variables__icontains={}", encode_query_value(key));
    walk_listing(source, "hosts/", Some(query)).await
}

/// Returns every host of `group`.
pub async fn group_hosts(
    source: &dyn InventorySource,
    group: &Group,
) -> Result<Vec<Host>, InventoryError> {
    walk_listing(source, &group.related.hosts, None).await
}

/// Fetches the variable bag behind a `variable_data` link.
pub async fn variables(
    source: &dyn InventorySource,
    path: &str,
) -> Result<VariableBag, InventoryError> {
    let body = source.get(path, None).await?;
    VariableBag::from_value(body).map_err(|source| InventoryError::Decode {
        path: path.to_string(),
        source,
    })
}
