use super::{InventoryError, InventorySource};
use crate::config::AwxConfig;
use async_trait::async_trait;
use log::debug;
use reqwest::{header, Client};
use serde_json::Value;

/// Path of the API root below the AWX host.
const API_ROOT: &str = "/api/v2/";

/// Authenticated client for the AWX REST API.
pub struct AwxClient {
    host: String,
    token: String,
    client: Client,
}

impl AwxClient {
    pub fn new(config: &AwxConfig) -> Result<Self, InventoryError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|source| InventoryError::Request {
                path: config.host.clone(),
                source,
            })?;
        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    /// Resolves an API-relative path or a server-absolute link to a full URL.
    fn url(&self, path: &str, query: Option<&str>) -> String {
        let mut url = if path.starts_with('/') {
            format!("{}{}", self.host, path)
        } else {
            format!("{}{}{}", self.host, API_ROOT, path)
        };
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

#[async_trait]
impl InventorySource for AwxClient {
    async fn get(&self, path: &str, query: Option<&str>) -> Result<Value, InventoryError> {
        let url = self.url(path, query);
        debug!("GET {}", url);
        let request_error = |source| InventoryError::Request {
            path: path.to_string(),
            source,
        };

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(InventoryError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        serde_json::from_slice(&body).map_err(|source| InventoryError::Decode {
            path: path.to_string(),
            source,
        })
    }
}
