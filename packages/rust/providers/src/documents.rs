//! HTTP document store: `GET {base_url}/{collection}/{key}`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use acctfetch_core::DocumentStore;
use acctfetch_shared::{DocumentPayload, LookupError, Result};

use crate::client::{ClientOptions, MAX_RESPONSE_SIZE, authorize, build_client, join_segments};

/// Fetches one JSON object per key. 404 means the document does not exist.
pub struct HttpDocumentStore {
    client: Client,
    base_url: Url,
    opts: ClientOptions,
}

impl HttpDocumentStore {
    pub fn new(base_url: Url, opts: ClientOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(&opts)?,
            base_url,
            opts,
        })
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> std::result::Result<DocumentPayload, LookupError> {
        let url = join_segments(&self.base_url, &[collection, key])
            .map_err(|e| LookupError::Transient(e.to_string()))?;

        let response = authorize(self.client.get(url.clone()), &self.opts)
            .send()
            .await
            .map_err(|e| LookupError::Transient(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LookupError::not_found(key));
        }
        if !status.is_success() {
            return Err(LookupError::Transient(format!("{url}: HTTP {status}")));
        }
        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(LookupError::Transient(format!(
                    "{url}: document too large ({len} bytes)"
                )));
            }
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LookupError::Transient(format!("{url}: malformed document: {e}")))?;
        debug!(%key, "document received");

        match body {
            serde_json::Value::Object(document) => Ok(document),
            other => Err(LookupError::Transient(format!(
                "{url}: expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
