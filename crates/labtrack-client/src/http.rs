//! HTTP transport using reqwest

use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use labtrack_core::{RecordKind, SyncConfig};

use crate::api::RecordApi;
use crate::error::SyncError;

/// `{"error": message}` body returned by the service
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`RecordApi`] over the service's `/data` endpoint
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    endpoint: Url,
}

impl HttpApi {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: data_endpoint(&config.base_url)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(
        &self,
        method: Method,
        kind: RecordKind,
        id: Option<&str>,
        body: Option<Map<String, Value>>,
    ) -> Result<Response, SyncError> {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("type", kind.key());
            if let Some(id) = id {
                query.append_pair("id", id);
            }
        }

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or_else(|_| status_text(status, text));
        Err(SyncError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

fn status_text(status: StatusCode, body: String) -> String {
    if body.is_empty() {
        status.canonical_reason().unwrap_or("error").to_string()
    } else {
        body
    }
}

/// `<base_url>/data`, keeping any path prefix on the base
fn data_endpoint(base_url: &str) -> Result<Url, SyncError> {
    let base = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|url| url.join("data"))
        .map_err(|e| SyncError::Network(format!("Invalid base URL {base_url}: {e}")))
}

impl RecordApi for HttpApi {
    async fn list(&self, kind: RecordKind) -> Result<Vec<Value>, SyncError> {
        let response = self.send(Method::GET, kind, None, None).await?;
        Ok(response.json().await?)
    }

    async fn create(&self, kind: RecordKind, payload: Map<String, Value>) -> Result<Value, SyncError> {
        let response = self.send(Method::POST, kind, None, Some(payload)).await?;
        Ok(response.json().await?)
    }

    async fn update(
        &self,
        kind: RecordKind,
        id: &str,
        payload: Map<String, Value>,
    ) -> Result<Value, SyncError> {
        let response = self.send(Method::PUT, kind, Some(id), Some(payload)).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<(), SyncError> {
        self.send(Method::DELETE, kind, Some(id), None).await?;
        Ok(())
    }
}
