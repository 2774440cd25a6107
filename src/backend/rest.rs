//! HTTP client for the hosted database and storage service.
//!
//! Tables are addressed PostgREST-style under `/rest/v1/<table>` with filters
//! as `column=eq.value` query parameters; storage signing lives under
//! `/storage/v1/object/sign/<bucket>/<path>`.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, Url, header};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Backend, Query, UrlSigner};
use crate::{Error, Result};

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent header sent with every request
const USER_AGENT: &str = concat!("faena/", env!("CARGO_PKG_VERSION"));

/// HTTP backend for the hosted service.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base_url: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

impl RestBackend {
    /// Create a client for `base_url` authenticating with `api_key`.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("invalid remote URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("remote URL '{}' cannot be a base", base_url)));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("remote URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.endpoint(["rest", "v1", table])
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    /// Query-string pairs for the filters, order and limit of `query`.
    pub fn query_params(query: &Query) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = query
            .filters
            .iter()
            .map(|f| {
                let value = match &f.value {
                    Value::String(s) => s.clone(),
                    Value::Null => "null".to_string(),
                    other => other.to_string(),
                };
                let op = if f.value.is_null() { "is" } else { "eq" };
                (f.column.clone(), format!("{}.{}", op, value))
            })
            .collect();
        if !query.order.is_empty() {
            let order = query
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Turn a non-success response into `Error::Remote`, extracting the
    /// service's message when the body is JSON.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                ["message", "error_description", "error", "msg"]
                    .iter()
                    .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
            })
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body
                }
            });
        Err(Error::Remote {
            status: status.as_u16(),
            message,
        })
    }

    async fn json_body(response: Response) -> Result<Value> {
        let text = Self::check(response).await?.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn rows(value: Value) -> Vec<Value> {
        match value {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    fn first_row(value: Value) -> Result<Value> {
        Self::rows(value)
            .into_iter()
            .next()
            .ok_or_else(|| Error::Remote {
                status: 500,
                message: "empty representation returned".to_string(),
            })
    }
}

impl Backend for RestBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        tracing::debug!(table, ?query, "select");
        let response = self
            .request(Method::GET, self.table_url(table)?)
            .query(&Self::query_params(query))
            .send()
            .await?;
        Ok(Self::rows(Self::json_body(response).await?))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        tracing::debug!(table, "insert");
        let response = self
            .request(Method::POST, self.table_url(table)?)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        Self::first_row(Self::json_body(response).await?)
    }

    async fn upsert(&self, table: &str, row: Value, on_conflict: &[&str]) -> Result<Value> {
        tracing::debug!(table, ?on_conflict, "upsert");
        let response = self
            .request(Method::POST, self.table_url(table)?)
            .query(&[("on_conflict", on_conflict.join(","))])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&row)
            .send()
            .await?;
        Self::first_row(Self::json_body(response).await?)
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>> {
        tracing::debug!(table, ?query, "update");
        let response = self
            .request(Method::PATCH, self.table_url(table)?)
            .query(&Self::query_params(query))
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        Ok(Self::rows(Self::json_body(response).await?))
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<u64> {
        tracing::debug!(table, ?query, "delete");
        let response = self
            .request(Method::DELETE, self.table_url(table)?)
            .query(&Self::query_params(query))
            .header("Prefer", "return=representation")
            .send()
            .await?;
        Ok(Self::rows(Self::json_body(response).await?).len() as u64)
    }

    async fn replace(&self, table: &str, scope: &Query, rows: Vec<Value>) -> Result<u64> {
        tracing::debug!(table, ?scope, rows = rows.len(), "replace");
        let removed = self.delete(table, scope).await?;
        if !rows.is_empty() {
            let response = self
                .request(Method::POST, self.table_url(table)?)
                .header("Prefer", "return=minimal")
                .json(&rows)
                .send()
                .await?;
            Self::json_body(response).await?;
        }
        Ok(removed)
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        tracing::debug!(function, "rpc");
        let response = self
            .request(Method::POST, self.endpoint(["rest", "v1", "rpc", function])?)
            .json(&args)
            .send()
            .await?;
        Self::json_body(response).await
    }

    fn location(&self) -> String {
        self.base_url.to_string()
    }

    fn backend_type(&self) -> &'static str {
        "remote"
    }
}

impl UrlSigner for RestBackend {
    async fn create_signed_url(&self, bucket: &str, path: &str, ttl_seconds: u64) -> Result<String> {
        tracing::debug!(bucket, path, ttl_seconds, "signing object URL");
        let segments = ["storage", "v1", "object", "sign", bucket]
            .into_iter()
            .chain(path.split('/').filter(|s| !s.is_empty()));
        let response = self
            .request(Method::POST, self.endpoint(segments)?)
            .json(&json!({ "expiresIn": ttl_seconds }))
            .send()
            .await?;
        let body: SignedUrlResponse = serde_json::from_value(Self::json_body(response).await?)?;

        // The service answers with a path relative to /storage/v1.
        if body.signed_url.starts_with("http://") || body.signed_url.starts_with("https://") {
            return Ok(body.signed_url);
        }
        let base = self.endpoint(["storage", "v1"])?;
        Ok(format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            body.signed_url.trim_start_matches('/')
        ))
    }
}
