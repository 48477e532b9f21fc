//! Typed wrappers for the backend HTTP contract.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tether_core::ClassifiedError;
use tether_core::encoding::encode_segment;

use crate::client::RequestClient;
use crate::request::Request;

/// `GET /health` response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthStatus {
    /// Backend status label (`ok`, `degraded`, ...).
    pub status: String,
    /// Backend version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Seconds since the backend started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<f64>,
}

/// One entry of `GET /api/v1/items`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    /// Item name.
    pub name: String,
    /// Category, if the backend groups items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Current status label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Everything else the backend reported.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Options for an execute call. Unknown keys pass through.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    /// Backend-side execution deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Additional backend-specific options.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /api/v1/batch/execute`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchExecuteRequest {
    /// Items to execute.
    pub names: Vec<String>,
    /// Options applied to every item.
    pub options: ExecuteOptions,
}

/// Export target format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// PDF document.
    Pdf,
    /// PNG images.
    Png,
    /// PowerPoint deck.
    Pptx,
    /// Standalone HTML.
    Html,
}

impl ExportFormat {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Pptx => "pptx",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "png" => Ok(Self::Png),
            "pptx" => Ok(Self::Pptx),
            "html" => Ok(Self::Html),
            other => Err(format!("unknown export format '{other}' (pdf, png, pptx, html)")),
        }
    }
}

/// Body of `POST /api/v1/items/{name}/export`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Output format.
    pub format: ExportFormat,
    /// Format-specific quality (e.g. PNG scale).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
    /// Page selection such as `1-3,5`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
}

impl ExportRequest {
    /// Export everything in `format` at default quality.
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            quality: None,
            pages: None,
        }
    }
}

/// Backend API over a [`RequestClient`].
#[derive(Clone, Debug)]
pub struct BackendApi {
    client: RequestClient,
}

impl BackendApi {
    /// Wrap a client.
    pub fn new(client: RequestClient) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<HealthStatus, ClassifiedError> {
        self.typed(Request::get("/health")).await
    }

    /// `GET /api/v1/items?category=`
    ///
    /// Accepts either a bare array or `{"items": [...]}`.
    pub async fn list_items(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<ItemSummary>, ClassifiedError> {
        let mut request = Request::get("/api/v1/items");
        if let Some(category) = category {
            request = request.with_query("category", category);
        }
        let body = self.client.send(request).await?.body;
        let list = match body {
            Value::Object(mut map) => map.remove("items").unwrap_or(Value::Array(Vec::new())),
            other => other,
        };
        decode(list)
    }

    /// `POST /api/v1/items/{name}/execute`
    pub async fn execute_item(
        &self,
        name: &str,
        options: &ExecuteOptions,
    ) -> Result<Value, ClassifiedError> {
        let path = format!("/api/v1/items/{}/execute", encode_segment(name));
        self.value(Request::post(path, encode(options)?)).await
    }

    /// `POST /api/v1/batch/execute`
    pub async fn batch_execute(
        &self,
        request: &BatchExecuteRequest,
    ) -> Result<Value, ClassifiedError> {
        self.value(Request::post("/api/v1/batch/execute", encode(request)?))
            .await
    }

    /// `GET /api/v1/items/{name}/status`
    pub async fn item_status(&self, name: &str) -> Result<Value, ClassifiedError> {
        let path = format!("/api/v1/items/{}/status", encode_segment(name));
        self.value(Request::get(path)).await
    }

    /// `POST /api/v1/items/{name}/export`
    pub async fn export_item(
        &self,
        name: &str,
        request: &ExportRequest,
    ) -> Result<Value, ClassifiedError> {
        let path = format!("/api/v1/items/{}/export", encode_segment(name));
        self.value(Request::post(path, encode(request)?)).await
    }

    /// `GET /api/v1/metrics`
    pub async fn metrics(&self) -> Result<Value, ClassifiedError> {
        self.value(Request::get("/api/v1/metrics")).await
    }

    async fn value(&self, request: Request) -> Result<Value, ClassifiedError> {
        Ok(self.client.send(request).await?.body)
    }

    async fn typed<T: DeserializeOwned>(&self, request: Request) -> Result<T, ClassifiedError> {
        decode(self.client.send(request).await?.body)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ClassifiedError> {
    serde_json::to_value(value)
        .map_err(|e| ClassifiedError::invalid_request(format!("unencodable body: {e}")))
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ClassifiedError> {
    serde_json::from_value(body.clone()).map_err(|e| {
        ClassifiedError::malformed(format!("unexpected response shape: {e}")).with_details(body)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn export_request_omits_unset_fields() {
        let body = serde_json::to_value(ExportRequest::new(ExportFormat::Pdf)).unwrap();
        assert_eq!(body, json!({"format": "pdf"}));
    }

    #[test]
    fn export_format_parses_case_insensitively() {
        assert_eq!("PPTX".parse::<ExportFormat>().unwrap(), ExportFormat::Pptx);
        assert!("gif".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn execute_options_flatten_extra() {
        let mut options = ExecuteOptions {
            timeout_ms: Some(500),
            ..ExecuteOptions::default()
        };
        let _ = options.extra.insert("dryRun".into(), json!(true));
        let body = serde_json::to_value(&options).unwrap();
        assert_eq!(body, json!({"timeoutMs": 500, "dryRun": true}));
    }

    #[test]
    fn item_summary_keeps_unknown_fields() {
        let item: ItemSummary =
            serde_json::from_value(json!({"name": "intro", "slides": 12})).unwrap();
        assert_eq!(item.name, "intro");
        assert_eq!(item.extra["slides"], 12);
    }

    #[test]
    fn decode_shape_mismatch_is_malformed() {
        let err = decode::<HealthStatus>(json!("nope")).unwrap_err();
        assert_eq!(err.kind, tether_core::ErrorKind::Malformed);
    }
}
