//! Client for OpenAI-compatible `/responses` endpoints.
//!
//! The whole batch is sent as one generative exchange, so one call yields a
//! single [`ResponseRecord`]. Payloads are validated in a fixed order and each
//! failure carries a distinct [`ResponseErrorReason`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ResponseApiError, ResponseErrorReason};
use crate::models::{ApiConfig, ResponseRecord, Usage};

/// Turns a batch of texts into one generated response.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, texts: &[String], model: &str)
    -> Result<ResponseRecord, ResponseApiError>;
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

/// Top-level reply. Metadata fields are kept as raw values so an unexpected
/// type degrades to a missing or stringified field instead of a rejection.
#[derive(Debug, Deserialize)]
struct ResponsesEnvelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    model: Option<Value>,
    #[serde(default)]
    usage: Option<Value>,
    output: Vec<Value>,
}

fn lenient_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Unix seconds; fractional values are truncated.
fn lenient_timestamp(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value.as_i64().or_else(|| value.as_f64().map(|secs| secs.trunc() as i64))
}

fn lenient_usage(value: Option<Value>) -> Usage {
    value
        .and_then(|usage| serde_json::from_value(usage).ok())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl OutputItem {
    fn is_assistant_message(&self) -> bool {
        self.kind.as_deref() == Some("message") && self.role.as_deref() == Some("assistant")
    }

    /// First non-blank `output_text` part, trimmed.
    fn output_text(&self) -> Option<&str> {
        self.content
            .iter()
            .filter(|part| part.kind.as_deref() == Some("output_text"))
            .filter_map(|part| part.text.as_deref())
            .map(str::trim)
            .find(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct ResponseClient {
    client: Client,
    endpoint: String,
}

impl ResponseClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ResponseApiError> {
        let mut headers = HeaderMap::new();
        let api_key = config.api_key.trim();
        if !api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                ResponseApiError::new(
                    ResponseErrorReason::InvalidInput,
                    format!("invalid API key: {}", e),
                )
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.response_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ResponseApiError::new(ResponseErrorReason::NetworkError, e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/responses", config.base_url.trim_end_matches('/')),
        })
    }

}

#[async_trait]
impl Responder for ResponseClient {
    async fn respond(
        &self,
        texts: &[String],
        model: &str,
    ) -> Result<ResponseRecord, ResponseApiError> {
        if texts.is_empty() {
            return Err(ResponseApiError::new(
                ResponseErrorReason::InvalidInput,
                "no texts provided for responses",
            ));
        }

        let request = ResponsesRequest {
            input: texts,
            model,
        };

        tracing::debug!(endpoint = %self.endpoint, texts = texts.len(), model, "requesting response");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ResponseApiError::new(
                    ResponseErrorReason::NetworkError,
                    format!("request failed: {}", e),
                )
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            ResponseApiError::new(
                ResponseErrorReason::NetworkError,
                format!("failed to read response body: {}", e),
            )
            .with_status(status)
        })?;

        interpret_response(status, &body)
    }
}

/// Validate a raw `/responses` reply and extract its record.
pub fn interpret_response(status: u16, body: &str) -> Result<ResponseRecord, ResponseApiError> {
    if !(200..300).contains(&status) {
        let mut err = ResponseApiError::new(
            ResponseErrorReason::HttpError,
            format!("endpoint returned status {}", status),
        )
        .with_status(status);
        if let Ok(detail) = serde_json::from_str::<Value>(body) {
            err = err.with_body(detail);
        }
        return Err(err);
    }

    let value: Value = serde_json::from_str(body).map_err(|e| {
        ResponseApiError::new(
            ResponseErrorReason::InvalidPayload,
            format!("invalid JSON response: {}", e),
        )
        .with_status(status)
        .with_body(Value::String(body.to_string()))
    })?;

    let shape_error = |message: String, value: Value| {
        ResponseApiError::new(ResponseErrorReason::InvalidShape, message)
            .with_status(status)
            .with_body(value)
    };

    if !value.is_object() {
        return Err(shape_error("expected JSON object response".to_string(), value));
    }

    if !value.get("output").is_some_and(Value::is_array) {
        return Err(shape_error("expected 'output' to be a list".to_string(), value));
    }

    let envelope: ResponsesEnvelope = match serde_json::from_value(value.clone()) {
        Ok(envelope) => envelope,
        Err(e) => return Err(shape_error(format!("unexpected response shape: {}", e), value)),
    };

    let text = envelope
        .output
        .iter()
        .filter_map(|item| serde_json::from_value::<OutputItem>(item.clone()).ok())
        .filter(OutputItem::is_assistant_message)
        .find_map(|item| item.output_text().map(String::from));

    let Some(text) = text else {
        return Err(ResponseApiError::new(
            ResponseErrorReason::NoContent,
            "no valid message response found in output",
        )
        .with_status(status)
        .with_body(value));
    };

    Ok(ResponseRecord {
        text,
        created_at: lenient_timestamp(envelope.created_at.as_ref()),
        id: lenient_string(envelope.id),
        model: lenient_string(envelope.model),
        usage: lenient_usage(envelope.usage),
    })
}
