use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provenance tag recorded on every persisted document.
pub const SOURCE_TAG: &str = "local_script";

/// Identifier generated by the document store for an embedding document and
/// shared with its paired response document.
pub type DocumentId = String;

/// Token usage reported by the responses endpoint.
///
/// Known counters are typed; anything else the endpoint reports is kept
/// verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Usage {
    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none()
            && self.output_tokens.is_none()
            && self.total_tokens.is_none()
            && self.extra.is_empty()
    }
}

/// Result of one call to the responses endpoint. One record covers a whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub text: String,
    pub id: Option<String>,
    pub created_at: Option<i64>,
    pub model: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingDocument {
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: i64,
    pub source: String,
    /// Position of the text within its batch.
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    /// Assigned by the store writer from the paired embedding document.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<DocumentId>,
    pub text: String,
    pub response: String,
    pub created_at: i64,
    pub response_id: Option<String>,
    pub model: Option<String>,
    pub usage: Usage,
    pub source: String,
    pub index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_keeps_unknown_fields() {
        let usage: Usage = serde_json::from_value(serde_json::json!({
            "input_tokens": 12,
            "output_tokens": 30,
            "total_tokens": 42,
            "output_tokens_details": {"reasoning_tokens": 20}
        }))
        .unwrap();
        assert_eq!(usage.total_tokens, Some(42));
        assert!(usage.extra.contains_key("output_tokens_details"));
        assert!(!usage.is_empty());

        let value = serde_json::to_value(&usage).unwrap();
        assert_eq!(value["output_tokens_details"]["reasoning_tokens"], 20);
    }

    #[test]
    fn test_empty_usage_serializes_as_empty_object() {
        let usage = Usage::default();
        assert!(usage.is_empty());
        assert_eq!(serde_json::to_string(&usage).unwrap(), "{}");
    }

    #[test]
    fn test_response_document_without_id_omits_field() {
        let doc = ResponseDocument {
            id: None,
            text: "alpha".to_string(),
            response: "reply".to_string(),
            created_at: 1,
            response_id: Some("resp_1".to_string()),
            model: None,
            usage: Usage::default(),
            source: SOURCE_TAG.to_string(),
            index: 0,
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["source"], "local_script");
    }
}
