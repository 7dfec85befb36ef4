// API response models

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exact `message` the backend returns when the Postgres connection test passes.
pub const CONNECT_SUCCESS_MESSAGE: &str = "Database connection to Postgres successful";

/// Generic JSON envelope returned by the one-shot endpoints.
///
/// Successful calls carry `message`; FastAPI errors carry `detail`, which is either a
/// string or a list of validation errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl MessageEnvelope {
    /// Non-empty `message`, if any.
    pub fn message_text(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.is_empty())
    }

    /// `detail` flattened to display text.
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// One decoded unit of the chat response body.
///
/// Wire shape: `{"event": "status" | "sql_query" | "error", "data": "<text>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Status(String),
    SqlQuery(String),
    Error(String),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Status(_) => "status",
            StreamEvent::SqlQuery(_) => "sql_query",
            StreamEvent::Error(_) => "error",
        }
    }
}

/// Response of `POST /execute-query/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteQueryResponse {
    #[serde(default)]
    pub results: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_decodes_each_kind() {
        let s: StreamEvent = serde_json::from_str(r#"{"event":"status","data":"A"}"#).unwrap();
        assert_eq!(s, StreamEvent::Status("A".to_string()));

        let q: StreamEvent =
            serde_json::from_str(r#"{"event":"sql_query","data":"SELECT 1"}"#).unwrap();
        assert_eq!(q, StreamEvent::SqlQuery("SELECT 1".to_string()));

        let e: StreamEvent = serde_json::from_str(r#"{"data":"boom","event":"error"}"#).unwrap();
        assert_eq!(e, StreamEvent::Error("boom".to_string()));
    }

    #[test]
    fn stream_event_rejects_unknown_kind_and_missing_data() {
        assert!(serde_json::from_str::<StreamEvent>(r#"{"event":"progress","data":"x"}"#).is_err());
        assert!(serde_json::from_str::<StreamEvent>(r#"{"event":"status"}"#).is_err());
    }

    #[test]
    fn envelope_detail_text_flattens_lists() {
        let env: MessageEnvelope = serde_json::from_str(
            r#"{"detail":[{"loc":["query","port"],"msg":"field required"}]}"#,
        )
        .unwrap();
        let text = env.detail_text().unwrap();
        assert!(text.contains("field required"), "{}", text);
        assert!(env.message_text().is_none());
    }

    #[test]
    fn envelope_ignores_empty_values() {
        let env: MessageEnvelope = serde_json::from_str(r#"{"message":"","detail":""}"#).unwrap();
        assert!(env.message_text().is_none());
        assert!(env.detail_text().is_none());
    }

    #[test]
    fn execute_response_tolerates_null_error() {
        let r: ExecuteQueryResponse =
            serde_json::from_str(r#"{"results":"id\n--\n1","error":null}"#).unwrap();
        assert_eq!(r.results, "id\n--\n1");
        assert!(r.error.is_none());
    }
}
