//! Parsed stream records and the metadata attached to finished messages.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One classified record from the response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Intermediate "thinking" text shown in the collapsible region.
    Reasoning(String),
    /// A fragment of the final answer.
    Content(String),
    Metadata(Metadata),
    /// Error reported by the server inside the stream.
    Error(String),
    Done,
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Reasoning(_) => "reasoning",
            StreamEvent::Content(_) => "content",
            StreamEvent::Metadata(_) => "metadata",
            StreamEvent::Error(_) => "error",
            StreamEvent::Done => "done",
        }
    }
}

/// Server-assigned message id. The chat backend emits integers, the
/// conversation store sometimes strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

/// Every field is read leniently: a value of the wrong type is dropped on
/// its own instead of failing the whole record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<RecordId>,
    #[serde(default, rename = "model_id_used", deserialize_with = "lenient")]
    pub model_used: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub completion_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub using_documents: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub document_sources: Option<Vec<String>>,
    /// Set when the server created a new conversation for this send.
    #[serde(default, deserialize_with = "lenient")]
    pub conversation_id: Option<RecordId>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl Metadata {
    /// Footer line shown under a finished message, e.g.
    /// `Model: gpt-x · Tokens: 10 prompt + 5 completion`.
    pub fn footer(&self) -> String {
        let mut parts = Vec::new();
        if let Some(model) = &self.model_used {
            parts.push(format!("Model: {}", model));
        }
        match (self.prompt_tokens, self.completion_tokens) {
            (Some(p), Some(c)) => parts.push(format!("Tokens: {} prompt + {} completion", p, c)),
            (Some(p), None) => parts.push(format!("Tokens: {} prompt", p)),
            (None, Some(c)) => parts.push(format!("Tokens: {} completion", c)),
            (None, None) => {}
        }
        if self.using_documents == Some(true) {
            match &self.document_sources {
                Some(sources) if !sources.is_empty() => {
                    parts.push(format!("Documents: {}", sources.join(", ")))
                }
                _ => parts.push("Documents used".to_string()),
            }
        }
        parts.join(" · ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footer_with_usage() {
        let meta: Metadata = serde_json::from_str(
            r#"{"id":42,"model_id_used":"gpt-x","prompt_tokens":10,"completion_tokens":5}"#,
        )
        .unwrap();
        assert_eq!(meta.id, Some(RecordId::Number(42)));
        assert_eq!(meta.footer(), "Model: gpt-x · Tokens: 10 prompt + 5 completion");
    }

    #[test]
    fn test_footer_with_documents() {
        let meta = Metadata {
            model_used: Some("m".into()),
            using_documents: Some(true),
            document_sources: Some(vec!["a.pdf".into(), "b.md".into()]),
            ..Default::default()
        };
        assert_eq!(meta.footer(), "Model: m · Documents: a.pdf, b.md");
    }

    #[test]
    fn test_mistyped_field_dropped_alone() {
        let meta: Metadata = serde_json::from_str(
            r#"{"id":7,"model_id_used":"gpt-x","prompt_tokens":"ten","completion_tokens":5,"conversation_id":17}"#,
        )
        .unwrap();
        assert_eq!(meta.id, Some(RecordId::Number(7)));
        assert_eq!(meta.prompt_tokens, None);
        assert_eq!(meta.conversation_id, Some(RecordId::Number(17)));
        assert_eq!(meta.footer(), "Model: gpt-x · Tokens: 5 completion");
    }

    #[test]
    fn test_string_ids() {
        let meta: Metadata = serde_json::from_str(r#"{"id":"msg_1"}"#).unwrap();
        assert_eq!(meta.id.unwrap().to_string(), "msg_1");
    }
}
