//! Maps one decoded record payload onto a [`StreamEvent`].
//!
//! Precedence:
//! 1. `reasoning` / `reasoning_content` text, unless the payload is marked
//!    as final content (`"final": true` or `"type": "content"`)
//! 2. `content` text
//! 3. `error` text
//! 4. identity or usage fields → metadata
//! 5. `"done": true`
//!
//! Anything else is not an event and yields `Ok(None)`.

use serde::Deserialize;
use serde_json::{Map, Value};
use shared::events::{Metadata, StreamEvent};

const METADATA_KEYS: &[&str] = &[
    "id",
    "model_id_used",
    "prompt_tokens",
    "completion_tokens",
    "using_documents",
    "document_sources",
    "conversation_id",
];

/// Parse the JSON body of a `data:` record and classify it.
pub fn parse_record(data: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
    let value: Value = serde_json::from_str(data)?;
    classify(value)
}

pub fn classify(value: Value) -> Result<Option<StreamEvent>, serde_json::Error> {
    let Some(obj) = value.as_object() else {
        return Ok(None);
    };

    if !is_marked_final(obj) {
        let reasoning =
            text_field(obj, "reasoning").or_else(|| text_field(obj, "reasoning_content"));
        if let Some(text) = reasoning {
            return Ok(Some(StreamEvent::Reasoning(text.to_string())));
        }
    }

    if let Some(text) = text_field(obj, "content") {
        return Ok(Some(StreamEvent::Content(text.to_string())));
    }

    if let Some(message) = text_field(obj, "error") {
        return Ok(Some(StreamEvent::Error(message.to_string())));
    }

    if METADATA_KEYS.iter().any(|k| obj.contains_key(*k)) {
        let meta = Metadata::deserialize(&value)?;
        return Ok(Some(StreamEvent::Metadata(meta)));
    }

    if obj.get("done").and_then(Value::as_bool) == Some(true) {
        return Ok(Some(StreamEvent::Done));
    }

    Ok(None)
}

fn is_marked_final(obj: &Map<String, Value>) -> bool {
    obj.get("final").and_then(Value::as_bool) == Some(true)
        || obj.get("type").and_then(Value::as_str) == Some("content")
}

fn text_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}
