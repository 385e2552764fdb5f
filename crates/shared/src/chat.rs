//! Outbound chat request types.
//!
//! A [`ChatRequest`] is built once per send and handed to the transport by
//! reference; it has no mutators after construction. [`ChatRequest::to_wire`]
//! produces the JSON body the chat endpoint expects.

use serde::{Deserialize, Serialize};

/// A file or image gathered before a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Attachment {
    Image { url: String },
    File { filename: String, data_url: String },
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        matches!(self, Attachment::Image { .. })
    }

    pub fn is_pdf(&self) -> bool {
        match self {
            Attachment::File { data_url, .. } => data_url.starts_with("data:application/pdf"),
            Attachment::Image { .. } => false,
        }
    }

    fn to_part(&self) -> ContentPart {
        match self {
            Attachment::Image { url } => ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            },
            Attachment::File { filename, data_url } => ContentPart::File {
                file: FilePart {
                    filename: filename.clone(),
                    file_data: data_url.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    message: String,
    model_id: Option<String>,
    conversation_id: Option<String>,
    attachments: Vec<Attachment>,
}

impl ChatRequest {
    pub fn new(
        message: impl Into<String>,
        model_id: Option<String>,
        conversation_id: Option<String>,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self {
            message: message.into(),
            model_id,
            conversation_id,
            attachments,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Build the request body. Plain string content is used when there are
    /// no attachments; otherwise the text goes first followed by one part
    /// per attachment.
    pub fn to_wire(&self) -> ChatRequestBody {
        let content = if self.attachments.is_empty() {
            MessageContent::Text(self.message.clone())
        } else {
            let mut parts = Vec::with_capacity(self.attachments.len() + 1);
            parts.push(ContentPart::Text {
                text: self.message.clone(),
            });
            parts.extend(self.attachments.iter().map(Attachment::to_part));
            MessageContent::Parts(parts)
        };

        ChatRequestBody {
            messages: vec![WireMessage {
                role: "user".to_string(),
                content,
            }],
            model_id: self.model_id.clone(),
            conversation_id: self.conversation_id.clone(),
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequestBody {
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: String, // always "user" for outbound sends
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FilePart },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilePart {
    pub filename: String,
    pub file_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_text_body() {
        let req = ChatRequest::new("hello", Some("gpt-x".into()), None, vec![]);
        let body = serde_json::to_value(req.to_wire()).unwrap();
        assert_eq!(
            body,
            json!({
                "messages": [{"role": "user", "content": "hello"}],
                "model_id": "gpt-x"
            })
        );
    }

    #[test]
    fn test_body_with_attachments_uses_parts() {
        let req = ChatRequest::new(
            "look",
            None,
            Some("c1".into()),
            vec![
                Attachment::Image {
                    url: "data:image/png;base64,AAAA".into(),
                },
                Attachment::File {
                    filename: "a.pdf".into(),
                    data_url: "data:application/pdf;base64,BBBB".into(),
                },
            ],
        );
        let body = serde_json::to_value(req.to_wire()).unwrap();
        assert_eq!(body["conversation_id"], "c1");
        assert!(body.get("model_id").is_none());

        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], json!({"type": "text", "text": "look"}));
        assert_eq!(
            parts[1],
            json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}})
        );
        assert_eq!(parts[2]["type"], "file");
        assert_eq!(parts[2]["file"]["filename"], "a.pdf");
    }

    #[test]
    fn test_attachment_kinds() {
        let pdf = Attachment::File {
            filename: "x.pdf".into(),
            data_url: "data:application/pdf;base64,AA".into(),
        };
        assert!(pdf.is_pdf());
        assert!(!pdf.is_image());
    }
}
