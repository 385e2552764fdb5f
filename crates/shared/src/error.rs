/// Errors surfaced by the chat client.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Server returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Model {model} cannot accept this message: {reason}")]
    Capability { model: String, reason: String },

    #[error("Invalid attachment: {message}")]
    Attachment { message: String },

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

impl ChatError {
    /// Whether the error happened before anything was sent to the server.
    /// Attachments are kept for a resend in that case.
    pub fn is_pre_dispatch(&self) -> bool {
        matches!(
            self,
            ChatError::Capability { .. }
                | ChatError::Attachment { .. }
                | ChatError::UnknownPreset(_)
                | ChatError::InvalidUrl(_)
        )
    }

    /// Message shown in place of the assistant reply.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Status { status: 401 | 403, .. } => {
                "You are not signed in or your session expired. Please sign in and try again."
                    .to_string()
            }
            ChatError::Status { status: 429, .. } => {
                "Too many requests right now. Please wait a moment and resend.".to_string()
            }
            ChatError::Status { status, .. } if *status >= 500 => {
                "The chat service had a problem answering. Please resend your message.".to_string()
            }
            ChatError::Transport(_) => {
                "Couldn't reach the chat service. Check your connection and resend.".to_string()
            }
            other => format!("Sorry, something went wrong: {}", other),
        }
    }
}
