//! HTTP transport for the chat backend: the streaming chat endpoint and the
//! conversation/model collaborator endpoints.

pub mod chat;
pub mod classify;
pub mod endpoints;
pub mod sse;

use reqwest::{Client, Response};
use shared::ChatError;
use std::time::Duration;
use url::Url;

/// Build the HTTP client shared by [`chat::ChatClient`] and
/// [`endpoints::ApiClient`].
///
/// Only the connect phase has a timeout here; a streamed reply can run for
/// minutes. Plain JSON calls set a per-request timeout instead.
pub fn build_http_client() -> Result<Client, ChatError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(2)
        .build()
        .map_err(transport_error)
}

pub fn parse_base_url(base_url: &str) -> Result<Url, ChatError> {
    let url = Url::parse(base_url.trim())
        .map_err(|e| ChatError::InvalidUrl(format!("{}: {}", base_url, e)))?;
    if url.cannot_be_a_base() {
        return Err(ChatError::InvalidUrl(base_url.to_string()));
    }
    Ok(url)
}

/// Append path segments to the base URL, percent-encoding each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ChatError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ChatError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub(crate) fn transport_error(e: reqwest::Error) -> ChatError {
    ChatError::Transport(e.to_string())
}

/// Turn a non-2xx response into [`ChatError::Status`] with the start of the
/// body as detail.
pub(crate) async fn check_status(resp: Response) -> Result<Response, ChatError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let detail: String = body.chars().take(800).collect();
    tracing::warn!(status, "chat backend returned an error status");
    Err(ChatError::Status {
        status,
        detail: detail.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_segments() {
        let base = parse_base_url("http://localhost:8000").unwrap();
        let url = endpoint(&base, &["api", "conversations", "a b/c", "messages"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/conversations/a%20b%2Fc/messages"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = parse_base_url("https://example.com/chat/").unwrap();
        let url = endpoint(&base, &["api", "models"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/chat/api/models");
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(parse_base_url("mailto:someone@example.com").is_err());
        assert!(parse_base_url("not a url").is_err());
    }
}
