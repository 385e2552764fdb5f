//! Client for the conversation store and model catalogue.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::api::{ConversationSummary, ModelInfo, Rating, ShareLink, StoredMessage};
use shared::ChatError;
use std::time::Duration;
use url::Url;

use crate::{check_status, endpoint, transport_error};

#[derive(Debug, Serialize)]
struct RateRequest {
    rating: Rating,
}

#[derive(Debug, Serialize)]
struct ModelPreferenceRequest<'a> {
    model_id: &'a str,
}

/// The backend wraps some lists in an object, older builds return a bare
/// array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "conversations", alias = "messages", alias = "models")]
        items: Vec<T>,
    },
}

impl<T> ListBody<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListBody::Bare(items) | ListBody::Wrapped { items } => items,
        }
    }
}

pub struct ApiClient {
    http: Client,
    base_url: Url,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(http: Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            timeout,
        }
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        let url = endpoint(&self.base_url, &["api", "conversations"])?;
        let body: ListBody<ConversationSummary> = self.fetch_json(self.http.get(url)).await?;
        Ok(body.into_vec())
    }

    pub async fn load_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, ChatError> {
        let url = endpoint(
            &self.base_url,
            &["api", "conversations", conversation_id, "messages"],
        )?;
        let body: ListBody<StoredMessage> = self.fetch_json(self.http.get(url)).await?;
        Ok(body.into_vec())
    }

    pub async fn rate_message(&self, message_id: &str, rating: Rating) -> Result<(), ChatError> {
        let url = endpoint(&self.base_url, &["api", "messages", message_id, "rate"])?;
        self.execute(self.http.post(url).json(&RateRequest { rating }))
            .await
    }

    pub async fn create_share_link(&self, conversation_id: &str) -> Result<ShareLink, ChatError> {
        let url = endpoint(
            &self.base_url,
            &["api", "conversations", conversation_id, "share"],
        )?;
        self.fetch_json(self.http.post(url)).await
    }

    pub async fn save_model_preference(&self, model_id: &str) -> Result<(), ChatError> {
        let url = endpoint(&self.base_url, &["api", "preferences", "model"])?;
        self.execute(self.http.put(url).json(&ModelPreferenceRequest { model_id }))
            .await
    }

    pub async fn reset_model_preference(&self) -> Result<(), ChatError> {
        let url = endpoint(&self.base_url, &["api", "preferences", "model"])?;
        self.execute(self.http.delete(url)).await
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ChatError> {
        let url = endpoint(&self.base_url, &["api", "models"])?;
        let body: ListBody<ModelInfo> = self.fetch_json(self.http.get(url)).await?;
        Ok(body.into_vec())
    }

    async fn execute(&self, req: RequestBuilder) -> Result<(), ChatError> {
        let resp = req
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp).await?;
        Ok(())
    }

    async fn fetch_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ChatError> {
        let resp = req
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp).await?;
        let bytes = resp.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&bytes).map_err(|e| ChatError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_http_client, parse_base_url};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(
            build_http_client().unwrap(),
            parse_base_url(&server.uri()).unwrap(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_list_conversations_wrapped_and_bare() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "conversations": [{"id": "c1", "title": "First"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "gpt-x", "supports_pdf": true}
            ])))
            .mount(&server)
            .await;

        let api = client(&server);
        let convs = api.list_conversations().await.unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].title, "First");

        let models = api.list_models().await.unwrap();
        assert_eq!(models[0].id, "gpt-x");
        assert!(models[0].supports_pdf);
    }

    #[tokio::test]
    async fn test_rate_and_preferences() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/messages/42/rate"))
            .and(body_json(json!({"rating": "up"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/preferences/model"))
            .and(body_json(json!({"model_id": "gpt-x"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/preferences/model"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let api = client(&server);
        api.rate_message("42", Rating::Up).await.unwrap();
        api.save_model_preference("gpt-x").await.unwrap();
        api.reset_model_preference().await.unwrap();
    }

    #[tokio::test]
    async fn test_share_link_and_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/conversations/c1/share"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"url": "https://x/s/abc"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/conversations/missing/messages"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let api = client(&server);
        let link = api.create_share_link("c1").await.unwrap();
        assert_eq!(link.url, "https://x/s/abc");

        match api.load_messages("missing").await {
            Err(ChatError::Status { status, detail }) => {
                assert_eq!(status, 404);
                assert_eq!(detail, "not found");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }
}
