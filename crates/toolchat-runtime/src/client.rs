//! HTTP-backed LLM provider
//!
//! Implementation of `LlmProvider` over reqwest, dispatching to the adapter
//! registered for each call's provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use toolchat_core::{
    error::{ChatError, Result},
    provider::{Completion, CompletionRequest, DebugEnvelope, LlmProvider, ProviderConfig, ProviderId},
};
use tracing::{debug, warn};
use url::Url;

use crate::http::{parse_json, read_body, transport_error};
use crate::providers::{AuthPlacement, ProviderAdapter, adapter_for};

/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Provider client shared by every session
#[derive(Clone, Debug)]
pub struct HttpProvider {
    client: reqwest::Client,
}

impl HttpProvider {
    /// Create a provider whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// The underlying client, for sharing its connection pool
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    fn request(
        &self,
        method: reqwest::Method,
        mut url: Url,
        adapter: &dyn ProviderAdapter,
        auth: &AuthPlacement,
    ) -> reqwest::RequestBuilder {
        auth.apply_to_url(&mut url);
        let mut builder = self.client.request(method, url).header(ACCEPT, "application/json");
        if let Some(token) = auth.bearer() {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in adapter.extra_headers() {
            builder = builder.header(*name, *value);
        }
        builder
    }

    async fn fetch_models(
        &self,
        adapter: &dyn ProviderAdapter,
        credential: &str,
        base_url: Option<&str>,
    ) -> Result<Vec<String>> {
        let url = adapter.models_endpoint(base_url)?;
        let auth = adapter.auth(credential);
        let response = self
            .request(reqwest::Method::GET, url, adapter, &auth)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let body = parse_json(&read_body(response).await?)?;
        adapter
            .parse_models(&body)
            .ok_or_else(|| ChatError::malformed("unrecognized model list shape"))
    }
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::with_client(reqwest::Client::new())
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn complete(
        &self,
        config: &ProviderConfig,
        request: &CompletionRequest<'_>,
    ) -> Result<Completion> {
        config.validate()?;

        let adapter = adapter_for(config.provider);
        let url = adapter.resolve_endpoint(&config.model, config.base_url())?;
        let payload = adapter.build_request(&config.model, request)?;
        let auth = adapter.auth(&config.credential);

        debug!(
            provider = %config.provider,
            model = %config.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .request(reqwest::Method::POST, url, adapter, &auth)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let body = read_body(response).await?;
        debug!(provider = %config.provider, bytes = body.len(), "Received completion response");

        let raw: Value = parse_json(&body)?;
        let parsed = adapter.parse_response(&raw)?;

        Ok(Completion {
            response: parsed,
            debug: DebugEnvelope {
                provider: config.provider,
                model: config.model.clone(),
                request: payload,
                response: raw,
            },
        })
    }

    async fn list_models(
        &self,
        provider: ProviderId,
        credential: &str,
        base_url: Option<&str>,
    ) -> Vec<String> {
        let adapter = adapter_for(provider);
        match self.fetch_models(adapter, credential, base_url).await {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => fallback(adapter),
            Err(err) => {
                warn!(%provider, error = %err, "Model discovery failed, using fallback list");
                fallback(adapter)
            }
        }
    }
}

fn fallback(adapter: &dyn ProviderAdapter) -> Vec<String> {
    adapter.fallback_models().iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolchat_core::error::ErrorKind;
    use toolchat_core::message::Message;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(messages: &[Message]) -> CompletionRequest<'_> {
        CompletionRequest {
            system_prompt: Some("Be brief."),
            messages,
            tools: &[],
        }
    }

    #[tokio::test]
    async fn test_complete_openai_compatible() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "llama3"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "4"}}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ProviderConfig::new(ProviderId::Custom, "sk-test", "llama3").with_endpoint(format!("{}/v1", server.uri()));
        let history = [Message::user("2+2?")];
        let completion = HttpProvider::default().complete(&config, &request(&history)).await.unwrap();

        assert_eq!(completion.response.text, "4");
        assert_eq!(completion.response.usage.unwrap().total_tokens, 4);
        assert_eq!(completion.debug.request["messages"][0]["role"], "system");
        assert_eq!(completion.debug.response["choices"][0]["message"]["content"], "4");
    }

    #[tokio::test]
    async fn test_complete_gemini_uses_query_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [
                    {"functionCall": {"name": "search", "args": {"q": "x"}}}
                ]}}]
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new(ProviderId::Gemini, "g-key", "gemini-1.5-flash").with_endpoint(server.uri());
        let history = [Message::user("find x")];
        let completion = HttpProvider::default().complete(&config, &request(&history)).await.unwrap();

        let call = &completion.response.tool_calls[0];
        assert_eq!(call.name, "search");
        assert!(!call.id.is_empty());
        assert!(!completion.debug.request.to_string().contains("g-key"));

        let received = server.received_requests().await.unwrap();
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new(ProviderId::Custom, "bad", "m").with_endpoint(server.uri());
        let history = [Message::user("hi")];
        let err = HttpProvider::default().complete(&config, &request(&history)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.user_message().contains("Incorrect API key provided"));
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_request() {
        let server = MockServer::start().await;
        let config = ProviderConfig::new(ProviderId::OpenAi, "", "gpt-4o").with_endpoint(server.uri());
        let history = [Message::user("hi")];

        let err = HttpProvider::default().complete(&config, &request(&history)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let config = ProviderConfig::new(ProviderId::Custom, "", "m").with_endpoint("http://127.0.0.1:9");
        let history = [Message::user("hi")];

        let err = HttpProvider::default().complete(&config, &request(&history)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_list_models_discovers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "gpt-4o"}, {"id": "o1-mini"}]
            })))
            .mount(&server)
            .await;

        let models = HttpProvider::default()
            .list_models(ProviderId::OpenAi, "sk-test", Some(&server.uri()))
            .await;
        assert_eq!(models, vec!["gpt-4o", "o1-mini"]);
    }

    #[tokio::test]
    async fn test_list_models_falls_back_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let models = HttpProvider::default()
            .list_models(ProviderId::Groq, "k", Some(&server.uri()))
            .await;
        assert_eq!(models, fallback(adapter_for(ProviderId::Groq)));
    }

    #[tokio::test]
    async fn test_list_models_falls_back_on_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let provider = HttpProvider::default();
        let gemini = provider.list_models(ProviderId::Gemini, "k", Some(&server.uri())).await;
        assert_eq!(gemini, fallback(adapter_for(ProviderId::Gemini)));

        let custom = provider.list_models(ProviderId::Custom, "", Some(&server.uri())).await;
        assert!(custom.is_empty());
    }
}
