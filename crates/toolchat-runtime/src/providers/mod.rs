//! Provider Adapter Registry
//!
//! One [`ProviderAdapter`] per wire family, selected by [`adapter_for`].
//! Adapters own the per-provider network concerns (endpoint, auth placement,
//! model discovery shape and fallbacks) and delegate payload translation to
//! `toolchat_core::wire`.

mod gemini;
mod openai;

pub use gemini::GeminiAdapter;
pub use openai::OpenAiCompatibleAdapter;

use serde_json::Value;
use toolchat_core::error::{FailureSignal, Result};
use toolchat_core::provider::{CompletionRequest, ParsedResponse, ProviderId};
use toolchat_core::wire;
use url::Url;

use crate::http::parse_url;

/// Where the credential goes on an outbound request
#[derive(Clone, PartialEq, Eq)]
pub enum AuthPlacement {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// Query parameter, no auth header
    Query { name: &'static str, value: String },
    None,
}

impl AuthPlacement {
    /// Append a query credential to `url`; header placements are left to the caller
    pub fn apply_to_url(&self, url: &mut Url) {
        if let Self::Query { name, value } = self {
            url.query_pairs_mut().append_pair(name, value);
        }
    }

    pub fn bearer(&self) -> Option<&str> {
        match self {
            Self::Bearer(token) => Some(token),
            Self::Query { .. } | Self::None => None,
        }
    }
}

impl std::fmt::Debug for AuthPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::Query { name, .. } => write!(f, "Query({name}=<redacted>)"),
            Self::None => f.write_str("None"),
        }
    }
}

/// Per-provider network strategy
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Base URL used when the caller gives no override
    fn default_base_url(&self) -> Option<&'static str>;

    /// Chat endpoint for `model` under `base`
    fn chat_url(&self, base: &str, model: &str) -> String;

    fn auth(&self, credential: &str) -> AuthPlacement;

    /// Model ids from a discovery response, or `None` if the shape is unknown
    fn parse_models(&self, body: &Value) -> Option<Vec<String>>;

    fn fallback_models(&self) -> &'static [&'static str];

    /// Extra static headers sent with every request
    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Override when present, else the provider default
    fn base_url(&self, override_base_url: Option<&str>) -> Result<String> {
        override_base_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .or_else(|| self.default_base_url())
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| FailureSignal::MissingConfig(format!("base URL for {}", self.id())).into())
    }

    fn resolve_endpoint(&self, model: &str, override_base_url: Option<&str>) -> Result<Url> {
        let base = self.base_url(override_base_url)?;
        parse_url(&self.chat_url(&base, model))
    }

    fn models_endpoint(&self, override_base_url: Option<&str>) -> Result<Url> {
        let base = self.base_url(override_base_url)?;
        parse_url(&format!("{base}/models"))
    }

    fn build_request(&self, model: &str, request: &CompletionRequest<'_>) -> Result<Value> {
        wire::to_wire(self.id(), model, request)
    }

    fn parse_response(&self, raw: &Value) -> Result<ParsedResponse> {
        wire::from_wire(self.id(), raw)
    }
}

static OPENAI: OpenAiCompatibleAdapter = OpenAiCompatibleAdapter::new(ProviderId::OpenAi);
static OPENROUTER: OpenAiCompatibleAdapter = OpenAiCompatibleAdapter::new(ProviderId::OpenRouter);
static GROQ: OpenAiCompatibleAdapter = OpenAiCompatibleAdapter::new(ProviderId::Groq);
static MISTRAL: OpenAiCompatibleAdapter = OpenAiCompatibleAdapter::new(ProviderId::Mistral);
static DEEPSEEK: OpenAiCompatibleAdapter = OpenAiCompatibleAdapter::new(ProviderId::DeepSeek);
static CUSTOM: OpenAiCompatibleAdapter = OpenAiCompatibleAdapter::new(ProviderId::Custom);
static GEMINI: GeminiAdapter = GeminiAdapter;

/// Adapter for `provider`
pub fn adapter_for(provider: ProviderId) -> &'static dyn ProviderAdapter {
    match provider {
        ProviderId::OpenAi => &OPENAI,
        ProviderId::OpenRouter => &OPENROUTER,
        ProviderId::Groq => &GROQ,
        ProviderId::Mistral => &MISTRAL,
        ProviderId::DeepSeek => &DEEPSEEK,
        ProviderId::Gemini => &GEMINI,
        ProviderId::Custom => &CUSTOM,
    }
}

/// Chat endpoint for `provider`
pub fn resolve_endpoint(provider: ProviderId, model: &str, override_base_url: Option<&str>) -> Result<Url> {
    adapter_for(provider).resolve_endpoint(model, override_base_url)
}

/// Credential placement for `provider`
pub fn build_auth(provider: ProviderId, credential: &str) -> AuthPlacement {
    adapter_for(provider).auth(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolchat_core::error::ErrorKind;

    #[test]
    fn test_resolve_fixed_endpoints() {
        let url = resolve_endpoint(ProviderId::Groq, "llama3", None).unwrap();
        assert_eq!(url.as_str(), "https://api.groq.com/openai/v1/chat/completions");

        let url = resolve_endpoint(ProviderId::Gemini, "gemini-1.5-flash", None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_custom_needs_override() {
        let err = resolve_endpoint(ProviderId::Custom, "llama3", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let url = resolve_endpoint(ProviderId::Custom, "llama3", Some("http://localhost:8080/v1/")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v1/chat/completions");

        let err = resolve_endpoint(ProviderId::Custom, "llama3", Some("not a url")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_auth_placement() {
        assert_eq!(build_auth(ProviderId::OpenAi, "sk-1").bearer(), Some("sk-1"));
        assert_eq!(build_auth(ProviderId::Custom, ""), AuthPlacement::None);

        let auth = build_auth(ProviderId::Gemini, "g-key");
        assert!(auth.bearer().is_none());
        let mut url = Url::parse("https://example.test/x").unwrap();
        auth.apply_to_url(&mut url);
        assert_eq!(url.query(), Some("key=g-key"));
        assert!(!format!("{auth:?}").contains("g-key"));
    }
}
