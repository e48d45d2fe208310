//! LLM Provider Strategy Pattern
//!
//! Defines the provider identifiers, the immutable per-call configuration and
//! the `LlmProvider` trait the orchestration loop talks to. Concrete network
//! implementations live in `toolchat-runtime`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use toolchat_core::provider::{CompletionRequest, LlmProvider, ProviderConfig, ProviderId};
//!
//! let config = ProviderConfig::new(ProviderId::OpenAi, api_key, "gpt-4o-mini");
//! let completion = provider.complete(&config, &request).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, FailureSignal, Result};
use crate::message::{Message, ToolCall};
use crate::tool::ToolDefinition;

/// Supported provider backends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    OpenRouter,
    Groq,
    Mistral,
    DeepSeek,
    Gemini,
    /// Self-hosted OpenAI-compatible server at a caller-supplied base URL
    Custom,
}

/// Wire protocol family a provider speaks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// `{model, messages[], tools?}` → `{choices[0].message}`
    OpenAiCompatible,
    /// `{contents[], systemInstruction?}` → `{candidates[0].content.parts}`
    Gemini,
}

impl ProviderId {
    pub const ALL: [Self; 7] = [
        Self::OpenAi,
        Self::OpenRouter,
        Self::Groq,
        Self::Mistral,
        Self::DeepSeek,
        Self::Gemini,
        Self::Custom,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Groq => "groq",
            Self::Mistral => "mistral",
            Self::DeepSeek => "deepseek",
            Self::Gemini => "gemini",
            Self::Custom => "custom",
        }
    }

    pub const fn wire_format(self) -> WireFormat {
        match self {
            Self::Gemini => WireFormat::Gemini,
            _ => WireFormat::OpenAiCompatible,
        }
    }

    /// Providers whose responses carry generated images outside the text
    pub const fn embeds_response_images(self) -> bool {
        matches!(self, Self::OpenRouter | Self::Gemini)
    }

    /// Custom servers are commonly unauthenticated
    pub const fn requires_credential(self) -> bool {
        !matches!(self, Self::Custom)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ChatError::Configuration(format!("Unknown provider '{s}'")))
    }
}

/// Provider settings for one orchestration call.
///
/// Passed by reference into every call and never mutated.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderId,

    #[serde(default)]
    pub credential: String,

    pub model: String,

    /// Base URL replacing the provider default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_override: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider: ProviderId, credential: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider,
            credential: credential.into(),
            model: model.into(),
            endpoint_override: None,
        }
    }

    pub fn with_endpoint(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint_override = Some(base_url.into());
        self
    }

    /// Override, ignoring blank values
    pub fn base_url(&self) -> Option<&str> {
        self.endpoint_override
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Reject configurations that cannot produce a request
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(FailureSignal::MissingConfig(format!("model for {}", self.provider)).into());
        }
        if self.provider.requires_credential() && self.credential.trim().is_empty() {
            return Err(FailureSignal::MissingConfig(format!("API key for {}", self.provider)).into());
        }
        if self.provider == ProviderId::Custom && self.base_url().is_none() {
            return Err(FailureSignal::MissingConfig("base URL for the custom provider".into()).into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("credential", &if self.credential.is_empty() { "" } else { "<redacted>" })
            .field("model", &self.model)
            .field("endpoint_override", &self.endpoint_override)
            .finish()
    }
}

/// Token usage statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Request and raw response behind an emitted message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebugEnvelope {
    pub provider: ProviderId,
    pub model: String,
    /// Payload as sent, credentials excluded
    pub request: serde_json::Value,
    /// Body as received
    pub response: serde_json::Value,
}

impl DebugEnvelope {
    /// Envelope for a path that never reached the provider
    pub fn unsent(config: &ProviderConfig) -> Self {
        Self {
            provider: config.provider,
            model: config.model.clone(),
            request: serde_json::Value::Null,
            response: serde_json::Value::Null,
        }
    }
}

/// Provider response reduced to canonical fields
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
    /// Generated-image URLs (OpenRouter and Gemini only)
    pub images: Vec<String>,
}

/// Everything one provider round trip produced
#[derive(Clone, Debug)]
pub struct Completion {
    pub response: ParsedResponse,
    pub debug: DebugEnvelope,
}

/// Input for one provider round trip
#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
    pub system_prompt: Option<&'a str>,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
}

/// Strategy trait for LLM providers
///
/// The orchestration loop works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one round trip against the provider named in `config`
    async fn complete(
        &self,
        config: &ProviderConfig,
        request: &CompletionRequest<'_>,
    ) -> Result<Completion>;

    /// Discover model ids.
    ///
    /// Never fails: implementations fall back to a static list.
    async fn list_models(
        &self,
        provider: ProviderId,
        credential: &str,
        base_url: Option<&str>,
    ) -> Vec<String>;
}
