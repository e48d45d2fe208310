//! OpenAI-compatible adapter (OpenAI, OpenRouter, Groq, Mistral, DeepSeek, custom)

use serde_json::Value;
use toolchat_core::provider::ProviderId;

use super::{AuthPlacement, ProviderAdapter};

/// One adapter value per provider of the OpenAI-compatible family
#[derive(Clone, Copy, Debug)]
pub struct OpenAiCompatibleAdapter {
    provider: ProviderId,
}

impl OpenAiCompatibleAdapter {
    pub const fn new(provider: ProviderId) -> Self {
        Self { provider }
    }
}

impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn id(&self) -> ProviderId {
        self.provider
    }

    fn default_base_url(&self) -> Option<&'static str> {
        match self.provider {
            ProviderId::OpenAi => Some("https://api.openai.com/v1"),
            ProviderId::OpenRouter => Some("https://openrouter.ai/api/v1"),
            ProviderId::Groq => Some("https://api.groq.com/openai/v1"),
            ProviderId::Mistral => Some("https://api.mistral.ai/v1"),
            ProviderId::DeepSeek => Some("https://api.deepseek.com"),
            ProviderId::Gemini | ProviderId::Custom => None,
        }
    }

    fn chat_url(&self, base: &str, _model: &str) -> String {
        format!("{base}/chat/completions")
    }

    fn auth(&self, credential: &str) -> AuthPlacement {
        let credential = credential.trim();
        if credential.is_empty() {
            AuthPlacement::None
        } else {
            AuthPlacement::Bearer(credential.to_string())
        }
    }

    /// `{data: [{id}]}`, or a bare `[{id}]` array from some self-hosted servers
    fn parse_models(&self, body: &Value) -> Option<Vec<String>> {
        let entries = body.get("data").unwrap_or(body).as_array()?;
        Some(
            entries
                .iter()
                .filter_map(|entry| entry.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
        )
    }

    fn fallback_models(&self) -> &'static [&'static str] {
        match self.provider {
            ProviderId::OpenAi => &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"],
            ProviderId::OpenRouter => &[
                "openai/gpt-4o-mini",
                "anthropic/claude-3.5-sonnet",
                "google/gemini-flash-1.5",
                "meta-llama/llama-3.1-70b-instruct",
            ],
            ProviderId::Groq => &[
                "llama-3.3-70b-versatile",
                "llama-3.1-8b-instant",
                "mixtral-8x7b-32768",
                "gemma2-9b-it",
            ],
            ProviderId::Mistral => &[
                "mistral-large-latest",
                "mistral-small-latest",
                "open-mistral-nemo",
                "codestral-latest",
            ],
            ProviderId::DeepSeek => &["deepseek-chat", "deepseek-reasoner"],
            ProviderId::Gemini | ProviderId::Custom => &[],
        }
    }

    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        match self.provider {
            ProviderId::OpenRouter => &[("HTTP-Referer", "https://github.com/your-org/toolchat"), ("X-Title", "toolchat")],
            _ => &[],
        }
    }
}
