//! Gemini adapter
//!
//! The model id is part of the URL path and the key travels as a query
//! parameter; no auth header is sent.

use serde_json::Value;
use toolchat_core::provider::ProviderId;

use super::{AuthPlacement, ProviderAdapter};

const GENERATE_CONTENT: &str = "generateContent";

#[derive(Clone, Copy, Debug, Default)]
pub struct GeminiAdapter;

impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn default_base_url(&self) -> Option<&'static str> {
        Some("https://generativelanguage.googleapis.com/v1beta")
    }

    fn chat_url(&self, base: &str, model: &str) -> String {
        let model = model.trim().trim_start_matches("models/");
        format!("{base}/models/{model}:{GENERATE_CONTENT}")
    }

    fn auth(&self, credential: &str) -> AuthPlacement {
        AuthPlacement::Query {
            name: "key",
            value: credential.trim().to_string(),
        }
    }

    /// `{models: [{name: "models/…", supportedGenerationMethods}]}`
    fn parse_models(&self, body: &Value) -> Option<Vec<String>> {
        let entries = body.get("models")?.as_array()?;
        Some(
            entries
                .iter()
                .filter(|entry| {
                    entry
                        .get("supportedGenerationMethods")
                        .and_then(Value::as_array)
                        .is_some_and(|methods| methods.iter().any(|m| m.as_str() == Some(GENERATE_CONTENT)))
                })
                .filter_map(|entry| entry.get("name").and_then(Value::as_str))
                .map(|name| name.strip_prefix("models/").unwrap_or(name).to_string())
                .collect(),
        )
    }

    fn fallback_models(&self) -> &'static [&'static str] {
        &["gemini-2.0-flash", "gemini-1.5-pro", "gemini-1.5-flash"]
    }
}
