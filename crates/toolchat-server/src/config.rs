//! Server configuration from the environment

use std::time::Duration;

use toolchat_core::orchestrator::{DEFAULT_MAX_TURNS, OrchestratorConfig};
use toolchat_runtime::client::DEFAULT_TIMEOUT_SECS;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub system_prompt: Option<String>,
    pub max_turns: usize,
    pub http_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            system_prompt: None,
            max_turns: DEFAULT_MAX_TURNS,
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Read `BIND_ADDR`, `CHAT_SYSTEM_PROMPT`, `CHAT_MAX_TURNS` and
    /// `HTTP_TIMEOUT_SECS`; unset or invalid values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: lookup("BIND_ADDR")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.bind_addr),
            system_prompt: lookup("CHAT_SYSTEM_PROMPT").filter(|v| !v.trim().is_empty()),
            max_turns: parse_positive(&lookup, "CHAT_MAX_TURNS").unwrap_or(defaults.max_turns),
            http_timeout: parse_positive(&lookup, "HTTP_TIMEOUT_SECS")
                .map_or(defaults.http_timeout, Duration::from_secs),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            system_prompt: self.system_prompt.clone(),
            max_turns: self.max_turns,
        }
    }
}

fn parse_positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + Default + PartialOrd,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring invalid setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.max_turns, 5);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = config(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("CHAT_SYSTEM_PROMPT", "Be terse."),
            ("CHAT_MAX_TURNS", "0"),
            ("HTTP_TIMEOUT_SECS", "30"),
        ]);
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.orchestrator_config().system_prompt.as_deref(), Some("Be terse."));
        assert_eq!(config.max_turns, 5);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }
}
