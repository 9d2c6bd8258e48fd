use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const API_KEYS_KEY: &str = "apiKeys";
pub const SELECTED_MODELS_KEY: &str = "selectedModels";
pub const SELECTED_PROVIDER_KEY: &str = "selectedProvider";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    OpenAi,
    Claude,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::Claude => "claude",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::OpenAi => "OpenAI",
            Provider::Claude => "Claude",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown provider: {0}")]
pub struct ParseProviderError(String);

impl FromStr for Provider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gemini" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            "claude" => Ok(Provider::Claude),
            other => Err(ParseProviderError(other.to_string())),
        }
    }
}

/// API keys per provider, stored JSON-encoded under `apiKeys`.
/// A missing provider decodes to an empty key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub gemini: String,
    pub openai: String,
    pub claude: String,
}

impl ApiKeys {
    pub fn get(&self, provider: Provider) -> &str {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::OpenAi => &self.openai,
            Provider::Claude => &self.claude,
        }
    }

    pub fn set(&mut self, provider: Provider, key: impl Into<String>) {
        let key = key.into();
        match provider {
            Provider::Gemini => self.gemini = key,
            Provider::OpenAi => self.openai = key,
            Provider::Claude => self.claude = key,
        }
    }
}

/// Selected model per provider, stored JSON-encoded under `selectedModels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSelection {
    pub gemini: String,
    pub openai: String,
    pub claude: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            gemini: DEFAULT_GEMINI_MODEL.to_string(),
            openai: DEFAULT_OPENAI_MODEL.to_string(),
            claude: DEFAULT_CLAUDE_MODEL.to_string(),
        }
    }
}

impl ModelSelection {
    pub fn get(&self, provider: Provider) -> &str {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::OpenAi => &self.openai,
            Provider::Claude => &self.claude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Settings {
    pub api_keys: ApiKeys,
    pub models: ModelSelection,
    pub selected_provider: Provider,
}

impl Settings {
    pub fn active_api_key(&self) -> &str {
        self.api_keys.get(self.selected_provider)
    }

    pub fn active_model(&self) -> &str {
        self.models.get(self.selected_provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_model_json_keeps_other_defaults() {
        let models: ModelSelection = serde_json::from_str(r#"{"openai":"gpt-4o-mini"}"#).unwrap();
        assert_eq!(models.openai, "gpt-4o-mini");
        assert_eq!(models.gemini, DEFAULT_GEMINI_MODEL);
        assert_eq!(models.claude, DEFAULT_CLAUDE_MODEL);
    }

    #[test]
    fn test_provider_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Provider::OpenAi).unwrap(), "\"openai\"");
        assert_eq!("claude".parse::<Provider>().unwrap(), Provider::Claude);
    }
}
