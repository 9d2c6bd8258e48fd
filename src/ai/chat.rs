use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Message, Provider, Role, Settings, Source};

use super::{claude, gemini, openai};

pub(crate) const TEMPERATURE: f64 = 0.1;
pub(crate) const MAX_OUTPUT_TOKENS: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub sources: Vec<SourceContext>,
}

impl ChatRequest {
    /// A request for the active provider over a notebook's transcript and sources.
    pub fn for_notebook(settings: &Settings, messages: &[Message], sources: &[Source]) -> Self {
        Self {
            provider: settings.selected_provider,
            api_key: settings.active_api_key().to_string(),
            model: settings.active_model().to_string(),
            messages: messages
                .iter()
                .map(|m| ChatTurn {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
            sources: sources
                .iter()
                .map(|s| SourceContext {
                    name: s.name.clone(),
                    content: s.content.clone(),
                })
                .collect(),
        }
    }

    pub(crate) fn model_or(&self, default: &str) -> String {
        if self.model.trim().is_empty() {
            default.to_string()
        } else {
            self.model.clone()
        }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Produce the assistant reply. Never fails: any error is returned as
    /// text so it can be stored in the transcript like a normal reply.
    async fn generate(&self, request: &ChatRequest) -> String;
}

pub fn build_system_prompt(sources: &[SourceContext]) -> String {
    let context = if sources.is_empty() {
        "No sources provided.".to_string()
    } else {
        sources
            .iter()
            .map(|s| format!("--- SOURCE: {} ---\n{}", s.name, s.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        r#"You are a helpful research assistant. Use the following sources to answer the user's question.
Answer based ONLY on the provided context. If the answer is not in the sources, say you don't know based on the current sources.

SOURCES:
{context}

END OF SOURCES"#
    )
}

/// HTTP client for the supported LLM vendors.
pub struct GroundedChat {
    client: Client,
    gemini_api_url: String,
    claude_api_url: String,
    openai_api_url: String,
}

impl GroundedChat {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            gemini_api_url: config.gemini_api_url.clone(),
            claude_api_url: config.claude_api_url.clone(),
            openai_api_url: config.openai_api_url.clone(),
        })
    }

    async fn try_generate(&self, request: &ChatRequest) -> Result<String> {
        let system_prompt = build_system_prompt(&request.sources);
        match request.provider {
            Provider::Gemini => {
                gemini::generate(&self.client, &self.gemini_api_url, request, &system_prompt).await
            }
            Provider::Claude => {
                claude::generate(&self.client, &self.claude_api_url, request, &system_prompt).await
            }
            Provider::OpenAi => {
                openai::generate(&self.client, &self.openai_api_url, request, &system_prompt).await
            }
        }
    }
}

#[async_trait]
impl ChatBackend for GroundedChat {
    async fn generate(&self, request: &ChatRequest) -> String {
        if request.api_key.trim().is_empty() {
            return format!(
                "Error: No API key provided for {}. Please check your settings.",
                request.provider
            );
        }

        match self.try_generate(request).await {
            Ok(text) => text,
            Err(AppError::LlmApi(message)) => {
                tracing::warn!("{}", message);
                message
            }
            Err(AppError::Http(e)) => {
                tracing::error!("Chat request to {} failed: {}", request.provider, e);
                format!("Fetch Error: {}", e)
            }
            Err(e) => {
                tracing::error!("Chat request to {} failed: {}", request.provider, e);
                format!("Error: {}", e)
            }
        }
    }
}

/// Error text for a provider that answered without any usable text.
pub(crate) fn empty_response(provider: Provider) -> AppError {
    AppError::LlmApi(format!(
        "{} Error: No response generated. Check your API key and model permissions.",
        provider.display_name()
    ))
}

pub(crate) fn api_error(provider: Provider, message: impl std::fmt::Display) -> AppError {
    AppError::LlmApi(format!("{} API Error: {}", provider.display_name(), message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::test_support::serve_once;

    fn request(provider: Provider, api_key: &str) -> ChatRequest {
        ChatRequest {
            provider,
            api_key: api_key.to_string(),
            model: String::new(),
            messages: vec![ChatTurn {
                role: Role::User,
                content: "What does the paper claim?".to_string(),
            }],
            sources: vec![SourceContext {
                name: "paper.txt".to_string(),
                content: "Water boils at 100C.".to_string(),
            }],
        }
    }

    fn config_for(base_url: &str) -> Config {
        Config {
            gemini_api_url: base_url.to_string(),
            claude_api_url: format!("{base_url}/v1/messages"),
            openai_api_url: format!("{base_url}/v1/chat/completions"),
            request_timeout_secs: 5,
            ..Config::default()
        }
    }

    #[test]
    fn test_system_prompt_lists_sources() {
        let prompt = build_system_prompt(&[
            SourceContext {
                name: "a.txt".to_string(),
                content: "Alpha".to_string(),
            },
            SourceContext {
                name: "b.md".to_string(),
                content: "Beta".to_string(),
            },
        ]);
        assert!(prompt.contains("--- SOURCE: a.txt ---\nAlpha\n\n--- SOURCE: b.md ---\nBeta"));
        assert!(prompt.contains("Answer based ONLY on the provided context."));
        assert!(prompt.trim_end().ends_with("END OF SOURCES"));
    }

    #[test]
    fn test_system_prompt_without_sources() {
        assert!(build_system_prompt(&[]).contains("No sources provided."));
    }

    #[test]
    fn test_request_for_notebook_uses_active_provider() {
        let mut settings = Settings::default();
        settings.selected_provider = Provider::Claude;
        settings.api_keys.set(Provider::Claude, "sk-ant");

        let request = ChatRequest::for_notebook(&settings, &[], &[]);
        assert_eq!(request.provider, Provider::Claude);
        assert_eq!(request.api_key, "sk-ant");
        assert_eq!(request.model, crate::models::DEFAULT_CLAUDE_MODEL);
    }

    #[tokio::test]
    async fn test_missing_api_key_short_circuits() {
        let chat = GroundedChat::new(&config_for("http://127.0.0.1:9")).unwrap();
        let reply = chat.generate(&request(Provider::OpenAi, "")).await;
        assert_eq!(
            reply,
            "Error: No API key provided for openai. Please check your settings."
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_becomes_text() {
        let chat = GroundedChat::new(&config_for("http://127.0.0.1:9")).unwrap();
        let reply = chat.generate(&request(Provider::Gemini, "key")).await;
        assert!(reply.starts_with("Fetch Error:"), "unexpected reply: {reply}");
    }

    #[tokio::test]
    async fn test_provider_error_is_returned_as_text() {
        let base = serve_once(
            "400 Bad Request",
            r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#,
        )
        .await;
        let chat = GroundedChat::new(&config_for(&base)).unwrap();
        let reply = chat.generate(&request(Provider::Gemini, "bad-key")).await;
        assert_eq!(reply, "Gemini API Error: API key not valid.");
    }
}
