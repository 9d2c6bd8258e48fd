use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Provider, Role, DEFAULT_CLAUDE_MODEL};

use super::chat::{api_error, empty_response, ChatRequest, MAX_OUTPUT_TOKENS, TEMPERATURE};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub(super) async fn generate(
    client: &Client,
    api_url: &str,
    request: &ChatRequest,
    system_prompt: &str,
) -> Result<String> {
    let body = MessageRequest {
        model: request.model_or(DEFAULT_CLAUDE_MODEL),
        max_tokens: MAX_OUTPUT_TOKENS,
        temperature: TEMPERATURE,
        messages: request
            .messages
            .iter()
            .map(|turn| Message {
                role: match turn.role {
                    Role::User => "user",
                    Role::Ai => "assistant",
                },
                content: turn.content.clone(),
            })
            .collect(),
        system: Some(system_prompt.to_string()),
    };

    let response = client
        .post(api_url)
        .header("x-api-key", &request.api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        let message = serde_json::from_str::<ErrorResponse>(&error_text)
            .map(|e| e.error.message)
            .unwrap_or(error_text);
        return Err(api_error(Provider::Claude, message));
    }

    let message_response: MessageResponse = response.json().await?;

    let reply = message_response
        .content
        .into_iter()
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");

    if reply.is_empty() {
        return Err(empty_response(Provider::Claude));
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::chat::ChatTurn;
    use crate::ai::test_support::serve_once;

    fn request() -> ChatRequest {
        ChatRequest {
            provider: Provider::Claude,
            api_key: "sk-ant".to_string(),
            model: String::new(),
            messages: vec![ChatTurn {
                role: Role::User,
                content: "Summarize".to_string(),
            }],
            sources: vec![],
        }
    }

    #[tokio::test]
    async fn test_text_blocks_are_joined() {
        let base = serve_once(
            "200 OK",
            r#"{"content":[{"type":"text","text":"First."},{"type":"text","text":"Second."}]}"#,
        )
        .await;
        let reply = generate(&Client::new(), &base, &request(), "system").await.unwrap();
        assert_eq!(reply, "First.\nSecond.");
    }

    #[tokio::test]
    async fn test_error_status_uses_error_message() {
        let base = serve_once(
            "401 Unauthorized",
            r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
        )
        .await;
        let err = generate(&Client::new(), &base, &request(), "system").await.unwrap_err();
        assert_eq!(err.to_string(), "Claude API Error: invalid x-api-key");
    }
}
