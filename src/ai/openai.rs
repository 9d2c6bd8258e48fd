use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Provider, Role, DEFAULT_OPENAI_MODEL};

use super::chat::{api_error, empty_response, ChatRequest, MAX_OUTPUT_TOKENS, TEMPERATURE};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<CompletionMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompletionMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn completion_message(role: &str, content: &str) -> CompletionMessage {
    CompletionMessage {
        role: role.to_string(),
        content: Some(content.to_string()),
    }
}

pub(super) async fn generate(
    client: &Client,
    api_url: &str,
    request: &ChatRequest,
    system_prompt: &str,
) -> Result<String> {
    let mut messages = vec![completion_message("system", system_prompt)];
    messages.extend(request.messages.iter().map(|turn| {
        let role = match turn.role {
            Role::User => "user",
            Role::Ai => "assistant",
        };
        completion_message(role, &turn.content)
    }));

    let body = ChatCompletionRequest {
        model: request.model_or(DEFAULT_OPENAI_MODEL),
        messages,
        temperature: TEMPERATURE,
        max_tokens: MAX_OUTPUT_TOKENS,
    };

    let response = client
        .post(api_url)
        .bearer_auth(&request.api_key)
        .json(&body)
        .send()
        .await?;

    let data: ChatCompletionResponse = response.json().await?;
    if let Some(error) = data.error {
        return Err(api_error(Provider::OpenAi, error.message));
    }

    data.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| empty_response(Provider::OpenAi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::chat::ChatTurn;
    use crate::ai::test_support::serve_once;

    fn request() -> ChatRequest {
        ChatRequest {
            provider: Provider::OpenAi,
            api_key: "sk-test".to_string(),
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatTurn {
                role: Role::User,
                content: "Hi".to_string(),
            }],
            sources: vec![],
        }
    }

    #[tokio::test]
    async fn test_first_choice_is_returned() {
        let base = serve_once(
            "200 OK",
            r#"{"id":"c1","choices":[{"index":0,"message":{"role":"assistant","content":"Hello there"},"finish_reason":"stop"}]}"#,
        )
        .await;
        let reply = generate(&Client::new(), &base, &request(), "system").await.unwrap();
        assert_eq!(reply, "Hello there");
    }

    #[tokio::test]
    async fn test_error_body_is_api_error() {
        let base = serve_once(
            "429 Too Many Requests",
            r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#,
        )
        .await;
        let err = generate(&Client::new(), &base, &request(), "system").await.unwrap_err();
        assert_eq!(err.to_string(), "OpenAI API Error: Rate limit reached");
    }
}
