use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Provider, Role, DEFAULT_GEMINI_MODEL};

use super::chat::{api_error, empty_response, ChatRequest, MAX_OUTPUT_TOKENS, TEMPERATURE};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn text_content(role: Option<&str>, text: String) -> Content {
    Content {
        role: role.map(str::to_string),
        parts: vec![Part { text: Some(text) }],
    }
}

pub(super) async fn generate(
    client: &Client,
    base_url: &str,
    request: &ChatRequest,
    system_prompt: &str,
) -> Result<String> {
    let model = request.model_or(DEFAULT_GEMINI_MODEL);
    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model
    );

    let body = GenerateContentRequest {
        contents: request
            .messages
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Ai => "model",
                };
                text_content(Some(role), turn.content.clone())
            })
            .collect(),
        system_instruction: text_content(None, system_prompt.to_string()),
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    };

    let response = client
        .post(&url)
        .query(&[("key", request.api_key.as_str())])
        .json(&body)
        .send()
        .await?;

    // Gemini reports failures in the JSON body alongside a non-2xx status.
    let data: GenerateContentResponse = response.json().await?;
    if let Some(error) = data.error {
        return Err(api_error(Provider::Gemini, error.message));
    }

    let text = data
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|text| !text.is_empty());

    text.ok_or_else(|| empty_response(Provider::Gemini))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::chat::ChatTurn;
    use crate::ai::test_support::serve_once;

    fn request() -> ChatRequest {
        ChatRequest {
            provider: Provider::Gemini,
            api_key: "key".to_string(),
            model: "gemini-test".to_string(),
            messages: vec![
                ChatTurn {
                    role: Role::User,
                    content: "Hi".to_string(),
                },
                ChatTurn {
                    role: Role::Ai,
                    content: "Hello".to_string(),
                },
            ],
            sources: vec![],
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateContentRequest {
            contents: vec![text_content(Some("model"), "Hello".to_string())],
            system_instruction: text_content(None, "system".to_string()),
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["role"], "model");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "system");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[tokio::test]
    async fn test_candidate_text_is_returned() {
        let base = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Water boils "},{"text":"at 100C."}]}}]}"#,
        )
        .await;
        let text = generate(&Client::new(), &base, &request(), "system").await.unwrap();
        assert_eq!(text, "Water boils at 100C.");
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_response() {
        let base = serve_once("200 OK", r#"{"candidates":[]}"#).await;
        let err = generate(&Client::new(), &base, &request(), "system").await.unwrap_err();
        assert!(err.to_string().starts_with("Gemini Error: No response generated."));
    }
}
