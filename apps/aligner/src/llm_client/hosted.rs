//! Hosted backend: any OpenAI-compatible `/chat/completions` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{api_error_message, BackendKind, CompletionBackend, CompletionOptions, LlmError, Prompt};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

pub struct HostedBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HostedBackend {
    pub fn new(client: Client, base_url: &str, api_key: String, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl CompletionBackend for HostedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hosted
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn probe(&self) -> Result<(), LlmError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(LlmError::Api {
            status: status.as_u16(),
            message: api_error_message(body),
        })
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let request_body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: api_error_message(body),
            });
        }

        let body: ChatResponse = serde_json::from_str(&response.text().await?)?;
        if let Some(usage) = &body.usage {
            debug!(
                "Hosted call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyContent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::{get, post}, Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn test_complete_reads_first_choice_and_sends_json_mode() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["response_format"]["type"], "json_object");
                assert_eq!(body["messages"][0]["role"], "system");
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "{\"matches\": []}"}}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 4}
                }))
            }),
        );
        let base = serve(router).await;
        let backend = HostedBackend::new(Client::new(), &base, "sk-test".into(), "gpt-4o");

        let text = backend
            .complete(&Prompt::new("sys", "user"), &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "{\"matches\": []}");
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let router = Router::new()
            .route(
                "/v1/chat/completions",
                post(|| async {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"error": {"message": "bad key"}})),
                    )
                }),
            )
            .route("/v1/models", get(|| async { StatusCode::UNAUTHORIZED }));
        let base = serve(router).await;
        let backend = HostedBackend::new(Client::new(), &base, "sk-bad".into(), "gpt-4o");

        match backend
            .complete(&Prompt::new("sys", "user"), &CompletionOptions::default())
            .await
        {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad key");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert!(backend.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_choice_is_empty_content() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": [{"message": {"content": null}}]})) }),
        );
        let base = serve(router).await;
        let backend = HostedBackend::new(Client::new(), &base, "sk-test".into(), "gpt-4o");

        let err = backend
            .complete(&Prompt::new("sys", "user"), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }
}
