//! Local backend: an Ollama server's `/api/chat`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{api_error_message, BackendKind, CompletionBackend, CompletionOptions, LlmError, Prompt};

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaReply>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaReply {
    content: String,
}

pub struct LocalBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl LocalBackend {
    pub fn new(client: Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl CompletionBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn probe(&self) -> Result<(), LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(LlmError::Api {
                status: status.as_u16(),
                message: "ollama did not answer /api/tags".to_string(),
            })
        }
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let request_body = OllamaChatRequest {
            model: &self.model,
            messages: vec![
                OllamaMessage {
                    role: "system",
                    content: &prompt.system,
                },
                OllamaMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            stream: false,
            format: options.json_mode.then_some("json"),
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
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

        let body: OllamaChatResponse = serde_json::from_str(&response.text().await?)?;
        debug!(
            "Local call succeeded: prompt_eval_count={:?}, eval_count={:?}",
            body.prompt_eval_count, body.eval_count
        );

        body.message
            .map(|m| m.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyContent)
    }
}
