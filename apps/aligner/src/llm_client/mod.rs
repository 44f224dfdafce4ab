//! Model Adapter: the single point of entry for every language-model call.
//!
//! ARCHITECTURAL RULE: No other module may talk to an inference server
//! directly. All model interactions MUST go through `ModelAdapter`.
//!
//! Two interchangeable backends sit behind `CompletionBackend`: a hosted
//! OpenAI-compatible API and a local Ollama server. The adapter picks one by a
//! fixed rule (hosted when a key is configured and it answers a probe, else
//! local if it answers, else `Unavailable`) and callers never branch on which
//! one is active. No retries happen at this layer.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;

pub mod hosted;
pub mod local;
#[cfg(test)]
pub mod mock;
pub mod prompts;

pub use hosted::HostedBackend;
pub use local::LocalBackend;

/// Probes are cheap metadata calls and should answer quickly.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model returned empty content")]
    EmptyContent,

    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("no inference backend reachable (tried: {tried})")]
    Unavailable { tried: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Hosted,
    Local,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Hosted => "hosted",
            BackendKind::Local => "local",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the backend for a JSON object (OpenAI `response_format`, Ollama `format`).
    pub json_mode: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: DEFAULT_MAX_TOKENS,
            json_mode: true,
        }
    }
}

/// Raw model output plus which backend produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub backend: BackendKind,
    pub model: String,
}

/// One inference backend. Implement this to add a provider without touching
/// the engine.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn model(&self) -> &str;

    /// Cheap reachability check used during backend selection.
    async fn probe(&self) -> Result<(), LlmError>;

    /// Sends one prompt and returns the raw text of the reply.
    async fn complete(
        &self,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<String, LlmError>;
}

/// Uniform front for the configured backends.
///
/// Selection is lazy: the first call probes candidates in priority order and
/// remembers the winner. If nothing answers, the call fails and the next call
/// probes again.
pub struct ModelAdapter {
    candidates: Vec<Arc<dyn CompletionBackend>>,
    active: RwLock<Option<Arc<dyn CompletionBackend>>>,
    timeout: Duration,
}

impl ModelAdapter {
    /// `candidates` are tried in order during selection.
    pub fn new(candidates: Vec<Arc<dyn CompletionBackend>>, timeout: Duration) -> Self {
        Self {
            candidates,
            active: RwLock::new(None),
            timeout,
        }
    }

    /// Builds the hosted (only when `OPENAI_API_KEY` is set) and local backends.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(config.llm_timeout_secs);
        let client = build_http_client(timeout)?;

        let mut candidates: Vec<Arc<dyn CompletionBackend>> = Vec::new();
        if let Some(key) = &config.openai_api_key {
            candidates.push(Arc::new(HostedBackend::new(
                client.clone(),
                &config.hosted_base_url,
                key.clone(),
                &config.hosted_model,
            )));
        }
        candidates.push(Arc::new(LocalBackend::new(
            client,
            &config.local_llm_url,
            &config.local_model,
        )));

        Ok(Self::new(candidates, timeout))
    }

    /// Returns the selected backend, probing candidates if none is selected yet.
    pub async fn active(&self) -> Result<Arc<dyn CompletionBackend>, LlmError> {
        if let Some(backend) = self.active.read().await.as_ref() {
            return Ok(backend.clone());
        }

        let mut active = self.active.write().await;
        if let Some(backend) = active.as_ref() {
            return Ok(backend.clone());
        }

        let mut tried = Vec::new();
        for candidate in &self.candidates {
            let label = format!("{}:{}", candidate.kind().as_str(), candidate.model());
            match tokio::time::timeout(PROBE_TIMEOUT, candidate.probe()).await {
                Ok(Ok(())) => {
                    info!("Selected {label} inference backend");
                    *active = Some(candidate.clone());
                    return Ok(candidate.clone());
                }
                Ok(Err(e)) => warn!("Backend {label} failed probe: {e}"),
                Err(_) => warn!("Backend {label} probe timed out"),
            }
            tried.push(label);
        }

        Err(LlmError::Unavailable {
            tried: if tried.is_empty() {
                "none configured".to_string()
            } else {
                tried.join(", ")
            },
        })
    }

    /// Sends one prompt through the active backend, bounded by the configured timeout.
    pub async fn complete(
        &self,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let backend = self.active().await?;
        let text = tokio::time::timeout(self.timeout, backend.complete(prompt, options))
            .await
            .map_err(|_| LlmError::Timeout {
                secs: self.timeout.as_secs(),
            })??;

        Ok(Completion {
            text,
            backend: backend.kind(),
            model: backend.model().to_string(),
        })
    }
}

/// Shared HTTP client for both backends. The adapter enforces the call
/// timeout itself; the client timeout is a backstop.
pub fn build_http_client(timeout: Duration) -> Result<Client, LlmError> {
    Ok(Client::builder()
        .timeout(timeout + Duration::from_secs(5))
        .connect_timeout(PROBE_TIMEOUT)
        .build()?)
}

/// Pulls `{"error": {"message": ...}}` out of an error body when present.
pub(crate) fn api_error_message(body: String) -> String {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: ErrorBody,
    }
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ErrorBody {
        Detailed { message: String },
        Plain(String),
    }

    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(ErrorEnvelope {
            error: ErrorBody::Detailed { message },
        })
        | Ok(ErrorEnvelope {
            error: ErrorBody::Plain(message),
        }) => message,
        Err(_) => body,
    }
}
