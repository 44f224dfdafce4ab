//! In-process backend for tests. Replies come from a script, every call is
//! counted and every prompt recorded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{BackendKind, CompletionBackend, CompletionOptions, LlmError, Prompt};

type Responder = Box<dyn Fn(&Prompt) -> Result<String, LlmError> + Send + Sync>;

pub struct ScriptedBackend {
    kind: BackendKind,
    responder: Responder,
    reachable: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedBackend {
    pub fn new(
        kind: BackendKind,
        responder: impl Fn(&Prompt) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            responder: Box::new(responder),
            reachable: true,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Replies with the same text on every call.
    pub fn always(kind: BackendKind, text: &str) -> Self {
        let text = text.to_string();
        Self::new(kind, move |_| Ok(text.clone()))
    }

    /// Replies with each text in turn, repeating the last one when exhausted.
    pub fn sequence(kind: BackendKind, texts: Vec<&str>) -> Self {
        let queue: Mutex<VecDeque<String>> =
            Mutex::new(texts.into_iter().map(str::to_string).collect());
        Self::new(kind, move |_| {
            let mut queue = queue.lock().unwrap();
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            next.ok_or(LlmError::EmptyContent)
        })
    }

    /// Routes on the prompt: the first rule whose marker appears in the user
    /// prompt answers. Unmatched prompts get `EmptyContent`.
    pub fn routed(kind: BackendKind, rules: Vec<(&str, &str)>) -> Self {
        let rules: Vec<(String, String)> = rules
            .into_iter()
            .map(|(m, r)| (m.to_string(), r.to_string()))
            .collect();
        Self::new(kind, move |prompt| {
            rules
                .iter()
                .find(|(marker, _)| prompt.user.contains(marker.as_str()))
                .map(|(_, reply)| reply.clone())
                .ok_or(LlmError::EmptyContent)
        })
    }

    /// Fails every probe, so selection skips this backend.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn probe(&self) -> Result<(), LlmError> {
        if self.reachable {
            Ok(())
        } else {
            Err(LlmError::Api {
                status: 503,
                message: "scripted backend is unreachable".to_string(),
            })
        }
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        _options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(prompt)
    }
}
