//! Scripted model fakes for unit tests.

use super::{CallOptions, ModelCall};
use crate::error::{KnowledgeError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Responder = dyn Fn(&str, &str) -> Result<String> + Send + Sync;

/// A model whose answers come from a closure over `(prompt, context)`.
///
/// Records every call and the peak number of calls in flight.
pub(crate) struct ScriptedModel {
    respond: Box<Responder>,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<(String, String, CallOptions)>>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl ScriptedModel {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always answer with the same text.
    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Ok(text.clone()))
    }

    /// Always fail as if the provider were down.
    pub fn failing() -> Self {
        Self::new(|_, _| Err(KnowledgeError::LlmApi("provider unavailable".to_string())))
    }

    /// Hold each call open for `delay` so concurrency can be observed.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelCall for ScriptedModel {
    async fn call(&self, prompt: &str, context: &str, options: CallOptions) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), context.to_string(), options));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let answer = (self.respond)(prompt, context);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }
}
