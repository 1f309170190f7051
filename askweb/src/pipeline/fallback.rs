//! Last-resort answers from a prioritized list of LLM backends.

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, instrument, warn};

use crate::errors::LlmError;
use crate::ranking::RankedResult;
use crate::websearch::strip_citations;

/// Boilerplate that means the backend did not answer.
pub const REFUSAL_PHRASES: &[&str] = &["Tôi xin lỗi", "Please visit", "I'm sorry", "I don't understand"];

/// Consecutive failures of the preferred backend before the full list is walked again.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

static SEARCHING_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^Searching.*$").ok());

/// An `ask(prompt) -> text` capability.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Name used in logs and in the `bot:<name>` source of answers.
    fn name(&self) -> &str;

    /// Sends the prompt and returns the raw answer.
    async fn ask(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Strips citation markers and search-progress lines from an answer.
#[must_use]
pub fn clean_answer(raw: &str) -> String {
    let text = strip_citations(raw);
    match SEARCHING_LINE.as_ref() {
        Some(re) => re.replace_all(&text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Whether the answer is refusal boilerplate.
#[must_use]
pub fn is_refusal(answer: &str) -> bool {
    REFUSAL_PHRASES.iter().any(|phrase| answer.contains(phrase))
}

#[derive(Debug, Default)]
struct ChainState {
    preferred: Option<usize>,
    failures: u32,
}

/// Tries backends in priority order and sticks with the last one that answered.
///
/// When the preferred backend fails the chain reports
/// [`LlmError::CoolingDown`] until it has failed `failure_threshold` times
/// in a row; then the preference is dropped and the whole list is tried
/// again in order.
pub struct FallbackChain {
    backends: Vec<Arc<dyn LlmBackend>>,
    failure_threshold: u32,
    state: Mutex<ChainState>,
}

impl fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackChain")
            .field("backends", &self.backend_names())
            .field("failure_threshold", &self.failure_threshold)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl FallbackChain {
    /// Creates a chain over backends in priority order.
    #[must_use]
    pub fn new(backends: Vec<Arc<dyn LlmBackend>>) -> Self {
        Self {
            backends,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            state: Mutex::new(ChainState::default()),
        }
    }

    /// Sets the failure threshold. Zero behaves like one.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Backend names in priority order.
    #[must_use]
    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Name of the backend the chain currently prefers.
    #[must_use]
    pub fn preferred(&self) -> Option<String> {
        let index = self.state.lock().preferred?;
        self.backends.get(index).map(|b| b.name().to_string())
    }

    async fn try_backend(backend: &dyn LlmBackend, prompt: &str) -> Result<String, LlmError> {
        let raw = backend.ask(prompt).await?;
        let answer = clean_answer(&raw);
        if answer.is_empty() {
            return Err(LlmError::Empty {
                backend: backend.name().to_string(),
            });
        }
        if is_refusal(&answer) {
            return Err(LlmError::Refused {
                backend: backend.name().to_string(),
            });
        }
        Ok(answer)
    }

    /// Asks the chain and returns the cleaned answer with the backend name.
    #[instrument(skip(self, prompt), fields(backends = self.backends.len()))]
    pub async fn ask(&self, prompt: &str) -> Result<(String, String), LlmError> {
        if self.backends.is_empty() {
            return Err(LlmError::NoBackends);
        }

        let preferred = self.state.lock().preferred;
        if let Some(index) = preferred {
            let backend = &self.backends[index];
            match Self::try_backend(backend.as_ref(), prompt).await {
                Ok(answer) => {
                    self.state.lock().failures = 0;
                    return Ok((answer, backend.name().to_string()));
                }
                Err(e) => {
                    let mut state = self.state.lock();
                    state.failures += 1;
                    warn!(backend = backend.name(), failures = state.failures, error = %e, "preferred backend failed");
                    if state.failures < self.failure_threshold {
                        return Err(LlmError::CoolingDown {
                            failures: state.failures,
                        });
                    }
                    state.preferred = None;
                    state.failures = 0;
                }
            }
        }

        for (index, backend) in self.backends.iter().enumerate() {
            debug!(backend = backend.name(), "trying backend");
            match Self::try_backend(backend.as_ref(), prompt).await {
                Ok(answer) => {
                    info!(backend = backend.name(), "backend answered");
                    let mut state = self.state.lock();
                    state.preferred = Some(index);
                    state.failures = 0;
                    return Ok((answer, backend.name().to_string()));
                }
                Err(e) => debug!(backend = backend.name(), error = %e, "backend failed"),
            }
        }

        Err(LlmError::Exhausted {
            attempted: self.backends.len(),
        })
    }

    /// Asks the chain and wraps the answer as a ranked result.
    pub async fn answer(&self, prompt: &str) -> Result<RankedResult, LlmError> {
        let (answer, backend) = self.ask(prompt).await?;
        Ok(RankedResult::from_bot(answer, &backend))
    }
}
