//! Completion provider abstraction.
//!
//! A [`CompletionClient`] turns a prompt into raw model text. It never
//! retries: the retry budget belongs to
//! [`RecoveryPipeline`](crate::recovery::RecoveryPipeline), which calls
//! [`complete`](CompletionClient::complete) again with the same prompt.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

/// Failure of a single completion call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("provider returned no completion text")]
    EmptyResponse,

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl CompletionError {
    /// Whether another attempt with the same prompt could succeed.
    ///
    /// Client errors other than 429 (bad key, unknown model, oversized
    /// request) fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Provider { status, .. } => {
                *status == 429 || !(400..500).contains(status)
            }
            _ => true,
        }
    }
}

/// A text-in / text-out language model endpoint.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the model identifier (e.g. `"llama-3.1-8b-instant"`).
    fn model_name(&self) -> &str;

    /// Send `prompt` and return the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// A [`CompletionClient`] that replays canned responses in order.
///
/// Once the script is down to its final entry, that entry is returned for
/// every further call. Records each prompt it receives.
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<String, CompletionError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(responses: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Script of successful responses.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| Ok(t.into())).collect())
    }

    /// Number of completed `complete` calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let mut responses = self
            .responses
            .lock()
            .map_err(|_| CompletionError::Malformed("script lock poisoned".to_string()))?;
        match responses.len() {
            0 => Err(CompletionError::EmptyResponse),
            1 => responses
                .front()
                .cloned()
                .unwrap_or(Err(CompletionError::EmptyResponse)),
            _ => responses
                .pop_front()
                .unwrap_or(Err(CompletionError::EmptyResponse)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CompletionError::Timeout.is_retryable());
        assert!(CompletionError::Network("reset".into()).is_retryable());
        assert!(CompletionError::Provider {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(CompletionError::Provider {
            status: 503,
            message: "overloaded".into()
        }
        .is_retryable());
        assert!(!CompletionError::Provider {
            status: 401,
            message: "bad key".into()
        }
        .is_retryable());
    }

    #[tokio::test]
    async fn test_scripted_repeats_last_response() {
        let client = ScriptedCompletion::from_texts(["first", "last"]);
        assert_eq!(client.complete("p").await.unwrap(), "first");
        assert_eq!(client.complete("p").await.unwrap(), "last");
        assert_eq!(client.complete("p").await.unwrap(), "last");
        assert_eq!(client.calls(), 3);
        assert_eq!(client.prompts(), vec!["p", "p", "p"]);
    }
}
