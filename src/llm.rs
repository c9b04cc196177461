//! OpenAI-compatible chat completion client.
//!
//! [`ChatCompletionClient`] implements the core
//! [`CompletionClient`] trait against `POST {base_url}/chat/completions`,
//! which both Groq and OpenAI serve. Each call is a single request with
//! no internal retry: the recovery pipeline owns the attempt budget.
//!
//! # Provider Selection
//!
//! [`create_completion_client`] reads `[completion]` and the API key
//! environment variable. A disabled provider or a missing key yields
//! [`Collaborator::Unavailable`] rather than a start-up failure, so the
//! server still answers `/health`.
//!
//! # Error Mapping
//!
//! - request timeout → [`CompletionError::Timeout`]
//! - connect / transport failure → [`CompletionError::Network`]
//! - non-2xx status → [`CompletionError::Provider`] (4xx other than 429 is not retried)
//! - 2xx without `choices[0].message.content` → [`CompletionError::EmptyResponse`]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use upsell_advisor_core::completion::{CompletionClient, CompletionError};
use upsell_advisor_core::models::Collaborator;

use crate::config::CompletionConfig;

/// Fixed system message sent with every prompt.
pub const SYSTEM_MESSAGE: &str =
    "You are a JSON generator. Return ONLY valid JSON. No text, no explanations, no markdown.";

pub struct ChatCompletionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl ChatCompletionClient {
    pub fn new(config: &CompletionConfig, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.resolved_base_url()),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CompletionError::Provider {
                status: status.as_u16(),
                message: truncate(&message, 300),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        let text = extract_content(parsed)?;
        debug!(model = %self.model, chars = text.len(), "completion received");
        Ok(text)
    }
}

fn transport_error(err: reqwest::Error) -> CompletionError {
    if err.is_timeout() {
        CompletionError::Timeout
    } else {
        CompletionError::Network(err.to_string())
    }
}

fn extract_content(response: ChatResponse) -> Result<String, CompletionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(CompletionError::EmptyResponse)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Build the completion collaborator from configuration.
///
/// `lookup` resolves environment variables (the API key).
pub fn create_completion_client<F>(
    config: &CompletionConfig,
    lookup: F,
) -> Result<Collaborator<dyn CompletionClient>>
where
    F: Fn(&str) -> Option<String>,
{
    if !config.is_enabled() {
        return Ok(Collaborator::Unavailable(
            "completion provider is disabled".to_string(),
        ));
    }
    let Some(api_key) = lookup(&config.api_key_env).filter(|k| !k.trim().is_empty()) else {
        return Ok(Collaborator::Unavailable(format!(
            "{} environment variable not set",
            config.api_key_env
        )));
    };

    let client: Arc<dyn CompletionClient> = Arc::new(ChatCompletionClient::new(config, api_key)?);
    Ok(Collaborator::Available(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let body = ChatRequest {
            model: "llama-3.1-8b-instant",
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            temperature: 0.1,
            max_tokens: 4000,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][1], json!({"role": "user", "content": "hi"}));
        assert_eq!(value["max_tokens"], 4000);
    }

    #[test]
    fn test_extract_content() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "[1]"}}]
        }))
        .unwrap();
        assert_eq!(extract_content(response).unwrap(), "[1]");

        let empty: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(extract_content(empty), Err(CompletionError::EmptyResponse));

        let blank: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": "  "}}]})).unwrap();
        assert_eq!(extract_content(blank), Err(CompletionError::EmptyResponse));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("ok", 10), "ok");
    }

    #[test]
    fn test_disabled_provider_is_unavailable() {
        let config = CompletionConfig {
            provider: "disabled".to_string(),
            ..Default::default()
        };
        let client = create_completion_client(&config, |_| None).unwrap();
        assert!(!client.is_available());
    }

    #[test]
    fn test_missing_key_is_unavailable() {
        let client = create_completion_client(&CompletionConfig::default(), |_| None).unwrap();
        assert_eq!(client.status(), "unavailable (GROQ_API_KEY environment variable not set)");
    }

    #[test]
    fn test_configured_client_is_available() {
        let client = create_completion_client(&CompletionConfig::default(), |key| {
            (key == "GROQ_API_KEY").then(|| "gsk_test".to_string())
        })
        .unwrap();
        assert!(client.is_available());
    }
}
