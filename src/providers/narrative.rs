use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::CaptureError;
use crate::utils::http::build_http_client;
use crate::utils::timing::log_provider_timing;

const PROVIDER_NAME: &str = "narrative";

/// The booth persona is fixed; only profession and age vary per visitor.
const NARRATIVE_GENDER: &str = "male";

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

pub fn build_narrative_prompt(profession: &str, age: i64) -> String {
    format!(
        "Gender: {NARRATIVE_GENDER}\n\
         Profession: {profession}\n\
         Age at death: {age}\n\
         Describe what your past life was like, and finish with an EPIC death scene."
    )
}

fn extract_first_completion(response: ChatCompletionResponse) -> Option<String> {
    let text = response
        .choices?
        .into_iter()
        .next()?
        .message?
        .content?
        .trim()
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub struct NarrativeClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl NarrativeClient {
    pub fn new(config: &Config) -> Self {
        NarrativeClient {
            client: build_http_client(config.narrative_timeout_secs),
            api_key: config.narrative_api_key.clone(),
            base_url: config.narrative_base_url.clone(),
            model: config.narrative_model.clone(),
        }
    }

    /// One chat-completions request; the first choice's trimmed text is the
    /// past-life narrative. Any transport, status, or envelope problem is a
    /// terminal provider error.
    pub async fn generate(&self, profession: &str, age: i64) -> Result<String, CaptureError> {
        let prompt = build_narrative_prompt(profession, age);
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        debug!(
            target: "providers.narrative",
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "requesting narrative"
        );

        log_provider_timing(PROVIDER_NAME, &self.model, "generate_narrative", || async {
            let response = self
                .client
                .post(format!(
                    "{}/chat/completions",
                    self.base_url.trim_end_matches('/')
                ))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&payload)
                .send()
                .await
                .map_err(|err| CaptureError::provider(PROVIDER_NAME, err.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&body);
                let detail = message.unwrap_or(body_summary);
                return Err(CaptureError::provider(
                    PROVIDER_NAME,
                    format!("status {status}: {detail}"),
                ));
            }

            let envelope = response
                .json::<ChatCompletionResponse>()
                .await
                .map_err(|err| {
                    CaptureError::provider(PROVIDER_NAME, format!("malformed response: {err}"))
                })?;

            extract_first_completion(envelope).ok_or_else(|| {
                CaptureError::provider(PROVIDER_NAME, "response held no completion text")
            })
        })
        .await
    }
}
