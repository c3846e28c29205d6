use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::retry::{RetryPolicy, is_rate_limited, retry_after};
use crate::pipeline::{CollaboratorFuture, Translator};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// [`Translator`] over an OpenAI-compatible `chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiTranslator {
    client: reqwest::Client,
    key: String,
    model: String,
    base_url: String,
    source_lang: String,
    target_lang: String,
    retry: RetryPolicy,
}

impl OpenAiTranslator {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: default_base_url(),
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_languages(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_lang = source.into();
        self.target_lang = target.into();
        self
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {
                    "role": "system",
                    "content": render_system_prompt(&self.source_lang, &self.target_lang)
                },
                {"role": "user", "content": text}
            ]
        })
    }

    async fn call(&self, text: String) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&text);

        let mut attempt = 0usize;
        let mut delay = self.retry.base_delay;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.key)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("failed to reach {}", url))?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                let translated = extract_translation(&text)?;
                debug!("{} translated {} char(s)", self.model, translated.chars().count());
                return Ok(translated);
            }
            if is_rate_limited(status, &text) && attempt < self.retry.max_attempts {
                delay = self.retry.wait("OpenAI", attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!(
                "OpenAI API error ({}): {}",
                status,
                extract_openai_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl Translator for OpenAiTranslator {
    fn translate(&self, text: String) -> CollaboratorFuture<'_, String> {
        Box::pin(self.call(text))
    }
}

fn default_base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

pub(crate) fn render_system_prompt(source_lang: &str, target_lang: &str) -> String {
    format!(
        "You translate comic speech bubbles from {} to {}. The text comes from OCR and may contain recognition noise. Reply with the translation only, on a single line, without quotes or commentary.",
        language_label(source_lang),
        language_label(target_lang)
    )
}

fn language_label(code: &str) -> String {
    let code = code.trim();
    if code.is_empty() || code.eq_ignore_ascii_case("auto") {
        "the detected source language".to_string()
    } else {
        format!("language code '{}'", code)
    }
}

fn extract_translation(body: &str) -> Result<String> {
    let payload: ChatResponse =
        serde_json::from_str(body).with_context(|| "failed to parse OpenAI response JSON")?;
    let content = payload
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("no message content returned from OpenAI"))?;
    Ok(content.trim().trim_matches('"').trim().to_string())
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let parts: Vec<String> = [
        error.message,
        error.kind.map(|kind| format!("type: {}", kind)),
        error.code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect();
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
