use crate::core::config::{ImageConfig, RetryConfig};
use crate::core::error::{BookError, BookResult};
use crate::core::state::{Character, Page};
use crate::utils::time::Sleeper;
use async_trait::async_trait;
use log::{info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub mod fal;
pub mod openai;
pub mod replicate;

pub const COLORING_BOOK_STYLE: &str = "children's coloring book illustration style, monochrome black line art only, clean bold black outlines, simple shapes, pure white background, no shading, no gray tones, no color fills, no text or lettering, friendly cartoon aesthetic, suitable for kids to color in";

/// One provider transport: prompt in, image URL out.
#[async_trait]
pub trait ImageClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> BookResult<String>;
    fn name(&self) -> &'static str;
}

pub fn build_prompt(page: &Page, characters: &[Character]) -> String {
    let char_descriptions = characters
        .iter()
        .map(|c| format!("{} ({})", c.name, c.description))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{}\n\nCharacters in scene: {}\n\nStyle: {}",
        page.description, char_descriptions, COLORING_BOOK_STYLE
    )
}

/// Pulls a human readable message out of a provider error payload.
pub fn provider_error_message(body: &Value) -> Option<String> {
    if let Some(msg) = body.pointer("/error/message").and_then(Value::as_str) {
        return Some(msg.to_string());
    }
    if let Some(msg) = body.get("error").and_then(Value::as_str) {
        return Some(msg.to_string());
    }
    match body.get("detail") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|i| i.get("msg").and_then(Value::as_str))
                .collect();
            if !msgs.is_empty() {
                return Some(msgs.join("; "));
            }
        }
        _ => {}
    }
    body.get("message").and_then(Value::as_str).map(str::to_string)
}

/// Turns a non-success HTTP response into a `Generation` error.
pub(crate) async fn error_from_response(resp: reqwest::Response, fallback: &str) -> BookError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| provider_error_message(&v))
        .unwrap_or_else(|| fallback.to_string());
    BookError::with_status(status, message)
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            delay: Duration::from_secs(cfg.delay_seconds),
        }
    }
}

/// Builds per-page prompts and retries rate-limited calls.
pub struct ImageGenerator {
    client: Box<dyn ImageClient>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ImageGenerator {
    pub fn new(client: Box<dyn ImageClient>, retry: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { client, retry, sleeper }
    }

    pub fn provider(&self) -> &'static str {
        self.client.name()
    }

    pub async fn generate(&self, page: &Page, characters: &[Character]) -> BookResult<String> {
        let prompt = build_prompt(page, characters);
        let mut attempt = 1;
        loop {
            match self.client.generate(&prompt).await {
                Ok(url) => return Ok(url),
                Err(e) if e.is_rate_limited() && attempt < self.retry.max_attempts => {
                    warn!(
                        "{} rate limited on page {} (attempt {}/{}), waiting {:?}",
                        self.client.name(),
                        page.id,
                        attempt,
                        self.retry.max_attempts,
                        self.retry.delay
                    );
                    self.sleeper.sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Keys the image clients may need, already validated.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub openai: Option<String>,
    pub replicate: Option<String>,
    pub fal: Option<String>,
}

pub fn create_image_client(
    config: &ImageConfig,
    keys: &ProviderKeys,
    relay_url: &str,
    sleeper: Arc<dyn Sleeper>,
) -> BookResult<Box<dyn ImageClient>> {
    info!("Initializing image client for provider: {}", config.provider);
    let missing = |what: &str| BookError::Credential(format!("{} is not set", what));
    match config.provider.as_str() {
        "openai" => {
            let key = keys.openai.as_deref().ok_or_else(|| missing("OpenAI API key"))?;
            Ok(Box::new(openai::OpenAIImageClient::new(key, config.openai.clone())))
        }
        "replicate" => {
            let key = keys.replicate.as_deref().ok_or_else(|| missing("Replicate API token"))?;
            Ok(Box::new(replicate::ReplicateClient::new(
                relay_url,
                key,
                config.replicate.clone(),
                sleeper,
            )))
        }
        "fal" => {
            let key = keys.fal.as_deref().ok_or_else(|| missing("fal.ai API key"))?;
            Ok(Box::new(fal::FalClient::new(relay_url, key, config.fal.clone())))
        }
        other => Err(BookError::Workflow(format!("Unknown image provider: {}", other))),
    }
}
