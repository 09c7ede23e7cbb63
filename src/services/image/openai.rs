use crate::core::error::{BookError, BookResult};
use crate::services::image::{error_from_response, ImageClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIImageConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for OpenAIImageConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            size: default_size(),
            quality: default_quality(),
            base_url: default_base_url(),
        }
    }
}

fn default_model() -> String {
    "dall-e-3".to_string()
}
fn default_size() -> String {
    "1024x1792".to_string()
}
fn default_quality() -> String {
    "standard".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Synchronous transport: one request, URL in the response.
pub struct OpenAIImageClient {
    api_key: String,
    config: OpenAIImageConfig,
    client: reqwest::Client,
}

impl OpenAIImageClient {
    pub fn new(api_key: &str, config: OpenAIImageConfig) -> Self {
        Self {
            api_key: api_key.to_string(),
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
    n: u32,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[async_trait]
impl ImageClient for OpenAIImageClient {
    async fn generate(&self, prompt: &str) -> BookResult<String> {
        let url = format!(
            "{}/images/generations",
            self.config.base_url.trim_end_matches('/')
        );
        let body = ImageRequest {
            model: &self.config.model,
            prompt,
            size: &self.config.size,
            quality: &self.config.quality,
            n: 1,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "Failed to generate image").await);
        }

        let result: ImageResponse = resp.json().await?;
        result
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or_else(|| BookError::generation("OpenAI image response contained no URL"))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
