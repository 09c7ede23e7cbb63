use crate::core::error::{BookError, BookResult};
use crate::services::image::{error_from_response, ImageClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FalConfig {
    #[serde(default = "default_image_size")]
    pub image_size: String,
    #[serde(default = "default_steps")]
    pub num_inference_steps: u32,
    #[serde(default)]
    pub enable_safety_checker: bool,
}

impl Default for FalConfig {
    fn default() -> Self {
        Self {
            image_size: default_image_size(),
            num_inference_steps: default_steps(),
            enable_safety_checker: false,
        }
    }
}

pub(crate) fn default_image_size() -> String {
    "portrait_4_3".to_string()
}
pub(crate) fn default_steps() -> u32 {
    4
}

/// Single-shot fal.ai transport through the relay's `/api/fal` endpoint.
pub struct FalClient {
    relay_url: String,
    api_key: String,
    config: FalConfig,
    client: reqwest::Client,
}

impl FalClient {
    pub fn new(relay_url: &str, api_key: &str, config: FalConfig) -> Self {
        Self {
            relay_url: relay_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    fal_key: &'a str,
    prompt: &'a str,
    #[serde(rename = "image_size")]
    image_size: &'a str,
    #[serde(rename = "num_inference_steps")]
    num_inference_steps: u32,
    #[serde(rename = "enable_safety_checker")]
    enable_safety_checker: bool,
}

#[derive(Deserialize)]
struct FalResponse {
    #[serde(default)]
    images: Vec<FalImage>,
}

#[derive(Deserialize)]
struct FalImage {
    url: String,
}

#[async_trait]
impl ImageClient for FalClient {
    async fn generate(&self, prompt: &str) -> BookResult<String> {
        let body = RelayRequest {
            fal_key: &self.api_key,
            prompt,
            image_size: &self.config.image_size,
            num_inference_steps: self.config.num_inference_steps,
            enable_safety_checker: self.config.enable_safety_checker,
        };

        let resp = self
            .client
            .post(format!("{}/api/fal", self.relay_url))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "Failed to generate image").await);
        }

        let result: FalResponse = resp.json().await?;
        result
            .images
            .into_iter()
            .next()
            .map(|i| i.url)
            .ok_or_else(|| BookError::generation("fal.ai response contained no images"))
    }

    fn name(&self) -> &'static str {
        "fal"
    }
}
