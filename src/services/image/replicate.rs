use crate::core::error::{BookError, BookResult};
use crate::services::image::{error_from_response, provider_error_message, ImageClient};
use crate::utils::time::Sleeper;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplicateConfig {
    /// `owner/name` for official models, or a version hash.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Upper bound on status checks before the job is given up.
    #[serde(default = "default_max_polls")]
    pub max_polls: usize,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            aspect_ratio: default_aspect_ratio(),
            poll_interval_ms: default_poll_interval(),
            max_polls: default_max_polls(),
        }
    }
}

fn default_model() -> String {
    "black-forest-labs/flux-schnell".to_string()
}
fn default_aspect_ratio() -> String {
    "3:4".to_string()
}
fn default_poll_interval() -> u64 {
    2000
}
fn default_max_polls() -> usize {
    150
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

enum JobState {
    Running,
    Succeeded(String),
    Failed(String),
}

impl Prediction {
    fn state(&self) -> JobState {
        match self.status.as_str() {
            "succeeded" => match first_output(self.output.as_ref()) {
                Some(url) => JobState::Succeeded(url),
                None => JobState::Failed("Prediction succeeded without output".to_string()),
            },
            "failed" | "canceled" => JobState::Failed(
                self.error
                    .as_ref()
                    .and_then(|e| match e {
                        Value::String(s) => Some(s.clone()),
                        other => provider_error_message(other),
                    })
                    .unwrap_or_else(|| format!("Prediction {}", self.status)),
            ),
            _ => JobState::Running,
        }
    }
}

fn first_output(output: Option<&Value>) -> Option<String> {
    match output? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Asynchronous job transport through the relay's `/api/replicate` endpoint.
pub struct ReplicateClient {
    relay_url: String,
    api_key: String,
    config: ReplicateConfig,
    client: reqwest::Client,
    sleeper: Arc<dyn Sleeper>,
}

impl ReplicateClient {
    pub fn new(
        relay_url: &str,
        api_key: &str,
        config: ReplicateConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            relay_url: relay_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            config,
            client: reqwest::Client::new(),
            sleeper,
        }
    }

    async fn call(&self, body: Value) -> BookResult<Prediction> {
        let resp = self
            .client
            .post(format!("{}/api/replicate", self.relay_url))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "Failed to generate image").await);
        }
        Ok(resp.json().await?)
    }

    async fn start(&self, prompt: &str) -> BookResult<Prediction> {
        self.call(json!({
            "action": "start",
            "replicateKey": self.api_key,
            "model": self.config.model,
            "input": {
                "prompt": prompt,
                "aspect_ratio": self.config.aspect_ratio,
                "num_outputs": 1,
                "output_format": "png",
            },
        }))
        .await
    }

    async fn poll(&self, prediction_id: &str) -> BookResult<Prediction> {
        self.call(json!({
            "action": "poll",
            "replicateKey": self.api_key,
            "predictionId": prediction_id,
        }))
        .await
    }
}

#[async_trait]
impl ImageClient for ReplicateClient {
    async fn generate(&self, prompt: &str) -> BookResult<String> {
        let mut prediction = self.start(prompt).await?;
        let id = prediction
            .id
            .clone()
            .ok_or_else(|| BookError::generation("Replicate did not return a prediction id"))?;
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        let mut polls = 0;
        loop {
            match prediction.state() {
                JobState::Succeeded(url) => return Ok(url),
                JobState::Failed(message) => return Err(BookError::generation(message)),
                JobState::Running => {}
            }
            if polls >= self.config.max_polls {
                return Err(BookError::generation(format!(
                    "Prediction {} did not finish after {} polls",
                    id, polls
                )));
            }
            self.sleeper.sleep(interval).await;
            polls += 1;
            prediction = self.poll(&id).await?;
            debug!("Prediction {} status: {}", id, prediction.status);
        }
    }

    fn name(&self) -> &'static str {
        "replicate"
    }
}
