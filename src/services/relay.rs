//! Same-origin passthrough endpoints for the image providers.
//!
//! Each handler takes the caller's credential out of the JSON body, forwards
//! the rest to the provider and hands back the provider's status and JSON
//! body unchanged. Transport failures become `500 {"error": ...}`.

use crate::core::error::BookResult;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayConfig {
    /// Start an in-process relay on an ephemeral port instead of using `url`.
    #[serde(default = "default_self_host")]
    pub self_host: bool,
    /// Address used by `colorbook serve`.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// External relay, used when `self_host` is off.
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_replicate_base")]
    pub replicate_base_url: String,
    #[serde(default = "default_fal_base")]
    pub fal_base_url: String,
    #[serde(default = "default_openai_base")]
    pub openai_base_url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            self_host: default_self_host(),
            bind: default_bind(),
            url: default_url(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            replicate_base_url: default_replicate_base(),
            fal_base_url: default_fal_base(),
            openai_base_url: default_openai_base(),
        }
    }
}

fn default_self_host() -> bool {
    true
}
fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_url() -> String {
    "http://127.0.0.1:3000".to_string()
}
fn default_replicate_base() -> String {
    "https://api.replicate.com/v1".to_string()
}
fn default_fal_base() -> String {
    "https://fal.run".to_string()
}
fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Upstream(#[from] reqwest::Error),
}

/// Unreadable bodies answer with the same `{"error": ...}` shape as every other failure.
impl From<JsonRejection> for RelayError {
    fn from(rejection: JsonRejection) -> Self {
        RelayError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Upstream(e) => {
                error!("Relay upstream failure: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
struct RelayState {
    client: reqwest::Client,
    upstream: Arc<UpstreamConfig>,
}

pub fn router(upstream: UpstreamConfig) -> Router {
    let state = RelayState {
        client: reqwest::Client::new(),
        upstream: Arc::new(upstream),
    };
    Router::new()
        .route("/health", get(health))
        .route("/api/replicate", post(replicate))
        .route("/api/fal", post(fal))
        .route("/api/openai", post(openai))
        .with_state(state)
}

/// Serves the relay on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, upstream: UpstreamConfig) -> std::io::Result<()> {
    axum::serve(listener, router(upstream)).await
}

pub struct RelayHandle {
    pub url: String,
    task: JoinHandle<()>,
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Binds `addr` and runs the relay as a background task.
pub async fn spawn(addr: &str, upstream: UpstreamConfig) -> BookResult<RelayHandle> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let url = format!("http://{}", local);
    info!("Relay listening on {}", url);

    let task = tokio::spawn(async move {
        if let Err(e) = serve(listener, upstream).await {
            error!("Relay stopped: {}", e);
        }
    });
    Ok(RelayHandle { url, task })
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Passes the provider's status and JSON body straight through.
async fn relay_response(resp: reqwest::Response) -> Result<Response, RelayError> {
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let text = resp.text().await?;
    let body: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "error": text }));
    Ok((status, Json(body)).into_response())
}

fn take_string(body: &mut Map<String, Value>, key: &str) -> Option<String> {
    match body.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// A reference containing `/` names an official model; anything else is a version hash.
pub fn shape_prediction_request(mut rest: Map<String, Value>) -> Map<String, Value> {
    let reference = take_string(&mut rest, "model").or_else(|| take_string(&mut rest, "version"));
    if let Some(reference) = reference {
        let field = if reference.contains('/') { "model" } else { "version" };
        rest.insert(field.to_string(), Value::String(reference));
    }
    rest
}

async fn replicate(
    State(state): State<RelayState>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Response, RelayError> {
    let Json(mut body) = body?;
    let action = take_string(&mut body, "action");
    let key = take_string(&mut body, "replicateKey").unwrap_or_default();
    let prediction_id = take_string(&mut body, "predictionId");
    let base = state.upstream.replicate_base_url.trim_end_matches('/');

    match action.as_deref() {
        Some("start") => {
            info!("Relaying Replicate prediction start");
            let payload = shape_prediction_request(body);
            let resp = state
                .client
                .post(format!("{}/predictions", base))
                .header("Authorization", format!("Token {}", key))
                .json(&payload)
                .send()
                .await?;
            relay_response(resp).await
        }
        Some("poll") => {
            let id = prediction_id
                .ok_or_else(|| RelayError::BadRequest("Missing predictionId".to_string()))?;
            let resp = state
                .client
                .get(format!("{}/predictions/{}", base, id))
                .header("Authorization", format!("Token {}", key))
                .send()
                .await?;
            relay_response(resp).await
        }
        _ => Err(RelayError::BadRequest("Invalid action".to_string())),
    }
}

#[derive(Deserialize)]
struct FalRelayRequest {
    #[serde(rename = "falKey", default)]
    fal_key: String,
    prompt: Option<String>,
    image_size: Option<String>,
    num_inference_steps: Option<u32>,
    enable_safety_checker: Option<bool>,
}

async fn fal(
    State(state): State<RelayState>,
    req: Result<Json<FalRelayRequest>, JsonRejection>,
) -> Result<Response, RelayError> {
    let Json(req) = req?;
    info!("Relaying fal.ai generation");
    let mut payload = json!({
        "image_size": req.image_size.unwrap_or_else(crate::services::image::fal::default_image_size),
        "num_inference_steps": req.num_inference_steps.unwrap_or_else(crate::services::image::fal::default_steps),
        "num_images": 1,
        "enable_safety_checker": req.enable_safety_checker.unwrap_or(false),
    });
    // Forwarded as given; fal reports a missing prompt itself.
    if let Some(prompt) = req.prompt {
        payload["prompt"] = Value::String(prompt);
    }
    let resp = state
        .client
        .post(format!(
            "{}/fal-ai/flux/schnell",
            state.upstream.fal_base_url.trim_end_matches('/')
        ))
        .header("Authorization", format!("Key {}", req.fal_key))
        .json(&payload)
        .send()
        .await?;
    relay_response(resp).await
}

async fn openai(
    State(state): State<RelayState>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Response, RelayError> {
    let Json(mut body) = body?;
    info!("Relaying OpenAI image generation");
    let key = take_string(&mut body, "openaiKey").unwrap_or_default();
    let resp = state
        .client
        .post(format!(
            "{}/images/generations",
            state.upstream.openai_base_url.trim_end_matches('/')
        ))
        .header("Authorization", format!("Bearer {}", key))
        .json(&body)
        .send()
        .await?;
    relay_response(resp).await
}
