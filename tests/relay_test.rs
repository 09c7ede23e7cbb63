use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use colorbook::services::relay::{router, UpstreamConfig};

fn relay_for(server: &MockServer) -> Router {
    router(UpstreamConfig {
        replicate_base_url: server.uri(),
        fal_base_url: server.uri(),
        openai_base_url: server.uri(),
    })
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    post_raw(app, uri, body.to_string()).await
}

async fn post_raw(app: Router, uri: &str, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = relay_for(&server).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_replicate_start_sends_official_model() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .and(header("authorization", "Token r8_secret"))
        .and(body_partial_json(json!({
            "model": "black-forest-labs/flux-schnell",
            "input": {"prompt": "a cat", "aspect_ratio": "3:4"}
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "p1", "status": "starting"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = post_json(
        relay_for(&server),
        "/api/replicate",
        json!({
            "action": "start",
            "replicateKey": "r8_secret",
            "model": "black-forest-labs/flux-schnell",
            "input": {"prompt": "a cat", "aspect_ratio": "3:4"}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"id": "p1", "status": "starting"}));

    // The relay's own fields never reach the provider.
    let received = server.received_requests().await.unwrap();
    let forwarded: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(forwarded.get("action").is_none());
    assert!(forwarded.get("replicateKey").is_none());
}

#[tokio::test]
async fn test_replicate_start_sends_version_hash() {
    let server = MockServer::start().await;
    let hash = "5c7d5dc6dd8bf75c1acaa8565735e7986bc5b66206b55cca93cb72c9bf15ccaa";

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .and(body_partial_json(json!({"version": hash})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "p2", "status": "starting"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (status, _) = post_json(
        relay_for(&server),
        "/api/replicate",
        json!({"action": "start", "replicateKey": "r8_secret", "model": hash, "input": {}}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_replicate_poll_hits_prediction() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/predictions/p1"))
        .and(header("authorization", "Token r8_secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "p1",
            "status": "succeeded",
            "output": ["https://replicate.delivery/p1.png"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = post_json(
        relay_for(&server),
        "/api/replicate",
        json!({"action": "poll", "replicateKey": "r8_secret", "predictionId": "p1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"][0], "https://replicate.delivery/p1.png");
}

#[tokio::test]
async fn test_replicate_rejects_bad_actions() {
    let server = MockServer::start().await;

    let (status, body) = post_json(
        relay_for(&server),
        "/api/replicate",
        json!({"action": "cancel", "replicateKey": "r8_secret"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid action"}));

    let (status, _) = post_json(
        relay_for(&server),
        "/api/replicate",
        json!({"replicateKey": "r8_secret"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        relay_for(&server),
        "/api/replicate",
        json!({"action": "poll", "replicateKey": "r8_secret"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Missing predictionId"}));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_provider_errors_pass_through() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": "Invalid version or not permitted"
        })))
        .mount(&server)
        .await;

    let (status, body) = post_json(
        relay_for(&server),
        "/api/replicate",
        json!({"action": "start", "replicateKey": "r8_secret", "model": "nope", "input": {}}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({"detail": "Invalid version or not permitted"}));
}

#[tokio::test]
async fn test_unreachable_provider_is_500() {
    // Nothing listens on port 1.
    let app = router(UpstreamConfig {
        replicate_base_url: "http://127.0.0.1:1".to_string(),
        fal_base_url: "http://127.0.0.1:1".to_string(),
        openai_base_url: "http://127.0.0.1:1".to_string(),
    });

    let (status, body) = post_json(
        app,
        "/api/fal",
        json!({"falKey": "id:secret", "prompt": "a cat"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().is_some_and(|m| !m.is_empty()));
}

#[tokio::test]
async fn test_fal_fills_defaults() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/schnell"))
        .and(header("authorization", "Key id:secret"))
        .and(body_partial_json(json!({
            "prompt": "a cat",
            "image_size": "portrait_4_3",
            "num_inference_steps": 4,
            "num_images": 1,
            "enable_safety_checker": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{"url": "https://fal.media/cat.png"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = post_json(
        relay_for(&server),
        "/api/fal",
        json!({"falKey": "id:secret", "prompt": "a cat"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["images"][0]["url"], "https://fal.media/cat.png");
}

#[tokio::test]
async fn test_fal_forwards_request_without_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/schnell"))
        .and(body_partial_json(json!({"num_inference_steps": 4})))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [{"loc": ["body", "prompt"], "msg": "field required"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = post_json(relay_for(&server), "/api/fal", json!({"falKey": "id:secret"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["msg"], "field required");

    let received = server.received_requests().await.unwrap();
    let forwarded: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(forwarded.get("prompt").is_none());
}

#[tokio::test]
async fn test_unreadable_body_is_json_400() {
    let server = MockServer::start().await;

    for uri in ["/api/replicate", "/api/fal", "/api/openai"] {
        let (status, body) = post_raw(relay_for(&server), uri, "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].as_str().is_some_and(|m| !m.is_empty()), "{uri}");
    }

    let (status, body) = post_json(
        relay_for(&server),
        "/api/fal",
        json!({"falKey": "id:secret", "prompt": 42}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_openai_uses_bearer_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "dall-e-3", "prompt": "a cat"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"url": "https://oaidalle.example/cat.png"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = post_json(
        relay_for(&server),
        "/api/openai",
        json!({"openaiKey": "sk-test", "model": "dall-e-3", "prompt": "a cat"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["url"], "https://oaidalle.example/cat.png");
}
