//! Extraction client and proxy against an in-process axum upstream.
//!
//! Everything binds to 127.0.0.1 on an ephemeral port; no external network.
#![cfg(feature = "proxy")]

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use invoice_extract::{proxy, ApiConfig, ExtractionBackend, HttpExtractionClient, InvoiceError, PageImage};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// What the fake model endpoint received.
#[derive(Default)]
struct Seen {
    authorization: Option<String>,
    body: Option<Value>,
}

async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Fake chat-completions endpoint answering `content`, or 429 when `content`
/// is `None`.
async fn spawn_model(content: Option<&'static str>) -> (SocketAddr, Arc<Mutex<Seen>>) {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let seen_in_handler = seen.clone();

    let router = Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let seen = seen_in_handler.clone();
            async move {
                let mut s = seen.lock().unwrap();
                s.authorization = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                s.body = Some(body);
                match content {
                    Some(text) => (
                        StatusCode::OK,
                        Json(json!({"choices": [{"message": {"role": "assistant", "content": text}}]})),
                    ),
                    None => (
                        StatusCode::TOO_MANY_REQUESTS,
                        Json(json!({"error": "rate limited"})),
                    ),
                }
            }
        }),
    );
    (spawn(router).await, seen)
}

fn api_for(addr: SocketAddr, key: Option<&str>) -> ApiConfig {
    ApiConfig {
        base_url: format!("http://{addr}/v1"),
        api_key: key.map(str::to_string),
        ..ApiConfig::default()
    }
}

fn pages() -> Vec<PageImage> {
    vec![
        PageImage {
            page_number: 1,
            data_uri: "data:image/png;base64,AAA".into(),
            width: 1,
            height: 1,
        },
        PageImage {
            page_number: 2,
            data_uri: "data:image/png;base64,BBB".into(),
            width: 1,
            height: 1,
        },
    ]
}

#[tokio::test]
async fn direct_call_sends_bearer_and_returns_content() {
    let (addr, seen) = spawn_model(Some(r#"{"total": 1}"#)).await;
    let client = HttpExtractionClient::new(None);

    let text = client
        .extract(&pages(), "PROMPT", &api_for(addr, Some("sk-test")))
        .await
        .unwrap();
    assert_eq!(text, r#"{"total": 1}"#);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.authorization.as_deref(), Some("Bearer sk-test"));
    let body = seen.body.as_ref().unwrap();
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][1]["content"][0]["text"], "PROMPT");
    assert_eq!(
        body["messages"][1]["content"][2]["image_url"]["url"],
        "data:image/png;base64,BBB"
    );
}

#[tokio::test]
async fn call_through_proxy_relays_status_and_body() {
    let (model_addr, seen) = spawn_model(None).await;
    let proxy_addr = spawn(proxy::router(reqwest::Client::new())).await;
    let client = HttpExtractionClient::new(Some(format!("http://{proxy_addr}/llm-proxy")));

    let err = client
        .extract(&pages(), "PROMPT", &api_for(model_addr, Some("sk-proxy")))
        .await
        .unwrap_err();

    match err {
        InvoiceError::Upstream { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, r#"{"error":"rate limited"}"#);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        seen.lock().unwrap().authorization.as_deref(),
        Some("Bearer sk-proxy")
    );
}

#[tokio::test]
async fn proxy_success_path_returns_model_text() {
    let (model_addr, seen) = spawn_model(Some("{}")).await;
    let proxy_addr = spawn(proxy::router(reqwest::Client::new())).await;
    let client = HttpExtractionClient::new(Some(format!("http://{proxy_addr}/llm-proxy")));

    let text = client
        .extract(&pages(), "P", &api_for(model_addr, None))
        .await
        .unwrap();
    assert_eq!(text, "{}");
    assert_eq!(seen.lock().unwrap().authorization, None);
}

#[tokio::test]
async fn proxy_rejects_missing_target_header() {
    let response = proxy::router(reqwest::Client::new())
        .oneshot(
            Request::post("/llm-proxy")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"error": "Missing X-LLM-Target-URL header"}));
}

#[tokio::test]
async fn proxy_reports_unreachable_upstream_as_502() {
    // Bind then drop to get a port with nothing listening.
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let response = proxy::router(reqwest::Client::new())
        .oneshot(
            Request::post("/llm-proxy")
                .header("X-LLM-Target-URL", format!("http://{closed}/v1/chat/completions"))
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Proxy error: "));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let client = HttpExtractionClient::new(None);

    let err = client
        .extract(&pages(), "P", &api_for(closed, None))
        .await
        .unwrap_err();
    assert!(matches!(err, InvoiceError::Proxy { .. }));
    assert!(err.is_retryable());
}
