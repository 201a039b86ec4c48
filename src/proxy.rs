//! Pass-through proxy for model requests.
//!
//! `POST /llm-proxy` forwards the request body unchanged to the URL in
//! `X-LLM-Target-URL`, turning `X-LLM-API-Key` into a bearer token, and
//! relays the upstream status, content type and body. Browsers and other
//! clients that cannot reach the model endpoint directly (CORS, private
//! network) point [`crate::pipeline::llm::HttpExtractionClient`] here.

use crate::pipeline::llm::{API_KEY_HEADER, TARGET_URL_HEADER};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// Route the proxy is mounted on.
pub const PROXY_PATH: &str = "/llm-proxy";

#[derive(Clone)]
struct ProxyState {
    client: reqwest::Client,
}

/// Build the proxy router around a shared HTTP client.
pub fn router(client: reqwest::Client) -> Router {
    Router::new()
        .route(PROXY_PATH, post(handle_llm_proxy))
        .with_state(ProxyState { client })
}

/// Bind `addr` and serve the proxy until the process exits.
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("LLM proxy listening on http://{}{}", listener.local_addr()?, PROXY_PATH);
    axum::serve(listener, router(reqwest::Client::new())).await
}

async fn handle_llm_proxy(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(target) = header_str(&headers, TARGET_URL_HEADER) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing X-LLM-Target-URL header" })),
        )
            .into_response();
    };

    let mut request = state
        .client
        .post(target)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body);
    if let Some(key) = header_str(&headers, API_KEY_HEADER) {
        request = request.bearer_auth(key);
    }

    debug!("Forwarding model request to {}", target);

    let upstream = match request.send().await {
        Ok(response) => response,
        Err(e) => return bad_gateway(e),
    };

    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));

    match upstream.bytes().await {
        Ok(bytes) => (status, [(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(e) => bad_gateway(e),
    }
}

fn bad_gateway(e: reqwest::Error) -> Response {
    warn!("Proxy upstream failed: {}", e);
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": format!("Proxy error: {e}") })),
    )
        .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
