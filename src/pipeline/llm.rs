//! Extraction client: one chat-completion request per invoice.
//!
//! The request is a system instruction plus a single user message whose
//! content is the compiled prompt followed by every page image in page order.
//! This module makes exactly one attempt per call. Whether a failed call is
//! repeated is decided by the orchestrator, which knows the caller's retry
//! policy.
//!
//! ## Proxy
//!
//! When a proxy URL is configured the body goes to the proxy instead, with
//! the real endpoint in `X-LLM-Target-URL` and the key in `X-LLM-API-Key`.
//! The proxy relays the upstream status and body unchanged, so the error
//! mapping below is the same on both paths.

use crate::config::ApiConfig;
use crate::error::InvoiceError;
use crate::pipeline::render::PageImage;
use crate::prompts::SYSTEM_INSTRUCTION;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Header carrying the real chat-completions URL through the proxy.
pub const TARGET_URL_HEADER: &str = "X-LLM-Target-URL";
/// Header carrying the API key through the proxy.
pub const API_KEY_HEADER: &str = "X-LLM-API-Key";

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System { content: String },
    User { content: Vec<ContentPart> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Build the request body. Text part first, then one image part per page.
pub fn build_chat_request(pages: &[PageImage], prompt: &str, api: &ApiConfig) -> ChatRequest {
    let mut content = Vec::with_capacity(pages.len() + 1);
    content.push(ContentPart::Text {
        text: prompt.to_string(),
    });
    content.extend(pages.iter().map(|page| ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: page.data_uri.clone(),
        },
    }));

    ChatRequest {
        model: api.model.clone(),
        messages: vec![
            ChatMessage::System {
                content: SYSTEM_INSTRUCTION.to_string(),
            },
            ChatMessage::User { content },
        ],
        max_tokens: api.max_tokens,
        temperature: api.temperature,
        stream: false,
    }
}

// ── Backend seam ─────────────────────────────────────────────────────────────

/// Sends pages plus prompt to a model and returns the raw assistant text.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn extract(
        &self,
        pages: &[PageImage],
        prompt: &str,
        api: &ApiConfig,
    ) -> Result<String, InvoiceError>;
}

/// [`ExtractionBackend`] speaking the OpenAI chat-completions protocol.
#[derive(Debug, Clone)]
pub struct HttpExtractionClient {
    client: reqwest::Client,
    proxy_url: Option<String>,
}

impl HttpExtractionClient {
    /// `proxy_url` is the full proxy endpoint, e.g. `http://127.0.0.1:3001/llm-proxy`.
    pub fn new(proxy_url: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), proxy_url)
    }

    pub fn with_client(client: reqwest::Client, proxy_url: Option<String>) -> Self {
        Self { client, proxy_url }
    }
}

#[async_trait]
impl ExtractionBackend for HttpExtractionClient {
    async fn extract(
        &self,
        pages: &[PageImage],
        prompt: &str,
        api: &ApiConfig,
    ) -> Result<String, InvoiceError> {
        let body = build_chat_request(pages, prompt, api);
        let target = api.chat_completions_url();

        let request = match &self.proxy_url {
            Some(proxy) => {
                let mut req = self
                    .client
                    .post(proxy)
                    .header(TARGET_URL_HEADER, &target);
                if let Some(key) = &api.api_key {
                    req = req.header(API_KEY_HEADER, key);
                }
                req
            }
            None => {
                let mut req = self.client.post(&target);
                if let Some(key) = &api.api_key {
                    req = req.bearer_auth(key);
                }
                req
            }
        };

        debug!(
            "POST {} ({} page images, model {})",
            target,
            pages.len(),
            api.model
        );

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| InvoiceError::Proxy {
                detail: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| InvoiceError::Proxy {
            detail: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(InvoiceError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        assistant_text(&text)
    }
}

/// Pull `choices[0].message.content` out of a chat-completion document.
fn assistant_text(body: &str) -> Result<String, InvoiceError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| InvoiceError::UnexpectedResponse(format!("invalid JSON: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            InvoiceError::UnexpectedResponse("missing choices[0].message.content".into())
        })
}
