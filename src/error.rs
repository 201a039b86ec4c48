//! Error types for the invoice-extract library.
//!
//! Two error types reflect two different policies:
//!
//! * [`InvoiceError`]: a typed failure of one pipeline run (bad PDF, model
//!   call rejected, reply without JSON) or of a configuration change. The
//!   orchestrator catches these at its boundary and turns them into an
//!   `error` record whose message is the error's `Display` text.
//!
//! * [`StoreError`]: a snapshot could not be read or written. Persistence is
//!   best-effort: the record store logs these and keeps going with its
//!   in-memory state, so they never reach pipeline callers.

use std::path::PathBuf;
use thiserror::Error;

/// All typed failures produced by the extraction pipeline.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure while reading an input file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Decode errors ─────────────────────────────────────────────────────
    /// The bytes do not start with the `%PDF` signature.
    #[error("Not a valid PDF file (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// pdfium could not parse the document.
    #[error("Failed to decode PDF: {detail}")]
    Decode { detail: String },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A rendered page could not be encoded as PNG.
    #[error("Image encoding failed for page {page}: {detail}")]
    ImageEncoding { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
         Install libpdfium or set PDFIUM_LIB_PATH=/path/to/libpdfium"
    )]
    PdfiumBindingFailed(String),

    // ── Model call errors ─────────────────────────────────────────────────
    /// The endpoint answered with a non-success status. Body kept verbatim.
    #[error("API error {status}: {body}")]
    Upstream { status: u16, body: String },

    /// No response at all: connection refused, DNS failure, reset.
    #[error("Proxy error: {detail}")]
    Proxy { detail: String },

    /// A 2xx reply that is not a chat-completion document.
    #[error("Unexpected model response: {0}")]
    UnexpectedResponse(String),

    // ── Validator errors ──────────────────────────────────────────────────
    #[error("No JSON object found in model response")]
    NoJsonFound,

    #[error("Malformed JSON in model response: {detail}")]
    MalformedJson { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A field schema violates an id/label invariant.
    #[error("Invalid field schema: {0}")]
    InvalidSchema(String),

    /// Builder or API configuration validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Export errors ─────────────────────────────────────────────────────
    #[error("Failed to write export '{path}': {detail}")]
    ExportFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InvoiceError {
    /// True for the decode family: the input bytes are not a renderable PDF.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            InvoiceError::NotAPdf { .. }
                | InvoiceError::Decode { .. }
                | InvoiceError::RasterisationFailed { .. }
                | InvoiceError::ImageEncoding { .. }
        )
    }

    /// True when repeating the same model call might succeed.
    ///
    /// Only consulted when the caller opted into retries; 4xx other than 429
    /// never qualifies.
    pub fn is_retryable(&self) -> bool {
        match self {
            InvoiceError::Upstream { status, .. } => *status == 429 || *status >= 500,
            InvoiceError::Proxy { .. } => true,
            _ => false,
        }
    }
}

/// Snapshot persistence failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Snapshot I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot serialisation failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_display_keeps_status_and_body() {
        let e = InvoiceError::Upstream {
            status: 401,
            body: "{\"error\":\"bad key\"}".into(),
        };
        assert_eq!(e.to_string(), "API error 401: {\"error\":\"bad key\"}");
    }

    #[test]
    fn retryable_classification() {
        assert!(InvoiceError::Upstream {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(InvoiceError::Upstream {
            status: 429,
            body: String::new()
        }
        .is_retryable());
        assert!(!InvoiceError::Upstream {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(InvoiceError::Proxy {
            detail: "connection refused".into()
        }
        .is_retryable());
        assert!(!InvoiceError::NoJsonFound.is_retryable());
    }

    #[test]
    fn decode_family() {
        assert!(InvoiceError::NotAPdf {
            magic: b"hell".to_vec()
        }
        .is_decode_error());
        assert!(InvoiceError::Decode {
            detail: "xref".into()
        }
        .is_decode_error());
        assert!(!InvoiceError::NoJsonFound.is_decode_error());
    }

    #[test]
    fn validator_messages() {
        assert_eq!(
            InvoiceError::NoJsonFound.to_string(),
            "No JSON object found in model response"
        );
        let e = InvoiceError::MalformedJson {
            detail: "EOF while parsing".into(),
        };
        assert!(e.to_string().contains("EOF while parsing"));
    }
}
