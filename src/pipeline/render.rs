//! PDF rasterisation: render every page to a PNG data URI via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so a
//! multi-page render never stalls the runtime driving other files' model
//! calls.
//!
//! ## Why check the signature first?
//!
//! A non-PDF upload is the most common decode failure. Rejecting it from the
//! first four bytes reports a precise error and needs no pdfium binding at
//! all, which keeps that path testable on machines without libpdfium.
//!
//! ## All or nothing
//!
//! One failed page fails the whole document. A truncated page list would be
//! sent to the model as if it were the full invoice.

use crate::error::InvoiceError;
use crate::pipeline::encode::encode_page;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// One rendered page, ready for the model request.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    /// 1-based page number.
    pub page_number: usize,
    /// `data:image/png;base64,…`
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

/// Turns PDF bytes into an ordered page image sequence.
///
/// Implementations return either one image per page in page order or an
/// error from the decode family; never a partial sequence.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, bytes: &[u8], scale: f32) -> Result<Vec<PageImage>, InvoiceError>;
}

/// [`PageRasterizer`] backed by the pdfium library.
///
/// The library is bound per call: `PDFIUM_LIB_PATH` (a file, or a directory
/// holding the platform library) when set, else the system library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self {
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }

    /// Bind to an explicit library file or directory instead of the environment.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn rasterize(&self, bytes: &[u8], scale: f32) -> Result<Vec<PageImage>, InvoiceError> {
        check_pdf_signature(bytes)?;

        let bytes = bytes.to_vec();
        let library_path = self.library_path.clone();

        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(library_path.as_ref())?;
            render_all_blocking(&pdfium, &bytes, scale)
        })
        .await
        .map_err(|e| InvoiceError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Reject bytes that do not start with `%PDF`.
pub fn check_pdf_signature(bytes: &[u8]) -> Result<(), InvoiceError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(InvoiceError::NotAPdf {
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

fn bind_pdfium(library_path: Option<&PathBuf>) -> Result<Pdfium, InvoiceError> {
    let bindings = match library_path {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| InvoiceError::PdfiumBindingFailed(e.to_string()))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of page rendering.
///
/// The document handle and every bitmap are dropped before returning, on the
/// error paths too.
fn render_all_blocking(
    pdfium: &Pdfium,
    bytes: &[u8],
    scale: f32,
) -> Result<Vec<PageImage>, InvoiceError> {
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| InvoiceError::Decode {
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let mut results = Vec::with_capacity(total_pages);

    for (idx, page) in pages.iter().enumerate() {
        let page_number = idx + 1;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            InvoiceError::RasterisationFailed {
                page: page_number,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        let data_uri = encode_page(&image).map_err(|e| InvoiceError::ImageEncoding {
            page: page_number,
            detail: e.to_string(),
        })?;

        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );

        results.push(PageImage {
            page_number,
            data_uri,
            width: image.width(),
            height: image.height(),
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_accepts_pdf_header() {
        assert!(check_pdf_signature(b"%PDF-1.7\n%\xe2\xe3").is_ok());
    }

    #[test]
    fn signature_rejects_other_bytes() {
        let err = check_pdf_signature(b"PK\x03\x04zip").unwrap_err();
        assert!(err.is_decode_error());
        match err {
            InvoiceError::NotAPdf { magic } => assert_eq!(magic, b"PK\x03\x04"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn signature_rejects_empty_input() {
        assert!(matches!(
            check_pdf_signature(b""),
            Err(InvoiceError::NotAPdf { .. })
        ));
    }

    #[tokio::test]
    async fn rasterizer_rejects_non_pdf_without_pdfium() {
        let rasterizer = PdfiumRasterizer::with_library_path("/nonexistent/libpdfium.so");
        let err = rasterizer
            .rasterize(b"hello, not a pdf", 2.0)
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::NotAPdf { .. }));
    }
}
