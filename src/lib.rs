//! # invoice-extract
//!
//! Extract structured invoice data from PDFs with a vision language model.
//!
//! ## Why this crate?
//!
//! Invoice layouts vary per vendor, so template-based parsers break on every
//! new supplier. Instead each page is rasterised and a VLM reads it the way a
//! clerk would, guided by a user-defined field schema. The reply is validated
//! against that schema and stored as a record ready for spreadsheet export.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Hash      SHA-256 content address (dedup key)
//!  ├─ 2. Render    rasterise pages via pdfium (spawn_blocking) → PNG data URIs
//!  ├─ 3. Compile   field schema → prompt shape + expected keys
//!  ├─ 4. Extract   one chat-completion request with every page image
//!  ├─ 5. Validate  reply text → scalar + array data, total over bad shapes
//!  └─ 6. Record    processing → completed | error, persisted snapshot
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_extract::{
//!     load_input, FileSnapshot, HttpExtractionClient, InvoiceProcessor, PdfiumRasterizer,
//!     RecordStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(RecordStore::load(FileSnapshot::in_dir("./invoice-data")));
//!     let processor = InvoiceProcessor::new(
//!         store.clone(),
//!         Arc::new(PdfiumRasterizer::new()),
//!         Arc::new(HttpExtractionClient::new(None)),
//!     );
//!
//!     let file = load_input("invoice.pdf", 60).await?;
//!     let outcome = processor.process_file(file).await;
//!     println!("{} → {}", outcome.file_name, outcome.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-extract` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `proxy` | via `cli` | The `/llm-proxy` pass-through server ([`proxy`]) on axum |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! invoice-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
#[cfg(feature = "proxy")]
pub mod proxy;
pub mod record;
pub mod schema;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ApiConfig, PipelineConfig, PipelineConfigBuilder};
pub use error::{InvoiceError, StoreError};
pub use export::{build_tables, write_csv, write_xlsx, Table};
pub use pipeline::compile::{compile_schema, CompiledSchema, ExpectedKeys};
pub use pipeline::hash::content_hash;
pub use pipeline::input::{load_input, InputFile};
pub use pipeline::llm::{ExtractionBackend, HttpExtractionClient};
pub use pipeline::render::{PageImage, PageRasterizer, PdfiumRasterizer};
pub use pipeline::validate::{validate_response, ExtractedData};
pub use process::{InvoiceProcessor, ProcessOutcome, SUPERSEDED_MESSAGE};
pub use progress::{NoopObserver, ProcessingObserver};
pub use record::{AppState, FieldValue, InvoiceRecord, RecordStatus};
pub use schema::{default_field_configs, validate_schema, DataType, FieldConfig, SubFieldConfig};
pub use store::{FileSnapshot, MemorySnapshot, RecordStore, SnapshotBackend};
