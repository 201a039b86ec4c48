//! Pipeline orchestrator: one invoice file from bytes to a terminal record.
//!
//! ## Lifecycle
//!
//! For every file that was read successfully:
//!
//! 1. hash the bytes, mint an id, `start_processing` with `page_count = 0`;
//! 2. rasterise; on success `start_processing` again with the real page count
//!    (same id and hash, refined in place);
//! 3. compile the schema prompt;
//! 4. call the extraction backend;
//! 5. validate the reply;
//! 6. `complete_processing`, or `record_error` with the failing step's message.
//!
//! Failures never escape [`InvoiceProcessor::process_file`]. They become an
//! `error` record and an [`ProcessOutcome::error`] string, so one bad file
//! cannot abort the rest of a batch.
//!
//! ## Why no threads?
//!
//! Files in a batch interleave on the caller's task via
//! `futures::StreamExt::buffered`. The only CPU-heavy stage (pdfium) already
//! runs on the blocking pool; everything else is waiting on the network.

use crate::config::{ApiConfig, PipelineConfig};
use crate::error::InvoiceError;
use crate::pipeline::compile::compile_schema;
use crate::pipeline::hash::content_hash;
use crate::pipeline::input::InputFile;
use crate::pipeline::llm::ExtractionBackend;
use crate::pipeline::render::{PageImage, PageRasterizer};
use crate::pipeline::validate::{validate_response, ExtractedData};
use crate::record::RecordStatus;
use crate::schema::FieldConfig;
use crate::store::RecordStore;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome error for a run whose record was replaced by a later run of the
/// same content before it finished.
pub const SUPERSEDED_MESSAGE: &str = "Superseded by a newer run of the same content";

/// What happened to one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub id: String,
    pub file_name: String,
    pub file_hash: String,
    /// `Completed` or `Error`.
    pub status: RecordStatus,
    pub page_count: usize,
    pub error: Option<String>,
}

/// Drives files through the pipeline against a shared [`RecordStore`].
#[derive(Clone)]
pub struct InvoiceProcessor {
    store: Arc<RecordStore>,
    rasterizer: Arc<dyn PageRasterizer>,
    backend: Arc<dyn ExtractionBackend>,
    config: PipelineConfig,
}

impl InvoiceProcessor {
    pub fn new(
        store: Arc<RecordStore>,
        rasterizer: Arc<dyn PageRasterizer>,
        backend: Arc<dyn ExtractionBackend>,
    ) -> Self {
        Self {
            store,
            rasterizer,
            backend,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Process one file to a terminal record.
    pub async fn process_file(&self, file: InputFile) -> ProcessOutcome {
        let start = Instant::now();
        let file_hash = content_hash(&file.bytes);
        let id = Uuid::new_v4().to_string();

        // Schema and endpoint are fixed for the whole run, even if the user
        // edits them while the model call is in flight.
        let fields = self.store.field_configs();
        let api = self.store.api_config();

        self.store.start_processing(&id, &file.file_name, &file_hash, 0);
        if let Some(ref o) = self.config.observer {
            o.on_file_start(&id, &file.file_name);
        }
        info!("Processing {} ({})", file.file_name, &file_hash[..12]);

        let mut page_count = 0;
        let result = self
            .run_stages(&id, &file, &file_hash, &fields, &api, &mut page_count)
            .await;

        let outcome = |status, error| ProcessOutcome {
            id: id.clone(),
            file_name: file.file_name.clone(),
            file_hash: file_hash.clone(),
            status,
            page_count,
            error,
        };

        // A `false` transition means a later run of the same content took
        // over the record slot and this run's id is gone from the store.
        let message = match result {
            Ok((extracted, raw_response)) => {
                let applied = self.store.complete_processing(
                    &id,
                    extracted.scalar_data,
                    extracted.array_data,
                    raw_response,
                );
                if applied {
                    if let Some(ref o) = self.config.observer {
                        o.on_file_complete(&id, &file.file_name);
                    }
                    info!(
                        "Completed {} in {}ms",
                        file.file_name,
                        start.elapsed().as_millis()
                    );
                    return outcome(RecordStatus::Completed, None);
                }
                SUPERSEDED_MESSAGE.to_string()
            }
            Err(e) => {
                let message = e.to_string();
                if self.store.record_error(&id, &message) {
                    message
                } else {
                    SUPERSEDED_MESSAGE.to_string()
                }
            }
        };

        if let Some(ref o) = self.config.observer {
            o.on_file_error(&id, &file.file_name, &message);
        }
        warn!("Failed {}: {}", file.file_name, message);
        outcome(RecordStatus::Error, Some(message))
    }

    /// Process a batch, at most `concurrency` files in flight. Outcomes are
    /// returned in input order.
    pub async fn process_files(&self, files: Vec<InputFile>) -> Vec<ProcessOutcome> {
        let total = files.len();
        if let Some(ref o) = self.config.observer {
            o.on_batch_start(total);
        }

        let outcomes: Vec<ProcessOutcome> = stream::iter(files.into_iter().map(|file| {
            let processor = self.clone();
            async move { processor.process_file(file).await }
        }))
        .buffered(self.config.concurrency.max(1))
        .collect()
        .await;

        let succeeded = outcomes
            .iter()
            .filter(|o| o.status == RecordStatus::Completed)
            .count();
        if let Some(ref o) = self.config.observer {
            o.on_batch_complete(total, succeeded);
        }
        info!("Batch complete: {}/{} succeeded", succeeded, total);

        outcomes
    }

    /// Steps 2–5. Returns the validated data plus the raw model text.
    async fn run_stages(
        &self,
        id: &str,
        file: &InputFile,
        file_hash: &str,
        fields: &[FieldConfig],
        api: &ApiConfig,
        page_count: &mut usize,
    ) -> Result<(ExtractedData, String), InvoiceError> {
        let pages = self
            .rasterizer
            .rasterize(&file.bytes, self.config.scale)
            .await?;
        *page_count = pages.len();

        self.store
            .start_processing(id, &file.file_name, file_hash, pages.len());
        if let Some(ref o) = self.config.observer {
            o.on_pages_rasterized(id, pages.len());
        }
        debug!("{}: {} pages rasterised", file.file_name, pages.len());

        let compiled = compile_schema(fields);
        let raw = self.extract_with_retry(&pages, &compiled.prompt, api).await?;
        let extracted = validate_response(&raw, &compiled.keys)?;
        Ok((extracted, raw))
    }

    /// One model call, repeated only for retryable errors and only when the
    /// caller configured `max_retries`.
    async fn extract_with_retry(
        &self,
        pages: &[PageImage],
        prompt: &str,
        api: &ApiConfig,
    ) -> Result<String, InvoiceError> {
        let mut attempt = 0;
        loop {
            match self.backend.extract(pages, prompt, api).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff = retry_backoff_ms(self.config.retry_backoff_ms, attempt);
                    warn!(
                        "Model call failed ({}); retry {}/{} after {}ms",
                        e, attempt, self.config.max_retries, backoff
                    );
                    sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `base_ms * 2^(attempt - 1)`, saturating instead of overflowing.
fn retry_backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}
