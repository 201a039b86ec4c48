//! Record store: the single owner of [`AppState`].
//!
//! Every mutation is one locked read-modify-persist step, so concurrent
//! pipeline runs can finish in any order without clobbering each other's
//! records. Callers hold an `Arc<RecordStore>` and only ever receive clones
//! of the state.
//!
//! ## Persistence is best-effort
//!
//! A snapshot write that fails (disk full, read-only directory) is logged and
//! swallowed. The in-memory state stays authoritative for the session and
//! the next successful write carries everything forward.
//!
//! ## Recovery
//!
//! A record still in `processing` when a snapshot is loaded belongs to a run
//! that never finished. [`RecordStore::load`] moves it to `error` so nothing
//! stays stuck mid-flight across restarts.

use crate::config::ApiConfig;
use crate::error::{InvoiceError, StoreError};
use crate::record::{AppState, ArrayData, InvoiceRecord, RecordStatus, ScalarData};
use crate::schema::{validate_schema, FieldConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Fixed key the snapshot is stored under.
pub const STORAGE_KEY: &str = "invoice-processor-state";

/// Error message given to records recovered from an interrupted session.
pub const INTERRUPTED_MESSAGE: &str = "Interrupted by page refresh";

// ── Snapshot backends ────────────────────────────────────────────────────────

/// Whole-document snapshot storage.
pub trait SnapshotBackend: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn read(&self) -> Result<Option<String>, StoreError>;
    fn write(&self, contents: &str) -> Result<(), StoreError>;
}

/// JSON file `invoice-processor-state.json` inside a directory.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{STORAGE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotBackend for FileSnapshot {
    fn read(&self) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

/// In-process snapshot, for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    contents: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Last successfully written document.
    pub fn contents(&self) -> Option<String> {
        lock(&self.contents).clone()
    }

    /// Make subsequent writes fail, simulating a full or read-only store.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl SnapshotBackend for MemorySnapshot {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.contents).clone())
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from(STORAGE_KEY),
                source: std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded"),
            });
        }
        *lock(&self.contents) = Some(contents.to_string());
        Ok(())
    }
}

impl<T: SnapshotBackend + ?Sized> SnapshotBackend for Arc<T> {
    fn read(&self) -> Result<Option<String>, StoreError> {
        (**self).read()
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        (**self).write(contents)
    }
}

/// A panic while holding the lock cannot leave `AppState` half-written
/// (every mutation replaces whole values), so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Record store ─────────────────────────────────────────────────────────────

pub struct RecordStore {
    state: Mutex<AppState>,
    backend: Box<dyn SnapshotBackend>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("invoices", &lock(&self.state).invoices.len())
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Load the snapshot, apply the recovery rule and persist the result once.
    ///
    /// A missing, unreadable or unparsable snapshot yields the default state.
    pub fn load(backend: impl SnapshotBackend + 'static) -> Self {
        let mut state = match backend.read() {
            Ok(Some(raw)) => serde_json::from_str::<AppState>(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unparsable snapshot: {}", e);
                AppState::default()
            }),
            Ok(None) => AppState::default(),
            Err(e) => {
                warn!("{}", e);
                AppState::default()
            }
        };

        let recovered = recover_interrupted(&mut state);
        if recovered > 0 {
            info!("Marked {} interrupted record(s) as failed", recovered);
        }

        let store = Self {
            state: Mutex::new(state),
            backend: Box::new(backend),
        };
        store.persist(&lock(&store.state));
        store
    }

    /// Replace the whole state and persist it.
    pub fn save(&self, state: AppState) {
        self.mutate(|current| {
            *current = state;
        });
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> AppState {
        lock(&self.state).clone()
    }

    pub fn invoices(&self) -> Vec<InvoiceRecord> {
        lock(&self.state).invoices.clone()
    }

    pub fn get(&self, id: &str) -> Option<InvoiceRecord> {
        lock(&self.state).invoices.iter().find(|r| r.id == id).cloned()
    }

    pub fn field_configs(&self) -> Vec<FieldConfig> {
        lock(&self.state).field_configs.clone()
    }

    pub fn api_config(&self) -> ApiConfig {
        lock(&self.state).api_config.clone()
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Replace the field schema. Invalid schemas are rejected unchanged.
    pub fn set_field_configs(&self, fields: Vec<FieldConfig>) -> Result<(), InvoiceError> {
        validate_schema(&fields)?;
        self.mutate(|state| state.field_configs = fields);
        Ok(())
    }

    pub fn set_api_config(&self, api: ApiConfig) -> Result<(), InvoiceError> {
        api.validate()?;
        self.mutate(|state| state.api_config = api);
        Ok(())
    }

    /// Put a record into `processing`, upserting by content hash.
    ///
    /// A record with the same `file_hash` is replaced at its position with a
    /// fresh one (stale data and error cleared); otherwise the record is
    /// appended. Calling again with the same id and hash refines the page
    /// count in place.
    pub fn start_processing(&self, id: &str, file_name: &str, file_hash: &str, page_count: usize) {
        let record = InvoiceRecord::processing(id, file_name, file_hash, page_count);
        self.mutate(|state| {
            match state.invoices.iter_mut().find(|r| r.file_hash == file_hash) {
                Some(existing) => {
                    debug!("Replacing record {} with {} (same content)", existing.id, id);
                    *existing = record;
                }
                None => state.invoices.push(record),
            }
        });
    }

    /// `processing → completed`. Returns `false` (and changes nothing) when
    /// no record with this id is in `processing`.
    pub fn complete_processing(
        &self,
        id: &str,
        scalar_data: ScalarData,
        array_data: ArrayData,
        raw_response: String,
    ) -> bool {
        self.transition(id, "complete", |record| {
            record.scalar_data = scalar_data;
            record.array_data = array_data;
            record.raw_response = raw_response;
            record.status = RecordStatus::Completed;
            record.error_message = None;
        })
    }

    /// `processing → error`. Extracted data and raw response are cleared.
    pub fn record_error(&self, id: &str, message: &str) -> bool {
        self.transition(id, "fail", |record| {
            record.scalar_data.clear();
            record.array_data.clear();
            record.raw_response.clear();
            record.status = RecordStatus::Error;
            record.error_message = Some(message.to_string());
        })
    }

    pub fn remove_invoice(&self, id: &str) -> bool {
        self.mutate(|state| {
            let before = state.invoices.len();
            state.invoices.retain(|r| r.id != id);
            state.invoices.len() != before
        })
    }

    fn transition(&self, id: &str, what: &str, apply: impl FnOnce(&mut InvoiceRecord)) -> bool {
        self.mutate(|state| {
            match state
                .invoices
                .iter_mut()
                .find(|r| r.id == id && r.status == RecordStatus::Processing)
            {
                Some(record) => {
                    apply(record);
                    true
                }
                None => {
                    warn!("Ignoring {} for record {}: not processing", what, id);
                    false
                }
            }
        })
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut state = lock(&self.state);
        let result = f(&mut state);
        self.persist(&state);
        result
    }

    fn persist(&self, state: &AppState) {
        let written = serde_json::to_string(state)
            .map_err(StoreError::from)
            .and_then(|json| self.backend.write(&json));
        if let Err(e) = written {
            warn!("Snapshot not saved: {}", e);
        }
    }
}

fn recover_interrupted(state: &mut AppState) -> usize {
    let mut count = 0;
    for record in state
        .invoices
        .iter_mut()
        .filter(|r| r.status == RecordStatus::Processing)
    {
        record.status = RecordStatus::Error;
        record.error_message = Some(INTERRUPTED_MESSAGE.to_string());
        count += 1;
    }
    count
}
