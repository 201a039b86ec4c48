//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements one transformation step and is testable on its
//! own. The orchestrator in [`crate::process`] composes them per file.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ hash
//!   │
//!   └────▶ render ──▶ encode ──┐
//!                              ├──▶ llm ──▶ validate
//! schema ──▶ compile ──────────┘
//! ```
//!
//! 1. [`input`]:    read a local file or download a URL into memory
//! 2. [`hash`]:     SHA-256 content address used as the dedup key
//! 3. [`render`]:   rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 4. [`encode`]:   PNG-encode each page into a `data:` URI
//! 5. [`compile`]:  field schema → prompt text + expected-key index
//! 6. [`llm`]:      one chat-completion request; the only stage with
//!    network I/O
//! 7. [`validate`]: model text → schema-shaped scalar and array data

pub mod compile;
pub mod encode;
pub mod hash;
pub mod input;
pub mod llm;
pub mod render;
pub mod validate;
