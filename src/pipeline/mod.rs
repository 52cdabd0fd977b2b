//! Pipeline stages for batched document analysis.
//!
//! Each submodule implements one step; the orchestrator in
//! [`crate::analyze`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ batch ──▶ request ──▶ stream ──▶ sink
//! (.pdf)    (pdfium)   (base64)   (split)   (body)     (fold)     (.md)
//! ```
//!
//! 1. [`input`]  : validate the document path and derive the result path
//! 2. [`render`] : rasterise every page to JPEG; runs in `spawn_blocking`
//! 3. [`encode`] : base64-encode page images with bounded concurrency
//! 4. [`batch`]  : partition encoded images into contiguous batches
//! 5. [`request`]: build one chat request per batch
//! 6. [`stream`] : consume a streaming response into text plus usage
//! 7. [`sink`]   : persist the joined document text

pub mod batch;
pub mod encode;
pub mod input;
pub mod render;
pub mod request;
pub mod sink;
pub mod stream;
