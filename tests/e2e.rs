//! End-to-end tests against a live Ark endpoint.
//!
//! These render a real PDF with pdfium and make live model calls. They are
//! gated behind `E2E_ENABLED` and need:
//!
//! * `VOLC_APIKEY`: Ark API key
//! * `DOCBATCH_E2E_PDF`: path to a small PDF (a copy is analyzed)
//! * `DOCBATCH_E2E_MODEL`: model ID (default `doubao-seed-1.6-vision`)
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/opt/pdfium cargo test --test e2e -- --nocapture

use docbatch::{convert, AnalysisConfig, AnalysisProgressCallback, DocBatchError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn model() -> String {
    std::env::var("DOCBATCH_E2E_MODEL").unwrap_or_else(|_| "doubao-seed-1.6-vision".into())
}

/// Skip unless E2E is enabled, a key is present and the PDF exists.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if std::env::var("VOLC_APIKEY").is_err() {
            println!("SKIP: VOLC_APIKEY is not set");
            return;
        }
        let p = match std::env::var("DOCBATCH_E2E_PDF") {
            Ok(p) => PathBuf::from(p),
            Err(_) => {
                println!("SKIP: set DOCBATCH_E2E_PDF to a PDF path");
                return;
            }
        };
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Copy the PDF into a temp dir so page images and the `.md` land there.
fn staged_copy(pdf: &PathBuf) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("e2e.pdf");
    std::fs::copy(pdf, &target).unwrap();
    (dir, target)
}

#[derive(Default)]
struct Released(AtomicUsize);

impl AnalysisProgressCallback for Released {
    fn on_resources_released(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_convert_writes_markdown_and_usage() {
    let pdf = e2e_skip_unless_ready!();
    let (dir, pdf) = staged_copy(&pdf);
    let released = Arc::new(Released::default());

    let config = AnalysisConfig::builder()
        .model(model())
        .batch_size(2)
        .progress_callback(released.clone())
        .build()
        .unwrap();

    let output = convert(&pdf, &config).await.expect("conversion");

    let md = dir.path().join("e2e.md");
    assert_eq!(output.result_path, md);
    let text = std::fs::read_to_string(&md).unwrap();
    assert_eq!(text, output.text);
    assert!(!text.trim().is_empty(), "extracted text is empty");

    assert!(dir.path().join("e2e").join("image-1.jpg").exists());
    assert_eq!(output.usage.records, output.stats.batches);
    assert!(output.usage.prompt_tokens > 0);
    assert_eq!(
        output.usage.total_tokens,
        output.batches.iter().map(|b| b.usage.total_tokens).sum::<u64>()
    );
    assert_eq!(released.0.load(Ordering::SeqCst), 1);

    println!("{}", output.usage.summary());
}

#[tokio::test]
async fn e2e_bad_key_fails_a_batch() {
    let pdf = e2e_skip_unless_ready!();
    let (_dir, pdf) = staged_copy(&pdf);

    let config = AnalysisConfig::builder()
        .model(model())
        .batch_size(50)
        .api_key("invalid-key")
        .build()
        .unwrap();

    match convert(&pdf, &config).await {
        Err(DocBatchError::BatchFailed { batch_index, .. }) => assert_eq!(batch_index, 0),
        other => panic!("expected BatchFailed, got {other:?}"),
    }
    assert!(!pdf.with_extension("md").exists());
}
