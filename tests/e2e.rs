//! End-to-end integration tests for edgequake-pdf2pptx.
//!
//! These tests use real PDF files in `./test_cases/` and, for the
//! conversion tests, make live vision-model calls. They are gated behind
//! the `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_page_out_of_range -- --nocapture

use edgequake_pdf2pptx::{
    convert, convert_from_bytes, convert_stream, convert_to_file, ConversionConfig,
    ConversionProgressCallback, NoopProgressCallback, PageFailurePolicy, PageSelection,
    Pdf2PptxError, RetryPolicy,
};
use futures::StreamExt;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Gentler pacing than the library default so short runs finish quickly
/// while still backing off on rate limits.
fn e2e_config() -> ConversionConfig {
    ConversionConfig::builder()
        .retry_policy(RetryPolicy {
            initial_delay: Duration::from_secs(1),
            increment: Duration::from_secs(5),
            max_delay: Some(Duration::from_secs(30)),
            max_attempts: Some(6),
        })
        .pages(PageSelection::Range(1, 2))
        .build()
        .expect("config should build")
}

/// Assert the bytes are a readable PPTX package with `slides` slides.
fn assert_deck(deck: &[u8], slides: usize, context: &str) {
    let archive = zip::ZipArchive::new(Cursor::new(deck))
        .unwrap_or_else(|e| panic!("[{context}] deck is not a zip: {e}"));
    let names: Vec<&str> = archive.file_names().collect();
    for required in ["[Content_Types].xml", "_rels/.rels", "ppt/presentation.xml"] {
        assert!(names.contains(&required), "[{context}] missing part {required}");
    }
    let found = names
        .iter()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .count();
    assert_eq!(found, slides, "[{context}] slide count");
    println!("[{context}] ✓  {} bytes, {found} slides", deck.len());
}

// ── Document errors (pdfium, no model) ───────────────────────────────────────

#[tokio::test]
async fn test_non_pdf_input_is_malformed() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fake.pdf");
    std::fs::write(&path, b"PK\x03\x04 definitely a zip").unwrap();

    let err = convert(path.to_str().unwrap(), &ConversionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2PptxError::MalformedDocument { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_nonexistent_file() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    let err = convert("/no/such/deck.pdf", &ConversionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2PptxError::FileNotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_page_out_of_range() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample_slides.pdf"));
    let bytes = std::fs::read(&path).unwrap();
    let config = ConversionConfig::builder()
        .pages(PageSelection::Single(9999))
        .build()
        .unwrap();

    let err = convert_from_bytes(&bytes, &config).await.unwrap_err();
    assert!(
        matches!(err, Pdf2PptxError::PageOutOfRange { page: 9999, .. }),
        "got {err:?}"
    );
}

// ── Live conversions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_first_two_slides() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample_slides.pdf"));

    let output = convert(path.to_str().unwrap(), &e2e_config())
        .await
        .expect("convert() should succeed");

    assert_deck(&output.deck, 2, "sample_slides p1-2");
    assert_eq!(output.pages.len(), 2);
    assert!(output.pages.iter().all(|p| p.layout.is_some()));
    assert_eq!(output.stats.reconstructed, 2);

    let out = output_dir().join("sample_slides_p1-2.pptx");
    std::fs::write(&out, &output.deck).unwrap();
    println!("Wrote {}", out.display());
}

#[tokio::test]
async fn test_convert_to_file_with_placeholders() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample_slides.pdf"));
    let out = output_dir().join("sample_slides_placeholder.pptx");
    let mut config = e2e_config();
    config.on_page_failure = PageFailurePolicy::Placeholder;

    let stats = convert_to_file(path.to_str().unwrap(), &out, &config)
        .await
        .expect("convert_to_file() should succeed");

    assert_eq!(stats.total_pages, 2);
    assert_eq!(stats.reconstructed + stats.placeholders, 2);
    assert_deck(&std::fs::read(&out).unwrap(), 2, "convert_to_file");
}

#[tokio::test]
async fn test_report_json_has_no_slide_text() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample_slides.pdf"));
    let mut config = e2e_config();
    config.pages = PageSelection::Single(1);

    let output = convert(path.to_str().unwrap(), &config).await.unwrap();
    let json = serde_json::to_value(&output.pages).unwrap();
    let page = &json[0];
    let keys: Vec<&str> = page.as_object().unwrap().keys().map(String::as_str).collect();
    for key in &keys {
        assert!(
            ["page_num", "layout", "shapes", "figures", "rate_limited", "duration_ms"].contains(key),
            "unexpected report field {key}"
        );
    }
}

#[tokio::test]
async fn test_stream_matches_page_selection() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample_slides.pdf"));

    let mut stream = convert_stream(path.to_str().unwrap(), &e2e_config())
        .await
        .expect("stream should open");
    let mut seen = Vec::new();
    while let Some(item) = stream.next().await {
        seen.push(item.expect("page should convert").report.page_num);
    }
    assert_eq!(seen, vec![1, 2]);
}

#[tokio::test]
async fn test_callback_send_in_tokio_spawn() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample_slides.pdf"));

    struct Counter(Arc<AtomicUsize>);
    impl ConversionProgressCallback for Counter {
        fn on_page_complete(&self, _page_num: usize, _total: usize, _shapes: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let done = Arc::new(AtomicUsize::new(0));
    let mut config = e2e_config();
    config.pages = PageSelection::Single(1);
    config.progress_callback = Some(Arc::new(Counter(Arc::clone(&done))));

    let handle = tokio::spawn(async move { convert(path.to_str().unwrap(), &config).await });
    handle.await.unwrap().expect("conversion should succeed");
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

// ── No I/O ───────────────────────────────────────────────────────────────────

#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();
    assert_send_sync::<ConversionConfig>();
}
