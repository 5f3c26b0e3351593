//! Shared fixtures for integration tests: in-memory PDF generation with
//! `lopdf` and a call-counting completion service.

#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pdf_digest::{
    default_parser, CompletionRequest, CompletionService, FsArtifactStore, IngestConfig,
    Ingestor, UpstreamError,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── PDF fixtures ─────────────────────────────────────────────────────────────

/// One page of a generated document.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    /// Lines of text, drawn top to bottom.
    pub lines: Vec<String>,
    /// Draw a 60×60 grey image.
    pub image: bool,
    /// Draw a ruled grid with this many rows and columns.
    pub grid: Option<(usize, usize)>,
    /// Set the text in a Type0 Identity-H font with no ToUnicode map, which
    /// lopdf cannot decode.
    pub cid_font: bool,
}

impl PageLayout {
    pub fn text(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
            ..Default::default()
        }
    }
}

/// Build a PDF from page layouts.
pub fn build_pdf(pages: &[PageLayout]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "NotoSansCJK-Regular",
        "Encoding" => "Identity-H",
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let font = if page.cid_font { cid_font_id } else { font_id };
        let page_id = add_page(&mut doc, pages_id, font, page);
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("serialise test PDF");
    out
}

fn add_page(doc: &mut Document, pages_id: ObjectId, font_id: ObjectId, page: &PageLayout) -> ObjectId {
    let mut ops = Vec::new();

    if !page.lines.is_empty() {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
        ops.push(Operation::new("Td", vec![72.into(), 770.into()]));
        for (i, line) in page.lines.iter().enumerate() {
            if i > 0 {
                ops.push(Operation::new("Td", vec![0.into(), (-16).into()]));
            }
            ops.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
        }
        ops.push(Operation::new("ET", vec![]));
    }

    if let Some((rows, cols)) = page.grid {
        let (left, top, cell_w, cell_h) = (72i64, 500i64, 80i64, 20i64);
        let right = left + cols as i64 * cell_w;
        let bottom = top - rows as i64 * cell_h;
        for r in 0..=rows as i64 {
            let y = top - r * cell_h;
            ops.push(Operation::new("m", vec![left.into(), y.into()]));
            ops.push(Operation::new("l", vec![right.into(), y.into()]));
        }
        for c in 0..=cols as i64 {
            let x = left + c * cell_w;
            ops.push(Operation::new("m", vec![x.into(), top.into()]));
            ops.push(Operation::new("l", vec![x.into(), bottom.into()]));
        }
        ops.push(Operation::new("S", vec![]));
    }

    let mut xobjects = lopdf::Dictionary::new();
    if page.image {
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 60,
                "Height" => 60,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![128u8; 60 * 60],
        ));
        xobjects.set("Im1", image_id);
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![60.into(), 0.into(), 0.into(), 60.into(), 300.into(), 100.into()],
        ));
        ops.push(Operation::new("Do", vec!["Im1".into()]));
        ops.push(Operation::new("Q", vec![]));
    }

    let content = Content { operations: ops };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("encode content stream"),
    ));

    let resources = dictionary! {
        "Font" => dictionary! { "F1" => font_id },
        "XObject" => xobjects,
    };
    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources,
    })
}

/// A document of `n` pages, each with one distinct line of text.
pub fn text_pdf(n: usize, tag: &str) -> Vec<u8> {
    let pages: Vec<PageLayout> = (1..=n)
        .map(|i| PageLayout::text(format!("{tag} page {i} quarterly revenue grew")))
        .collect();
    build_pdf(&pages)
}

/// A one-page document whose trailer declares encryption.
pub fn encrypted_pdf() -> Vec<u8> {
    let mut doc = Document::load_mem(&text_pdf(1, "secret")).expect("reload test PDF");
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "Length" => 40,
        "P" => -44,
    });
    doc.trailer.set("Encrypt", encrypt_id);
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("serialise encrypted PDF");
    out
}

// ── Completion fake ──────────────────────────────────────────────────────────

/// How the fake completion service behaves.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Answer with a summary naming the page count from the prompt.
    Succeed,
    /// Fail every call as unavailable.
    Outage,
}

/// Completion service that counts calls and never touches the network.
#[derive(Debug)]
pub struct FakeCompletion {
    behaviour: Behaviour,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeCompletion {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Self::with_delay(behaviour, Duration::ZERO)
    }

    pub fn with_delay(behaviour: Behaviour, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behaviour {
            Behaviour::Succeed => {
                let pages = request
                    .user
                    .lines()
                    .find_map(|l| l.trim().strip_prefix("- pages: "))
                    .unwrap_or("?");
                Ok(format!(
                    "A {pages}-page report on quarterly revenue.\n\nRevenue grew in every quarter."
                ))
            }
            Behaviour::Outage => Err(UpstreamError::Unavailable {
                detail: "HTTP 503 upstream overloaded".to_string(),
            }),
        }
    }
}

// ── Orchestrator setup ───────────────────────────────────────────────────────

/// Config with fast retries, rooted at `dir`.
pub fn test_config(dir: &Path) -> IngestConfig {
    IngestConfig::builder()
        .storage_dir(dir)
        .retry_backoff_ms(1)
        .max_backoff_ms(5)
        .build()
        .expect("valid test config")
}

pub async fn ingestor(config: IngestConfig, completion: Arc<FakeCompletion>) -> Ingestor {
    let store = FsArtifactStore::open(config.storage_dir.clone())
        .await
        .expect("open store");
    Ingestor::new(config, default_parser(), completion, Arc::new(store))
}
