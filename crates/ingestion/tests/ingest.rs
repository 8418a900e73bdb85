//! Corpus builds over generated PDF fixtures

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as PdfDocument, Object, Stream, StringFormat};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tripwise_common::embeddings::MockEmbedder;
use tripwise_common::errors::{AppError, Result};
use tripwise_common::vectorstore::{DistanceMetric, FileVectorStore, InMemoryVectorStore};
use tripwise_common::{Embedder, VectorStore};
use tripwise_ingestion::pdf::extract_text_from_pdf;
use tripwise_ingestion::{CollectionStatus, CorpusIngestor, IngestionError};

const DIM: usize = 8;

/// Counts embed calls on top of the deterministic mock
struct CountingEmbedder {
    inner: MockEmbedder,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MockEmbedder::new(DIM),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn model_name(&self) -> &str {
        "counting"
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

struct UnavailableEmbedder;

#[async_trait]
impl Embedder for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::EmbeddingService {
            message: "connection refused".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "unavailable"
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Write a PDF with one page per entry of `pages`
fn write_pdf(path: &Path, pages: &[&str]) {
    let pages: Vec<&[u8]> = pages.iter().map(|p| p.as_bytes()).collect();
    write_encoded_pdf(path, &pages, None);
}

/// Write a PDF whose page strings are raw bytes shown with a Helvetica font,
/// optionally carrying a named `/Encoding`
fn write_encoded_pdf(path: &Path, pages: &[&[u8]], encoding: Option<&str>) {
    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut font = dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    };
    if let Some(encoding) = encoding {
        font.set("Encoding", Object::Name(encoding.as_bytes().to_vec()));
    }
    let font_id = doc.add_object(font);
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for bytes in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::String(bytes.to_vec(), StringFormat::Literal)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn memory_store() -> Arc<InMemoryVectorStore> {
    Arc::new(InMemoryVectorStore::new("travelfaq_collection", DistanceMetric::Cosine, DIM))
}

#[tokio::test]
async fn indexes_every_pdf() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("faq1.pdf"), &["Carry your passport at all times."]);
    write_pdf(&dir.path().join("faq2.pdf"), &["Travel insurance covers", "medical emergencies."]);
    write_pdf(&dir.path().join("FAQ3.PDF"), &["Emergency number is 112."]);

    let embedder = CountingEmbedder::new();
    let store = memory_store();
    let report = CorpusIngestor::new(embedder.clone(), store.clone())
        .ingest(dir.path())
        .await
        .unwrap();

    assert_eq!(report.status, CollectionStatus::Created);
    assert_eq!(report.indexed, vec!["FAQ3.PDF", "faq1.pdf", "faq2.pdf"]);
    assert!(report.skipped.is_empty());
    assert_eq!(embedder.calls(), 3);
    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(report.user_notice(), "Welcome to Trip Assistor");
}

#[tokio::test]
async fn pages_are_concatenated_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("faq2.pdf"), &["Travel insurance covers", "medical emergencies."]);

    let store = memory_store();
    let embedder = CountingEmbedder::new();
    CorpusIngestor::new(embedder.clone(), store.clone())
        .ingest(dir.path())
        .await
        .unwrap();

    let query = embedder
        .embed("Travel insurance covers medical emergencies.")
        .await
        .unwrap();
    let result = store.query(&query, 1).await.unwrap();
    let nearest = result.nearest().unwrap();
    assert_eq!(nearest.id, "faq2.pdf");
    assert_eq!(nearest.text, "Travel insurance covers medical emergencies.");
    assert!(nearest.distance.abs() < 1e-5);
}

#[tokio::test]
async fn corrupt_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("faq1.pdf"), &["Carry your passport."]);
    write_pdf(&dir.path().join("faq2.pdf"), &["Check visa rules."]);
    std::fs::write(dir.path().join("broken.pdf"), b"this is not a pdf").unwrap();

    let embedder = CountingEmbedder::new();
    let store = memory_store();
    let report = CorpusIngestor::new(embedder.clone(), store.clone())
        .ingest(dir.path())
        .await
        .unwrap();

    assert_eq!(report.indexed.len(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, "broken.pdf");
    assert_eq!(embedder.calls(), 2);
    assert_eq!(store.count().await.unwrap(), 2);
    assert_eq!(
        report.user_notice(),
        "Welcome to Trip Assistor. 1 document(s) could not be indexed"
    );
}

#[tokio::test]
async fn unrecognized_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("faq1.pdf"), &["Carry your passport."]);
    std::fs::write(dir.path().join("notes.txt"), "scratch notes").unwrap();
    std::fs::create_dir(dir.path().join("archive")).unwrap();
    write_pdf(&dir.path().join("archive").join("old.pdf"), &["Outdated advice."]);

    let store = memory_store();
    let report = CorpusIngestor::new(CountingEmbedder::new(), store.clone())
        .ingest(dir.path())
        .await
        .unwrap();

    assert_eq!(report.indexed, vec!["faq1.pdf"]);
    assert!(report.skipped.is_empty());
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn populated_collection_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("faq1.pdf"), &["Carry your passport."]);
    let store = memory_store();

    CorpusIngestor::new(CountingEmbedder::new(), store.clone())
        .ingest(dir.path())
        .await
        .unwrap();

    let embedder = CountingEmbedder::new();
    let report = CorpusIngestor::new(embedder.clone(), store.clone())
        .ingest(dir.path())
        .await
        .unwrap();

    assert_eq!(report.status, CollectionStatus::Reused);
    assert_eq!(embedder.calls(), 0);
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(report.user_notice(), "Welcome back to Trip Assistor");
}

#[tokio::test]
async fn force_rebuilds_populated_collection() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("faq1.pdf"), &["Carry your passport."]);
    let store = memory_store();

    CorpusIngestor::new(CountingEmbedder::new(), store.clone())
        .ingest(dir.path())
        .await
        .unwrap();

    let embedder = CountingEmbedder::new();
    let report = CorpusIngestor::new(embedder.clone(), store.clone())
        .with_force(true)
        .ingest(dir.path())
        .await
        .unwrap();

    assert_eq!(report.status, CollectionStatus::Created);
    assert_eq!(embedder.calls(), 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn file_store_is_reused_after_restart() {
    let corpus = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    write_pdf(&corpus.path().join("faq1.pdf"), &["Carry your passport."]);

    {
        let store = Arc::new(
            FileVectorStore::open(data.path(), "travelfaq_collection", DistanceMetric::Cosine, DIM)
                .await
                .unwrap(),
        );
        CorpusIngestor::new(CountingEmbedder::new(), store)
            .ingest(corpus.path())
            .await
            .unwrap();
    }

    let store = Arc::new(
        FileVectorStore::open(data.path(), "travelfaq_collection", DistanceMetric::Cosine, DIM)
            .await
            .unwrap(),
    );
    let embedder = CountingEmbedder::new();
    let report = CorpusIngestor::new(embedder.clone(), store)
        .ingest(corpus.path())
        .await
        .unwrap();

    assert_eq!(report.status, CollectionStatus::Reused);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn embedding_outage_aborts() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("faq1.pdf"), &["Carry your passport."]);

    let err = CorpusIngestor::new(Arc::new(UnavailableEmbedder), memory_store())
        .ingest(dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::Service(AppError::EmbeddingService { .. })));
}

#[tokio::test]
async fn oversized_document_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("faq1.pdf"), &["Short answer."]);
    write_pdf(&dir.path().join("faq2.pdf"), &["This answer is far longer than the limit allows."]);

    let embedder = Arc::new(MockEmbedder::new(DIM).with_max_input_chars(20));
    let report = CorpusIngestor::new(embedder, memory_store())
        .ingest(dir.path())
        .await
        .unwrap();

    assert_eq!(report.indexed, vec!["faq1.pdf"]);
    assert_eq!(report.skipped[0].id, "faq2.pdf");
}

#[tokio::test]
async fn missing_corpus_dir_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = tokio_test::assert_err!(
        CorpusIngestor::new(CountingEmbedder::new(), memory_store())
            .ingest(&dir.path().join("datafiles"))
            .await
    );

    assert!(matches!(err, IngestionError::CorpusNotFound(_)));
}

#[test]
fn win_ansi_quotes_are_decoded_and_straightened() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faq1.pdf");
    let mut shown = vec![0x93];
    shown.extend_from_slice(b"Safe");
    shown.push(0x94);
    shown.extend_from_slice(b" isn");
    shown.push(0x92);
    shown.push(b't');
    write_encoded_pdf(&path, &[&shown], Some("WinAnsiEncoding"));

    assert_eq!(extract_text_from_pdf(&path).unwrap(), "\"Safe\" isn't");
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_pdf_is_indexed() {
    let corpus = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let target = elsewhere.path().join("shared.pdf");
    write_pdf(&target, &["Insurance covers lost luggage."]);
    std::os::unix::fs::symlink(&target, corpus.path().join("faq1.pdf")).unwrap();
    std::os::unix::fs::symlink(elsewhere.path().join("gone.pdf"), corpus.path().join("faq2.pdf")).unwrap();

    let report = CorpusIngestor::new(CountingEmbedder::new(), memory_store())
        .ingest(corpus.path())
        .await
        .unwrap();

    assert_eq!(report.indexed, vec!["faq1.pdf"]);
}
