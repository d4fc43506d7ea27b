//! End-to-end engine tests with deterministic in-process fakes.
//!
//! No network: embeddings come from a word-hash embedder and answers from a
//! scripted model, so retrieval ranking and failure paths are reproducible.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use pdfchat::config::{ChunkingConfig, RetrievalConfig};
use pdfchat::embedding::Embedder;
use pdfchat::engine::{ChatEngine, FALLBACK_ANSWER, NO_DOCUMENTS_ANSWER};
use pdfchat::llm::ChatModel;
use pdfchat::models::HistoryTurn;

mod common;
use common::write_pdf;

// ============ Fakes ============

/// Deterministic bag-of-words embedder: each word hashes into one of 64
/// buckets, so texts sharing words score higher cosine similarity.
struct HashEmbedder;

fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0f32; 64];
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % 64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding backend unavailable")
    }
}

/// Echoes a canned answer and records the history length of every call.
struct RecordingModel {
    history_lens: Mutex<Vec<usize>>,
}

impl RecordingModel {
    fn new() -> Self {
        Self {
            history_lens: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for RecordingModel {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn generate(
        &self,
        _context: &str,
        history: &[HistoryTurn],
        question: &str,
    ) -> Result<String> {
        self.history_lens.lock().unwrap().push(history.len());
        Ok(format!("scripted answer to: {}", question))
    }
}

struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn generate(
        &self,
        _context: &str,
        _history: &[HistoryTurn],
        _question: &str,
    ) -> Result<String> {
        bail!("model backend unavailable")
    }
}

fn make_engine(
    corpus_dir: &Path,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
) -> ChatEngine {
    ChatEngine::new(
        corpus_dir.to_path_buf(),
        &ChunkingConfig {
            chunk_size: 1000,
            chunk_overlap: 200,
        },
        &RetrievalConfig { top_k: 4 },
        embedder,
        model,
    )
}

// ============ Tests ============

#[tokio::test]
async fn absent_corpus_dir_returns_sentinel() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("uploads"); // never created

    let engine = make_engine(&corpus, Arc::new(HashEmbedder), Arc::new(RecordingModel::new()));
    let result = engine.answer("001", "anything?").await;

    assert_eq!(result.answer, NO_DOCUMENTS_ANSWER);
    assert!(result.sources.is_empty());
    assert_eq!(engine.build_count(), 0, "no index work for an empty corpus");
}

#[tokio::test]
async fn empty_corpus_dir_returns_sentinel() {
    let tmp = TempDir::new().unwrap();

    let engine =
        make_engine(tmp.path(), Arc::new(HashEmbedder), Arc::new(RecordingModel::new()));
    let result = engine.answer("001", "anything?").await;

    assert_eq!(result.answer, NO_DOCUMENTS_ANSWER);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn unloadable_corpus_returns_sentinel() {
    let tmp = TempDir::new().unwrap();
    // A .pdf entry exists but cannot be extracted, so indexing yields
    // zero fragments despite a non-empty directory.
    fs::write(tmp.path().join("broken.pdf"), b"not a pdf at all").unwrap();

    let engine =
        make_engine(tmp.path(), Arc::new(HashEmbedder), Arc::new(RecordingModel::new()));
    let result = engine.answer("001", "anything?").await;

    assert_eq!(result.answer, NO_DOCUMENTS_ANSWER);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn unreadable_corpus_path_degrades_to_fallback() {
    let tmp = TempDir::new().unwrap();
    // A plain file where the corpus directory should be. Enumeration fails,
    // which must not masquerade as an empty corpus.
    let not_a_dir = tmp.path().join("corpus");
    fs::write(&not_a_dir, b"not a directory").unwrap();

    let engine = make_engine(
        &not_a_dir,
        Arc::new(HashEmbedder),
        Arc::new(RecordingModel::new()),
    );
    let result = engine.answer("001", "anything?").await;

    assert_eq!(result.answer, FALLBACK_ANSWER);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn failing_embedder_degrades_to_fallback() {
    let tmp = TempDir::new().unwrap();
    write_pdf(tmp.path(), "doc.pdf", &["some document text"]);

    let engine = make_engine(
        tmp.path(),
        Arc::new(FailingEmbedder),
        Arc::new(RecordingModel::new()),
    );
    let result = engine.answer("001", "what is in the document?").await;

    assert_eq!(result.answer, FALLBACK_ANSWER);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn failing_model_degrades_to_fallback() {
    let tmp = TempDir::new().unwrap();
    write_pdf(tmp.path(), "doc.pdf", &["some document text"]);

    let engine = make_engine(tmp.path(), Arc::new(HashEmbedder), Arc::new(FailingModel));
    let result = engine.answer("001", "what is in the document?").await;

    assert_eq!(result.answer, FALLBACK_ANSWER);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn three_page_pdf_query_cites_the_file() {
    let tmp = TempDir::new().unwrap();
    write_pdf(
        tmp.path(),
        "manual.pdf",
        &[
            "installation requires a wrench and a ladder",
            "the warranty covers corrosion damage for nine years",
            "maintenance schedule says lubricate annually",
        ],
    );

    let engine =
        make_engine(tmp.path(), Arc::new(HashEmbedder), Arc::new(RecordingModel::new()));
    let result = engine
        .answer("001", "warranty corrosion damage nine years")
        .await;

    assert!(result.answer.starts_with("scripted answer"));
    assert!(
        result.sources.iter().any(|s| s.source == "manual.pdf"),
        "sources should cite the file: {:?}",
        result.sources
    );
    assert_eq!(
        result.sources[0].page, 2,
        "best match should be the warranty page"
    );
}

#[tokio::test]
async fn invalidate_is_idempotent_and_forces_rebuild() {
    let tmp = TempDir::new().unwrap();
    write_pdf(tmp.path(), "doc.pdf", &["alpha beta gamma"]);

    let engine =
        make_engine(tmp.path(), Arc::new(HashEmbedder), Arc::new(RecordingModel::new()));

    engine.answer("001", "alpha?").await;
    assert_eq!(engine.build_count(), 1);

    // Repeated queries reuse the index.
    engine.answer("001", "beta?").await;
    assert_eq!(engine.build_count(), 1);

    // Double invalidation without an intervening build is harmless.
    engine.invalidate();
    engine.invalidate();

    engine.answer("001", "gamma?").await;
    assert_eq!(engine.build_count(), 2);
}

#[tokio::test]
async fn query_after_invalidation_sees_fresh_corpus() {
    let tmp = TempDir::new().unwrap();
    write_pdf(tmp.path(), "first.pdf", &["ocelot habitats span rainforest"]);

    let engine =
        make_engine(tmp.path(), Arc::new(HashEmbedder), Arc::new(RecordingModel::new()));

    let result = engine.answer("001", "ocelot habitats rainforest").await;
    assert!(result.sources.iter().all(|s| s.source == "first.pdf"));

    write_pdf(
        tmp.path(),
        "second.pdf",
        &["submarine ballast tanks regulate depth"],
    );
    engine.invalidate();

    let result = engine
        .answer("001", "submarine ballast tanks regulate depth")
        .await;
    assert!(
        result.sources.iter().any(|s| s.source == "second.pdf"),
        "rebuilt index must include the document added before invalidation: {:?}",
        result.sources
    );
}

#[tokio::test]
async fn concurrent_queries_trigger_exactly_one_build() {
    let tmp = TempDir::new().unwrap();
    write_pdf(tmp.path(), "doc.pdf", &["delta epsilon zeta"]);

    let engine = Arc::new(make_engine(
        tmp.path(),
        Arc::new(HashEmbedder),
        Arc::new(RecordingModel::new()),
    ));

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.answer("001", "delta?").await })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.answer("002", "epsilon?").await })
    };

    let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
    assert!(ra.answer.starts_with("scripted answer"));
    assert!(rb.answer.starts_with("scripted answer"));
    assert_eq!(engine.build_count(), 1, "one invalidation epoch, one build");
}

#[tokio::test]
async fn conversation_memory_is_keyed_by_chat() {
    let tmp = TempDir::new().unwrap();
    write_pdf(tmp.path(), "doc.pdf", &["eta theta iota"]);

    let model = Arc::new(RecordingModel::new());
    let engine = make_engine(tmp.path(), Arc::new(HashEmbedder), model.clone());

    engine.answer("001", "first question").await;
    engine.answer("001", "second question").await;
    engine.answer("002", "other chat question").await;

    let lens = model.history_lens.lock().unwrap().clone();
    // Chat 001 accumulates its own turns; chat 002 starts clean.
    assert_eq!(lens, vec![0, 2, 0]);
}

#[tokio::test]
async fn forget_clears_one_chat_memory() {
    let tmp = TempDir::new().unwrap();
    write_pdf(tmp.path(), "doc.pdf", &["kappa lambda mu"]);

    let model = Arc::new(RecordingModel::new());
    let engine = make_engine(tmp.path(), Arc::new(HashEmbedder), model.clone());

    engine.answer("001", "first question").await;
    engine.forget("001");
    engine.answer("001", "after forgetting").await;

    let lens = model.history_lens.lock().unwrap().clone();
    assert_eq!(lens, vec![0, 0]);
}
