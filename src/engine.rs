//! Conversational retrieval engine.
//!
//! Owns the vector index lifecycle (lazy build, invalidation on corpus
//! mutation) and per-chat conversation memory, and orchestrates a query end
//! to end: ensure index freshness, retrieve the top fragments, call the
//! model, return an answer with source citations.
//!
//! Index state machine: `Absent → (build) → Ready`; `Ready → (invalidate) →
//! Absent` (stale generation). Read-or-build is one critical section behind a
//! single async lock, so concurrent queries against an absent index trigger
//! exactly one build and a reader never observes a partially built index.
//! `invalidate` is lock-free: it bumps a generation counter, and a build that
//! finishes against a stale generation is discarded rather than installed.
//!
//! All failure paths degrade to a typed fallback response at the `answer`
//! boundary; the internal steps stay `Result`-returning and testable.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::chunker::chunk_pages;
use crate::config::{ChunkingConfig, RetrievalConfig};
use crate::embedding::{embed_query, Embedder};
use crate::index::VectorIndex;
use crate::llm::ChatModel;
use crate::loader;
use crate::models::{HistoryTurn, QueryResult, SourceRef};

/// Fixed response when the corpus is empty or yields nothing to index.
pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been uploaded yet. Please upload some PDF documents first.";

/// Fixed response when retrieval or answer synthesis fails.
pub const FALLBACK_ANSWER: &str =
    "I'm having trouble processing your question. Please try again.";

/// Separator between retrieved fragments in the model context.
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// The index slot: an explicit two-state value instead of a nullable field.
/// `generation` records which invalidation epoch the index was built from.
enum IndexState {
    Absent,
    Ready {
        index: Arc<VectorIndex>,
        generation: u64,
    },
}

pub struct ChatEngine {
    corpus_dir: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    slot: Mutex<IndexState>,
    generation: AtomicU64,
    builds: AtomicU64,
    /// Conversation memory keyed by chat session, so context never bleeds
    /// across sessions. Held only for snapshot/append, never across awaits.
    memory: std::sync::Mutex<HashMap<String, Vec<HistoryTurn>>>,
}

impl ChatEngine {
    pub fn new(
        corpus_dir: impl Into<PathBuf>,
        chunking: &ChunkingConfig,
        retrieval: &RetrievalConfig,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            corpus_dir: corpus_dir.into(),
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            top_k: retrieval.top_k,
            embedder,
            model,
            slot: Mutex::new(IndexState::Absent),
            generation: AtomicU64::new(0),
            builds: AtomicU64::new(0),
            memory: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Discard the current index; the next query rebuilds from the corpus.
    /// Called after every corpus mutation (upload or delete). Idempotent,
    /// and safe to call while a build is in flight: the build notices the
    /// stale generation and discards its result.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of index builds attempted so far.
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::SeqCst)
    }

    /// Drop the in-process conversation memory for one chat session.
    pub fn forget(&self, chat_id: &str) {
        self.memory.lock().unwrap().remove(chat_id);
    }

    /// Answer `question` within the conversation identified by `chat_id`.
    ///
    /// Never fails: every internal error degrades to [`FALLBACK_ANSWER`]
    /// with empty sources, and an empty corpus short-circuits to
    /// [`NO_DOCUMENTS_ANSWER`] without touching the index or the model.
    pub async fn answer(&self, chat_id: &str, question: &str) -> QueryResult {
        match self.try_answer(chat_id, question).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(chat = %chat_id, error = %e, "query failed, returning fallback");
                QueryResult {
                    answer: FALLBACK_ANSWER.to_string(),
                    sources: Vec::new(),
                }
            }
        }
    }

    async fn try_answer(&self, chat_id: &str, question: &str) -> Result<QueryResult> {
        // An enumeration failure propagates (degrading to the fallback at
        // the `answer` boundary); only a genuinely empty corpus gets the
        // no-documents answer.
        if !loader::has_documents(&self.corpus_dir)? {
            return Ok(no_documents());
        }

        let index = match self.ensure_index().await? {
            Some(index) => index,
            // Non-empty directory, but nothing survived loading.
            None => return Ok(no_documents()),
        };

        let history = self.history_snapshot(chat_id);

        // Query embedding and the model call both happen outside the index
        // lock; only the build critical section holds it.
        let query_vec = embed_query(self.embedder.as_ref(), question).await?;
        let hits = index.search(&query_vec, self.top_k);

        let context = hits
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let mut seen = HashSet::new();
        let sources: Vec<SourceRef> = hits
            .iter()
            .map(|f| f.source_ref())
            .filter(|s| seen.insert(s.clone()))
            .collect();

        let answer = self.model.generate(&context, &history, question).await?;

        self.remember(chat_id, question, &answer);

        Ok(QueryResult { answer, sources })
    }

    /// Return an index no older than the last invalidation, building one if
    /// the slot is absent or stale. Returns `Ok(None)` when the corpus
    /// produced zero fragments (the slot stays absent).
    async fn ensure_index(&self) -> Result<Option<Arc<VectorIndex>>> {
        let mut slot = self.slot.lock().await;

        if let IndexState::Ready { index, generation } = &*slot {
            if *generation == self.generation.load(Ordering::SeqCst) {
                return Ok(Some(index.clone()));
            }
        }
        *slot = IndexState::Absent;

        // One retry if an invalidation lands mid-build; beyond that the
        // corpus is churning and the query gives up.
        for _ in 0..2 {
            let built_from = self.generation.load(Ordering::SeqCst);

            let outcome = loader::load_corpus(&self.corpus_dir)?;
            if !outcome.skipped.is_empty() {
                tracing::warn!(
                    skipped = outcome.skipped.len(),
                    "some corpus files were skipped during indexing"
                );
            }
            let fragments = chunk_pages(outcome.pages, self.chunk_size, self.chunk_overlap);

            self.builds.fetch_add(1, Ordering::SeqCst);
            let index = match VectorIndex::build(fragments, self.embedder.as_ref()).await? {
                Some(index) => Arc::new(index),
                None => return Ok(None),
            };

            if self.generation.load(Ordering::SeqCst) == built_from {
                tracing::info!(fragments = index.len(), "vector index built");
                *slot = IndexState::Ready {
                    index: index.clone(),
                    generation: built_from,
                };
                return Ok(Some(index));
            }
            tracing::info!("index invalidated during build, discarding and rebuilding");
        }

        anyhow::bail!("corpus kept changing during index rebuild")
    }

    fn history_snapshot(&self, chat_id: &str) -> Vec<HistoryTurn> {
        self.memory
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    fn remember(&self, chat_id: &str, question: &str, answer: &str) {
        let mut memory = self.memory.lock().unwrap();
        let turns = memory.entry(chat_id.to_string()).or_default();
        turns.push(HistoryTurn::user(question));
        turns.push(HistoryTurn::assistant(answer));
    }
}

fn no_documents() -> QueryResult {
    QueryResult {
        answer: NO_DOCUMENTS_ANSWER.to_string(),
        sources: Vec::new(),
    }
}
