//! Core data types used throughout pdfchat.
//!
//! These types represent the pages, fragments, and chat turns that flow
//! through the ingestion, retrieval, and session-persistence pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of extracted PDF text, tagged with its originating file name.
/// Page numbers are 1-based.
#[derive(Debug, Clone)]
pub struct LoadedPage {
    pub source: String,
    pub page: usize,
    pub text: String,
}

/// A bounded span of page text with provenance. Immutable once created;
/// consumed by the index build step.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub text: String,
    pub source: String,
    pub page: usize,
}

impl Fragment {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            source: self.source.clone(),
            page: self.page,
        }
    }
}

/// Provenance marker attached to an answer: the file and page a retrieved
/// fragment came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub page: usize,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One prior turn of in-process conversation memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: ChatRole,
    pub content: String,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One persisted question/answer exchange in a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub timestamp: DateTime<Utc>,
}

/// The engine's response to a query: answer text plus the provenance of
/// every fragment supplied as context.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Corpus listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Session listing entry: the id plus the opening question and its time.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: String,
    pub question: String,
    pub timestamp: DateTime<Utc>,
}
