//! Persisted chat sessions keyed by short numeric IDs.
//!
//! Each session is one JSON record on disk, `NNN.json`, holding the ordered
//! turn list. IDs are zero-padded 3-digit strings allocated as the lowest
//! unused integer in `[1, 999]`; deleting a session frees its ID for reuse.
//! Operations on the same ID are serialized through a per-ID lock table so
//! concurrent appends cannot lose updates; different IDs never block each
//! other. Writes go through a temp file and rename, so a reader never
//! observes a partial record.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::models::{ChatSummary, ChatTurn};

pub const MIN_CHAT_ID: u32 = 1;
pub const MAX_CHAT_ID: u32 = 999;

/// Typed session-store failure (no panic; callers map variants to their
/// boundary's error shape).
#[derive(Debug)]
pub enum ChatStoreError {
    /// No session exists under the given ID.
    NotFound(String),
    /// The ID is not a numeric string in `[1, 999]`.
    InvalidId(String),
    /// The persisted record exists but cannot be parsed.
    Corrupt(String, String),
    /// Every ID in `[1, 999]` is taken.
    CapacityExhausted,
    Io(std::io::Error),
}

impl std::fmt::Display for ChatStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatStoreError::NotFound(id) => write!(f, "chat not found: {}", id),
            ChatStoreError::InvalidId(id) => write!(f, "invalid chat id: {}", id),
            ChatStoreError::Corrupt(id, reason) => {
                write!(f, "chat record {} is corrupt: {}", id, reason)
            }
            ChatStoreError::CapacityExhausted => {
                write!(f, "no free chat ids left in [{}, {}]", MIN_CHAT_ID, MAX_CHAT_ID)
            }
            ChatStoreError::Io(e) => write!(f, "chat store I/O error: {}", e),
        }
    }
}

impl std::error::Error for ChatStoreError {}

impl From<std::io::Error> for ChatStoreError {
    fn from(e: std::io::Error) -> Self {
        ChatStoreError::Io(e)
    }
}

/// Canonicalize a caller-supplied ID to its zero-padded 3-digit form.
pub fn canonical_id(id: &str) -> Result<String, ChatStoreError> {
    let n: u32 = id
        .parse()
        .map_err(|_| ChatStoreError::InvalidId(id.to_string()))?;
    if !(MIN_CHAT_ID..=MAX_CHAT_ID).contains(&n) {
        return Err(ChatStoreError::InvalidId(id.to_string()));
    }
    Ok(format!("{:03}", n))
}

/// Directory-backed session store.
pub struct ChatStore {
    dir: PathBuf,
    /// Serializes ID allocation (scan + reserve as one step).
    alloc_lock: Mutex<()>,
    /// Per-ID locks; same-ID operations are mutually exclusive.
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            alloc_lock: Mutex::new(()),
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Numeric IDs currently persisted on disk.
    fn used_ids(&self) -> Result<Vec<u32>, ChatStoreError> {
        let mut used = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name.strip_suffix(".json") {
                if let Ok(n) = stem.parse::<u32>() {
                    if (MIN_CHAT_ID..=MAX_CHAT_ID).contains(&n) {
                        used.push(n);
                    }
                }
            }
        }
        Ok(used)
    }

    /// Allocate the lowest unused ID and reserve it by writing an empty
    /// record, so a concurrent allocation cannot hand out the same ID.
    /// The reservation happens under the per-ID lock and re-checks the disk
    /// first: a session created under an explicit ID between the scan and
    /// the reservation is skipped, never overwritten.
    pub async fn allocate_id(&self) -> Result<String, ChatStoreError> {
        let _guard = self.alloc_lock.lock().await;

        let used = self.used_ids()?;
        for n in (MIN_CHAT_ID..=MAX_CHAT_ID).filter(|n| !used.contains(n)) {
            let id = format!("{:03}", n);

            let lock = self.lock_for(&id);
            let _id_guard = lock.lock().await;
            if self.record_path(&id).exists() {
                continue;
            }

            self.write_record(&id, &[])?;
            return Ok(id);
        }

        Err(ChatStoreError::CapacityExhausted)
    }

    /// Append `turn` under `chat_id`, or under a freshly allocated ID when
    /// none is given. A caller-supplied ID with no existing session starts a
    /// new single-turn session under that exact ID; it is never remapped.
    /// Returns the session ID the turn landed in.
    pub async fn create_or_append(
        &self,
        chat_id: Option<&str>,
        turn: ChatTurn,
    ) -> Result<String, ChatStoreError> {
        let id = match chat_id {
            Some(raw) => canonical_id(raw)?,
            None => self.allocate_id().await?,
        };

        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;

        let mut turns = match self.read_record(&id) {
            Ok(turns) => turns,
            Err(ChatStoreError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        turns.push(turn);
        self.write_record(&id, &turns)?;

        Ok(id)
    }

    /// Full ordered turn list for a session. Not-found and corrupt records
    /// are typed errors for direct reads.
    pub async fn get(&self, chat_id: &str) -> Result<Vec<ChatTurn>, ChatStoreError> {
        let id = canonical_id(chat_id)?;
        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;
        self.read_record(&id)
    }

    /// Remove a session. Not-found is a typed error, so deletion of an
    /// absent session reports rather than silently succeeding.
    pub async fn delete(&self, chat_id: &str) -> Result<(), ChatStoreError> {
        let id = canonical_id(chat_id)?;
        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;

        match std::fs::remove_file(self.record_path(&id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ChatStoreError::NotFound(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Summaries of every session, ascending numeric ID. Unreadable or
    /// corrupt records are skipped with a warning, never fatal to the
    /// listing; reserved-but-empty records are skipped too.
    pub async fn list(&self) -> Result<Vec<ChatSummary>, ChatStoreError> {
        let mut ids = self.used_ids()?;
        ids.sort_unstable();

        let mut summaries = Vec::new();
        for n in ids {
            let id = format!("{:03}", n);
            match self.read_record(&id) {
                Ok(turns) => {
                    if let Some(first) = turns.first() {
                        summaries.push(ChatSummary {
                            id,
                            question: first.question.clone(),
                            timestamp: first.timestamp,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(chat = %id, error = %e, "skipping unreadable chat record");
                }
            }
        }

        Ok(summaries)
    }

    fn read_record(&self, id: &str) -> Result<Vec<ChatTurn>, ChatStoreError> {
        let path = self.record_path(id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChatStoreError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map_err(|e| ChatStoreError::Corrupt(id.to_string(), e.to_string()))
    }

    /// Write the full record atomically: temp file, then rename.
    fn write_record(&self, id: &str, turns: &[ChatTurn]) -> Result<(), ChatStoreError> {
        let json = serde_json::to_string_pretty(turns)
            .map_err(|e| ChatStoreError::Corrupt(id.to_string(), e.to_string()))?;

        let tmp = self.dir.join(format!(".{}.json.tmp", id));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, self.record_path(id))?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
