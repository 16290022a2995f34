//! Note records and the sink shared by every running import engine.
//!
//! Engines for different formats run concurrently and all write through the same
//! [`NoteSink`]. [`NoteStore`] serializes those writes behind a mutex and assigns each note its
//! identity inside the critical section, so interleaved calls never observe a half-written store.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use uuid::Uuid;

/// System tag marking a note as markdown.
pub const MARKDOWN_TAG: &str = "markdown";
/// System tag marking a note as pinned.
pub const PINNED_TAG: &str = "pinned";

/// Identity assigned to a note when it enters the store.
pub type NoteId = Uuid;

/// A single converted note, independent of the format it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    /// Note body.
    pub content: String,
    /// User-visible tags.
    pub tags: Vec<String>,
    /// Flags such as `markdown` or `pinned`.
    pub system_tags: Vec<String>,
    /// Creation time in unix seconds.
    pub creation_date: i64,
    /// Last modification time in unix seconds.
    pub modification_date: i64,
    /// Whether the note was exported from the trash.
    pub deleted: bool,
}

impl Note {
    /// Create a note stamped with the current time.
    pub fn new(content: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            content: content.into(),
            tags: Vec::new(),
            system_tags: Vec::new(),
            creation_date: now,
            modification_date: now,
            deleted: false,
        }
    }

    /// Override creation and modification times.
    pub fn with_dates(mut self, created: i64, modified: i64) -> Self {
        self.creation_date = created;
        self.modification_date = modified;
        self
    }

    /// Add a system tag unless already present.
    pub fn add_system_tag(&mut self, tag: &str) {
        if !self.system_tags.iter().any(|existing| existing == tag) {
            self.system_tags.push(tag.to_string());
        }
    }
}

/// Destination for converted notes.
///
/// Implementations must tolerate calls from several engines interleaved in time.
pub trait NoteSink: Send + Sync {
    /// Persist one note and return the identity assigned to it.
    fn add_note(&self, note: Note) -> NoteId;
}

/// A note together with the identity and digest assigned by the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredNote {
    /// Identity assigned on insert.
    pub id: NoteId,
    /// SHA-256 digest of the note content.
    pub content_hash: String,
    /// The stored note.
    #[serde(flatten)]
    pub note: Note,
}

#[derive(Default)]
struct StoreInner {
    notes: Vec<StoredNote>,
    hashes: HashSet<String>,
    duplicates: usize,
}

/// In-memory, mutex-guarded note store.
#[derive(Default)]
pub struct NoteStore {
    inner: Mutex<StoreInner>,
}

impl NoteStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored notes.
    pub fn len(&self) -> usize {
        self.lock().notes.len()
    }

    /// Whether the store holds no notes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored note in insertion order.
    pub fn notes(&self) -> Vec<StoredNote> {
        self.lock().notes.clone()
    }

    /// Number of stored notes whose content matched an earlier note.
    pub fn duplicate_count(&self) -> usize {
        self.lock().duplicates
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NoteSink for NoteStore {
    fn add_note(&self, note: Note) -> NoteId {
        let content_hash = compute_content_hash(&note.content);
        let mut inner = self.lock();
        if !inner.hashes.insert(content_hash.clone()) {
            inner.duplicates += 1;
            tracing::debug!(hash = %content_hash, "Stored note duplicates earlier content");
        }
        let id = Uuid::new_v4();
        inner.notes.push(StoredNote {
            id,
            content_hash,
            note,
        });
        id
    }
}

/// Compute a stable digest of note content.
pub fn compute_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn content_hash_is_deterministic() {
        let first = compute_content_hash("hello");
        assert_eq!(first, compute_content_hash("hello"));
        assert_ne!(first, compute_content_hash("hello!"));
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn add_system_tag_skips_duplicates() {
        let mut note = Note::new("body");
        note.add_system_tag(MARKDOWN_TAG);
        note.add_system_tag(MARKDOWN_TAG);
        note.add_system_tag(PINNED_TAG);
        assert_eq!(note.system_tags, vec!["markdown", "pinned"]);
    }

    #[test]
    fn store_assigns_unique_ids_and_counts_duplicate_content() {
        let store = NoteStore::new();
        let a = store.add_note(Note::new("same"));
        let b = store.add_note(Note::new("same"));
        store.add_note(Note::new("different"));

        assert_ne!(a, b);
        assert_eq!(store.len(), 3);
        assert_eq!(store.duplicate_count(), 1);
        let notes = store.notes();
        assert_eq!(notes[0].id, a);
        assert_eq!(notes[0].content_hash, notes[1].content_hash);
    }

    #[test]
    fn store_accepts_writes_from_many_threads() {
        let store = Arc::new(NoteStore::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for index in 0..50 {
                        store.add_note(Note::new(format!("{worker}-{index}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }

        let notes = store.notes();
        assert_eq!(notes.len(), 400);
        let ids: HashSet<_> = notes.iter().map(|stored| stored.id).collect();
        assert_eq!(ids.len(), 400);
        assert_eq!(store.duplicate_count(), 0);
    }
}
