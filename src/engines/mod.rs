//! Format-specific import engines.
//!
//! Every engine implements [`ImportEngine`]: it receives one admitted batch, writes notes through
//! the shared [`NoteSink`], and reports progress over its own [`StatusSender`]. The coordinator
//! only sees the trait; [`DefaultEngineFactory`] picks the concrete engine for a category.

mod enml;
mod evernote;
mod simplenote;
mod text;

pub use evernote::EvernoteImporter;
pub use simplenote::SimplenoteImporter;
pub use text::TextImporter;

use crate::importer::{FileCategory, ImportBatch, ImportOptions, SourceFile, StatusEvent};
use crate::notes::{MARKDOWN_TAG, Note, NoteSink};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// Errors raised while converting a file. Rendered to text on the status stream.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The batch held no file.
    #[error("No file to import.")]
    NoFile,
    /// The export does not carry the expected extension.
    #[error("File name does not end in \".{expected}\".")]
    WrongExtension {
        /// Extension the engine requires.
        expected: &'static str,
    },
    /// The file exceeds the configured size cap.
    #[error("File is too large.")]
    TooLarge {
        /// Size of the file in bytes.
        size: u64,
        /// Configured cap in bytes.
        limit: u64,
    },
    /// The file had no content.
    #[error("File was empty.")]
    Empty,
    /// Reading the file failed.
    #[error("Failed to read file: {0}")]
    Read(#[from] io::Error),
    /// The file is not valid UTF-8 text.
    #[error("File is not valid UTF-8 text.")]
    NotUtf8,
    /// The Simplenote export could not be parsed.
    #[error("Invalid json file.")]
    InvalidJson(#[source] serde_json::Error),
    /// The Evernote export is not well-formed XML.
    #[error("Invalid enex file.")]
    InvalidEnex(#[source] roxmltree::Error),
    /// The XML document is not an Evernote export.
    #[error("Invalid enex file.")]
    NotAnExport,
}

/// Sending half of one engine's status channel.
///
/// [`StatusSender::complete`] consumes the sender, so nothing can follow a completion. Dropping
/// the sender without completing closes the channel, which the coordinator treats as a failed
/// job.
#[derive(Debug)]
pub struct StatusSender {
    category: FileCategory,
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusSender {
    /// Create a status channel for an engine of `category`.
    pub fn channel(category: FileCategory) -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { category, tx }, rx)
    }

    /// Report the number of notes produced so far.
    pub fn progress(&self, notes: usize) {
        self.send(StatusEvent::Progress(notes));
    }

    /// Report a failure.
    pub fn error(&self, message: impl Into<String>) {
        self.send(StatusEvent::Error(message.into()));
    }

    /// Report successful exhaustion of the batch. Final.
    pub fn complete(self, notes: usize) {
        self.send(StatusEvent::Complete(notes));
    }

    fn send(&self, event: StatusEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!(category = %self.category, "Status receiver dropped");
        }
    }
}

/// Contract implemented by every format engine.
#[async_trait]
pub trait ImportEngine: Send + Sync {
    /// Category of files this engine converts.
    fn category(&self) -> FileCategory;

    /// Convert `batch` into notes, reporting through `status`.
    ///
    /// The coordinator runs this on its own task; it may suspend freely.
    async fn import_notes(&self, batch: ImportBatch, status: StatusSender);
}

/// Builds the engine responsible for a category.
pub trait EngineFactory: Send + Sync {
    /// Construct an engine bound to the shared sink and options.
    fn create(
        &self,
        category: FileCategory,
        sink: Arc<dyn NoteSink>,
        options: ImportOptions,
    ) -> Box<dyn ImportEngine>;
}

/// Factory returning the built-in text, Simplenote and Evernote engines.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEngineFactory;

impl EngineFactory for DefaultEngineFactory {
    fn create(
        &self,
        category: FileCategory,
        sink: Arc<dyn NoteSink>,
        options: ImportOptions,
    ) -> Box<dyn ImportEngine> {
        match category {
            FileCategory::Text | FileCategory::Unknown => Box::new(TextImporter::new(sink, options)),
            FileCategory::Simplenote => Box::new(SimplenoteImporter::new(sink, options)),
            FileCategory::Evernote => Box::new(EvernoteImporter::new(sink, options)),
        }
    }
}

/// Read a file as UTF-8 text, enforcing the size cap before loading it.
pub(crate) async fn read_text(file: &SourceFile, limit: u64) -> Result<String, EngineError> {
    let size = file.size().await?;
    if size > limit {
        return Err(EngineError::TooLarge { size, limit });
    }
    let bytes = file.read().await?;
    String::from_utf8(bytes).map_err(|_| EngineError::NotUtf8)
}

/// Apply option-driven tags shared by all engines.
pub(crate) fn apply_options(note: &mut Note, options: &ImportOptions) {
    if options.markdown {
        note.add_system_tag(MARKDOWN_TAG);
    }
}

pub(crate) fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
