//! Core data types shared by classification, the coordinator and the engines.

use crate::config::{Config, DEFAULT_MAX_FILE_BYTES};
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;

/// Source format bucket a selected file is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// Plain text or markdown files; any number per batch.
    Text,
    /// Simplenote JSON export; one file per batch.
    Simplenote,
    /// Evernote ENEX export; one file per batch.
    Evernote,
    /// Anything else. Admitted alongside text files.
    Unknown,
}

impl FileCategory {
    /// Map a resolved extension to its category. Matching is exact and case-sensitive.
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "txt" | "md" => Self::Text,
            "json" => Self::Simplenote,
            "enex" => Self::Evernote,
            _ => Self::Unknown,
        }
    }

    /// Whether at most one file of this category is admitted per batch.
    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::Simplenote | Self::Evernote)
    }

    /// Category whose batch actually receives the file.
    pub fn admission_category(self) -> Self {
        match self {
            Self::Unknown => Self::Text,
            other => other,
        }
    }

    /// Lowercase identifier used in logs and API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Simplenote => "simplenote",
            Self::Evernote => "evernote",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
enum FileContent {
    Memory(Arc<[u8]>),
    Disk(PathBuf),
}

/// Read-only handle to a user-selected file.
///
/// Cloning is cheap; in-memory contents are shared.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    content: FileContent,
    modified: Option<OffsetDateTime>,
}

impl SourceFile {
    /// Wrap contents already held in memory, e.g. from an upload.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: FileContent::Memory(Arc::from(bytes.into())),
            modified: None,
        }
    }

    /// Reference a file on disk. Contents are read lazily by the engine.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            content: FileContent::Disk(path.to_path_buf()),
            modified: None,
        }
    }

    /// Attach an explicit last-modified time.
    pub fn with_modified(mut self, modified: OffsetDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// File name as selected by the user.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text after the last `.` of the name, or the whole name when there is none.
    pub fn extension(&self) -> &str {
        match self.name.rfind('.') {
            Some(index) if index + 1 < self.name.len() => &self.name[index + 1..],
            _ => &self.name,
        }
    }

    /// Category derived from the extension.
    pub fn category(&self) -> FileCategory {
        FileCategory::from_extension(self.extension())
    }

    /// Size of the contents in bytes.
    pub async fn size(&self) -> io::Result<u64> {
        match &self.content {
            FileContent::Memory(bytes) => Ok(bytes.len() as u64),
            FileContent::Disk(path) => Ok(tokio::fs::metadata(path).await?.len()),
        }
    }

    /// Read the full contents.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        match &self.content {
            FileContent::Memory(bytes) => Ok(bytes.to_vec()),
            FileContent::Disk(path) => tokio::fs::read(path).await,
        }
    }

    /// Last-modified time, falling back to filesystem metadata for files on disk.
    pub async fn last_modified(&self) -> Option<OffsetDateTime> {
        if let Some(modified) = self.modified {
            return Some(modified);
        }
        match &self.content {
            FileContent::Memory(_) => None,
            FileContent::Disk(path) => tokio::fs::metadata(path)
                .await
                .and_then(|metadata| metadata.modified())
                .ok()
                .map(OffsetDateTime::from),
        }
    }
}

/// Ordered, immutable set of admitted files for one category.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    category: FileCategory,
    files: Arc<[SourceFile]>,
}

impl ImportBatch {
    /// Freeze a list of admitted files.
    pub fn new(category: FileCategory, files: Vec<SourceFile>) -> Self {
        Self {
            category,
            files: Arc::from(files),
        }
    }

    /// Category every file in the batch was admitted under.
    pub fn category(&self) -> FileCategory {
        self.category
    }

    /// Files in admission order.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Number of files in the batch.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the batch holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Status reported by a single engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Notes produced so far by the engine.
    Progress(usize),
    /// A file- or batch-level failure.
    Error(String),
    /// The engine exhausted its batch; carries the number of notes imported.
    Complete(usize),
}

/// Status reported on the aggregate stream of a running batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportUpdate {
    /// Forwarded engine progress.
    Progress {
        /// Engine that reported it.
        category: FileCategory,
        /// Notes produced so far by that engine.
        notes: usize,
    },
    /// Forwarded engine error, or a coordinator error when `category` is `None`.
    Error {
        /// Engine that reported it, if any.
        category: Option<FileCategory>,
        /// Human-readable message.
        message: String,
    },
    /// Every dispatched job has finished. Emitted at most once per batch.
    Complete {
        /// Sum of the note counts reported by the completed engines.
        notes_imported: usize,
        /// Jobs that stopped without reporting completion.
        jobs_failed: usize,
    },
}

/// Options forwarded unchanged to every engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Tag every imported note as markdown.
    pub markdown: bool,
    /// Largest file, in bytes, an engine will read.
    pub max_file_bytes: u64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            markdown: false,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl ImportOptions {
    /// Derive engine options from the runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            markdown: config.markdown,
            max_file_bytes: config.max_file_bytes,
        }
    }
}
