use super::{ImportEngine, StatusSender, apply_options, now_unix, read_text};
use crate::importer::{FileCategory, ImportBatch, ImportOptions};
use crate::notes::{Note, NoteSink};
use async_trait::async_trait;
use std::sync::Arc;

/// Imports each text or markdown file as one note.
pub struct TextImporter {
    sink: Arc<dyn NoteSink>,
    options: ImportOptions,
}

impl TextImporter {
    /// Build an engine writing into `sink`.
    pub fn new(sink: Arc<dyn NoteSink>, options: ImportOptions) -> Self {
        Self { sink, options }
    }
}

#[async_trait]
impl ImportEngine for TextImporter {
    fn category(&self) -> FileCategory {
        FileCategory::Text
    }

    async fn import_notes(&self, batch: ImportBatch, status: StatusSender) {
        let mut imported = 0;
        for file in batch.files() {
            let content = match read_text(file, self.options.max_file_bytes).await {
                Ok(content) => content,
                Err(error) => {
                    tracing::warn!(file = file.name(), %error, "Skipping text file");
                    status.error(format!("{}: {error}", file.name()));
                    continue;
                }
            };
            if content.trim().is_empty() {
                tracing::debug!(file = file.name(), "Skipping empty text file");
                continue;
            }

            let modified = file
                .last_modified()
                .await
                .map(|time| time.unix_timestamp())
                .unwrap_or_else(now_unix);
            let mut note = Note::new(content).with_dates(modified, modified);
            apply_options(&mut note, &self.options);
            self.sink.add_note(note);
            imported += 1;
            status.progress(imported);
        }

        tracing::debug!(files = batch.len(), imported, "Text import finished");
        status.complete(imported);
    }
}
