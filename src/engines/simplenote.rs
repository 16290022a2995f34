use super::{EngineError, ImportEngine, StatusSender, apply_options, now_unix, read_text};
use crate::importer::{FileCategory, ImportBatch, ImportOptions, SourceFile};
use crate::notes::{MARKDOWN_TAG, Note, NoteSink, PINNED_TAG};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Imports a Simplenote JSON export (`activeNotes` / `trashedNotes`).
pub struct SimplenoteImporter {
    sink: Arc<dyn NoteSink>,
    options: ImportOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimplenoteExport {
    #[serde(default)]
    active_notes: Vec<ExportedNote>,
    #[serde(default)]
    trashed_notes: Vec<ExportedNote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportedNote {
    #[serde(default)]
    content: String,
    #[serde(default)]
    creation_date: Option<String>,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    markdown: bool,
}

impl SimplenoteImporter {
    /// Build an engine writing into `sink`.
    pub fn new(sink: Arc<dyn NoteSink>, options: ImportOptions) -> Self {
        Self { sink, options }
    }

    async fn import_export(
        &self,
        file: &SourceFile,
        status: &StatusSender,
    ) -> Result<usize, EngineError> {
        if !file.name().to_lowercase().ends_with(".json") {
            return Err(EngineError::WrongExtension { expected: "json" });
        }
        let text = read_text(file, self.options.max_file_bytes).await?;
        if text.trim().is_empty() {
            return Err(EngineError::Empty);
        }
        let export: SimplenoteExport =
            serde_json::from_str(&text).map_err(EngineError::InvalidJson)?;

        let trashed = export.trashed_notes.into_iter().map(|note| (note, true));
        let notes = export
            .active_notes
            .into_iter()
            .map(|note| (note, false))
            .chain(trashed);

        let mut imported = 0;
        for (exported, deleted) in notes {
            let Some(mut note) = self.convert(exported) else {
                continue;
            };
            note.deleted = deleted;
            self.sink.add_note(note);
            imported += 1;
            status.progress(imported);
        }
        Ok(imported)
    }

    fn convert(&self, exported: ExportedNote) -> Option<Note> {
        if exported.content.trim().is_empty() {
            return None;
        }
        let created = parse_date(exported.creation_date.as_deref());
        let modified = parse_date(exported.last_modified.as_deref()).or(created);
        let now = now_unix();

        let mut note = Note::new(exported.content)
            .with_dates(created.unwrap_or(now), modified.unwrap_or(now));
        note.tags = exported.tags;
        if exported.pinned {
            note.add_system_tag(PINNED_TAG);
        }
        if exported.markdown {
            note.add_system_tag(MARKDOWN_TAG);
        }
        apply_options(&mut note, &self.options);
        Some(note)
    }
}

fn parse_date(value: Option<&str>) -> Option<i64> {
    let value = value?.trim();
    OffsetDateTime::parse(value, &Rfc3339)
        .map(OffsetDateTime::unix_timestamp)
        .ok()
}

#[async_trait]
impl ImportEngine for SimplenoteImporter {
    fn category(&self) -> FileCategory {
        FileCategory::Simplenote
    }

    async fn import_notes(&self, batch: ImportBatch, status: StatusSender) {
        let Some(file) = batch.files().first() else {
            status.error(EngineError::NoFile.to_string());
            return;
        };
        match self.import_export(file, &status).await {
            Ok(imported) => {
                tracing::debug!(file = file.name(), imported, "Simplenote import finished");
                status.complete(imported);
            }
            Err(error) => {
                tracing::warn!(file = file.name(), %error, "Simplenote import failed");
                status.error(error.to_string());
            }
        }
    }
}
