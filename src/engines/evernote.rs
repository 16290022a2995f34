use super::enml::enml_to_text;
use super::{EngineError, ImportEngine, StatusSender, apply_options, now_unix, read_text};
use crate::importer::{FileCategory, ImportBatch, ImportOptions, SourceFile};
use crate::notes::{Note, NoteSink};
use async_trait::async_trait;
use roxmltree::{Document, Node, ParsingOptions};
use std::sync::Arc;
use time::PrimitiveDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

const ENEX_DATE: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");

/// Imports an Evernote ENEX export; every `<note>` becomes one note.
pub struct EvernoteImporter {
    sink: Arc<dyn NoteSink>,
    options: ImportOptions,
}

impl EvernoteImporter {
    /// Build an engine writing into `sink`.
    pub fn new(sink: Arc<dyn NoteSink>, options: ImportOptions) -> Self {
        Self { sink, options }
    }

    async fn import_export(
        &self,
        file: &SourceFile,
        status: &StatusSender,
    ) -> Result<usize, EngineError> {
        let text = read_text(file, self.options.max_file_bytes).await?;
        if text.trim().is_empty() {
            return Err(EngineError::Empty);
        }
        let mut parsing = ParsingOptions::default();
        parsing.allow_dtd = true;
        let document =
            Document::parse_with_options(&text, parsing).map_err(EngineError::InvalidEnex)?;
        if !document.root_element().has_tag_name("en-export") {
            return Err(EngineError::NotAnExport);
        }

        let mut imported = 0;
        for node in document
            .root_element()
            .children()
            .filter(|child| child.has_tag_name("note"))
        {
            let Some(note) = self.convert(node) else {
                continue;
            };
            self.sink.add_note(note);
            imported += 1;
            status.progress(imported);
        }
        Ok(imported)
    }

    fn convert(&self, node: Node<'_, '_>) -> Option<Note> {
        let title = child_text(node, "title").map(str::trim).unwrap_or_default();
        let body = child_text(node, "content")
            .map(|enml| match enml_to_text(enml) {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(title, %error, "Keeping unparseable note body as-is");
                    enml.trim().to_string()
                }
            })
            .unwrap_or_default();
        let content = match (title.is_empty(), body.is_empty()) {
            (true, true) => return None,
            (false, true) => title.to_string(),
            (true, false) => body,
            (false, false) => format!("{title}\n{body}"),
        };

        let now = now_unix();
        let created = child_text(node, "created").and_then(parse_enex_date);
        let updated = child_text(node, "updated").and_then(parse_enex_date).or(created);
        let mut note =
            Note::new(content).with_dates(created.unwrap_or(now), updated.unwrap_or(now));
        note.tags = node
            .children()
            .filter(|child| child.has_tag_name("tag"))
            .filter_map(|child| child.text())
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();
        apply_options(&mut note, &self.options);
        Some(note)
    }
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|child| child.has_tag_name(name))
        .and_then(|child| child.text())
}

fn parse_enex_date(value: &str) -> Option<i64> {
    PrimitiveDateTime::parse(value.trim(), ENEX_DATE)
        .map(|date| date.assume_utc().unix_timestamp())
        .ok()
}

#[async_trait]
impl ImportEngine for EvernoteImporter {
    fn category(&self) -> FileCategory {
        FileCategory::Evernote
    }

    async fn import_notes(&self, batch: ImportBatch, status: StatusSender) {
        let Some(file) = batch.files().first() else {
            status.error(EngineError::NoFile.to_string());
            return;
        };
        match self.import_export(file, &status).await {
            Ok(imported) => {
                tracing::debug!(file = file.name(), imported, "Evernote import finished");
                status.complete(imported);
            }
            Err(error) => {
                tracing::warn!(file = file.name(), %error, "Evernote import failed");
                status.error(error.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::StatusEvent;
    use crate::notes::NoteStore;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE en-export SYSTEM "http://xml.evernote.com/pub/evernote-export3.dtd">
<en-export export-date="20240101T000000Z" application="Evernote" version="10">
  <note>
    <title>Trip plan</title>
    <created>20230405T101500Z</created>
    <updated>20230406T080000Z</updated>
    <tag>travel</tag>
    <tag>2023</tag>
    <content><![CDATA[<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE en-note SYSTEM "http://xml.evernote.com/pub/enml2.dtd">
<en-note><div>Book flights</div><div>Pack &amp; go</div></en-note>]]></content>
  </note>
  <note>
    <title>Empty body</title>
    <content><![CDATA[<en-note></en-note>]]></content>
  </note>
  <note>
    <title></title>
    <content><![CDATA[<en-note/>]]></content>
  </note>
</en-export>"#;

    async fn run(file: SourceFile) -> (Arc<NoteStore>, Vec<StatusEvent>) {
        let store = Arc::new(NoteStore::new());
        let engine = EvernoteImporter::new(store.clone(), ImportOptions::default());
        let (status, mut rx) = StatusSender::channel(FileCategory::Evernote);
        engine
            .import_notes(ImportBatch::new(FileCategory::Evernote, vec![file]), status)
            .await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (store, events)
    }

    #[tokio::test]
    async fn imports_each_note_element() {
        let (store, events) = run(SourceFile::from_bytes("memo.enex", EXPORT)).await;

        assert_eq!(
            events,
            vec![
                StatusEvent::Progress(1),
                StatusEvent::Progress(2),
                StatusEvent::Complete(2)
            ]
        );
        let notes = store.notes();
        let trip = &notes[0].note;
        assert_eq!(trip.content, "Trip plan\nBook flights\nPack & go");
        assert_eq!(trip.tags, vec!["travel", "2023"]);
        assert_eq!(trip.creation_date, 1_680_689_700);
        assert_eq!(trip.modification_date, 1_680_768_000);
        assert_eq!(notes[1].note.content, "Empty body");
    }

    #[tokio::test]
    async fn malformed_xml_terminates_without_complete() {
        let (store, events) = run(SourceFile::from_bytes("memo.enex", "<en-export><note>")).await;
        assert_eq!(events, vec![StatusEvent::Error("Invalid enex file.".into())]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn foreign_xml_is_rejected() {
        let (_, events) = run(SourceFile::from_bytes("memo.enex", "<rss></rss>")).await;
        assert_eq!(events, vec![StatusEvent::Error("Invalid enex file.".into())]);
    }

    #[tokio::test]
    async fn malformed_note_body_is_kept_verbatim() {
        let export = r#"<en-export><note><title>Draft</title><content><![CDATA[<en-note><div>half]]></content></note></en-export>"#;
        let (store, events) = run(SourceFile::from_bytes("memo.enex", export)).await;
        assert_eq!(events, vec![StatusEvent::Progress(1), StatusEvent::Complete(1)]);
        assert_eq!(store.notes()[0].note.content, "Draft\n<en-note><div>half");
    }

    #[test]
    fn parse_enex_date_reads_compact_utc() {
        assert_eq!(parse_enex_date("20230405T101500Z"), Some(1_680_689_700));
        assert_eq!(parse_enex_date("2023-04-05"), None);
    }
}
