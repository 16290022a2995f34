use std::sync::Arc;

use rustyimport::importer::{FileCategory, ImportCoordinator, ImportOptions, ImportUpdate, SourceFile};
use rustyimport::notes::{MARKDOWN_TAG, NoteStore, PINNED_TAG};
use serde_json::json;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: impl AsRef<[u8]>) -> SourceFile {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write fixture");
    SourceFile::from_path(&path)
}

fn scratch() -> TempDir {
    tempfile::tempdir().expect("create temp dir")
}

const ENEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE en-export SYSTEM "http://xml.evernote.com/pub/evernote-export3.dtd">
<en-export application="Evernote" version="10">
  <note>
    <title>Reading list</title>
    <content><![CDATA[<en-note><ul><li>Dune</li><li>Solaris</li></ul></en-note>]]></content>
    <created>20220101T120000Z</created>
    <tag>books</tag>
  </note>
  <note>
    <title>Quote</title>
    <content><![CDATA[<en-note><div>Less is more &amp; more is less</div></en-note>]]></content>
  </note>
</en-export>"#;

fn simplenote_export(contents: &[&str]) -> String {
    let notes: Vec<_> = contents
        .iter()
        .map(|content| json!({ "content": content, "tags": ["imported"], "pinned": true }))
        .collect();
    json!({
        "activeNotes": notes,
        "trashedNotes": [{ "content": "trashed thought" }]
    })
    .to_string()
}

#[tokio::test]
async fn mixed_selection_imports_every_admitted_file() {
    let dir = scratch();
    let files = vec![
        write(&dir, "note1.txt", "first plain note"),
        write(&dir, "note2.md", "# Second\n\nwith *markdown*"),
        write(&dir, "export.json", simplenote_export(&["alpha", "beta"])),
        write(&dir, "export2.json", simplenote_export(&["never imported"])),
        write(&dir, "memo.enex", ENEX),
    ];
    let store = Arc::new(NoteStore::new());
    let coordinator = ImportCoordinator::new(store.clone(), ImportOptions::default());

    let mut run = coordinator.import_notes(Some(files));
    assert_eq!(run.total_jobs(), 3);
    assert_eq!(run.discarded(), 1);

    let mut updates = Vec::new();
    while let Some(update) = run.next_update().await {
        updates.push(update);
    }

    let completions: Vec<_> = updates
        .iter()
        .filter(|update| matches!(update, ImportUpdate::Complete { .. }))
        .collect();
    assert_eq!(
        completions,
        vec![&ImportUpdate::Complete {
            notes_imported: 7,
            jobs_failed: 0
        }]
    );
    assert!(matches!(updates.last(), Some(ImportUpdate::Complete { .. })));
    assert!(
        !updates
            .iter()
            .any(|update| matches!(update, ImportUpdate::Error { .. }))
    );

    let notes = store.notes();
    assert_eq!(notes.len(), 7);
    let content = |text: &str| {
        notes
            .iter()
            .find(|stored| stored.note.content == text)
            .map(|stored| stored.note.clone())
    };
    assert!(content("first plain note").is_some());
    let alpha = content("alpha").expect("simplenote note");
    assert_eq!(alpha.tags, vec!["imported"]);
    assert_eq!(alpha.system_tags, vec![PINNED_TAG]);
    assert!(content("trashed thought").expect("trashed note").deleted);
    let reading = content("Reading list\n- Dune\n- Solaris").expect("enex note");
    assert_eq!(reading.tags, vec!["books"]);
    assert!(content("Quote\nLess is more & more is less").is_some());
    assert!(content("never imported").is_none());
}

#[tokio::test]
async fn broken_export_fails_its_job_but_not_the_batch() {
    let dir = scratch();
    let files = vec![
        write(&dir, "broken.json", "{\"activeNotes\": ["),
        write(&dir, "kept.txt", "still here"),
    ];
    let store = Arc::new(NoteStore::new());
    let coordinator = ImportCoordinator::new(store.clone(), ImportOptions::default());

    let summary = coordinator.import_notes(Some(files)).wait().await;

    assert!(summary.completed);
    assert_eq!(summary.notes_imported, 1);
    assert_eq!(summary.jobs_failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].category, Some(FileCategory::Simplenote));
    assert_eq!(summary.errors[0].message, "Invalid json file.");
    assert_eq!(store.len(), 1);
    assert!(!coordinator.is_importing());
}

#[tokio::test]
async fn markdown_option_and_size_cap_reach_the_engines() {
    let dir = scratch();
    let files = vec![
        write(&dir, "small.txt", "short"),
        write(&dir, "large.txt", "x".repeat(64)),
        write(&dir, "README", "unknown type read as text"),
    ];
    let store = Arc::new(NoteStore::new());
    let options = ImportOptions {
        markdown: true,
        max_file_bytes: 32,
    };
    let coordinator = ImportCoordinator::new(store.clone(), options);

    let summary = coordinator.import_notes(Some(files)).wait().await;

    assert!(summary.completed);
    assert_eq!(summary.total_jobs, 1);
    assert_eq!(summary.notes_imported, 2);
    assert_eq!(summary.jobs_failed, 0);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].message, "large.txt: File is too large.");
    assert!(
        store
            .notes()
            .iter()
            .all(|stored| stored.note.system_tags == vec![MARKDOWN_TAG])
    );
    assert!(dir.path().join("large.txt").exists());
}

#[tokio::test]
async fn empty_selection_reports_a_single_error() {
    let store = Arc::new(NoteStore::new());
    let coordinator = ImportCoordinator::new(store.clone(), ImportOptions::default());

    let summary = coordinator.import_notes(None).wait().await;

    assert!(!summary.completed);
    assert_eq!(summary.total_jobs, 0);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].category, None);
    assert_eq!(summary.errors[0].message, "No files to import.");
    assert!(store.is_empty());
}
