//! Command-line importer.
//!
//! Runs one import batch over the given files and directories and writes the resulting notes as
//! JSON. Directories are walked recursively; only files on the configured allow-list are picked
//! up from them, while files named explicitly are always passed on.
use anyhow::{Context, Result, bail};
use clap::Parser;
use rustyimport::config::Config;
use rustyimport::dropzone::DropzoneConfig;
use rustyimport::importer::{ImportCoordinator, ImportOptions, ImportUpdate, SourceFile};
use rustyimport::logging;
use rustyimport::notes::NoteStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "rusty-import",
    about = "Import Simplenote, Evernote and plain-text files into a JSON note list"
)]
struct Cli {
    /// Tag every imported note as markdown.
    #[arg(long)]
    markdown: bool,
    /// Where to write the imported notes.
    #[arg(long, default_value = "notes.json")]
    output: PathBuf,
    /// Largest file, in bytes, an engine will read.
    #[arg(long)]
    max_file_bytes: Option<u64>,
    /// Files or directories to import.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("failed to load configuration")?;
    logging::init_tracing();

    let files = collect_files(&cli.paths, &DropzoneConfig::from_config(&config))?;
    let mut options = ImportOptions::from_config(&config);
    options.markdown |= cli.markdown;
    if let Some(limit) = cli.max_file_bytes {
        options.max_file_bytes = limit;
    }

    let store = Arc::new(NoteStore::new());
    let coordinator = ImportCoordinator::new(store.clone(), options);
    let mut run = coordinator.import_notes(Some(files));

    let mut errors = Vec::new();
    let mut outcome = None;
    while let Some(update) = run.next_update().await {
        match update {
            ImportUpdate::Progress { category, notes } => {
                tracing::debug!(%category, notes, "Import progress");
            }
            ImportUpdate::Error { category, message } => {
                tracing::warn!(category = ?category, error = %message, "Import error");
                errors.push(message);
            }
            ImportUpdate::Complete {
                notes_imported,
                jobs_failed,
            } => outcome = Some((notes_imported, jobs_failed)),
        }
    }
    let Some((notes_imported, jobs_failed)) = outcome else {
        bail!("import did not complete: {}", errors.join("; "));
    };

    let json = serde_json::to_string_pretty(&store.notes()).context("failed to serialize notes")?;
    fs::write(&cli.output, json)
        .with_context(|| format!("failed to write notes to {}", cli.output.display()))?;

    println!(
        "Imported {notes_imported} notes into {} ({} errors, {jobs_failed} failed jobs, {} files skipped)",
        cli.output.display(),
        errors.len(),
        run.discarded()
    );
    Ok(())
}

fn collect_files(paths: &[PathBuf], filter: &DropzoneConfig) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk_directory(path, filter, &mut files)?;
        } else if path.is_file() {
            files.push(SourceFile::from_path(path));
        } else {
            bail!("{} is not a file or directory", path.display());
        }
    }
    Ok(files)
}

fn walk_directory(root: &Path, filter: &DropzoneConfig, files: &mut Vec<SourceFile>) -> Result<()> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if filter.accepts(&name) {
            files.push(SourceFile::from_path(entry.path()));
        } else {
            tracing::debug!(path = %entry.path().display(), "Skipping file outside the allow-list");
        }
    }
    Ok(())
}
