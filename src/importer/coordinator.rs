//! Fan a classified selection out to one engine per category and fold their status reports
//! into a single aggregate stream.
//!
//! Each engine runs on its own tokio task and owns the sending half of a private status
//! channel. The aggregator task merges those channels and tracks every job to a terminal
//! state:
//!
//! - `Complete(n)` finishes the job and adds `n` to the running note count.
//! - `Error` and `Progress` are forwarded with the originating category and never finish a job.
//! - A channel that closes before `Complete` (the engine gave up after an error, or panicked)
//!   finishes the job as failed with zero notes.
//!
//! The aggregate `Complete` is therefore emitted exactly once per dispatched batch, after every
//! job has finished, even when some engines fail.

use super::classifier::classify;
use super::types::{
    FileCategory, ImportBatch, ImportOptions, ImportUpdate, SourceFile, StatusEvent,
};
use crate::engines::{DefaultEngineFactory, EngineFactory, StatusSender};
use crate::metrics::ImportMetrics;
use crate::notes::NoteSink;
use futures_core::Stream;
use futures_util::stream::{StreamExt, select_all};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Message emitted when `import_notes` receives no files.
pub const NO_FILES_MESSAGE: &str = "No files to import.";
/// Message emitted when a batch is requested while another is still running.
pub const BATCH_IN_PROGRESS_MESSAGE: &str = "An import is already in progress.";

/// Running tally of dispatched versus finished jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateStatus {
    total_jobs: usize,
    jobs_finished: usize,
    jobs_failed: usize,
    notes_imported: usize,
}

impl AggregateStatus {
    /// Start a tally for `total_jobs` dispatched engines.
    pub fn new(total_jobs: usize) -> Self {
        Self {
            total_jobs,
            jobs_finished: 0,
            jobs_failed: 0,
            notes_imported: 0,
        }
    }

    /// Engines dispatched for the batch. Fixed for the batch's lifetime.
    pub fn total_jobs(&self) -> usize {
        self.total_jobs
    }

    /// Jobs that reached a terminal state.
    pub fn jobs_finished(&self) -> usize {
        self.jobs_finished
    }

    /// Jobs that finished without reporting completion.
    pub fn jobs_failed(&self) -> usize {
        self.jobs_failed
    }

    /// Notes reported by completed jobs so far.
    pub fn notes_imported(&self) -> usize {
        self.notes_imported
    }

    /// Record a job that reported `Complete(notes)`.
    pub fn record_completed(&mut self, notes: usize) {
        debug_assert!(self.jobs_finished < self.total_jobs);
        self.jobs_finished += 1;
        self.notes_imported += notes;
    }

    /// Record a job whose channel closed without completion.
    pub fn record_failed(&mut self) {
        debug_assert!(self.jobs_finished < self.total_jobs);
        self.jobs_finished += 1;
        self.jobs_failed += 1;
    }

    /// Whether every dispatched job has finished.
    pub fn is_finished(&self) -> bool {
        self.jobs_finished == self.total_jobs
    }
}

/// One reported error, as collected by [`ImportRun::wait`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportErrorReport {
    /// Engine that reported it; `None` for coordinator errors.
    pub category: Option<FileCategory>,
    /// Human-readable message.
    pub message: String,
}

/// Everything observed on an aggregate stream once it ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Whether the terminal `Complete` event was received.
    pub completed: bool,
    /// Notes imported across all completed engines.
    pub notes_imported: usize,
    /// Engines dispatched for the batch.
    pub total_jobs: usize,
    /// Engines that stopped without completing.
    pub jobs_failed: usize,
    /// Exclusive-format files dropped during admission.
    pub discarded: usize,
    /// Progress events observed.
    pub progress_events: usize,
    /// Errors in arrival order.
    pub errors: Vec<ImportErrorReport>,
}

/// Aggregate status stream for one batch.
///
/// Yields [`ImportUpdate`]s in arrival order and ends after the terminal `Complete`, or right
/// after the single error when the batch was refused. Dropping it does not stop the batch.
#[derive(Debug)]
pub struct ImportRun {
    updates: mpsc::UnboundedReceiver<ImportUpdate>,
    total_jobs: usize,
    discarded: usize,
}

impl ImportRun {
    fn new(updates: mpsc::UnboundedReceiver<ImportUpdate>, total_jobs: usize, discarded: usize) -> Self {
        Self {
            updates,
            total_jobs,
            discarded,
        }
    }

    /// Engines dispatched for this batch; zero when it was refused.
    pub fn total_jobs(&self) -> usize {
        self.total_jobs
    }

    /// Exclusive-format files dropped during admission.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Receive the next update, or `None` once the stream ended.
    pub async fn next_update(&mut self) -> Option<ImportUpdate> {
        self.updates.recv().await
    }

    /// Drain the stream into a summary.
    pub async fn wait(mut self) -> ImportSummary {
        let mut summary = ImportSummary {
            total_jobs: self.total_jobs,
            discarded: self.discarded,
            ..ImportSummary::default()
        };
        while let Some(update) = self.updates.recv().await {
            match update {
                ImportUpdate::Progress { .. } => summary.progress_events += 1,
                ImportUpdate::Error { category, message } => {
                    summary.errors.push(ImportErrorReport { category, message });
                }
                ImportUpdate::Complete {
                    notes_imported,
                    jobs_failed,
                } => {
                    summary.completed = true;
                    summary.notes_imported = notes_imported;
                    summary.jobs_failed = jobs_failed;
                }
            }
        }
        summary
    }
}

impl Stream for ImportRun {
    type Item = ImportUpdate;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().updates.poll_recv(cx)
    }
}

/// Dispatches one engine per admitted category and aggregates their status.
///
/// One instance runs at most one batch at a time.
pub struct ImportCoordinator {
    sink: Arc<dyn NoteSink>,
    options: ImportOptions,
    factory: Arc<dyn EngineFactory>,
    metrics: Arc<ImportMetrics>,
    active: Arc<AtomicBool>,
}

impl ImportCoordinator {
    /// Build a coordinator using the built-in engines.
    pub fn new(sink: Arc<dyn NoteSink>, options: ImportOptions) -> Self {
        Self {
            sink,
            options,
            factory: Arc::new(DefaultEngineFactory),
            metrics: Arc::new(ImportMetrics::new()),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the engine factory.
    pub fn with_engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Record into a shared metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<ImportMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics registry this coordinator records into.
    pub fn metrics(&self) -> &Arc<ImportMetrics> {
        &self.metrics
    }

    /// Options forwarded to every engine.
    pub fn options(&self) -> ImportOptions {
        self.options
    }

    /// Whether a batch is still running.
    pub fn is_importing(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Start importing `files` and return the aggregate status stream.
    ///
    /// Returns immediately; engines and the aggregator run on spawned tasks, so this must be
    /// called from within a tokio runtime.
    pub fn import_notes(&self, files: Option<Vec<SourceFile>>) -> ImportRun {
        let (updates, receiver) = mpsc::unbounded_channel();

        let files = match files {
            Some(files) if !files.is_empty() => files,
            _ => {
                tracing::warn!("Import requested without files");
                refuse(&updates, NO_FILES_MESSAGE);
                return ImportRun::new(receiver, 0, 0);
            }
        };
        let Some(active) = ActiveBatch::acquire(&self.active) else {
            tracing::warn!(files = files.len(), "Import requested while a batch is running");
            refuse(&updates, BATCH_IN_PROGRESS_MESSAGE);
            return ImportRun::new(receiver, 0, 0);
        };

        let classification = classify(&files);
        let total_jobs = classification.total_jobs();
        let discarded = classification.total_discarded();
        self.metrics.record_batch_started(discarded as u64);
        tracing::info!(
            files = files.len(),
            total_jobs,
            discarded,
            "Starting import batch"
        );

        let mut jobs = Vec::with_capacity(total_jobs);
        let mut signals = Vec::with_capacity(total_jobs);
        for batch in classification.into_batches() {
            let category = batch.category();
            let engine = self
                .factory
                .create(category, Arc::clone(&self.sink), self.options);
            let (status, events) = StatusSender::channel(category);
            signals.push(Box::pin(job_signals(category, events)));
            jobs.push(ImportJob {
                category,
                batch: batch.clone(),
                state: JobState::Dispatched,
            });
            tracing::debug!(%category, files = batch.len(), "Dispatching import engine");
            tokio::spawn(async move {
                engine.import_notes(batch, status).await;
            });
        }

        let aggregator = Aggregator {
            status: AggregateStatus::new(total_jobs),
            jobs,
            updates,
            metrics: Arc::clone(&self.metrics),
            active: Some(active),
        };
        tokio::spawn(aggregator.run(select_all(signals)));

        ImportRun::new(receiver, total_jobs, discarded)
    }
}

fn refuse(updates: &mpsc::UnboundedSender<ImportUpdate>, message: &str) {
    let _ = updates.send(ImportUpdate::Error {
        category: None,
        message: message.to_string(),
    });
}

/// Marks the coordinator busy until dropped.
struct ActiveBatch(Arc<AtomicBool>);

impl ActiveBatch {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for ActiveBatch {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Dispatched,
    Completed,
    Failed,
}

/// Binds a category to its batch while the engine runs.
struct ImportJob {
    category: FileCategory,
    batch: ImportBatch,
    state: JobState,
}

enum JobSignal {
    Status(FileCategory, StatusEvent),
    Closed(FileCategory),
}

fn job_signals(
    category: FileCategory,
    mut events: mpsc::UnboundedReceiver<StatusEvent>,
) -> impl Stream<Item = JobSignal> {
    async_stream::stream! {
        while let Some(event) = events.recv().await {
            yield JobSignal::Status(category, event);
        }
        yield JobSignal::Closed(category);
    }
}

struct Aggregator {
    status: AggregateStatus,
    jobs: Vec<ImportJob>,
    updates: mpsc::UnboundedSender<ImportUpdate>,
    metrics: Arc<ImportMetrics>,
    active: Option<ActiveBatch>,
}

impl Aggregator {
    async fn run<S>(mut self, mut signals: S)
    where
        S: Stream<Item = JobSignal> + Unpin,
    {
        while !self.status.is_finished() {
            let Some(signal) = signals.next().await else {
                break;
            };
            match signal {
                JobSignal::Status(category, StatusEvent::Progress(notes)) => {
                    self.forward(ImportUpdate::Progress { category, notes });
                }
                JobSignal::Status(category, StatusEvent::Error(message)) => {
                    self.metrics.record_engine_error();
                    tracing::warn!(%category, error = %message, "Import engine reported an error");
                    self.forward(ImportUpdate::Error {
                        category: Some(category),
                        message,
                    });
                }
                JobSignal::Status(category, StatusEvent::Complete(notes)) => {
                    self.finish_job(category, JobState::Completed, notes);
                }
                JobSignal::Closed(category) => {
                    self.finish_job(category, JobState::Failed, 0);
                }
            }
        }
        self.complete();
    }

    fn finish_job(&mut self, category: FileCategory, outcome: JobState, notes: usize) {
        let Some(job) = self.jobs.iter_mut().find(|job| job.category == category) else {
            return;
        };
        // A completed engine's channel closes right after `Complete`.
        if job.state != JobState::Dispatched {
            return;
        }
        job.state = outcome;
        if outcome == JobState::Completed {
            tracing::info!(%category, files = job.batch.len(), notes, "Import job completed");
            self.status.record_completed(notes);
        } else {
            tracing::warn!(
                %category,
                files = job.batch.len(),
                "Import job stopped without completing"
            );
            self.status.record_failed();
        }
    }

    fn complete(mut self) {
        // Release before announcing so a caller reacting to `Complete` can start a new batch.
        self.active.take();
        let notes_imported = self.status.notes_imported();
        let jobs_failed = self.status.jobs_failed();
        self.metrics
            .record_batch_completed(notes_imported as u64, jobs_failed as u64);
        tracing::info!(
            total_jobs = self.status.total_jobs(),
            notes_imported,
            jobs_failed,
            "Import batch completed"
        );
        self.forward(ImportUpdate::Complete {
            notes_imported,
            jobs_failed,
        });
    }

    fn forward(&self, update: ImportUpdate) {
        if self.updates.send(update).is_err() {
            tracing::trace!("Import run dropped by caller");
        }
    }
}
