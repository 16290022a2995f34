//! Import coordination: classification, engine dispatch, and status aggregation.

mod classifier;
mod coordinator;
pub mod types;

pub use classifier::{Classification, ExclusivityFilter, classify};
pub use coordinator::{
    AggregateStatus, BATCH_IN_PROGRESS_MESSAGE, ImportCoordinator, ImportErrorReport, ImportRun,
    ImportSummary, NO_FILES_MESSAGE,
};
pub use types::{
    FileCategory, ImportBatch, ImportOptions, ImportUpdate, SourceFile, StatusEvent,
};
