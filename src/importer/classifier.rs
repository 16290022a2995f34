//! Admission control: route selected files to per-category batches.

use super::types::{FileCategory, ImportBatch, SourceFile};
use std::collections::{BTreeMap, BTreeSet};

/// Tracks which exclusive categories already admitted a file.
///
/// Shared by [`classify`] and the drop target so both apply the same first-file-wins rule.
#[derive(Debug, Default)]
pub struct ExclusivityFilter {
    seen: BTreeSet<FileCategory>,
}

impl ExclusivityFilter {
    /// Create a filter that has admitted nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when a file of `category` may be admitted.
    pub fn admit(&mut self, category: FileCategory) -> bool {
        !category.is_exclusive() || self.seen.insert(category)
    }
}

/// Result of classifying one selection. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    batches: BTreeMap<FileCategory, ImportBatch>,
    discarded: BTreeMap<FileCategory, usize>,
}

impl Classification {
    /// Admitted batch for `category`, if any file was admitted.
    pub fn batch(&self, category: FileCategory) -> Option<&ImportBatch> {
        self.batches.get(&category)
    }

    /// Non-empty batches in category order.
    pub fn batches(&self) -> impl Iterator<Item = &ImportBatch> {
        self.batches.values()
    }

    /// Number of files of `category` dropped by the exclusivity rule.
    pub fn discarded(&self, category: FileCategory) -> usize {
        self.discarded.get(&category).copied().unwrap_or(0)
    }

    /// Number of files dropped across all categories.
    pub fn total_discarded(&self) -> usize {
        self.discarded.values().sum()
    }

    /// Number of engines the batch needs.
    pub fn total_jobs(&self) -> usize {
        self.batches.len()
    }

    /// Whether nothing was admitted.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Consume the classification, yielding its batches in category order.
    pub fn into_batches(self) -> Vec<ImportBatch> {
        self.batches.into_values().collect()
    }
}

/// Split `files` into per-category batches.
///
/// The first Simplenote and the first Evernote file in input order are admitted; later files
/// of those categories are counted as discarded. Text and unknown files are always admitted
/// into the text batch. Never fails; an empty input yields an empty classification.
pub fn classify(files: &[SourceFile]) -> Classification {
    let mut filter = ExclusivityFilter::new();
    let mut admitted: BTreeMap<FileCategory, Vec<SourceFile>> = BTreeMap::new();
    let mut discarded: BTreeMap<FileCategory, usize> = BTreeMap::new();

    for file in files {
        let category = file.category().admission_category();
        if !filter.admit(category) {
            *discarded.entry(category).or_insert(0) += 1;
            tracing::debug!(file = file.name(), %category, "Discarding extra exclusive file");
            continue;
        }
        admitted.entry(category).or_default().push(file.clone());
    }

    Classification {
        batches: admitted
            .into_iter()
            .map(|(category, files)| (category, ImportBatch::new(category, files)))
            .collect(),
        discarded,
    }
}
