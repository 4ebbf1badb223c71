//! Batch-local class bookkeeping.
//!
//! [`ClassCounts`] accumulates how often each original detector class id
//! was seen across the batch. Once inference has finished for every image,
//! [`ClassMap`] freezes the id → batch-local-index assignment that all
//! label files and the shared class file use.

pub mod writer;

use std::collections::BTreeMap;

/// Occurrence counts per original detector class id, whole batch.
///
/// Backed by a `BTreeMap` so iteration is in ascending original-id order,
/// which is exactly the order the class map assigns indices in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassCounts {
    counts: BTreeMap<usize, usize>,
}

impl ClassCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one detection of `class_id`.
    pub fn record(&mut self, class_id: usize) {
        *self.counts.entry(class_id).or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct class ids seen.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Total detections across all classes.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Ascending iteration over (original id, count).
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.counts.iter().map(|(&id, &count)| (id, count))
    }

    pub fn as_map(&self) -> &BTreeMap<usize, usize> {
        &self.counts
    }

    pub fn into_map(self) -> BTreeMap<usize, usize> {
        self.counts
    }
}

/// One class-map entry: the detector's original id and the name written to
/// the class file. The entry's position in [`ClassMap`] is its index.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassEntry {
    pub original_id: usize,
    pub name: String,
}

/// Immutable id → batch-local index assignment for one batch.
///
/// Indices are contiguous `0..len()`, assigned in ascending original-id
/// order. The map is keyed by original id internally; names are only the
/// on-disk label, so two ids resolving to the same name keep distinct
/// indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassMap {
    entries: Vec<ClassEntry>,
    index_by_id: BTreeMap<usize, usize>,
}

impl ClassMap {
    /// Derives the map from observed counts, resolving each id to a name.
    pub fn from_counts(counts: &ClassCounts, mut resolve: impl FnMut(usize) -> String) -> Self {
        let entries: Vec<ClassEntry> = counts
            .iter()
            .map(|(original_id, _)| ClassEntry {
                original_id,
                name: resolve(original_id),
            })
            .collect();
        Self::from_entries(entries)
    }

    /// Fallback for batches with zero detections: the configured class
    /// names in configuration order, entry `i` carrying original id `i`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let entries: Vec<ClassEntry> = names
            .iter()
            .enumerate()
            .map(|(original_id, name)| ClassEntry {
                original_id,
                name: name.as_ref().to_string(),
            })
            .collect();
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<ClassEntry>) -> Self {
        let index_by_id: BTreeMap<usize, usize> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.original_id, index))
            .collect();
        Self {
            entries,
            index_by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Batch-local index for an original detector class id.
    pub fn index_of(&self, original_id: usize) -> Option<usize> {
        self.index_by_id.get(&original_id).copied()
    }

    /// Name at a batch-local index, i.e. line `index` of the class file.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }
}
