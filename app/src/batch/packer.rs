// ==============================================================================
// batch/packer.rs - Tumor/Normal Pair Batch Packer
// ==============================================================================
// Description: Groups sample pairs into subject-preserving processing batches
// Author: Matt Barham
// Created: 2026-10-13
// Modified: 2026-10-19
// Version: 1.2.0
// ==============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::SamplePair;
use crate::progress::{emit, ProgressEventType, ProgressObserver};

/// Batch indices reserved for curated (pre-seeded) pair lists
pub const FIRST_PACKED_BATCH: usize = 2;

/// Bytes in one GiB, the unit of disk sizes on the command line
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// How the disk-size threshold takes part in batch rollover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiskSizePolicy {
    /// Size is tracked and reported, only the pair count closes a batch
    #[default]
    Advisory,
    /// Exceeding the size also closes the current batch
    Enforced,
}

/// Limits and curated batches for one packing run
#[derive(Debug, Clone)]
pub struct PackerConfig {
    /// Cumulative BAM size targeted per batch, in bytes
    pub max_disk_size_bytes: u64,

    /// Maximum number of pairs per batch
    pub max_batch_size: usize,

    pub disk_size_policy: DiskSizePolicy,

    /// Pair identifiers pinned to batch 0, 1, ... (at most two lists)
    pub seeded_batches: Vec<Vec<String>>,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            max_disk_size_bytes: 190 * BYTES_PER_GIB,
            max_batch_size: 4,
            disk_size_policy: DiskSizePolicy::Advisory,
            seeded_batches: Vec::new(),
        }
    }
}

/// Grouping errors that make a batch assignment unusable
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Subject {subject_id} has pair {pair_id} outside of its seeded batch {seeded_batch}")]
    SplitSubject {
        subject_id: String,
        seeded_batch: usize,
        pair_id: String,
    },

    #[error("Sample {sample_id} belongs to batches {first} and {second}")]
    SampleInMultipleBatches {
        sample_id: String,
        first: usize,
        second: usize,
    },
}

/// Errors raised by [`BatchPacker::pack`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PackError {
    #[error("Duplicate pair identifier: {0}")]
    DuplicatePair(String),

    #[error("Seeded pair {pair_id} (batch {batch}) is not among the input pairs")]
    UnknownSeededPair { pair_id: String, batch: usize },

    #[error("{count} seeded batches given, at most {max} are supported")]
    TooManySeededBatches { count: usize, max: usize },

    #[error("Maximum batch size must be at least 1")]
    ZeroBatchSize,

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

/// Running totals of the batch being filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchState {
    pub index: usize,
    pub cumulative_size: u64,
    pub cumulative_count: usize,
}

impl BatchState {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            cumulative_size: 0,
            cumulative_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative_count == 0
    }

    /// Dry run: the state after adding `pairs`, without committing anything
    pub fn would_fit(&self, pairs: &[&SamplePair]) -> BatchState {
        BatchState {
            index: self.index,
            cumulative_size: self.cumulative_size
                + pairs.iter().map(|p| p.paired_file_size_bytes).sum::<u64>(),
            cumulative_count: self.cumulative_count + pairs.len(),
        }
    }

    /// Empty state of the next batch
    pub fn rollover(&self) -> BatchState {
        BatchState::new(self.index + 1)
    }
}

/// One processing batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub pairs: Vec<SamplePair>,
    /// Built from a curated list rather than by the packer
    pub seeded: bool,
}

impl Batch {
    pub fn total_size(&self) -> u64 {
        self.pairs.iter().map(|p| p.paired_file_size_bytes).sum()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Outcome of a packing run, batches in increasing index order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingResult {
    pub batches: Vec<Batch>,
}

impl PackingResult {
    /// Pair identifier -> batch index
    pub fn assignments(&self) -> BTreeMap<String, usize> {
        self.batches
            .iter()
            .flat_map(|batch| batch.pairs.iter().map(move |p| (p.pair_id(), batch.index)))
            .collect()
    }

    pub fn batch_of(&self, pair_id: &str) -> Option<usize> {
        self.batches
            .iter()
            .find(|batch| batch.pairs.iter().any(|p| p.pair_id() == pair_id))
            .map(|batch| batch.index)
    }

    /// Sample id -> batch index; a sample must resolve to a single batch
    pub fn sample_batches(&self) -> Result<BTreeMap<String, usize>, ConsistencyError> {
        let mut membership: BTreeMap<String, usize> = BTreeMap::new();

        for batch in &self.batches {
            for pair in &batch.pairs {
                for sample in [&pair.tumor_sample_id, &pair.normal_sample_id] {
                    match membership.get(sample.as_str()) {
                        Some(&first) if first != batch.index => {
                            return Err(ConsistencyError::SampleInMultipleBatches {
                                sample_id: sample.clone(),
                                first,
                                second: batch.index,
                            });
                        }
                        Some(_) => {}
                        None => {
                            membership.insert(sample.clone(), batch.index);
                        }
                    }
                }
            }
        }

        Ok(membership)
    }
}

/// Packs tumor/normal pairs into batches
///
/// # Algorithm
/// 1. Curated pair lists are pinned to batches 0 and 1
/// 2. Remaining pairs are sorted by pair identifier and grouped by subject
///    in order of first appearance
/// 3. For each subject, a dry run adds all of its pairs to the current
///    batch; if the count limit (or the size limit, when enforced) would be
///    exceeded and the batch is not empty, the batch is closed and the
///    subject goes to a fresh one
/// 4. A subject larger than the limits alone still gets a single batch
pub struct BatchPacker {
    config: PackerConfig,
}

impl BatchPacker {
    pub fn new(config: PackerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    fn exceeds_limits(&self, state: &BatchState) -> bool {
        let over_count = state.cumulative_count > self.config.max_batch_size;
        let over_size = state.cumulative_size > self.config.max_disk_size_bytes;

        match self.config.disk_size_policy {
            DiskSizePolicy::Advisory => over_count,
            DiskSizePolicy::Enforced => over_count || over_size,
        }
    }

    /// Assign every pair to a batch
    pub fn pack(
        &self,
        pairs: &[SamplePair],
        observer: &dyn ProgressObserver,
    ) -> Result<PackingResult, PackError> {
        if self.config.max_batch_size == 0 {
            return Err(PackError::ZeroBatchSize);
        }
        if self.config.seeded_batches.len() > FIRST_PACKED_BATCH {
            return Err(PackError::TooManySeededBatches {
                count: self.config.seeded_batches.len(),
                max: FIRST_PACKED_BATCH,
            });
        }

        // Sorted so that batch indices do not change from one run to another
        let mut sorted: Vec<(String, &SamplePair)> = pairs.iter().map(|p| (p.pair_id(), p)).collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        for window in sorted.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(PackError::DuplicatePair(window[0].0.clone()));
            }
        }

        let seeded = self.seeded_lookup(&sorted)?;
        let mut batches = self.seeded_batches(&sorted, &seeded, observer);

        // Subjects of seeded pairs must not reappear among the remaining pairs
        let seeded_subjects: HashMap<&str, usize> = sorted
            .iter()
            .filter_map(|(id, pair)| seeded.get(id.as_str()).map(|&b| (pair.subject_id.as_str(), b)))
            .collect();

        for (id, pair) in &sorted {
            if let Some(&seeded_batch) = seeded_subjects.get(pair.subject_id.as_str()) {
                if seeded.get(id.as_str()) != Some(&seeded_batch) {
                    return Err(ConsistencyError::SplitSubject {
                        subject_id: pair.subject_id.clone(),
                        seeded_batch,
                        pair_id: id.clone(),
                    }
                    .into());
                }
            }
        }

        let remaining: Vec<&SamplePair> = sorted
            .iter()
            .filter(|(id, _)| !seeded.contains_key(id.as_str()))
            .map(|(_, pair)| *pair)
            .collect();

        batches.extend(self.pack_remaining(&remaining, observer));

        info!(
            "Packed {} pairs into {} batches ({} seeded)",
            pairs.len(),
            batches.len(),
            batches.iter().filter(|b| b.seeded).count()
        );

        Ok(PackingResult { batches })
    }

    /// Pair identifier -> seeded batch index, validated against the input
    fn seeded_lookup<'a>(
        &'a self,
        sorted: &[(String, &SamplePair)],
    ) -> Result<HashMap<&'a str, usize>, PackError> {
        let known: HashSet<&str> = sorted.iter().map(|(id, _)| id.as_str()).collect();
        let mut lookup = HashMap::new();

        for (batch, ids) in self.config.seeded_batches.iter().enumerate() {
            for id in ids {
                if !known.contains(id.as_str()) {
                    return Err(PackError::UnknownSeededPair {
                        pair_id: id.clone(),
                        batch,
                    });
                }
                if lookup.insert(id.as_str(), batch).is_some() {
                    return Err(PackError::DuplicatePair(id.clone()));
                }
            }
        }

        Ok(lookup)
    }

    fn seeded_batches(
        &self,
        sorted: &[(String, &SamplePair)],
        seeded: &HashMap<&str, usize>,
        observer: &dyn ProgressObserver,
    ) -> Vec<Batch> {
        let mut batches = Vec::new();

        for index in 0..self.config.seeded_batches.len() {
            let pairs: Vec<SamplePair> = sorted
                .iter()
                .filter(|(id, _)| seeded.get(id.as_str()) == Some(&index))
                .map(|(_, pair)| (*pair).clone())
                .collect();

            if pairs.is_empty() {
                continue;
            }

            emit(
                observer,
                ProgressEventType::BatchSeeded,
                Some(format!("batch_{}", index)),
                serde_json::json!({ "batch": index, "pairs": pairs.len() }),
            );

            batches.push(Batch {
                index,
                pairs,
                seeded: true,
            });
        }

        batches
    }

    fn pack_remaining(&self, remaining: &[&SamplePair], observer: &dyn ProgressObserver) -> Vec<Batch> {
        // Subjects in order of their first pair
        let mut order: Vec<&str> = Vec::new();
        let mut by_subject: HashMap<&str, Vec<&SamplePair>> = HashMap::new();
        for pair in remaining {
            let subject = pair.subject_id.as_str();
            by_subject
                .entry(subject)
                .or_insert_with(|| {
                    order.push(subject);
                    Vec::new()
                })
                .push(pair);
        }

        let mut batches = Vec::new();
        let mut state = BatchState::new(FIRST_PACKED_BATCH);
        let mut current: Vec<SamplePair> = Vec::new();

        for subject in order {
            let group = &by_subject[subject];

            let mut trial = state.would_fit(group);
            if self.exceeds_limits(&trial) && !state.is_empty() {
                batches.push(self.close_batch(state, std::mem::take(&mut current), observer));
                state = state.rollover();
                trial = state.would_fit(group);
            }

            if state.is_empty() {
                emit(
                    observer,
                    ProgressEventType::BatchOpened,
                    Some(format!("batch_{}", state.index)),
                    serde_json::json!({ "batch": state.index }),
                );
            }

            state = trial;
            current.extend(group.iter().map(|p| (*p).clone()));

            debug!("Subject {} -> batch {} ({} pairs)", subject, state.index, group.len());
            emit(
                observer,
                ProgressEventType::SubjectAssigned,
                Some(subject.to_string()),
                serde_json::json!({
                    "batch": state.index,
                    "pairs": group.len(),
                    "cumulative_count": state.cumulative_count,
                    "cumulative_size": state.cumulative_size,
                }),
            );
        }

        if !current.is_empty() {
            batches.push(self.close_batch(state, current, observer));
        }

        batches
    }

    fn close_batch(
        &self,
        state: BatchState,
        pairs: Vec<SamplePair>,
        observer: &dyn ProgressObserver,
    ) -> Batch {
        if state.cumulative_size > self.config.max_disk_size_bytes {
            emit(
                observer,
                ProgressEventType::BatchOverDiskSize,
                Some(format!("batch_{}", state.index)),
                serde_json::json!({
                    "batch": state.index,
                    "size_bytes": state.cumulative_size,
                    "max_disk_size_bytes": self.config.max_disk_size_bytes,
                }),
            );
        }

        Batch {
            index: state.index,
            pairs,
            seeded: false,
        }
    }
}
