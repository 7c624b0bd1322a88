//! Ramp planning: concurrency levels and per-process partitions.

use apfaas_core::{ConcurrencyPolicy, RequestRecord};

/// Concurrency levels: `initial, initial + increment, ...` strictly below
/// `maximum`, then `maximum` itself. The last level is always `maximum`.
pub fn concurrency_sequence(policy: &ConcurrencyPolicy) -> Vec<usize> {
    let step = policy.increment.max(1);
    let mut levels: Vec<usize> = (policy.initial..policy.maximum).step_by(step).collect();
    if levels.last() != Some(&policy.maximum) {
        levels.push(policy.maximum);
    }
    levels
}

/// Worker processes available: a share of the logical cores, never more
/// than the sample size and never fewer than one.
pub fn process_count(cores: usize, cpu_percentage: f64, sample_size: usize) -> usize {
    let share = (cores as f64 * cpu_percentage / 100.0).floor() as usize;
    share.min(sample_size).max(1)
}

/// Split `level` units of concurrency over `process_count` workers.
///
/// The first `level % process_count` workers get one extra unit. When
/// `level < process_count` the first `level` workers get one unit and the
/// rest get none.
pub fn partition_concurrency(level: usize, process_count: usize) -> Vec<usize> {
    if process_count == 0 {
        return Vec::new();
    }
    let base = level / process_count;
    let extra = level % process_count;
    (0..process_count)
        .map(|worker| base + usize::from(worker < extra))
        .collect()
}

/// Split `items` into `parts` contiguous chunks of nearly equal size; the
/// remainder goes to the first chunks.
pub fn split_chunks<T: Clone>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    if parts == 0 {
        return Vec::new();
    }
    let base = items.len() / parts;
    let extra = items.len() % parts;

    let mut chunks = Vec::with_capacity(parts);
    let mut offset = 0;
    for part in 0..parts {
        let size = base + usize::from(part < extra);
        chunks.push(items[offset..offset + size].to_vec());
        offset += size;
    }
    chunks
}

/// Work of one concurrency level.
#[derive(Debug, Clone)]
pub struct LevelPlan {
    pub level: usize,
    /// One chunk per worker, in sample order
    pub chunks: Vec<Vec<RequestRecord>>,
    /// Sub-concurrency per worker, aligned with `chunks`
    pub concurrency: Vec<usize>,
}

impl LevelPlan {
    pub fn new(sample: &[RequestRecord], level: usize, process_count: usize) -> Self {
        let processes = process_count.min(level).max(1);
        Self {
            level,
            chunks: split_chunks(sample, processes),
            concurrency: partition_concurrency(level, processes),
        }
    }

    pub fn processes(&self) -> usize {
        self.chunks.len()
    }
}
