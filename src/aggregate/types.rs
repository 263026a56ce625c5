use std::path::Path;

use crate::error::Incompatibility;

/// The per-file steps of one aggregation.
///
/// `load` and `transform` are called concurrently from worker threads;
/// `reference` is called at most once per aggregation.
pub trait Pipeline: Sync {
    type Sample;
    type Reference: Send + Sync;
    type Output: Send;

    fn load(&self, path: &Path) -> anyhow::Result<Self::Sample>;

    /// Derives the shared reference state from the first sample that gets there.
    fn reference(&self, sample: &Self::Sample) -> Self::Reference;

    fn check_compatible(
        &self,
        sample: &Self::Sample,
        reference: &Self::Reference,
    ) -> Result<(), Incompatibility>;

    fn transform(&self, sample: &Self::Sample, reference: &Self::Reference) -> Self::Output;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// `Some(n)` runs on a dedicated pool of `n` workers, `None` on the global pool.
    pub threads: Option<usize>,
}

impl AggregateOptions {
    pub fn with_threads(threads: usize) -> Self {
        AggregateOptions {
            threads: Some(threads),
        }
    }
}

/// What an aggregation leaves behind once every worker has joined.
#[derive(Debug)]
pub struct Aggregation<A, R> {
    pub accumulator: A,
    /// `None` only when there were no inputs.
    pub reference: Option<R>,
}

/// Per-file completion callback, used for user feedback only.
pub trait Progress: Sync {
    fn file_done(&self, done: usize, total: usize, path: &Path);
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn file_done(&self, _done: usize, _total: usize, _path: &Path) {}
}

impl<F> Progress for F
where
    F: Fn(usize, usize, &Path) + Sync,
{
    fn file_done(&self, done: usize, total: usize, path: &Path) {
        self(done, total, path)
    }
}
