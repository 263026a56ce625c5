//! Parallel per-file aggregation with a lazily shared reference state.
//!
//! Every input file goes through the same steps on a worker thread: load,
//! obtain the reference state (the first worker to arrive computes it), check
//! the sample against it, transform, and merge into a shared accumulator.
//! Reduction runs only after all workers have joined.

pub mod accumulator;
pub mod driver;
pub mod reduce;
pub mod reference;
pub mod types;

pub use accumulator::{Accumulator, IndexedSlots, RunningSum};
pub use driver::{aggregate, aggregate_required, run_in_pool};
pub use reduce::{normalize_in_place, pairwise_matrix};
pub use reference::ReferenceCell;
pub use types::{AggregateOptions, Aggregation, NoProgress, Pipeline, Progress};
