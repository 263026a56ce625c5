use log::{debug, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use super::accumulator::Accumulator;
use super::reference::ReferenceCell;
use super::types::{AggregateOptions, Aggregation, Pipeline, Progress};
use crate::error::{AggregateError, AggregateResult};
use crate::runtime;

/// Keeps the first error any worker reports and tells the others to stop.
#[derive(Default)]
struct FirstFailure {
    raised: AtomicBool,
    first: Mutex<Option<AggregateError>>,
}

impl FirstFailure {
    #[inline]
    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    fn record(&self, err: AggregateError) {
        let mut slot = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        } else {
            debug!("[aggregate] dropping follow-up error: {err}");
        }
        self.raised.store(true, Ordering::Release);
    }

    fn into_inner(self) -> Option<AggregateError> {
        self.first.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Load -> reference (first arrival only) -> validate -> transform -> merge, for one file.
fn process_file<P, A>(
    index: usize,
    path: &Path,
    pipeline: &P,
    reference: &ReferenceCell<P::Reference>,
    accumulator: &A,
    failure: &FirstFailure,
) -> AggregateResult<bool>
where
    P: Pipeline,
    A: Accumulator<P::Output>,
{
    let sample = pipeline.load(path).map_err(|source| AggregateError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    // loading is the slow part; re-check before doing anything shared
    if failure.is_raised() {
        return Ok(false);
    }

    let state = reference.get_or_compute(|| {
        let t0 = Instant::now();
        let state = pipeline.reference(&sample);
        debug!(
            "[reference] derived from {} in {:.3}s",
            path.display(),
            t0.elapsed().as_secs_f64()
        );
        state
    });

    let incompatible = |reason| AggregateError::Incompatible {
        path: path.to_path_buf(),
        reason,
    };
    pipeline
        .check_compatible(&sample, state)
        .map_err(incompatible)?;
    let output = pipeline.transform(&sample, state);
    accumulator.merge(index, output).map_err(incompatible)?;
    Ok(true)
}

/// Runs `pipeline` over every path and merges the results into `accumulator`.
///
/// Files are handed out one at a time to whichever worker is free. Returns
/// once all workers have joined; on failure the first error is returned and
/// the accumulator is dropped. No inputs yields the untouched accumulator and
/// no reference.
pub fn aggregate<P, A>(
    paths: &[PathBuf],
    pipeline: &P,
    accumulator: A,
    options: &AggregateOptions,
    progress: &dyn Progress,
) -> AggregateResult<Aggregation<A, P::Reference>>
where
    P: Pipeline,
    A: Accumulator<P::Output>,
{
    let total = paths.len();
    if total == 0 {
        debug!("[aggregate] no inputs");
        return Ok(Aggregation {
            accumulator,
            reference: None,
        });
    }

    let reference = ReferenceCell::new();
    let failure = FirstFailure::default();
    let done = AtomicUsize::new(0);
    let t0 = Instant::now();

    let run = || {
        info!(
            "[aggregate] {} files on {} workers",
            total,
            rayon::current_num_threads()
        );
        (0..total)
            .into_par_iter()
            .with_max_len(1)
            .for_each(|index| {
                if failure.is_raised() {
                    return;
                }
                let path = &paths[index];
                match process_file(index, path, pipeline, &reference, &accumulator, &failure) {
                    Ok(true) => {
                        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                        progress.file_done(n, total, path);
                    }
                    Ok(false) => {}
                    Err(err) => failure.record(err),
                }
            });
    };
    run_in_pool(options, run)?;

    if let Some(err) = failure.into_inner() {
        return Err(err);
    }
    info!(
        "[aggregate] {} files done in {:.3}s",
        done.load(Ordering::Relaxed),
        t0.elapsed().as_secs_f64()
    );
    Ok(Aggregation {
        accumulator,
        reference: reference.into_inner(),
    })
}

/// Runs `op` on a dedicated pool of `options.threads` workers, or on the
/// global pool when no count is given.
///
/// Any rayon work `op` spawns stays on that pool.
pub fn run_in_pool<R, OP>(options: &AggregateOptions, op: OP) -> AggregateResult<R>
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    match options.threads {
        Some(threads) => Ok(runtime::build_pool(threads)?.install(op)),
        None => Ok(op()),
    }
}

/// [`aggregate`] for callers that need at least `required` inputs.
///
/// Too few inputs (and always zero) fail with `EmptyInput` before any worker
/// is started.
pub fn aggregate_required<P, A>(
    required: usize,
    paths: &[PathBuf],
    pipeline: &P,
    accumulator: A,
    options: &AggregateOptions,
    progress: &dyn Progress,
) -> AggregateResult<Aggregation<A, P::Reference>>
where
    P: Pipeline,
    A: Accumulator<P::Output>,
{
    let required = required.max(1);
    if paths.len() < required {
        return Err(AggregateError::EmptyInput { required });
    }
    aggregate(paths, pipeline, accumulator, options, progress)
}
