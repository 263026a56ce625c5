use ndarray::{Array1, array};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use placeagg::aggregate::{
    AggregateOptions, IndexedSlots, NoProgress, Pipeline, RunningSum, aggregate,
    aggregate_required, normalize_in_place, pairwise_matrix, run_in_pool,
};
use placeagg::{AggregateError, Incompatibility};

/// In-memory pipeline: a "file" is a tree size plus a value vector.
#[derive(Default)]
struct CountingPipeline {
    files: HashMap<PathBuf, (usize, Vec<f64>)>,
    broken: Vec<PathBuf>,
    loads: AtomicUsize,
    references: AtomicUsize,
    reference_delay: Duration,
}

impl CountingPipeline {
    fn new(files: Vec<(&str, usize, Vec<f64>)>) -> (Self, Vec<PathBuf>) {
        let paths: Vec<PathBuf> = files.iter().map(|(p, _, _)| PathBuf::from(p)).collect();
        let files = files
            .into_iter()
            .map(|(p, size, values)| (PathBuf::from(p), (size, values)))
            .collect();
        (
            CountingPipeline {
                files,
                ..Default::default()
            },
            paths,
        )
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn references(&self) -> usize {
        self.references.load(Ordering::SeqCst)
    }
}

impl Pipeline for CountingPipeline {
    type Sample = (usize, Vec<f64>);
    type Reference = usize;
    type Output = Array1<f64>;

    fn load(&self, path: &Path) -> anyhow::Result<Self::Sample> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.broken.iter().any(|b| b == path) {
            anyhow::bail!("corrupt file");
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such file"))
    }

    fn reference(&self, sample: &Self::Sample) -> usize {
        self.references.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.reference_delay);
        sample.0
    }

    fn check_compatible(
        &self,
        sample: &Self::Sample,
        reference: &usize,
    ) -> Result<(), Incompatibility> {
        if sample.0 != *reference {
            return Err(Incompatibility::Size {
                what: "edge",
                expected: *reference,
                found: sample.0,
            });
        }
        Ok(())
    }

    fn transform(&self, sample: &Self::Sample, _reference: &usize) -> Array1<f64> {
        Array1::from_vec(sample.1.clone())
    }
}

fn unit_files(n: usize, dim: usize) -> Vec<(String, usize, Vec<f64>)> {
    (0..n)
        .map(|i| {
            let mut v = vec![0.0; dim];
            v[i % dim] = 1.0 + i as f64 * 0.001;
            (format!("sample_{i}.jplace"), dim, v)
        })
        .collect()
}

fn pipeline_from(files: &[(String, usize, Vec<f64>)]) -> (CountingPipeline, Vec<PathBuf>) {
    CountingPipeline::new(
        files
            .iter()
            .map(|(p, s, v)| (p.as_str(), *s, v.clone()))
            .collect(),
    )
}

fn sum_on(
    paths: &[PathBuf],
    pipeline: &CountingPipeline,
    threads: usize,
) -> Result<Array1<f64>, AggregateError> {
    let done = aggregate(
        paths,
        pipeline,
        RunningSum::new(),
        &AggregateOptions::with_threads(threads),
        &NoProgress,
    )?;
    Ok(done.accumulator.into_inner().unwrap())
}

#[test]
fn reference_is_computed_exactly_once_for_any_worker_count() {
    let files = unit_files(128, 5);
    for threads in [1, 2, 8, 64] {
        let (mut pipeline, paths) = pipeline_from(&files);
        pipeline.reference_delay = Duration::from_millis(10);
        let done = aggregate(
            &paths,
            &pipeline,
            RunningSum::new(),
            &AggregateOptions::with_threads(threads),
            &NoProgress,
        )
        .unwrap();
        assert_eq!(pipeline.references(), 1, "threads={threads}");
        assert_eq!(pipeline.loads(), paths.len(), "threads={threads}");
        assert_eq!(done.reference, Some(5));
    }
}

#[test]
fn running_sum_is_independent_of_input_order() {
    let mut files = unit_files(40, 7);
    let (pipeline, paths) = pipeline_from(&files);
    let expected = sum_on(&paths, &pipeline, 1).unwrap();

    // a few deterministic permutations, on several pool sizes
    for (round, threads) in [2usize, 8, 64].into_iter().enumerate() {
        files.reverse();
        files.rotate_left(round * 7 + 3);
        let (pipeline, paths) = pipeline_from(&files);
        let got = sum_on(&paths, &pipeline, threads).unwrap();
        for (a, b) in expected.iter().zip(got.iter()) {
            assert!((a - b).abs() < 1e-9, "threads={threads}: {a} vs {b}");
        }
    }
}

#[test]
fn three_unit_vectors_sum_and_normalize() {
    let (pipeline, paths) = CountingPipeline::new(vec![
        ("a.jplace", 3, vec![1.0, 0.0, 0.0]),
        ("b.jplace", 3, vec![0.0, 1.0, 0.0]),
        ("c.jplace", 3, vec![0.0, 0.0, 1.0]),
    ]);
    let mut total = sum_on(&paths, &pipeline, 3).unwrap();
    assert_eq!(total, array![1.0, 1.0, 1.0]);

    normalize_in_place(&mut total);
    for v in total.iter() {
        assert!((v - 1.0 / 3.0).abs() < 1e-12);
    }
}

#[test]
fn indexed_results_give_symmetric_euclidean_matrix() {
    let hist = vec![
        vec![1.0, 0.0, 0.0, 0.0],
        vec![0.5, 0.5, 0.0, 0.0],
        vec![0.0, 0.0, 1.0, 0.0],
        vec![0.25, 0.25, 0.25, 0.25],
    ];
    let (pipeline, paths) = CountingPipeline::new(
        vec!["h0", "h1", "h2", "h3"]
            .into_iter()
            .zip(hist.iter().cloned())
            .map(|(p, v)| (p, 4, v))
            .collect(),
    );

    let done = aggregate(
        &paths,
        &pipeline,
        IndexedSlots::new(paths.len()),
        &AggregateOptions::with_threads(4),
        &NoProgress,
    )
    .unwrap();
    let results = done.accumulator.into_vec().unwrap();
    // slots follow input order, not completion order
    for (r, h) in results.iter().zip(&hist) {
        assert_eq!(r.to_vec(), *h);
    }

    let euclid = |a: &Array1<f64>, b: &Array1<f64>| {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt()
    };
    let m = pairwise_matrix(&results, euclid);
    assert_eq!(m.dim(), (4, 4));
    for i in 0..4 {
        assert_eq!(m[(i, i)], 0.0);
        for j in 0..4 {
            assert_eq!(m[(i, j)], m[(j, i)]);
        }
    }
    let direct = ((1.0f64 - 0.5).powi(2) + 0.5f64.powi(2)).sqrt();
    assert!((m[(0, 1)] - direct).abs() < 1e-12);
}

#[test]
fn reduction_stays_on_the_bounded_pool() {
    let files = unit_files(12, 3);
    let (pipeline, paths) = pipeline_from(&files);
    let options = AggregateOptions::with_threads(1);
    let done = aggregate(
        &paths,
        &pipeline,
        IndexedSlots::new(paths.len()),
        &options,
        &NoProgress,
    )
    .unwrap();
    let results = done.accumulator.into_vec().unwrap();

    let threads = Mutex::new(HashSet::new());
    let names = Mutex::new(HashSet::new());
    let m = run_in_pool(&options, || {
        pairwise_matrix(&results, |a: &Array1<f64>, b: &Array1<f64>| {
            let current = std::thread::current();
            threads.lock().unwrap().insert(current.id());
            names
                .lock()
                .unwrap()
                .insert(current.name().unwrap_or_default().to_string());
            (a - b).sum().abs()
        })
    })
    .unwrap();

    assert_eq!(m.dim(), (12, 12));
    assert_eq!(threads.into_inner().unwrap().len(), 1);
    let names = names.into_inner().unwrap();
    assert!(
        names.iter().all(|n| n.starts_with("placeagg-pool-")),
        "{names:?}"
    );
}

#[test]
fn mismatching_file_is_reported_and_nothing_is_returned() {
    let mut files = unit_files(12, 4);
    files[7].1 = 6;
    files[7].2 = vec![0.0; 6];
    let (pipeline, paths) = pipeline_from(&files);
    // a single worker walks the inputs in order, so sample_0 defines the reference
    let err = sum_on(&paths, &pipeline, 1).unwrap_err();
    match err {
        AggregateError::Incompatible { path, reason } => {
            assert_eq!(path, PathBuf::from("sample_7.jplace"));
            assert!(matches!(
                reason,
                Incompatibility::Size {
                    expected: 4,
                    found: 6,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pipeline.references(), 1);
}

#[test]
fn mismatch_fails_the_whole_batch_on_many_workers() {
    let mut files = unit_files(64, 4);
    files[33].1 = 6;
    files[33].2 = vec![0.0; 6];
    let (pipeline, paths) = pipeline_from(&files);
    // whichever file sets the reference, some other file disagrees with it
    let err = sum_on(&paths, &pipeline, 8).unwrap_err();
    assert!(matches!(err, AggregateError::Incompatible { .. }));
    assert_eq!(pipeline.references(), 1);
}

#[test]
fn empty_input_never_touches_the_loader() {
    let (pipeline, _) = CountingPipeline::new(vec![("a", 1, vec![1.0])]);
    let options = AggregateOptions::default();
    let err = aggregate_required(1, &[], &pipeline, RunningSum::new(), &options, &NoProgress)
        .unwrap_err();
    assert!(matches!(err, AggregateError::EmptyInput { required: 1 }));
    assert_eq!(pipeline.loads(), 0);

    // the bare dispatcher hands back the empty aggregate instead
    let done = aggregate(&[], &pipeline, RunningSum::new(), &options, &NoProgress).unwrap();
    assert!(done.reference.is_none());
    assert!(done.accumulator.into_inner().is_none());
    assert_eq!(pipeline.loads(), 0);
    assert_eq!(pipeline.references(), 0);
}

#[test]
fn load_failure_stops_dispatch_on_a_single_worker() {
    let files = unit_files(20, 3);
    let (mut pipeline, paths) = pipeline_from(&files);
    pipeline.broken.push(paths[0].clone());
    let err = sum_on(&paths, &pipeline, 1).unwrap_err();
    assert_eq!(err.path(), Some(paths[0].as_path()));
    assert!(matches!(err, AggregateError::Load { .. }));
    assert_eq!(pipeline.loads(), 1);
}

#[test]
fn only_one_error_survives_when_every_file_fails() {
    let files = unit_files(32, 3);
    let (mut pipeline, paths) = pipeline_from(&files);
    pipeline.broken = paths.clone();
    let err = sum_on(&paths, &pipeline, 8).unwrap_err();
    let path = err.path().unwrap().to_path_buf();
    assert!(paths.contains(&path));
}

#[test]
fn progress_sees_every_file_once() {
    let files = unit_files(25, 2);
    let (pipeline, paths) = pipeline_from(&files);
    let seen = Mutex::new(Vec::new());
    let progress = |done: usize, total: usize, path: &Path| {
        assert_eq!(total, 25);
        seen.lock().unwrap().push((done, path.to_path_buf()));
    };
    aggregate(
        &paths,
        &pipeline,
        RunningSum::new(),
        &AggregateOptions::with_threads(4),
        &progress,
    )
    .unwrap();

    let mut seen = seen.into_inner().unwrap();
    seen.sort();
    let counts: Vec<usize> = seen.iter().map(|(d, _)| *d).collect();
    assert_eq!(counts, (1..=25).collect::<Vec<_>>());
    let mut files_seen: Vec<PathBuf> = seen.into_iter().map(|(_, p)| p).collect();
    files_seen.sort();
    let mut expected = paths.clone();
    expected.sort();
    assert_eq!(files_seen, expected);
}
