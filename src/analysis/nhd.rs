use log::info;
use ndarray::Array2;
use std::path::{Path, PathBuf};

use crate::aggregate::{
    AggregateOptions, IndexedSlots, Pipeline, Progress, aggregate_required, pairwise_matrix,
    run_in_pool,
};
use crate::error::{AggregateError, AggregateResult, Incompatibility};
use crate::placement::{
    NodeHistogramSet, Sample, SampleOptions, node_histogram_distance, node_histogram_set,
    read_sample,
};
use crate::tree::{Tree, compatible, node_distance_matrix, node_root_direction_matrix};

/// Shared state for node histograms: the first sample's tree and its node matrices.
#[derive(Debug, Clone)]
pub struct NhdReference {
    pub tree: Tree,
    pub distances: Array2<f64>,
    pub sides: Array2<i8>,
}

impl NhdReference {
    pub fn from_tree(tree: &Tree) -> Self {
        NhdReference {
            tree: tree.clone(),
            distances: node_distance_matrix(tree),
            sides: node_root_direction_matrix(tree),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NhdPipeline {
    pub sample_options: SampleOptions,
    pub bins: usize,
}

impl Default for NhdPipeline {
    fn default() -> Self {
        NhdPipeline {
            sample_options: SampleOptions::default(),
            bins: 25,
        }
    }
}

impl Pipeline for NhdPipeline {
    type Sample = Sample;
    type Reference = NhdReference;
    type Output = NodeHistogramSet;

    fn load(&self, path: &Path) -> anyhow::Result<Sample> {
        read_sample(path, &self.sample_options)
    }

    fn reference(&self, sample: &Sample) -> NhdReference {
        NhdReference::from_tree(&sample.tree)
    }

    fn check_compatible(
        &self,
        sample: &Sample,
        reference: &NhdReference,
    ) -> Result<(), Incompatibility> {
        compatible(&reference.tree, &sample.tree)
    }

    fn transform(&self, sample: &Sample, reference: &NhdReference) -> NodeHistogramSet {
        node_histogram_set(sample, &reference.distances, &reference.sides, self.bins)
    }
}

/// Pairwise node histogram distance matrix, rows and columns in input order.
pub fn nhd_matrix(
    paths: &[PathBuf],
    pipeline: &NhdPipeline,
    options: &AggregateOptions,
    progress: &dyn Progress,
) -> AggregateResult<Array2<f64>> {
    info!("[nhd] reading samples and preparing node histograms");
    let slots = IndexedSlots::new(paths.len());
    let done = aggregate_required(1, paths, pipeline, slots, options, progress)?;
    let sets = done
        .accumulator
        .into_vec()
        .map_err(|index| AggregateError::Incomplete { index })?;

    let n = sets.len();
    info!("[nhd] calculating {} pairwise distances", n * n.saturating_sub(1) / 2);
    run_in_pool(options, || pairwise_matrix(&sets, node_histogram_distance))
}
