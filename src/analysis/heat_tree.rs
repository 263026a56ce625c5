use log::{info, warn};
use ndarray::Array1;
use std::path::{Path, PathBuf};

use crate::aggregate::{
    AggregateOptions, Pipeline, Progress, RunningSum, aggregate_required, normalize_in_place,
};
use crate::error::{AggregateError, AggregateResult, Incompatibility};
use crate::placement::{MassNorm, Sample, SampleOptions, mass_per_edge, read_sample};
use crate::tree::{Tree, compatible};

/// Per-edge masses; the first sample's tree is the reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeMassPipeline {
    pub sample_options: SampleOptions,
}

impl Pipeline for EdgeMassPipeline {
    type Sample = Sample;
    type Reference = Tree;
    type Output = Array1<f64>;

    fn load(&self, path: &Path) -> anyhow::Result<Sample> {
        read_sample(path, &self.sample_options)
    }

    fn reference(&self, sample: &Sample) -> Tree {
        sample.tree.clone()
    }

    fn check_compatible(&self, sample: &Sample, reference: &Tree) -> Result<(), Incompatibility> {
        compatible(reference, &sample.tree)
    }

    fn transform(&self, sample: &Sample, _reference: &Tree) -> Array1<f64> {
        mass_per_edge(sample)
    }
}

#[derive(Debug, Clone)]
pub struct EdgeMasses {
    pub tree: Tree,
    /// Indexed like `tree.edges()`.
    pub masses: Array1<f64>,
}

/// Sums the per-edge masses of all samples.
///
/// With relative mass normalization the total is rescaled to sum 1 once more.
pub fn edge_masses(
    paths: &[PathBuf],
    pipeline: &EdgeMassPipeline,
    options: &AggregateOptions,
    progress: &dyn Progress,
) -> AggregateResult<EdgeMasses> {
    info!("[heat-tree] accumulating edge masses");
    let done = aggregate_required(1, paths, pipeline, RunningSum::new(), options, progress)?;
    let tree = done.reference.ok_or(AggregateError::Incomplete { index: 0 })?;
    let mut masses = done
        .accumulator
        .into_inner()
        .ok_or(AggregateError::Incomplete { index: 0 })?;

    if pipeline.sample_options.mass_norm == MassNorm::Relative {
        let sum = normalize_in_place(&mut masses);
        if sum == 0.0 {
            warn!("[heat-tree] total placement mass is zero, nothing to normalize");
        }
    }
    Ok(EdgeMasses { tree, masses })
}
