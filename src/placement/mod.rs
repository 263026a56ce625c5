// src/placement/mod.rs

use ndarray::Array1;

use crate::tree::Tree;

pub mod histogram;
pub mod jplace;

pub use histogram::{NodeHistogram, NodeHistogramSet, node_histogram_distance, node_histogram_set};
pub use jplace::{read_jplace, read_sample};

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Index into `Tree::edges`, already resolved from the file's `edge_num`.
    pub edge: usize,
    pub like_weight_ratio: f64,
    /// Distance from the root-side node of the edge.
    pub proximal_length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PqueryName {
    pub name: String,
    pub multiplicity: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pquery {
    pub placements: Vec<Placement>,
    pub names: Vec<PqueryName>,
}

impl Pquery {
    /// Sum of name multiplicities; a nameless pquery counts once.
    pub fn multiplicity(&self) -> f64 {
        if self.names.is_empty() {
            1.0
        } else {
            self.names.iter().map(|n| n.multiplicity).sum()
        }
    }
}

/// One loaded placement file.
#[derive(Debug, Clone)]
pub struct Sample {
    pub tree: Tree,
    pub pqueries: Vec<Pquery>,
}

impl Sample {
    pub fn total_mass(&self) -> f64 {
        self.pqueries
            .iter()
            .map(|pq| {
                let lwr: f64 = pq.placements.iter().map(|p| p.like_weight_ratio).sum();
                lwr * pq.multiplicity()
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MassNorm {
    #[default]
    Absolute,
    /// Scale every sample to a total mass of 1.
    Relative,
}

/// Per-sample adjustments applied right after reading a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleOptions {
    pub point_mass: bool,
    pub ignore_multiplicities: bool,
    pub mass_norm: MassNorm,
}

impl SampleOptions {
    pub fn apply(&self, sample: &mut Sample) {
        if self.point_mass {
            for pq in &mut sample.pqueries {
                let best = pq
                    .placements
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.like_weight_ratio.total_cmp(&b.1.like_weight_ratio))
                    .map(|(i, _)| i);
                if let Some(best) = best {
                    let mut keep = pq.placements.swap_remove(best);
                    keep.like_weight_ratio = 1.0;
                    pq.placements.clear();
                    pq.placements.push(keep);
                }
            }
        }
        if self.ignore_multiplicities {
            for pq in &mut sample.pqueries {
                for n in &mut pq.names {
                    n.multiplicity = 1.0;
                }
            }
        }
        if self.mass_norm == MassNorm::Relative {
            let total = sample.total_mass();
            if total > 0.0 {
                for pq in &mut sample.pqueries {
                    for p in &mut pq.placements {
                        p.like_weight_ratio /= total;
                    }
                }
            }
        }
    }
}

/// Placement mass on each edge, `lwr * multiplicity` summed per edge.
pub fn mass_per_edge(sample: &Sample) -> Array1<f64> {
    let mut masses = Array1::<f64>::zeros(sample.tree.edge_count());
    for pq in &sample.pqueries {
        let mult = pq.multiplicity();
        for p in &pq.placements {
            masses[p.edge] += p.like_weight_ratio * mult;
        }
    }
    masses
}
