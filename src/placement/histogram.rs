// src/placement/histogram.rs

use ndarray::Array2;

use super::Sample;

/// Signed placement-distance histogram around one node.
///
/// Negative values are placements reached by moving towards the root, positive
/// ones lie in the node's own subtree. The range is `[-max_d, max_d]` where
/// `max_d` is the node's largest distance to any other node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHistogram {
    pub min: f64,
    pub max: f64,
    pub bins: Vec<f64>,
}

impl NodeHistogram {
    #[inline]
    pub fn bin_width(&self) -> f64 {
        if self.bins.is_empty() {
            0.0
        } else {
            (self.max - self.min) / self.bins.len() as f64
        }
    }

    #[inline]
    fn bin_of(&self, x: f64) -> usize {
        let n = self.bins.len();
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0;
        }
        let pos = ((x - self.min) / span * n as f64).floor();
        (pos.max(0.0) as usize).min(n - 1)
    }

    fn normalize(&mut self) {
        let sum: f64 = self.bins.iter().sum();
        if sum > 0.0 {
            for b in &mut self.bins {
                *b /= sum;
            }
        }
    }
}

/// One histogram per tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHistogramSet {
    pub histograms: Vec<NodeHistogram>,
}

/// Builds the node histograms of one sample.
///
/// `distances` and `sides` are the node distance and root direction matrices
/// of the sample's tree. A `bins` of zero is treated as one bin.
pub fn node_histogram_set(
    sample: &Sample,
    distances: &Array2<f64>,
    sides: &Array2<i8>,
    bins: usize,
) -> NodeHistogramSet {
    let bins = bins.max(1);
    let tree = &sample.tree;
    let node_count = tree.node_count();

    let mut histograms: Vec<NodeHistogram> = (0..node_count)
        .map(|i| {
            let max_d = distances.row(i).iter().copied().fold(0.0f64, f64::max);
            NodeHistogram {
                min: -max_d,
                max: max_d,
                bins: vec![0.0; bins],
            }
        })
        .collect();

    for pq in &sample.pqueries {
        let mult = pq.multiplicity();
        for p in &pq.placements {
            let edge = tree.edge(p.edge);
            let (prim, secd) = (edge.primary, edge.secondary);
            let prox = p.proximal_length;
            let dist = edge.branch_length - prox;
            let mass = p.like_weight_ratio * mult;

            for (i, h) in histograms.iter_mut().enumerate() {
                let d = (prox + distances[(i, prim)]).min(dist + distances[(i, secd)]);
                let sign = if sides[(i, secd)] == 1 { 1.0 } else { -1.0 };
                let b = h.bin_of(sign * d);
                h.bins[b] += mass;
            }
        }
    }

    for h in &mut histograms {
        h.normalize();
    }
    NodeHistogramSet { histograms }
}

/// Mean over nodes of the earth mover's distance between matching histograms.
///
/// Both sets must come from compatible trees and the same bin count.
pub fn node_histogram_distance(a: &NodeHistogramSet, b: &NodeHistogramSet) -> f64 {
    debug_assert_eq!(a.histograms.len(), b.histograms.len());
    let n = a.histograms.len().min(b.histograms.len());
    if n == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for (ha, hb) in a.histograms.iter().zip(&b.histograms) {
        debug_assert_eq!(ha.bins.len(), hb.bins.len());
        let mut carry = 0.0f64;
        let mut emd = 0.0f64;
        for (x, y) in ha.bins.iter().zip(&hb.bins) {
            carry += x - y;
            emd += carry.abs();
        }
        total += emd * ha.bin_width();
    }
    total / n as f64
}
