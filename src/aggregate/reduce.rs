use itertools::Itertools;
use ndarray::{Array1, Array2};
use rayon::prelude::*;

/// Symmetric `n x n` matrix of `distance` over all pairs, zero diagonal.
///
/// Each unordered pair is evaluated once; the pair evaluations run on the
/// current rayon pool.
pub fn pairwise_matrix<T, F>(items: &[T], distance: F) -> Array2<f64>
where
    T: Sync,
    F: Fn(&T, &T) -> f64 + Sync,
{
    let n = items.len();
    let pairs: Vec<(usize, usize)> = (0..n).tuple_combinations().collect();
    let values: Vec<f64> = pairs
        .par_iter()
        .map(|&(i, j)| distance(&items[i], &items[j]))
        .collect();

    let mut matrix = Array2::<f64>::zeros((n, n));
    for (&(i, j), v) in pairs.iter().zip(values) {
        matrix[(i, j)] = v;
        matrix[(j, i)] = v;
    }
    matrix
}

/// Scales `values` to sum 1. Returns the sum before scaling; a zero or
/// non-finite sum leaves the values untouched.
pub fn normalize_in_place(values: &mut Array1<f64>) -> f64 {
    let sum = values.sum();
    if sum != 0.0 && sum.is_finite() {
        values.mapv_inplace(|x| x / sum);
    }
    sum
}
