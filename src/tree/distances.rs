// src/tree/distances.rs

use ndarray::Array2;

use super::Tree;

/// Path length between every pair of nodes.
///
/// Built row by row in preorder: for an edge `p -> c` of length `l`, node `c`
/// is `l` closer than `p` to everything in its own subtree and `l` further
/// from everything else.
pub fn node_distance_matrix(tree: &Tree) -> Array2<f64> {
    let n = tree.node_count();
    let mut d = Array2::<f64>::zeros((n, n));
    if n == 0 {
        return d;
    }

    for e in tree.edges() {
        d[(0, e.secondary)] = d[(0, e.primary)] + e.branch_length;
    }

    for e in tree.edges() {
        let (p, c, l) = (e.primary, e.secondary, e.branch_length);
        let lo = c;
        let hi = c + tree.subtree_size(c);
        for j in 0..n {
            let base = d[(p, j)];
            d[(c, j)] = if j >= lo && j < hi { base - l } else { base + l };
        }
        d[(c, c)] = 0.0;
    }
    d
}

/// Entry `(i, j)` is `1` if `j` lies below `i`, `-1` if reaching `j` from `i`
/// starts towards the root, `0` on the diagonal.
pub fn node_root_direction_matrix(tree: &Tree) -> Array2<i8> {
    let n = tree.node_count();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            0
        } else if tree.in_subtree(i, j) {
            1
        } else {
            -1
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::parse_newick;

    // R -> X (1) -> A (2), X -> B (3), R -> C (4)
    const T: &str = "((A:2,B:3)X:1,C:4)R;";

    #[test]
    fn distances_match_hand_computed_paths() {
        let t = parse_newick(T).unwrap();
        let d = node_distance_matrix(&t);
        // preorder: R=0, X=1, A=2, B=3, C=4
        let expect = [
            [0.0, 1.0, 3.0, 4.0, 4.0],
            [1.0, 0.0, 2.0, 3.0, 5.0],
            [3.0, 2.0, 0.0, 5.0, 7.0],
            [4.0, 3.0, 5.0, 0.0, 8.0],
            [4.0, 5.0, 7.0, 8.0, 0.0],
        ];
        for i in 0..5 {
            for j in 0..5 {
                assert!(
                    (d[(i, j)] - expect[i][j]).abs() < 1e-12,
                    "d[{i},{j}] = {}",
                    d[(i, j)]
                );
            }
        }
    }

    #[test]
    fn root_direction_signs() {
        let t = parse_newick(T).unwrap();
        let s = node_root_direction_matrix(&t);
        assert_eq!(s[(0, 0)], 0);
        assert_eq!(s[(0, 3)], 1);
        assert_eq!(s[(1, 2)], 1);
        assert_eq!(s[(1, 0)], -1);
        assert_eq!(s[(1, 4)], -1);
        assert_eq!(s[(2, 3)], -1);
    }
}
