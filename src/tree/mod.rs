// src/tree/mod.rs

use ahash::AHashMap;
use smallvec::SmallVec;

pub mod compat;
pub mod distances;
pub mod newick;

pub use compat::compatible;
pub use distances::{node_distance_matrix, node_root_direction_matrix};
pub use newick::parse_newick;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    /// Edge towards the root; `None` only for the root.
    pub parent_edge: Option<usize>,
    pub child_edges: SmallVec<[usize; 4]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Root-side end.
    pub primary: usize,
    /// Away-from-root end.
    pub secondary: usize,
    pub branch_length: f64,
    pub edge_num: i64,
}

/// Rooted tree with nodes stored in preorder (root = node 0).
///
/// Edge `e` always leads to node `e + 1`, so the subtree of a node `i` is the
/// contiguous node range `i..i + subtree_size(i)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    subtree_sizes: Vec<usize>,
    edge_nums: AHashMap<i64, usize>,
}

impl Tree {
    pub(crate) fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut subtree_sizes = vec![1usize; nodes.len()];
        for e in edges.iter().rev() {
            subtree_sizes[e.primary] += subtree_sizes[e.secondary];
        }
        let edge_nums = edges
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.edge_num, idx))
            .collect();
        Tree {
            nodes,
            edges,
            subtree_sizes,
            edge_nums,
        }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[inline]
    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    #[inline]
    pub fn edge(&self, idx: usize) -> &Edge {
        &self.edges[idx]
    }

    #[inline]
    pub fn is_leaf(&self, node: usize) -> bool {
        self.nodes[node].child_edges.is_empty()
    }

    #[inline]
    pub fn subtree_size(&self, node: usize) -> usize {
        self.subtree_sizes[node]
    }

    /// True iff `other` lies strictly below `node`.
    #[inline]
    pub fn in_subtree(&self, node: usize, other: usize) -> bool {
        other > node && other < node + self.subtree_sizes[node]
    }

    pub fn edge_index_of(&self, edge_num: i64) -> Option<usize> {
        self.edge_nums.get(&edge_num).copied()
    }
}
