// src/tree/compat.rs

use crate::error::Incompatibility;

use super::Tree;

/// Checks that `other` has the same shape and edge identities as `reference`.
///
/// Sizes are compared first so the common "wrong tree entirely" case yields a
/// `Size` mismatch; anything else that differs is a `Topology` mismatch.
/// Branch lengths are not compared.
pub fn compatible(reference: &Tree, other: &Tree) -> Result<(), Incompatibility> {
    if reference.node_count() != other.node_count() {
        return Err(Incompatibility::Size {
            what: "node",
            expected: reference.node_count(),
            found: other.node_count(),
        });
    }
    if reference.edge_count() != other.edge_count() {
        return Err(Incompatibility::Size {
            what: "edge",
            expected: reference.edge_count(),
            found: other.edge_count(),
        });
    }

    for (idx, (a, b)) in reference.edges().iter().zip(other.edges()).enumerate() {
        if a.primary != b.primary || a.secondary != b.secondary {
            return Err(Incompatibility::Topology(format!(
                "edge {idx} connects nodes {}-{} instead of {}-{}",
                b.primary, b.secondary, a.primary, a.secondary
            )));
        }
        if a.edge_num != b.edge_num {
            return Err(Incompatibility::Topology(format!(
                "edge {idx} is numbered {{{}}} instead of {{{}}}",
                b.edge_num, a.edge_num
            )));
        }
    }

    for (idx, (a, b)) in reference.nodes().iter().zip(other.nodes()).enumerate() {
        if reference.is_leaf(idx) && a.name != b.name {
            return Err(Incompatibility::Topology(format!(
                "leaf {idx} is named {:?} instead of {:?}",
                b.name, a.name
            )));
        }
    }
    Ok(())
}
