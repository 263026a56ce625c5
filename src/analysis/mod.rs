pub mod heat_tree;
pub mod nhd;

pub use heat_tree::{EdgeMassPipeline, EdgeMasses, edge_masses};
pub use nhd::{NhdPipeline, NhdReference, nhd_matrix};
