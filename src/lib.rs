pub mod aggregate;
pub mod analysis;
pub mod error;
pub mod output;
pub mod placement;
pub mod runtime;
pub mod tree;

pub use error::*;
