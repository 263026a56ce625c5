use std::path::PathBuf;

/// Structural difference between a sample and the reference it is checked against.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Incompatibility {
    /// Something countable (nodes, edges, vector entries) differs in number.
    #[error("{what} count differs: expected {expected}, found {found}")]
    Size {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// Same sizes, but the shape or the identities differ.
    #[error("topology differs: {0}")]
    Topology(String),
}

#[derive(thiserror::Error, Debug)]
pub enum AggregateError {
    /// One input file could not be read or parsed.
    #[error("failed to load {}: {source:#}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// An input's reference tree differs from the one all other inputs are measured against.
    #[error("input {} has a differing reference tree: {reason}", path.display())]
    Incompatible {
        path: PathBuf,
        #[source]
        reason: Incompatibility,
    },

    #[error("no input files given, need at least {required}")]
    EmptyInput { required: usize },

    /// All workers finished without error but a result is missing.
    #[error("aggregation finished without a result for input #{index}")]
    Incomplete { index: usize },

    #[error("cannot build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl AggregateError {
    /// Input file the error is about, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            AggregateError::Load { path, .. } | AggregateError::Incompatible { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

pub type AggregateResult<T> = Result<T, AggregateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incompatible_names_the_file_and_reason() {
        let err = AggregateError::Incompatible {
            path: PathBuf::from("samples/b.jplace"),
            reason: Incompatibility::Size {
                what: "edge",
                expected: 5,
                found: 7,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("samples/b.jplace"), "{msg}");
        assert!(msg.contains("expected 5, found 7"), "{msg}");
        assert_eq!(err.path(), Some(std::path::Path::new("samples/b.jplace")));
    }

    #[test]
    fn incompatibility_reads_as_a_sentence() {
        let size = Incompatibility::Size {
            what: "node",
            expected: 4,
            found: 3,
        };
        assert_eq!(size.to_string(), "node count differs: expected 4, found 3");
        let topology = Incompatibility::Topology("leaf B moved".into());
        assert_eq!(topology.to_string(), "topology differs: leaf B moved");
        let _: &dyn std::error::Error = &topology;
    }

    #[test]
    fn empty_input_has_no_path() {
        let err = AggregateError::EmptyInput { required: 1 };
        assert!(err.path().is_none());
    }
}
