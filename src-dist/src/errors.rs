use fitpop_env::Interrupted;
use thiserror::Error;

/// Failures of the message-passing substrate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommError {
    #[error("rank {0} disconnected")]
    Disconnected(usize),

    #[error("unknown rank {rank} in a world of {size}")]
    UnknownRank { rank: usize, size: usize },

    #[error("expected {expected} from rank {rank}, received {found}")]
    Unexpected {
        rank: usize,
        expected: &'static str,
        found: String,
    },
}

/// Reasons a worker stops serving candidates
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The evaluator broke its contract; invalid configurations must map to
    /// `+inf`
    #[error("Computed NaN value from parameters: {}", join_numbers(.parameters))]
    NanValue { parameters: Vec<f64> },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error(transparent)]
    Comm(#[from] CommError),
}

pub(crate) fn join_numbers(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
