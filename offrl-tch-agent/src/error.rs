//! Errors in the library.
use thiserror::Error;

/// Errors raised by agents and their components.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The diversity penalty compares members of an ensemble pairwise.
    #[error("Diversity penalty requires at least 2 critics, but ensemble size is {0}")]
    EnsembleTooSmall(i64),

    /// Elements of a batch do not share the leading dimension.
    #[error("Inconsistent batch shape: {0}")]
    BatchShape(String),

    /// A variable of a network does not exist in its target network.
    #[error("Variable {0} was not found in the target network")]
    VariableNotFound(String),

    /// A dataset with no transitions.
    #[error("Dataset is empty")]
    EmptyDataset,
}
