use thiserror::Error;

use crate::diagnostic::DiagnosticError;

/// Canonical result for the compiler crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by graph, analyzer, optimizer, and orchestration.
///
/// - `Structural`: malformed graphs (dangling edges, cyclic flow nesting,
///   duplicate property names). Always fatal to the current compile unit.
/// - `InvalidArgument` / `InconsistentState` / `NotFound`: declarative
///   metadata that cannot be resolved for one operator.
/// - `Diagnostic`: wrapped backend failures, already attributed to a
///   batch/jobflow/stage.
#[derive(Debug, Error)]
pub enum Error {
    #[error("structural error: {0}")]
    Structural(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("hashing error: {0}")]
    Hash(String),

    #[error(transparent)]
    Diagnostic(#[from] DiagnosticError),
}

impl Error {
    /// Returns true for errors that describe a malformed graph.
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Structural(_))
    }
}

// serialization only fails while hashing plans
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
