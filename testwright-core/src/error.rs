//! Error types for testwright

use thiserror::Error;

/// Result type alias for testwright operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for testwright operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Git error from libgit2
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Agent execution error
    #[error("Agent error: {0}")]
    Agent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow graph failed validation at build time
    #[error("Invalid workflow graph: {0}")]
    Graph(String),

    /// Source control provider error (clone, branch, pull request)
    #[error("Source control error: {0}")]
    SourceControl(String),

    /// A node failed while the workflow was running
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// The scheduler hit its step ceiling before any terminal output
    #[error("Workflow exceeded max steps ({max_steps}) without completing")]
    MaxStepsExceeded {
        /// Configured ceiling
        max_steps: usize,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Other(format!("Background task failed: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Agent(format!("HTTP request failed: {}", err))
    }
}
