//! Error types for source-control gateways

use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to GitHub or Azure DevOps
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Missing configuration or environment variable
    #[error("Missing setting: {0}")]
    MissingEnv(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<std::env::VarError> for Error {
    fn from(err: std::env::VarError) -> Self {
        Error::MissingEnv(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<Error> for testwright_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::MissingEnv(msg) => testwright_core::Error::Config(msg),
            other => testwright_core::Error::SourceControl(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_core() {
        let core: testwright_core::Error = Error::Auth("bad token".to_string()).into();
        assert!(matches!(core, testwright_core::Error::SourceControl(_)));
        assert!(core.to_string().contains("bad token"));

        let core: testwright_core::Error = Error::MissingEnv("scm.repo".to_string()).into();
        assert!(matches!(core, testwright_core::Error::Config(_)));
    }
}
