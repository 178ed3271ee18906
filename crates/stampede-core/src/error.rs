//! Error types for harness setup and configuration.
//!
//! Only setup-phase failures surface as errors: a run that has started never
//! aborts on a bad response. Per-request failures are classified outcomes
//! (see [`crate::classify::Outcome`]), and a failed threshold is a report
//! plus exit status, not an error.

use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, StampedeError>;

/// Errors that abort a run before any request is dispatched
#[derive(Error, Debug)]
pub enum StampedeError {
    // === Configuration ===
    /// Required environment fields could not be resolved
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Scenario failed validation
    #[error("invalid scenario '{name}': {reason}")]
    InvalidScenario { name: String, reason: String },

    /// No preset with the requested name
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// Override file could not be read
    #[error("failed to read env file {path}")]
    EnvFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Override file is not the expected JSON shape
    #[error("failed to parse env file {path}")]
    EnvFileFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// HTTP client could not be constructed
    #[error("failed to build http client")]
    ClientBuild(#[source] reqwest::Error),

    // === Authentication ===
    /// Login call never completed
    #[error("login request failed")]
    AuthRequest(#[source] reqwest::Error),

    /// Login completed with a non-success status
    #[error("login rejected with status {status}")]
    AuthRejected { status: u16 },

    /// Login succeeded but the token envelope was not recognisable
    #[error("unexpected login response shape: {0}")]
    AuthResponseShape(String),
}

impl StampedeError {
    /// True for failures of the authentication setup call
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::AuthRequest(_) | Self::AuthRejected { .. } | Self::AuthResponseShape(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StampedeError::MissingConfig("base_url, email".to_string());
        assert!(format!("{}", err).contains("base_url, email"));

        let err = StampedeError::AuthRejected { status: 401 };
        assert!(format!("{}", err).contains("401"));
    }

    #[test]
    fn test_auth_classification() {
        assert!(StampedeError::AuthRejected { status: 500 }.is_auth());
        assert!(StampedeError::AuthResponseShape("no data".into()).is_auth());
        assert!(!StampedeError::MissingConfig("email".into()).is_auth());
        assert!(!StampedeError::UnknownScenario("nope".into()).is_auth());
    }
}
