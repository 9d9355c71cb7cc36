//! Error types for the contract harness
//!
//! Errors raised here stay inside the harness: a scenario converts them
//! into a result at its own boundary, so only suite and config problems
//! ever abort a run.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Suite Errors ===
    #[error("Invalid test suite '{path}': {reason}")]
    SuiteParse { path: String, reason: String },

    #[error("Fixture '{path}' unavailable: {reason}")]
    Fixture { path: String, reason: String },

    // === Transport Errors ===
    #[error("Request {method} {url} timed out after {secs} seconds")]
    TransportTimeout {
        method: String,
        url: String,
        secs: u64,
    },

    #[error("Request {method} {url} could not connect: {reason}")]
    ConnectFailed {
        method: String,
        url: String,
        reason: String,
    },

    #[error("Request {method} {url} failed: {reason}")]
    Transport {
        method: String,
        url: String,
        reason: String,
    },

    // === Scenario Errors ===
    #[error("Authentication failed with status {status}: {body}")]
    AuthFailure { status: u16, body: String },

    #[error("Precondition missing: {0}")]
    PreconditionMissing(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a fixture error for a photo or other input file
    pub fn fixture<P: AsRef<std::path::Path>>(path: P, reason: impl ToString) -> Self {
        Self::Fixture {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a suite parse error
    pub fn suite<P: AsRef<std::path::Path>>(path: P, reason: impl ToString) -> Self {
        Self::SuiteParse {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a transport error from a failed reqwest call
    pub fn transport(method: &str, url: &str, err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::TransportTimeout {
                method: method.to_string(),
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else if err.is_connect() {
            Self::ConnectFailed {
                method: method.to_string(),
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::Transport {
                method: method.to_string(),
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::TransportTimeout { .. } | Error::ConnectFailed { .. } | Error::Transport { .. }
        )
    }

    /// Whether a request with this method may be sent again after the error
    ///
    /// A POST that timed out may have been applied, so it is only re-sent
    /// when the connection was never made.
    pub fn is_retryable(&self, method: &str) -> bool {
        match self {
            Error::ConnectFailed { .. } => true,
            Error::TransportTimeout { .. } | Error::Transport { .. } => method != "POST",
            _ => false,
        }
    }

    /// Failure cause this error is reported under
    pub fn cause(&self) -> FailureCause {
        match self {
            Error::TransportTimeout { .. } => FailureCause::TransportTimeout,
            Error::ConnectFailed { .. } | Error::Transport { .. } => FailureCause::TransportError,
            Error::AuthFailure { .. } => FailureCause::AuthFailure,
            Error::PreconditionMissing(_) => FailureCause::PreconditionMissing,
            Error::Assertion(_) => FailureCause::AssertionFailed,
            Error::Fixture { .. } | Error::FileRead { .. } | Error::Io(_) => {
                FailureCause::FixtureError
            }
            Error::Config(_)
            | Error::ConfigParse(_)
            | Error::SuiteParse { .. }
            | Error::Json(_) => FailureCause::HarnessError,
        }
    }
}

/// Classification attached to a scenario result
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCause {
    /// Credentials rejected by the service
    AuthFailure,
    /// Service rejected malformed input
    ValidationRejected,
    /// Service accepted malformed input
    BugDetected,
    AssertionFailed,
    TransportTimeout,
    TransportError,
    /// A dependent step had nothing to work on
    PreconditionMissing,
    FixtureError,
    HarnessError,
}

impl FailureCause {
    /// Stable code used in reports
    pub fn code(self) -> &'static str {
        match self {
            FailureCause::AuthFailure => "AUTH_FAILURE",
            FailureCause::ValidationRejected => "VALIDATION_REJECTED",
            FailureCause::BugDetected => "BUG_DETECTED",
            FailureCause::AssertionFailed => "ASSERTION_FAILED",
            FailureCause::TransportTimeout => "TRANSPORT_TIMEOUT",
            FailureCause::TransportError => "TRANSPORT_ERROR",
            FailureCause::PreconditionMissing => "PRECONDITION_MISSING",
            FailureCause::FixtureError => "FIXTURE_ERROR",
            FailureCause::HarnessError => "HARNESS_ERROR",
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
