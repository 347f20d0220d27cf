//! Error types for the access-control engine

use thiserror::Error;

/// Result type alias for the access-control engine
pub type Result<T> = std::result::Result<T, Error>;

/// Access-control engine errors
///
/// Construction-time errors (`Config`) are raised before any request is
/// evaluated; a rule that fails to build is never installed. Evaluation-time
/// lookup failures (`AuthenticationService`, `GroupsProvider`) are converted
/// to a NO_MATCH at exactly one point in the rule chain — they never reach
/// the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (malformed pattern, missing required attribute)
    #[error("Configuration error: {0}")]
    Config(String),

    /// External authentication service lookup failed
    #[error("Authentication service error: {0}")]
    AuthenticationService(String),

    /// Groups provider lookup failed
    #[error("Groups provider error: {0}")]
    GroupsProvider(String),

    /// The request origin address cannot be determined.
    ///
    /// This is an environment failure, not a denial: no host-based decision
    /// can be evaluated safely without an origin, so it is unrecoverable.
    #[error("Request origin address cannot be determined")]
    OriginUnresolvable,

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
