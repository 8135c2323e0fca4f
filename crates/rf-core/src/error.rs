//! # AppError
//!
//! Centralized error handling for the Rusty-Forum ecosystem.
//! Every variant is a caller-input error except `Internal`; none are retried.

use thiserror::Error;

/// The primary error type for all rf-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Vote value outside {-1, +1}
    #[error("invalid vote value {0}: expected -1 or 1")]
    InvalidValue(i64),

    /// Vote payload names no post and no comment
    #[error("vote has no target")]
    MissingTarget,

    /// Vote payload names more than one target
    #[error("vote must target exactly one post or comment")]
    AmbiguousTarget,

    /// A second vote for the same (voter, target) on the creation path
    #[error("duplicate vote: {0}")]
    DuplicateVote(String),

    /// Principal lacks the capability for this object
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (e.g., Subreddit, Post, Comment, Vote)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Community name (or username) already taken
    #[error("conflict: {0}")]
    NameConflict(String),

    /// Malformed payload (e.g., empty title, link on a text post)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Missing, expired or invalid credentials; deactivated account
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Infrastructure failure (e.g., DB down)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidValue(_) => "invalid_value",
            AppError::MissingTarget => "missing_target",
            AppError::AmbiguousTarget => "ambiguous_target",
            AppError::DuplicateVote(_) => "duplicate_vote",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(..) => "not_found",
            AppError::NameConflict(_) => "name_conflict",
            AppError::ValidationError(_) => "validation_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn not_found(what: &str, id: impl ToString) -> Self {
        AppError::NotFound(what.to_string(), id.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for Rusty-Forum logic.
pub type Result<T> = std::result::Result<T, AppError>;
