//! Error taxonomy shared by the store, collection pipeline and router.
//!
//! Mirrors spec section 7: callers need to distinguish not-found from
//! transport/backend failures, and timeouts from generic upstream errors,
//! so schedulers and REST handlers can react appropriately.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VireError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream rate limited: {0}")]
    UpstreamRateLimited(String),

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type VireResult<T> = Result<T, VireError>;

impl VireError {
    /// Distinguished error code used on job records for timed-out executions,
    /// per the Job Manager's timeout contract (spec section 4.4).
    pub const JOB_TIMEOUT_CODE: &'static str = "job_timeout";

    pub fn is_not_found(&self) -> bool {
        matches!(self, VireError::NotFound(_))
    }
}

impl From<sqlx::Error> for VireError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => VireError::NotFound("row not found".to_string()),
            other => VireError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for VireError {
    fn from(err: serde_json::Error) -> Self {
        VireError::Internal(format!("json: {err}"))
    }
}

impl From<reqwest::Error> for VireError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VireError::UpstreamTimeout(err.to_string())
        } else if err.status().map(|s| s.as_u16()) == Some(429) {
            VireError::UpstreamRateLimited(err.to_string())
        } else {
            VireError::UpstreamUnavailable(err.to_string())
        }
    }
}
