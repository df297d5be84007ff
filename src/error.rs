use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No work slot is available right now")]
    NoWorkAvailable,

    #[error("No proxy is available right now")]
    NoProxyAvailable,

    #[error("Unknown allocation key: {0}")]
    InvalidAllocationKey(String),

    #[error("Result for allocation {0} was already submitted or the lease ended")]
    DuplicateSubmission(String),

    #[error("Allocation {0} is not found or no longer active")]
    AllocationNotActive(String),

    #[error("Allocation {0} does not exist")]
    AllocationNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Stable wire code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NoWorkAvailable => "NO_WORK_AVAILABLE",
            AppError::NoProxyAvailable => "NO_PROXY_AVAILABLE",
            AppError::InvalidAllocationKey(_) => "INVALID_ALLOCATION_KEY",
            AppError::DuplicateSubmission(_) => "DUPLICATE_SUBMISSION",
            AppError::AllocationNotActive(_) => "ALLOCATION_NOT_ACTIVE",
            AppError::AllocationNotFound(_) => "ALLOCATION_NOT_FOUND",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Database(_) => "STORE_ERROR",
            AppError::Network(_) => "NETWORK_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) | AppError::Serialization(_) | AppError::Unknown(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Expected under load; callers should back off and retry.
    pub fn is_contention(&self) -> bool {
        matches!(self, AppError::NoWorkAvailable | AppError::NoProxyAvailable)
    }

    pub(crate) fn from_join(err: tokio::task::JoinError) -> Self {
        AppError::Unknown(format!("blocking task failed: {}", err))
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_errors_are_flagged() {
        assert!(AppError::NoWorkAvailable.is_contention());
        assert!(AppError::NoProxyAvailable.is_contention());
        assert!(!AppError::DuplicateSubmission("WA-1".into()).is_contention());
    }

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(AppError::NoWorkAvailable.code(), "NO_WORK_AVAILABLE");
        assert_eq!(AppError::NoProxyAvailable.code(), "NO_PROXY_AVAILABLE");
        assert_eq!(
            AppError::InvalidAllocationKey("x".into()).code(),
            "INVALID_ALLOCATION_KEY"
        );
        assert_eq!(
            AppError::DuplicateSubmission("x".into()).code(),
            "DUPLICATE_SUBMISSION"
        );
        assert_eq!(
            AppError::AllocationNotFound("x".into()).code(),
            "ALLOCATION_NOT_FOUND"
        );
    }
}
