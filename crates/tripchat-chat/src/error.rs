use thiserror::Error;

use tripchat_db::StoreError;

use crate::trips::TripAccessError;

/// Caller-visible failure classes. Each maps to one transport status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Whether repeating the same call may succeed without any other change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            StoreError::Unavailable(msg) => Self::Unavailable(msg),
            StoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<TripAccessError> for ChatError {
    fn from(err: TripAccessError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::not_found(StoreError::NotFound("g".into()), ChatError::NotFound("g".into()))]
    #[case::conflict(StoreError::Conflict("c".into()), ChatError::Conflict("c".into()))]
    #[case::busy(StoreError::Unavailable("busy".into()), ChatError::Unavailable("busy".into()))]
    #[case::invalid(StoreError::InvalidArgument("x".into()), ChatError::InvalidArgument("x".into()))]
    #[case::internal(StoreError::Internal("io".into()), ChatError::Internal("io".into()))]
    fn store_errors_map_one_to_one(#[case] from: StoreError, #[case] expected: ChatError) {
        assert_eq!(ChatError::from(from), expected);
    }

    #[test]
    fn trip_service_outage_is_retryable() {
        let err = ChatError::from(TripAccessError::Unavailable("connection refused".into()));
        assert!(err.is_retryable());
        assert!(!ChatError::forbidden("no").is_retryable());
    }
}
