//! Retry error types

use thiserror::Error;

/// Message carried by every deadline or cancellation failure
pub const RETRY_TIMEOUT_MESSAGE: &str = "retry timeout or cancellation";

/// Outcome of a failed retried call
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// The executor's deadline passed or the caller cancelled.
    /// Both cases look the same to the caller.
    #[error("{}", RETRY_TIMEOUT_MESSAGE)]
    Timeout,

    /// The operation failed with an error the classifier did not retry
    #[error(transparent)]
    Operation(E),
}

impl<E> RetryError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::Timeout)
    }

    /// The operation's own error, if that is what stopped the loop
    pub fn operation(&self) -> Option<&E> {
        match self {
            RetryError::Operation(e) => Some(e),
            RetryError::Timeout => None,
        }
    }

    pub fn into_operation(self) -> Option<E> {
        match self {
            RetryError::Operation(e) => Some(e),
            RetryError::Timeout => None,
        }
    }

    pub fn map_operation<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Operation(e) => RetryError::Operation(f(e)),
            RetryError::Timeout => RetryError::Timeout,
        }
    }
}

pub type Result<T, E> = std::result::Result<T, RetryError<E>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_error_is_not_wrapped() {
        let err: RetryError<std::io::Error> =
            RetryError::Operation(std::io::Error::other("conflict: name taken"));
        assert_eq!(err.to_string(), "conflict: name taken");
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_message() {
        let err: RetryError<std::io::Error> = RetryError::Timeout;
        assert_eq!(err.to_string(), RETRY_TIMEOUT_MESSAGE);
        assert!(err.operation().is_none());
    }
}
