//! Error types for resource controllers

use crate::identity::{NotFound, ReconcileError};
use crate::remote::ApiError;
use tether_retry::{RETRY_TIMEOUT_MESSAGE, RetryError};
use thiserror::Error;

/// Errors surfaced by a resource controller
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{}", RETRY_TIMEOUT_MESSAGE)]
    Timeout,

    #[error("Internal tag {tag} matches {} objects: {}", refs.len(), refs.join(", "))]
    AmbiguousTag { tag: String, refs: Vec<String> },

    #[error("Invalid attribute: {0}")]
    InvalidAttribute(#[from] ValueError),

    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

impl From<RetryError<ApiError>> for ControllerError {
    fn from(err: RetryError<ApiError>) -> Self {
        match err {
            RetryError::Timeout => ControllerError::Timeout,
            RetryError::Operation(e) => ControllerError::Api(e),
        }
    }
}

impl From<ReconcileError<ControllerError>> for ControllerError {
    fn from(err: ReconcileError<ControllerError>) -> Self {
        match err {
            ReconcileError::Remote(e) => e,
            ReconcileError::AmbiguousTag { tag, refs } => {
                ControllerError::AmbiguousTag { tag, refs }
            }
        }
    }
}

impl NotFound for ControllerError {
    fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::Api(e) if e.is_not_found())
    }
}

/// Attribute value conversion errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValueError {
    #[error("Unsupported number (only integers are allowed): {0}")]
    UnsupportedNumber(String),

    #[error("Value is not known until apply")]
    Unknown,
}

/// State file errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State file error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
