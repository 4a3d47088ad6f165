//! Remote API abstraction
//!
//! Each remote object type implements [`RemoteApi`] on top of its transport.
//! The controller only ever talks to this trait.

use crate::identity::NotFound;
use crate::metadata::{Metadata, internal_tag};
use crate::value::Attributes;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_retry::{CallContext, TemporaryError, is_network_error};
use thiserror::Error;

/// Server-side view of a managed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Server-assigned handle; may change across renames or be reused
    pub primary_ref: String,

    /// Tags, including ones the server added
    #[serde(default)]
    pub metadata: Metadata,

    /// Business attributes
    #[serde(default)]
    pub fields: Attributes,
}

impl RemoteObject {
    pub fn new(primary_ref: impl Into<String>) -> Self {
        Self {
            primary_ref: primary_ref.into(),
            metadata: Metadata::new(),
            fields: Attributes::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: crate::value::AttrValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn internal_tag(&self) -> Option<&str> {
        internal_tag(&self.metadata)
    }
}

/// Error returned by a remote API call
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::status(404, what)
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(_) => None,
        }
    }
}

impl NotFound for ApiError {
    fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

impl TemporaryError for ApiError {
    fn is_temporary(&self) -> bool {
        matches!(self.status_code(), Some(429 | 502 | 503 | 504))
    }
}

/// CRUD and tag search for one remote object type
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Resource type name (e.g. "dns_zone")
    fn resource_type(&self) -> &str;

    async fn create(
        &self,
        ctx: &CallContext,
        metadata: &Metadata,
        fields: &Attributes,
    ) -> Result<RemoteObject, ApiError>;

    /// Read by primary reference; a missing object is a 404 `ApiError`
    async fn read(&self, ctx: &CallContext, primary_ref: &str) -> Result<RemoteObject, ApiError>;

    /// All objects whose metadata has `key` set to `value`
    async fn search_by_tag(
        &self,
        ctx: &CallContext,
        key: &str,
        value: &str,
    ) -> Result<Vec<RemoteObject>, ApiError>;

    async fn update(
        &self,
        ctx: &CallContext,
        primary_ref: &str,
        metadata: &Metadata,
        fields: &Attributes,
    ) -> Result<RemoteObject, ApiError>;

    async fn delete(&self, ctx: &CallContext, primary_ref: &str) -> Result<(), ApiError>;

    /// Which failures are worth retrying. Defaults to transport failures and
    /// throttling/gateway statuses.
    fn is_retryable(&self, err: &ApiError) -> bool {
        err.is_temporary() || is_network_error(err)
    }
}
