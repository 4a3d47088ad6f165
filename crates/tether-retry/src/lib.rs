//! tether retry driver
//!
//! Every remote call a resource controller makes goes through a
//! [`RetryExecutor`]: the call is repeated with exponential backoff
//! (1s, 2s, 4s, ... capped at 30s) until it succeeds, fails with an error the
//! caller's classifier rejects, or the deadline passes.
//!
//! ```text
//!  caller ctx ──► derived ctx (retry timeout, default 60s)
//!                     │
//!        ┌────────────▼────────────┐
//!        │ attempt ─► Ok  ─► return│
//!        │    │                    │
//!        │    ▼ Err                │
//!        │ ctx done? ─► Timeout    │
//!        │ retryable? ─no► Err(e)  │
//!        │ sleep(backoff) ─► loop  │
//!        └─────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_config::ProviderSettings;
//! use tether_retry::{CallContext, RetryExecutor, is_network_error};
//!
//! let executor = RetryExecutor::new(Arc::new(ProviderSettings::load()?));
//! let zone = executor
//!     .execute(&CallContext::background(), Some(&is_network_error::<ApiError>), |ctx| {
//!         client.get_zone(ctx, "zone-1")
//!     })
//!     .await?;
//! ```

pub mod backoff;
pub mod classify;
pub mod context;
pub mod error;
pub mod executor;

pub use backoff::BackoffPolicy;
pub use classify::{TemporaryError, is_network_error, is_temporary_network_error, never_retry};
pub use context::{CallContext, CancelHandle, DoneReason};
pub use error::{RETRY_TIMEOUT_MESSAGE, RetryError};
pub use executor::{Classifier, RetryExecutor};
