//! tether: resource identity for declarative infrastructure providers
//!
//! Remote objects are addressed by a server-assigned primary reference that
//! can change (renames, migrations) or be reused after deletion. This crate
//! keeps a managed object's identity stable across such changes and keeps
//! server-added metadata out of the user's view.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              Resource controller                 │
//! │     create / read / update / delete / plan       │
//! └───────┬─────────────────────────┬───────────────┘
//!         │                         │
//! ┌───────▼────────┐       ┌────────▼─────────────┐
//! │ RetryExecutor  │       │ IdentityReconciler   │
//! │ (tether-retry) │       │ internal tag, split  │
//! └───────┬────────┘       └────────┬─────────────┘
//!         │                         │
//! ┌───────▼─────────────────────────▼───────────────┐
//! │          trait RemoteApi (per object type)       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_config::ProviderSettings;
//! use tether_core::{DesiredResource, ResourceController, StateStore};
//! use tether_retry::CallContext;
//!
//! let settings = Arc::new(ProviderSettings::load()?);
//! let controller = ResourceController::new(Arc::new(ZoneApi::new(client)), settings);
//! let store = StateStore::new(".");
//! let ctx = CallContext::background();
//!
//! if let Some(state) = store.get("dns_zone.main").await? {
//!     match controller.read(&ctx, &state).await? {
//!         Some(refreshed) => store.put("dns_zone.main", refreshed).await?,
//!         None => { store.remove("dns_zone.main").await?; }
//!     }
//! }
//! ```

pub mod controller;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod plan;
pub mod remote;
pub mod state;
pub mod value;

// Re-exports
pub use controller::ResourceController;
pub use error::{ControllerError, Result, StoreError, ValueError};
pub use identity::{
    AmbiguityPolicy, CreatedMetadata, IdentityReconciler, NotFound, Observed, ReadOutcome,
    ReconcileError, Reconciled,
};
pub use metadata::{INTERNAL_TAG_KEY, Metadata, MetadataSplit, merge, split};
pub use plan::{Action, ActionType, Change, DesiredResource, Plan, PlanSummary, plan_resource};
pub use remote::{ApiError, RemoteApi, RemoteObject};
pub use state::{Lifecycle, ManagedState, StateFile, StateStore};
pub use value::{AttrValue, Attributes, plan_value};
