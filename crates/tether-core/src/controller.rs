//! Generic resource controller
//!
//! Wires a [`RemoteApi`] to the retry executor and the identity reconciler.
//! Every remote call is retried under the provider's retry timeout.

use crate::error::{ControllerError, Result};
use crate::identity::{IdentityReconciler, NotFound, Reconciled};
use crate::metadata::{self, INTERNAL_TAG_KEY, internal_tag};
use crate::plan::{Action, ActionType, DesiredResource, plan_resource};
use crate::remote::{ApiError, RemoteApi, RemoteObject};
use crate::state::{Lifecycle, ManagedState};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tether_config::ProviderSettings;
use tether_retry::{CallContext, RetryExecutor};

/// CRUD for one remote object type
pub struct ResourceController<A: RemoteApi> {
    api: Arc<A>,
    executor: RetryExecutor,
    reconciler: IdentityReconciler,
    settings: Arc<ProviderSettings>,
}

impl<A: RemoteApi> ResourceController<A> {
    pub fn new(api: Arc<A>, settings: Arc<ProviderSettings>) -> Self {
        Self {
            api,
            executor: RetryExecutor::new(settings.clone()),
            reconciler: IdentityReconciler::new(),
            settings,
        }
    }

    pub fn with_executor(mut self, executor: RetryExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_reconciler(mut self, reconciler: IdentityReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn reconciler(&self) -> &IdentityReconciler {
        &self.reconciler
    }

    /// Run one remote call through the retry executor
    async fn call<T, F, Fut>(&self, ctx: &CallContext, operation: F) -> Result<T>
    where
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        let api = &self.api;
        let classify = |err: &ApiError| api.is_retryable(err);
        Ok(self.executor.execute(ctx, Some(&classify), operation).await?)
    }

    async fn read_remote(&self, ctx: &CallContext, primary_ref: &str) -> Result<RemoteObject> {
        let api = &self.api;
        self.call(ctx, move |c| async move { api.read(&c, primary_ref).await })
            .await
    }

    async fn search_remote(
        &self,
        ctx: &CallContext,
        key: &str,
        value: &str,
    ) -> Result<Vec<RemoteObject>> {
        let api = &self.api;
        self.call(ctx, move |c| async move { api.search_by_tag(&c, key, value).await })
            .await
    }

    /// Create the object and return its first managed state.
    ///
    /// Retries look the object up by its internal tag before calling create
    /// again, so a create that reached the server but failed on the way back
    /// is not repeated.
    pub async fn create(
        &self,
        ctx: &CallContext,
        desired: &DesiredResource,
    ) -> Result<ManagedState> {
        let metadata = self.reconciler.prepare_for_create(&desired.metadata);
        let fields = desired.known_attributes();
        let tag = internal_tag(&metadata).unwrap_or_default().to_string();
        let attempts = AtomicU32::new(0);

        let api = &self.api;
        let (metadata, fields, tag, attempts) = (&metadata, &fields, tag.as_str(), &attempts);
        let object = self
            .call(ctx, move |c| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt > 1 {
                        // a search endpoint answering 404 has no match
                        let existing = match api.search_by_tag(&c, INTERNAL_TAG_KEY, tag).await {
                            Ok(existing) => existing,
                            Err(err) if err.is_not_found() => Vec::new(),
                            Err(err) => return Err(err),
                        };
                        if let Some(object) = existing.into_iter().next() {
                            tracing::info!(
                                "Found {} from an earlier create attempt",
                                object.primary_ref
                            );
                            return Ok(object);
                        }
                    }
                    api.create(&c, metadata, fields).await
                }
            })
            .await?;

        let created = self.reconciler.after_create(&object.metadata, &desired.metadata);
        if internal_tag(&created.snapshot).is_none() {
            tracing::warn!(
                "{} was created without its internal tag; it cannot be relocated",
                object.primary_ref
            );
        }

        tracing::info!("Created {} {}", self.api.resource_type(), object.primary_ref);
        Ok(ManagedState::new(object.primary_ref, self.api.resource_type())
            .with_user_metadata(created.visible)
            .with_snapshot(created.snapshot)
            .with_attributes(object.fields)
            .with_lifecycle(Lifecycle::Unmanaged.on_create()))
    }

    /// Refresh `state` from the server.
    ///
    /// Returns `None` when the object is gone and cannot be relocated.
    pub async fn read(
        &self,
        ctx: &CallContext,
        state: &ManagedState,
    ) -> Result<Option<ManagedState>> {
        let reconciled = self
            .reconciler
            .read(
                move |primary_ref| async move { self.read_remote(ctx, &primary_ref).await },
                move |key, value| async move { self.search_remote(ctx, &key, &value).await },
                state,
            )
            .await?;

        let outcome = reconciled.outcome();
        match reconciled {
            Reconciled::Removed => {
                tracing::info!(
                    "{} {} no longer exists, dropping from state",
                    state.resource_type,
                    state.primary_ref
                );
                Ok(None)
            }
            Reconciled::Found(observed) | Reconciled::Relocated { observed, .. } => {
                let mut next = state.clone();
                next.refresh(observed, outcome);
                Ok(Some(next))
            }
        }
    }

    /// Apply `desired` to an existing object
    pub async fn update(
        &self,
        ctx: &CallContext,
        state: &ManagedState,
        desired: &DesiredResource,
    ) -> Result<ManagedState> {
        // entries the user declared before and has since removed are dropped
        let inherited =
            metadata::split(&state.all_metadata_snapshot, state.user_metadata.keys()).inherited;
        let metadata = self
            .reconciler
            .ensure_internal_tag(self.reconciler.prepare_for_update(&desired.metadata, &inherited));
        let fields = desired.known_attributes();

        let api = &self.api;
        let (primary_ref, metadata, fields) = (state.primary_ref.as_str(), &metadata, &fields);
        let object = self
            .call(ctx, move |c| async move {
                api.update(&c, primary_ref, metadata, fields).await
            })
            .await?;

        let updated = self.reconciler.after_update(&object.metadata, &desired.metadata);
        let mut next = state.clone();
        next.primary_ref = object.primary_ref;
        next.user_metadata = updated.visible;
        next.all_metadata_snapshot = updated.snapshot;
        next.attributes = object.fields;
        next.updated_at = Utc::now();

        tracing::info!("Updated {} {}", next.resource_type, next.primary_ref);
        Ok(next)
    }

    /// Delete the object. An object that is already gone counts as deleted.
    pub async fn delete(&self, ctx: &CallContext, state: &ManagedState) -> Result<()> {
        let api = &self.api;
        let primary_ref = state.primary_ref.as_str();
        match self
            .call(ctx, move |c| async move { api.delete(&c, primary_ref).await })
            .await
        {
            Ok(()) => {
                tracing::info!("Deleted {} {}", state.resource_type, state.primary_ref);
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!("{} already deleted", state.primary_ref);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Plan one object against its prior state
    pub fn plan(
        &self,
        address: &str,
        prior: Option<&ManagedState>,
        desired: Option<&DesiredResource>,
    ) -> Action {
        plan_resource(address, prior, desired, &self.settings)
    }

    /// Execute a planned action; returns the state to persist (`None` after a delete)
    pub async fn apply(
        &self,
        ctx: &CallContext,
        action: &Action,
        prior: Option<&ManagedState>,
    ) -> Result<Option<ManagedState>> {
        match (action.action_type, prior, action.planned.as_ref()) {
            (ActionType::NoOp, prior, _) => Ok(prior.cloned()),
            (ActionType::Create, _, Some(planned)) => Ok(Some(self.create(ctx, planned).await?)),
            (ActionType::Update, Some(prior), Some(planned)) => {
                Ok(Some(self.update(ctx, prior, planned).await?))
            }
            (ActionType::Delete, Some(prior), _) => {
                self.delete(ctx, prior).await?;
                Ok(None)
            }
            (action_type, _, _) => Err(ControllerError::InvalidAction(format!(
                "cannot {} {} without {}",
                action_type,
                action.address,
                if prior.is_none() { "prior state" } else { "a planned state" }
            ))),
        }
    }
}
