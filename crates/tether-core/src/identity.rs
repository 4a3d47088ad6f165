//! Identity reconciliation
//!
//! Every managed object carries an internal tag ([`INTERNAL_TAG_KEY`]) that
//! is generated once, at create time, and never changes afterwards. When the
//! object's primary reference stops resolving, or resolves to an object with
//! a different tag, the reconciler finds the object again by searching for
//! that tag.
//!
//! ```text
//! read_by_ref(state.primary_ref)
//!    ├─ found, same tag (or no stored tag) ──────────► Found
//!    ├─ found, different tag ─┐
//!    └─ not found ────────────┴─► search_by_tag(tag)
//!                                   ├─ no stored tag / no match ─► Removed
//!                                   ├─ one match ───────────────► Relocated
//!                                   └─ several ─────────────────► AmbiguityPolicy
//! ```

use crate::metadata::{self, INTERNAL_TAG_KEY, Metadata, internal_tag};
use crate::remote::RemoteObject;
use crate::state::ManagedState;
use std::future::Future;
use thiserror::Error;

/// Errors that can signal "the addressed object does not exist"
pub trait NotFound {
    fn is_not_found(&self) -> bool;
}

/// Errors from [`IdentityReconciler::read`]
#[derive(Error, Debug)]
pub enum ReconcileError<E> {
    /// A remote call failed for a reason other than not-found
    #[error(transparent)]
    Remote(E),

    /// The tag search returned more than one object
    #[error("Internal tag {tag} matches {} objects: {}", refs.len(), refs.join(", "))]
    AmbiguousTag { tag: String, refs: Vec<String> },
}

/// What to do when several objects carry the same internal tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AmbiguityPolicy {
    /// Fail the read with [`ReconcileError::AmbiguousTag`]
    #[default]
    Error,
    /// Take the first match the server returned
    FirstMatch,
}

/// How a read resolved the managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Found,
    Relocated,
    Removed,
}

impl std::fmt::Display for ReadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadOutcome::Found => write!(f, "found"),
            ReadOutcome::Relocated => write!(f, "relocated"),
            ReadOutcome::Removed => write!(f, "removed"),
        }
    }
}

/// Object returned by a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    /// The object, with inherited metadata stripped
    pub object: RemoteObject,

    /// Full server metadata, for the next snapshot
    pub all_metadata: Metadata,
}

/// Result of [`IdentityReconciler::read`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Found(Observed),
    Relocated {
        previous_ref: String,
        observed: Observed,
    },
    Removed,
}

impl Reconciled {
    pub fn outcome(&self) -> ReadOutcome {
        match self {
            Reconciled::Found(_) => ReadOutcome::Found,
            Reconciled::Relocated { .. } => ReadOutcome::Relocated,
            Reconciled::Removed => ReadOutcome::Removed,
        }
    }

    pub fn observed(&self) -> Option<&Observed> {
        match self {
            Reconciled::Found(observed) | Reconciled::Relocated { observed, .. } => Some(observed),
            Reconciled::Removed => None,
        }
    }

    pub fn into_observed(self) -> Option<Observed> {
        match self {
            Reconciled::Found(observed) | Reconciled::Relocated { observed, .. } => Some(observed),
            Reconciled::Removed => None,
        }
    }
}

/// Metadata to persist after a create or update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatedMetadata {
    /// Entries the user declared, as the server stored them
    pub visible: Metadata,

    /// Everything the server returned
    pub snapshot: Metadata,
}

fn generate_tag() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Keeps track of managed objects across primary reference changes
#[derive(Debug, Clone)]
pub struct IdentityReconciler {
    ambiguity: AmbiguityPolicy,
    tag_source: fn() -> String,
}

impl Default for IdentityReconciler {
    fn default() -> Self {
        Self {
            ambiguity: AmbiguityPolicy::default(),
            tag_source: generate_tag,
        }
    }
}

impl IdentityReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ambiguity_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    /// Replace the tag generator (deterministic tags in tests)
    pub fn with_tag_source(mut self, source: fn() -> String) -> Self {
        self.tag_source = source;
        self
    }

    pub fn ambiguity_policy(&self) -> AmbiguityPolicy {
        self.ambiguity
    }

    /// Add a fresh internal tag unless `metadata` already has a non-empty one
    pub fn ensure_internal_tag(&self, mut metadata: Metadata) -> Metadata {
        if internal_tag(&metadata).is_none() {
            let tag = (self.tag_source)();
            tracing::debug!("Assigning internal tag {}", tag);
            metadata.insert(INTERNAL_TAG_KEY.to_string(), tag);
        }
        metadata
    }

    /// Metadata to send with a create call
    pub fn prepare_for_create(&self, user_metadata: &Metadata) -> Metadata {
        self.ensure_internal_tag(user_metadata.clone())
    }

    /// Split the server's answer to a create call
    pub fn after_create(
        &self,
        server_metadata: &Metadata,
        user_metadata: &Metadata,
    ) -> CreatedMetadata {
        CreatedMetadata {
            visible: metadata::matching_entries(server_metadata, user_metadata),
            snapshot: server_metadata.clone(),
        }
    }

    /// Split the server's answer to an update call
    pub fn after_update(
        &self,
        server_metadata: &Metadata,
        user_metadata: &Metadata,
    ) -> CreatedMetadata {
        self.after_create(server_metadata, user_metadata)
    }

    /// Metadata to send with an update call.
    ///
    /// Entries seen on the server but not declared by the user (including the
    /// internal tag) are sent back unchanged, so the update does not delete
    /// them.
    pub fn prepare_for_update(
        &self,
        user_metadata: &Metadata,
        all_metadata_snapshot: &Metadata,
    ) -> Metadata {
        let mut merged = user_metadata.clone();
        for (key, value) in all_metadata_snapshot {
            merged.entry(key.clone()).or_insert_with(|| value.clone());
        }
        merged
    }

    /// Resolve the managed object described by `state`.
    ///
    /// `read_by_ref` is called once with `state.primary_ref`. `search_by_tag`
    /// is called at most once, with the internal tag from
    /// `state.all_metadata_snapshot`. A not-found search error counts as no
    /// match; any other error is returned as [`ReconcileError::Remote`].
    pub async fn read<E, R, RFut, S, SFut>(
        &self,
        read_by_ref: R,
        search_by_tag: S,
        state: &ManagedState,
    ) -> Result<Reconciled, ReconcileError<E>>
    where
        E: NotFound,
        R: FnOnce(String) -> RFut,
        RFut: Future<Output = Result<RemoteObject, E>>,
        S: FnOnce(String, String) -> SFut,
        SFut: Future<Output = Result<Vec<RemoteObject>, E>>,
    {
        let stored_tag = internal_tag(&state.all_metadata_snapshot);

        match read_by_ref(state.primary_ref.clone()).await {
            Ok(object) => match stored_tag {
                Some(tag) if object.internal_tag() != Some(tag) => {
                    tracing::info!(
                        "{} now holds a different object (tag {:?}, expected {}), searching by tag",
                        state.primary_ref,
                        object.internal_tag(),
                        tag
                    );
                    self.relocate(search_by_tag, state, tag).await
                }
                _ => Ok(Reconciled::Found(observe(object, state))),
            },
            Err(err) if err.is_not_found() => match stored_tag {
                Some(tag) => {
                    tracing::debug!("{} not found, searching by tag {}", state.primary_ref, tag);
                    self.relocate(search_by_tag, state, tag).await
                }
                None => {
                    tracing::info!("{} not found and has no internal tag", state.primary_ref);
                    Ok(Reconciled::Removed)
                }
            },
            Err(err) => Err(ReconcileError::Remote(err)),
        }
    }

    async fn relocate<E, S, SFut>(
        &self,
        search_by_tag: S,
        state: &ManagedState,
        tag: &str,
    ) -> Result<Reconciled, ReconcileError<E>>
    where
        E: NotFound,
        S: FnOnce(String, String) -> SFut,
        SFut: Future<Output = Result<Vec<RemoteObject>, E>>,
    {
        let mut matches = match search_by_tag(INTERNAL_TAG_KEY.to_string(), tag.to_string()).await {
            Ok(matches) => matches,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(ReconcileError::Remote(err)),
        };

        if matches.len() > 1 {
            let refs: Vec<String> = matches.iter().map(|o| o.primary_ref.clone()).collect();
            match self.ambiguity {
                AmbiguityPolicy::Error => {
                    return Err(ReconcileError::AmbiguousTag {
                        tag: tag.to_string(),
                        refs,
                    });
                }
                AmbiguityPolicy::FirstMatch => {
                    tracing::warn!(
                        "Internal tag {} matches {} objects ({}), using {}",
                        tag,
                        refs.len(),
                        refs.join(", "),
                        refs[0]
                    );
                }
            }
        }

        if matches.is_empty() {
            tracing::info!("No object carries internal tag {}, treating as removed", tag);
            return Ok(Reconciled::Removed);
        }

        let object = matches.swap_remove(0);
        tracing::info!("Relocated {} -> {}", state.primary_ref, object.primary_ref);
        Ok(Reconciled::Relocated {
            previous_ref: state.primary_ref.clone(),
            observed: observe(object, state),
        })
    }
}

/// Strip metadata the user did not declare
fn observe(mut object: RemoteObject, state: &ManagedState) -> Observed {
    let all_metadata = std::mem::take(&mut object.metadata);
    object.metadata = metadata::split(&all_metadata, state.user_metadata.keys()).own;
    Observed {
        object,
        all_metadata,
    }
}
