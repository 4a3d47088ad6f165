//! Managed state and its persistence
//!
//! `ManagedState` is the local view of one managed object. `StateStore`
//! keeps all of them in `.tether/state.json`.

use crate::error::StoreError;
use crate::identity::{Observed, ReadOutcome};
use crate::metadata::Metadata;
use crate::value::Attributes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".tether";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";

/// Lifecycle of one managed object
///
/// `Unmanaged → Created → {Found ⇄ Relocated} → Removed`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Unmanaged,
    Created,
    Found,
    Relocated,
    Removed,
}

impl Lifecycle {
    /// State after a successful create. A removed object re-enters here on
    /// the next apply.
    pub fn on_create(self) -> Lifecycle {
        match self {
            Lifecycle::Unmanaged | Lifecycle::Removed => Lifecycle::Created,
            other => other,
        }
    }

    /// State after a read resolved with `outcome`
    pub fn on_read(self, outcome: ReadOutcome) -> Lifecycle {
        match self {
            Lifecycle::Unmanaged | Lifecycle::Removed => self,
            Lifecycle::Created | Lifecycle::Found | Lifecycle::Relocated => match outcome {
                ReadOutcome::Found => Lifecycle::Found,
                ReadOutcome::Relocated => Lifecycle::Relocated,
                ReadOutcome::Removed => Lifecycle::Removed,
            },
        }
    }

    /// State once the current primary reference has been persisted
    pub fn on_persist(self) -> Lifecycle {
        match self {
            Lifecycle::Relocated => Lifecycle::Found,
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Lifecycle::Removed
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Unmanaged => write!(f, "unmanaged"),
            Lifecycle::Created => write!(f, "created"),
            Lifecycle::Found => write!(f, "found"),
            Lifecycle::Relocated => write!(f, "relocated"),
            Lifecycle::Removed => write!(f, "removed"),
        }
    }
}

/// Locally persisted view of one managed object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedState {
    /// Last known primary reference
    pub primary_ref: String,

    /// Resource type
    pub resource_type: String,

    /// Entries the user declared
    #[serde(default)]
    pub user_metadata: Metadata,

    /// Full metadata last seen on the server
    #[serde(default)]
    pub all_metadata_snapshot: Metadata,

    /// Business attributes last seen on the server
    #[serde(default)]
    pub attributes: Attributes,

    #[serde(default)]
    pub lifecycle: Lifecycle,

    /// When the object was created
    pub created_at: DateTime<Utc>,

    /// Last refresh
    pub updated_at: DateTime<Utc>,
}

impl ManagedState {
    pub fn new(primary_ref: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            primary_ref: primary_ref.into(),
            resource_type: resource_type.into(),
            user_metadata: Metadata::new(),
            all_metadata_snapshot: Metadata::new(),
            attributes: Attributes::new(),
            lifecycle: Lifecycle::Unmanaged,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_user_metadata(mut self, metadata: Metadata) -> Self {
        self.user_metadata = metadata;
        self
    }

    pub fn with_snapshot(mut self, snapshot: Metadata) -> Self {
        self.all_metadata_snapshot = snapshot;
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Apply the result of a successful read
    pub fn refresh(&mut self, observed: Observed, outcome: ReadOutcome) {
        self.primary_ref = observed.object.primary_ref;
        self.user_metadata = observed.object.metadata;
        self.all_metadata_snapshot = observed.all_metadata;
        self.attributes = observed.object.fields;
        self.lifecycle = self.lifecycle.on_read(outcome);
        self.updated_at = Utc::now();
    }

    /// `user_metadata ⊆ all_metadata_snapshot`
    pub fn is_consistent(&self) -> bool {
        self.user_metadata
            .iter()
            .all(|(k, v)| self.all_metadata_snapshot.get(k) == Some(v))
    }
}

/// Contents of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Managed objects by resource address
    pub resources: BTreeMap<String, ManagedState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a resource. A relocated object counts as found again
    /// once its new reference is stored.
    pub fn set_resource(&mut self, address: impl Into<String>, mut state: ManagedState) {
        state.lifecycle = state.lifecycle.on_persist();
        self.resources.insert(address.into(), state);
        self.updated_at = Utc::now();
    }

    pub fn remove_resource(&mut self, address: &str) -> Option<ManagedState> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_resource(&self, address: &str) -> Option<&ManagedState> {
        self.resources.get(address)
    }

    /// Resources of one type
    pub fn by_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a ManagedState)> {
        self.resources
            .iter()
            .filter(move |(_, s)| s.resource_type == resource_type)
    }
}

/// Reads and writes the state file under a project root
pub struct StateStore {
    project_root: PathBuf,
}

impl StateStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    async fn ensure_state_dir(&self) -> Result<(), StoreError> {
        let dir = self.state_dir();
        if !fs::try_exists(&dir).await? {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the state file; a missing file is an empty state
    pub async fn load(&self) -> Result<StateFile, StoreError> {
        let path = self.state_path();
        if !fs::try_exists(&path).await? {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StateFile::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateFile = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(StoreError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Write the state file, keeping the previous one as a backup
    pub async fn save(&self, state: &StateFile) -> Result<(), StoreError> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if fs::try_exists(&path).await? {
            if fs::try_exists(&backup).await? {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    pub async fn get(&self, address: &str) -> Result<Option<ManagedState>, StoreError> {
        Ok(self.load().await?.get_resource(address).cloned())
    }

    /// Store one resource
    pub async fn put(&self, address: &str, state: ManagedState) -> Result<(), StoreError> {
        let mut file = self.load().await?;
        file.set_resource(address, state);
        self.save(&file).await
    }

    /// Drop one resource; returns what was stored
    pub async fn remove(&self, address: &str) -> Result<Option<ManagedState>, StoreError> {
        let mut file = self.load().await?;
        let removed = file.remove_resource(address);
        if removed.is_some() {
            self.save(&file).await?;
        }
        Ok(removed)
    }
}
