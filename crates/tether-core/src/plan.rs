//! Planned actions for managed objects

use crate::metadata::Metadata;
use crate::state::ManagedState;
use crate::value::{AttrValue, Attributes, plan_value};
use serde::{Deserialize, Serialize};
use tether_config::ProviderSettings;

/// Desired state of one object, as produced by the schema layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredResource {
    pub resource_type: String,

    /// Metadata the user declared
    #[serde(default)]
    pub metadata: Metadata,

    /// Configured attributes; `Unknown` marks values computed by the server
    #[serde(default)]
    pub attributes: Attributes,
}

impl DesiredResource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Attributes that can be sent to the server (unknown ones are left out)
    pub fn known_attributes(&self) -> Attributes {
        self.attributes
            .iter()
            .filter(|(_, v)| !v.is_unknown())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// One changed value; metadata entries are prefixed with `metadata.`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub before: Option<AttrValue>,
    pub after: Option<AttrValue>,
}

/// Planned action for one managed object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Resource address (e.g. "dns_zone.main")
    pub address: String,

    pub action_type: ActionType,

    pub resource_type: String,

    pub description: String,

    pub changes: Vec<Change>,

    /// Desired state with plan-time values resolved; `None` for deletes
    pub planned: Option<DesiredResource>,
}

/// Plan containing all actions to be applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,

    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            has_changes: false,
        }
    }

    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

/// Plan one object from its prior state and desired configuration.
///
/// Metadata is compared against the user-declared entries only, so
/// inherited server tags never show up as changes.
pub fn plan_resource(
    address: &str,
    prior: Option<&ManagedState>,
    desired: Option<&DesiredResource>,
    settings: &ProviderSettings,
) -> Action {
    match (prior, desired) {
        (None, None) => Action {
            address: address.to_string(),
            action_type: ActionType::NoOp,
            resource_type: String::new(),
            description: format!("{} is not managed", address),
            changes: Vec::new(),
            planned: None,
        },
        (None, Some(desired)) => Action {
            address: address.to_string(),
            action_type: ActionType::Create,
            resource_type: desired.resource_type.clone(),
            description: format!("create {}", address),
            changes: creation_changes(desired),
            planned: Some(desired.clone()),
        },
        (Some(prior), None) => Action {
            address: address.to_string(),
            action_type: ActionType::Delete,
            resource_type: prior.resource_type.clone(),
            description: format!("delete {} ({})", address, prior.primary_ref),
            changes: Vec::new(),
            planned: None,
        },
        (Some(prior), Some(desired)) => {
            let mut planned = desired.clone();
            let mut changes = metadata_changes(&prior.user_metadata, &desired.metadata);

            for (key, value) in &desired.attributes {
                let before = prior.attributes.get(key);
                let resolved = plan_value(before, value, settings);
                let unchanged = before
                    .unwrap_or(&AttrValue::Null)
                    .semantically_equal(&resolved);
                if !unchanged {
                    changes.push(Change {
                        path: key.clone(),
                        before: before.cloned(),
                        after: Some(resolved.clone()),
                    });
                }
                planned.attributes.insert(key.clone(), resolved);
            }

            let action_type = if changes.is_empty() {
                ActionType::NoOp
            } else {
                ActionType::Update
            };
            let description = match action_type {
                ActionType::NoOp => format!("{} is up to date", address),
                _ => format!("update {} ({} changes)", address, changes.len()),
            };

            Action {
                address: address.to_string(),
                action_type,
                resource_type: desired.resource_type.clone(),
                description,
                changes,
                planned: Some(planned),
            }
        }
    }
}

fn creation_changes(desired: &DesiredResource) -> Vec<Change> {
    let mut changes = metadata_changes(&Metadata::new(), &desired.metadata);
    changes.extend(desired.attributes.iter().map(|(key, value)| Change {
        path: key.clone(),
        before: None,
        after: Some(value.clone()),
    }));
    changes
}

fn metadata_changes(before: &Metadata, after: &Metadata) -> Vec<Change> {
    let keys: std::collections::BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|key| before.get(*key) != after.get(*key))
        .map(|key| Change {
            path: format!("metadata.{}", key),
            before: before.get(key).map(|v| AttrValue::from(v.as_str())),
            after: after.get(key).map(|v| AttrValue::from(v.as_str())),
        })
        .collect()
}
