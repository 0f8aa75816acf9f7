use std::str::FromStr;

use relata_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::relationship::Relationship;

/// Legacy-model mutation that triggered a replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationEventType {
    /// A custom role was created.
    CreateCustomRole,
    /// A custom role's grants changed.
    UpdateCustomRole,
    /// A custom role was deleted.
    DeleteCustomRole,
    /// A role was granted to a group.
    AssignRole,
    /// A role was removed from a group.
    UnassignRole,
    /// Principals joined a group.
    AddPrincipalsToGroup,
    /// Principals left a group.
    RemovePrincipalsFromGroup,
    /// A role was replicated by the bulk migration.
    MigrateRole,
}

impl ReplicationEventType {
    /// Returns a stable storage value for this event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCustomRole => "create_custom_role",
            Self::UpdateCustomRole => "update_custom_role",
            Self::DeleteCustomRole => "delete_custom_role",
            Self::AssignRole => "assign_role",
            Self::UnassignRole => "unassign_role",
            Self::AddPrincipalsToGroup => "add_principals_to_group",
            Self::RemovePrincipalsFromGroup => "remove_principals_from_group",
            Self::MigrateRole => "migrate_role",
        }
    }
}

impl FromStr for ReplicationEventType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create_custom_role" => Ok(Self::CreateCustomRole),
            "update_custom_role" => Ok(Self::UpdateCustomRole),
            "delete_custom_role" => Ok(Self::DeleteCustomRole),
            "assign_role" => Ok(Self::AssignRole),
            "unassign_role" => Ok(Self::UnassignRole),
            "add_principals_to_group" => Ok(Self::AddPrincipalsToGroup),
            "remove_principals_from_group" => Ok(Self::RemovePrincipalsFromGroup),
            "migrate_role" => Ok(Self::MigrateRole),
            _ => Err(AppError::Validation(format!(
                "unknown replication event type '{value}'"
            ))),
        }
    }
}

/// Aggregate an outbox event is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    /// Legacy role.
    Role,
    /// Legacy group.
    Group,
}

impl AggregateType {
    /// Returns a stable storage value for this aggregate type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "Role",
            Self::Group => "Group",
        }
    }
}

/// Relationship changes published for one legacy-model write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationEvent {
    /// Tuples to write.
    pub relations_to_add: Vec<Relationship>,
    /// Tuples to delete.
    pub relations_to_remove: Vec<Relationship>,
}

impl ReplicationEvent {
    /// Returns whether the event carries no change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations_to_add.is_empty() && self.relations_to_remove.is_empty()
    }
}

/// Row written to the outbox table for change-data-capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEvent {
    /// Aggregate type.
    pub aggregate_type: AggregateType,
    /// Aggregate id, the legacy role or group id.
    pub aggregate_id: String,
    /// Triggering mutation.
    pub event_type: ReplicationEventType,
    /// Published changes.
    pub payload: ReplicationEvent,
}

impl OutboxEvent {
    /// Serializes the payload for storage.
    pub fn payload_json(&self) -> AppResult<Value> {
        serde_json::to_value(&self.payload).map_err(|error| {
            AppError::Internal(format!(
                "failed to serialize replication payload for {} '{}': {error}",
                self.aggregate_type.as_str(),
                self.aggregate_id
            ))
        })
    }
}
