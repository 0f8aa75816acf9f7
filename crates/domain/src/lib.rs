//! Domain entities and invariants for the legacy and relationship access models.

#![forbid(unsafe_code)]

mod binding_mapping;
mod legacy;
mod naming;
mod relation_model;
mod relationship;
mod replication;
mod resource;

pub use binding_mapping::{BindingMapping, StoredRoleBinding};
pub use legacy::{
    AccessGrant, LegacyGroup, LegacyPermission, LegacyPrincipal, LegacyRole, LegacyRoleDefinition,
};
pub use naming::{canonical_name, permission_application};
pub use relation_model::{BindingKey, RoleBinding, RoleKey, V2Group, V2Role};
pub use relationship::{ObjectReference, ObjectType, Relationship, SubjectReference};
pub use replication::{AggregateType, OutboxEvent, ReplicationEvent, ReplicationEventType};
pub use resource::{BoundResource, ResourceDefinition, ResourceOperation, WORKSPACE_RESOURCE_TYPE};
