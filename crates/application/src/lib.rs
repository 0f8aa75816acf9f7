//! Application services and ports.

#![forbid(unsafe_code)]

mod group_replication_service;
mod replication_ports;
mod role_replication_service;
mod role_translation;

pub use group_replication_service::GroupReplicationService;
pub use replication_ports::{
    DEFAULT_DISABLED_APPLICATIONS, DEFAULT_PRINCIPAL_USER_DOMAIN, LegacyRoleRepository,
    MappingChange, ReplicationRepository, ReplicationSettings, SystemRoleRepository,
    WorkspaceRepository, WorkspaceScope,
};
pub use role_replication_service::{RoleReplicationService, diff_role_bindings, reconcile_ids};
pub use role_translation::{
    CandidateSystemRole, PermissionGroupings, RoleAssignments, SystemRoleRegistry,
    TranslationContext, TranslationDiagnostics, bind_permissions, generate_role_bindings,
    match_system_roles, translate_role,
};
