use relata_core::AppResult;
use relata_domain::{LegacyRoleDefinition, RoleBinding};

use crate::replication_ports::{ReplicationSettings, WorkspaceScope};

mod context;
mod resource_binder;
mod role_binding_generator;
mod system_role_matcher;

pub use context::{
    CandidateSystemRole, SystemRoleRegistry, TranslationContext, TranslationDiagnostics,
};
pub use resource_binder::{PermissionGroupings, bind_permissions};
pub use role_binding_generator::generate_role_bindings;
pub use system_role_matcher::{RoleAssignments, match_system_roles};

/// Translates a legacy role definition into relationship-model role bindings.
///
/// Runs binding, system-role matching and binding generation in order. Every binding and
/// synthesized custom role receives a fresh id.
pub fn translate_role(
    legacy_role_id: &str,
    definition: &LegacyRoleDefinition,
    scope: &WorkspaceScope,
    settings: &ReplicationSettings,
    registry: &SystemRoleRegistry,
    context: &TranslationContext,
) -> AppResult<Vec<RoleBinding>> {
    let groupings = bind_permissions(definition, scope, &settings.disabled_applications)?;
    let assignments = match_system_roles(&groupings, registry, context, legacy_role_id);
    generate_role_bindings(legacy_role_id, &assignments, &definition.groups)
}

#[cfg(test)]
mod tests;
