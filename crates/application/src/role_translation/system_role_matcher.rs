use std::collections::{BTreeMap, BTreeSet};

use tracing::info;
use uuid::Uuid;

use relata_domain::{BoundResource, V2Role, permission_application};

use super::context::{SystemRoleRegistry, TranslationContext};
use super::resource_binder::PermissionGroupings;

/// Resources each matched or synthesized role is granted on.
pub type RoleAssignments = BTreeMap<V2Role, BTreeSet<BoundResource>>;

/// Covers each resource's permissions with registered system roles.
///
/// An exact registry match wins. Otherwise roles are accepted first-fit in registry order
/// while they add permissions not yet granted. Whatever stays uncovered becomes a new custom
/// role on that resource. The cover is not guaranteed to use the fewest roles.
pub fn match_system_roles(
    groupings: &PermissionGroupings,
    registry: &SystemRoleRegistry,
    context: &TranslationContext,
    legacy_role_id: &str,
) -> RoleAssignments {
    let mut assignments = RoleAssignments::new();

    for (resource, permissions) in groupings {
        if let Some(role) = registry.exact_match(permissions) {
            assign(&mut assignments, role.clone(), resource);
            continue;
        }

        let mut granted = BTreeSet::new();
        for role in registry.iter() {
            if &granted == permissions {
                break;
            }

            let role_permissions = role.permissions();
            if role_permissions.is_subset(permissions) && !role_permissions.is_subset(&granted) {
                assign(&mut assignments, role.clone(), resource);
                granted.extend(role_permissions.iter().cloned());
            }
        }

        if &granted == permissions {
            continue;
        }

        let leftovers: BTreeSet<String> = permissions.difference(&granted).cloned().collect();
        info!(
            legacy_role_id,
            resource = %resource,
            unmatched_permissions = ?leftovers,
            "no system role covers permissions, synthesizing custom role"
        );

        context.record_custom_role(legacy_role_id, candidate_bundles(permissions, &leftovers));
        assign(
            &mut assignments,
            V2Role::custom(Uuid::new_v4().to_string(), leftovers),
            resource,
        );
    }

    assignments
}

fn assign(assignments: &mut RoleAssignments, role: V2Role, resource: &BoundResource) {
    assignments.entry(role).or_default().insert(resource.clone());
}

// One bundle per application with uncovered permissions: everything that application was
// granted on the resource.
fn candidate_bundles(
    permissions: &BTreeSet<String>,
    leftovers: &BTreeSet<String>,
) -> Vec<BTreeSet<String>> {
    let applications: BTreeSet<&str> = leftovers
        .iter()
        .map(|permission| permission_application(permission))
        .collect();

    applications
        .into_iter()
        .map(|application| {
            permissions
                .iter()
                .filter(|permission| permission_application(permission) == application)
                .cloned()
                .collect()
        })
        .collect()
}
