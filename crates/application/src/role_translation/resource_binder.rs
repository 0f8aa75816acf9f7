use std::collections::{BTreeMap, BTreeSet};

use relata_core::{AppError, AppResult};
use relata_domain::{BoundResource, LegacyRoleDefinition, WORKSPACE_RESOURCE_TYPE};

use crate::replication_ports::WorkspaceScope;

/// Canonical permissions granted per bound resource.
pub type PermissionGroupings = BTreeMap<BoundResource, BTreeSet<String>>;

/// Groups a legacy role's grants by the resources they apply to.
///
/// Unscoped grants bind to the root workspace. A `null` workspace id binds to the default
/// workspace. Grants of disabled applications are skipped.
pub fn bind_permissions(
    definition: &LegacyRoleDefinition,
    scope: &WorkspaceScope,
    disabled_applications: &BTreeSet<String>,
) -> AppResult<PermissionGroupings> {
    let mut groupings = PermissionGroupings::new();

    for grant in &definition.access {
        if disabled_applications.contains(grant.permission.application()) {
            continue;
        }

        let v2_permission = grant.permission.v2_permission();
        if grant.resource_definitions.is_empty() {
            groupings
                .entry(BoundResource::workspace(scope.root_workspace_id.as_str()))
                .or_default()
                .insert(v2_permission);
            continue;
        }

        for resource_definition in &grant.resource_definitions {
            let resource_type = if grant.permission.application() == "inventory" {
                WORKSPACE_RESOURCE_TYPE.to_owned()
            } else {
                resource_definition.v2_resource_type()?
            };

            for resource_id in resource_definition.resource_ids()? {
                let resource_id = match resource_id {
                    Some(resource_id) => resource_id,
                    None if resource_type == WORKSPACE_RESOURCE_TYPE => {
                        scope.default_workspace_id.clone()
                    }
                    None => {
                        return Err(AppError::Validation(format!(
                            "resource definition '{}' of permission '{}' has a null id for non-workspace type '{resource_type}'",
                            resource_definition.key(),
                            grant.permission
                        )));
                    }
                };

                groupings
                    .entry(BoundResource::new(resource_type.as_str(), resource_id))
                    .or_default()
                    .insert(v2_permission.clone());
            }
        }
    }

    Ok(groupings)
}
