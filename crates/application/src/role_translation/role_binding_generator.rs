use std::collections::BTreeSet;

use uuid::Uuid;

use relata_core::AppResult;
use relata_domain::{LegacyGroup, RoleBinding, V2Group};

use super::system_role_matcher::RoleAssignments;

/// Expands role assignments into one binding per role, resource and group.
///
/// Without groups, one binding per role and resource is emitted with an empty group set.
pub fn generate_role_bindings(
    legacy_role_id: &str,
    assignments: &RoleAssignments,
    groups: &[LegacyGroup],
) -> AppResult<Vec<RoleBinding>> {
    let v2_groups: BTreeSet<V2Group> = groups.iter().map(V2Group::from).collect();
    let mut bindings = Vec::new();

    for (role, resources) in assignments {
        for resource in resources {
            if v2_groups.is_empty() {
                bindings.push(RoleBinding::new(
                    Uuid::new_v4().to_string(),
                    legacy_role_id,
                    role.clone(),
                    BTreeSet::from([resource.clone()]),
                    BTreeSet::new(),
                )?);
                continue;
            }

            for group in &v2_groups {
                bindings.push(RoleBinding::new(
                    Uuid::new_v4().to_string(),
                    legacy_role_id,
                    role.clone(),
                    BTreeSet::from([resource.clone()]),
                    BTreeSet::from([group.clone()]),
                )?);
            }
        }
    }

    Ok(bindings)
}
