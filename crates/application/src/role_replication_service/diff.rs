use std::collections::BTreeSet;

use relata_domain::{BindingMapping, Relationship, ReplicationEvent, RoleBinding};

/// Gives freshly translated bindings the ids already published for the same structure.
///
/// Custom roles keep the published id of the custom role with the same permissions on the
/// same resources; bindings keep the published id of the binding with the same key.
#[must_use]
pub fn reconcile_ids(
    bindings: Vec<RoleBinding>,
    mapping: Option<&BindingMapping>,
) -> Vec<RoleBinding> {
    let Some(mapping) = mapping else {
        return bindings;
    };

    bindings
        .into_iter()
        .map(|binding| {
            let binding = if binding.role().is_system() {
                binding
            } else {
                match mapping
                    .custom_role_id_for(binding.role().permissions(), binding.resources())
                    .map(str::to_owned)
                {
                    Some(role_id) => binding.with_role_id(role_id),
                    None => binding,
                }
            };

            match mapping.binding_id_for(&binding.key()).map(str::to_owned) {
                Some(binding_id) => binding.with_id(binding_id),
                None => binding,
            }
        })
        .collect()
}

/// Computes the tuples to add and remove to move from `current` to `new`.
///
/// Both inputs must be reconciled against the same mapping so equal structures serialize to
/// equal tuples. The two result lists never share a tuple.
#[must_use]
pub fn diff_role_bindings(current: &[RoleBinding], new: &[RoleBinding]) -> ReplicationEvent {
    let current = relationships(current);
    let new = relationships(new);

    ReplicationEvent {
        relations_to_add: new.difference(&current).cloned().collect(),
        relations_to_remove: current.difference(&new).cloned().collect(),
    }
}

fn relationships(bindings: &[RoleBinding]) -> BTreeSet<Relationship> {
    bindings
        .iter()
        .flat_map(RoleBinding::relationships)
        .collect()
}
