use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::legacy::LegacyRoleDefinition;
use crate::relation_model::{BindingKey, RoleBinding, V2Role};
use crate::resource::BoundResource;

/// Role binding as recorded in a published mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRoleBinding {
    /// Published binding id.
    pub id: String,
    /// Published role, including the id of a synthesized custom role.
    pub role: V2Role,
    /// Bound resources.
    pub resources: BTreeSet<BoundResource>,
    /// Granted group ids.
    pub group_ids: BTreeSet<String>,
}

impl StoredRoleBinding {
    /// Returns the structural identity of the stored binding.
    #[must_use]
    pub fn key(&self) -> BindingKey {
        BindingKey {
            role: self.role.key(),
            resources: self.resources.clone(),
            group_ids: self.group_ids.clone(),
        }
    }
}

impl From<&RoleBinding> for StoredRoleBinding {
    fn from(binding: &RoleBinding) -> Self {
        Self {
            id: binding.id().to_owned(),
            role: binding.role().clone(),
            resources: binding.resources().clone(),
            group_ids: binding.group_ids(),
        }
    }
}

/// Relationship-model objects last published for one legacy role.
///
/// Absence of a mapping means nothing has been published for the role yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingMapping {
    role_id: String,
    definition: LegacyRoleDefinition,
    bindings: Vec<StoredRoleBinding>,
}

impl BindingMapping {
    /// Creates a mapping from the definition and bindings being published.
    #[must_use]
    pub fn new(
        role_id: impl Into<String>,
        definition: LegacyRoleDefinition,
        bindings: &[RoleBinding],
    ) -> Self {
        Self {
            role_id: role_id.into(),
            definition,
            bindings: bindings.iter().map(StoredRoleBinding::from).collect(),
        }
    }

    /// Returns the legacy role id.
    #[must_use]
    pub fn role_id(&self) -> &str {
        self.role_id.as_str()
    }

    /// Returns the legacy definition the published state was computed from.
    #[must_use]
    pub fn definition(&self) -> &LegacyRoleDefinition {
        &self.definition
    }

    /// Returns the published bindings.
    #[must_use]
    pub fn bindings(&self) -> &[StoredRoleBinding] {
        self.bindings.as_slice()
    }

    /// Returns the published id of a structurally equal binding.
    #[must_use]
    pub fn binding_id_for(&self, key: &BindingKey) -> Option<&str> {
        self.bindings
            .iter()
            .find(|binding| &binding.key() == key)
            .map(|binding| binding.id.as_str())
    }

    /// Returns the published id of a custom role with these permissions on these resources.
    #[must_use]
    pub fn custom_role_id_for(
        &self,
        permissions: &BTreeSet<String>,
        resources: &BTreeSet<BoundResource>,
    ) -> Option<&str> {
        self.bindings
            .iter()
            .find(|binding| {
                !binding.role.is_system()
                    && binding.role.permissions() == permissions
                    && &binding.resources == resources
            })
            .map(|binding| binding.role.id())
    }
}
