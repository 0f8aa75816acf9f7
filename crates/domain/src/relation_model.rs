use std::collections::BTreeSet;

use relata_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::legacy::LegacyGroup;
use crate::relationship::{ObjectReference, ObjectType, Relationship, SubjectReference};
use crate::resource::BoundResource;

/// Role in the relationship model, either registry-known or synthesized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct V2Role {
    id: String,
    is_system: bool,
    permissions: BTreeSet<String>,
}

impl V2Role {
    /// Creates a system role.
    #[must_use]
    pub fn system(id: impl Into<String>, permissions: BTreeSet<String>) -> Self {
        Self {
            id: id.into(),
            is_system: true,
            permissions,
        }
    }

    /// Creates a custom role.
    #[must_use]
    pub fn custom(id: impl Into<String>, permissions: BTreeSet<String>) -> Self {
        Self {
            id: id.into(),
            is_system: false,
            permissions,
        }
    }

    /// Returns the role id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns whether this is a system role.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.is_system
    }

    /// Returns the canonical permissions of the role.
    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    /// Returns the id-independent identity of the role.
    #[must_use]
    pub fn key(&self) -> RoleKey {
        if self.is_system {
            RoleKey::System(self.id.clone())
        } else {
            RoleKey::Custom(self.permissions.clone())
        }
    }

    /// Returns a copy of the role carrying another id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Structural role identity: system roles by id, custom roles by permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleKey {
    /// Registry role id.
    System(String),
    /// Permissions of a synthesized role.
    Custom(BTreeSet<String>),
}

/// Group in the relationship model, mapped 1:1 from a legacy group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct V2Group {
    id: String,
    member_user_ids: BTreeSet<String>,
}

impl V2Group {
    /// Creates a group.
    #[must_use]
    pub fn new(id: impl Into<String>, member_user_ids: BTreeSet<String>) -> Self {
        Self {
            id: id.into(),
            member_user_ids,
        }
    }

    /// Returns the group id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns user ids of the members.
    #[must_use]
    pub fn member_user_ids(&self) -> &BTreeSet<String> {
        &self.member_user_ids
    }
}

impl From<&LegacyGroup> for V2Group {
    fn from(group: &LegacyGroup) -> Self {
        Self::new(
            group.id.clone(),
            group.member_user_ids().map(str::to_owned).collect(),
        )
    }
}

/// Structural identity of a role binding, independent of generated ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey {
    /// Role identity.
    pub role: RoleKey,
    /// Bound resources.
    pub resources: BTreeSet<BoundResource>,
    /// Granted group ids.
    pub group_ids: BTreeSet<String>,
}

/// Grant of a role on resources to groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    id: String,
    origin_role_id: String,
    role: V2Role,
    resources: BTreeSet<BoundResource>,
    groups: BTreeSet<V2Group>,
}

impl RoleBinding {
    /// Creates a role binding.
    ///
    /// An empty group set is valid: the binding exists but is granted to nobody yet.
    pub fn new(
        id: impl Into<String>,
        origin_role_id: impl Into<String>,
        role: V2Role,
        resources: BTreeSet<BoundResource>,
        groups: BTreeSet<V2Group>,
    ) -> AppResult<Self> {
        let id = id.into();
        if resources.is_empty() {
            return Err(AppError::Validation(format!(
                "role binding '{id}' must be bound to at least one resource"
            )));
        }

        Ok(Self {
            id,
            origin_role_id: origin_role_id.into(),
            role,
            resources,
            groups,
        })
    }

    /// Returns the binding id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the legacy role this binding was translated from.
    #[must_use]
    pub fn origin_role_id(&self) -> &str {
        self.origin_role_id.as_str()
    }

    /// Returns the granted role.
    #[must_use]
    pub fn role(&self) -> &V2Role {
        &self.role
    }

    /// Returns the bound resources.
    #[must_use]
    pub fn resources(&self) -> &BTreeSet<BoundResource> {
        &self.resources
    }

    /// Returns the subject groups.
    #[must_use]
    pub fn groups(&self) -> &BTreeSet<V2Group> {
        &self.groups
    }

    /// Returns the structural identity of the binding.
    #[must_use]
    pub fn key(&self) -> BindingKey {
        BindingKey {
            role: self.role.key(),
            resources: self.resources.clone(),
            group_ids: self.group_ids(),
        }
    }

    /// Returns the ids of the subject groups.
    #[must_use]
    pub fn group_ids(&self) -> BTreeSet<String> {
        self.groups.iter().map(|group| group.id.clone()).collect()
    }

    /// Returns the binding carrying another id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Returns the binding with its role carrying another id.
    #[must_use]
    pub fn with_role_id(mut self, role_id: impl Into<String>) -> Self {
        self.role = self.role.with_id(role_id);
        self
    }

    /// Serializes the binding into relationship tuples.
    #[must_use]
    pub fn relationships(&self) -> Vec<Relationship> {
        let binding = ObjectReference::new(ObjectType::rbac("role_binding"), self.id.as_str());
        let role = ObjectReference::new(ObjectType::rbac("role"), self.role.id());
        let mut relationships = vec![Relationship::new(
            binding.clone(),
            "granted",
            SubjectReference::direct(role.clone()),
        )];

        if !self.role.is_system() {
            let any_principal = ObjectReference::new(ObjectType::rbac("principal"), "*");
            relationships.extend(self.role.permissions().iter().map(|permission| {
                Relationship::new(
                    role.clone(),
                    permission.as_str(),
                    SubjectReference::direct(any_principal.clone()),
                )
            }));
        }

        relationships.extend(self.groups.iter().map(|group| {
            Relationship::new(
                binding.clone(),
                "subject",
                SubjectReference::with_relation(
                    ObjectReference::new(ObjectType::rbac("group"), group.id()),
                    "member",
                ),
            )
        }));

        relationships.extend(self.resources.iter().map(|resource| {
            Relationship::new(
                ObjectReference::new(resource.object_type(), resource.resource_id()),
                "binding",
                SubjectReference::direct(binding.clone()),
            )
        }));

        relationships
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{BoundResource, RoleBinding, RoleKey, V2Group, V2Role};

    fn permissions(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    fn binding(id: &str, role: V2Role, groups: &[&str]) -> RoleBinding {
        RoleBinding::new(
            id,
            "legacy-1",
            role,
            BTreeSet::from([BoundResource::workspace("w1")]),
            groups
                .iter()
                .map(|group| V2Group::new(*group, BTreeSet::new()))
                .collect(),
        )
        .unwrap_or_else(|error| panic!("{error}"))
    }

    #[test]
    fn binding_requires_resources() {
        let result = RoleBinding::new(
            "b1",
            "legacy-1",
            V2Role::system("s1", permissions(&["app_x_read"])),
            BTreeSet::new(),
            BTreeSet::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn key_ignores_generated_ids() {
        let first = binding("b1", V2Role::custom("r1", permissions(&["app_x_read"])), &["g1"]);
        let second = binding("b2", V2Role::custom("r2", permissions(&["app_x_read"])), &["g1"]);

        assert_eq!(first.key(), second.key());
        assert_eq!(
            first.key().role,
            RoleKey::Custom(permissions(&["app_x_read"]))
        );
    }

    #[test]
    fn system_binding_tuples_cover_role_groups_and_resources() {
        let binding = binding("b1", V2Role::system("s1", permissions(&["app_x_read"])), &["g1"]);
        let rendered: Vec<String> = binding
            .relationships()
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(
            rendered,
            vec![
                "rbac/role_binding:b1#granted@rbac/role:s1".to_owned(),
                "rbac/role_binding:b1#subject@rbac/group:g1#member".to_owned(),
                "rbac/workspace:w1#binding@rbac/role_binding:b1".to_owned(),
            ]
        );
    }

    #[test]
    fn custom_binding_tuples_include_role_permissions() {
        let binding = binding(
            "b1",
            V2Role::custom("c1", permissions(&["app_x_read", "app_y_write"])),
            &[],
        );
        let rendered: Vec<String> = binding
            .relationships()
            .iter()
            .map(ToString::to_string)
            .collect();

        assert!(rendered.contains(&"rbac/role:c1#app_x_read@rbac/principal:*".to_owned()));
        assert!(rendered.contains(&"rbac/role:c1#app_y_write@rbac/principal:*".to_owned()));
        assert!(!rendered.iter().any(|tuple| tuple.contains("#subject@")));
    }
}
