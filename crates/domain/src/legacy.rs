use std::fmt::{Display, Formatter};
use std::str::FromStr;

use relata_core::{AppError, AppResult, TenantId};
use serde::{Deserialize, Serialize};

use crate::naming::canonical_name;
use crate::resource::ResourceDefinition;

/// Legacy permission key in `application:resource_type:verb` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LegacyPermission {
    application: String,
    resource_type: String,
    verb: String,
}

impl LegacyPermission {
    /// Parses a permission from its storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        let mut parts = value.split(':');
        let (Some(application), Some(resource_type), Some(verb), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AppError::Validation(format!(
                "permission '{value}' must have the form 'application:resource_type:verb'"
            )));
        };

        if [application, resource_type, verb]
            .iter()
            .any(|part| part.trim().is_empty())
        {
            return Err(AppError::Validation(format!(
                "permission '{value}' contains an empty segment"
            )));
        }

        Ok(Self {
            application: application.to_owned(),
            resource_type: resource_type.to_owned(),
            verb: verb.to_owned(),
        })
    }

    /// Returns the owning application.
    #[must_use]
    pub fn application(&self) -> &str {
        self.application.as_str()
    }

    /// Returns the resource type segment.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        self.resource_type.as_str()
    }

    /// Returns the verb segment.
    #[must_use]
    pub fn verb(&self) -> &str {
        self.verb.as_str()
    }

    /// Returns whether this permission is an inventory group permission.
    #[must_use]
    pub fn is_inventory_groups(&self) -> bool {
        self.application == "inventory" && self.resource_type == "groups"
    }

    /// Translates the permission into its canonical relationship-model name.
    ///
    /// Inventory group permissions become `workspace_*` permissions.
    #[must_use]
    pub fn v2_permission(&self) -> String {
        if self.is_inventory_groups() {
            return canonical_name(format!("workspace_{}", self.verb).as_str());
        }

        canonical_name(format!("{}_{}_{}", self.application, self.resource_type, self.verb).as_str())
    }
}

impl FromStr for LegacyPermission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for LegacyPermission {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<LegacyPermission> for String {
    fn from(value: LegacyPermission) -> Self {
        value.to_string()
    }
}

impl Display for LegacyPermission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}:{}:{}",
            self.application, self.resource_type, self.verb
        )
    }
}

/// One permission granted by a legacy role, optionally scoped by resource definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Granted permission.
    pub permission: LegacyPermission,
    /// Attribute filters restricting the grant; empty means unscoped.
    #[serde(default)]
    pub resource_definitions: Vec<ResourceDefinition>,
}

impl AccessGrant {
    /// Creates an unscoped grant.
    #[must_use]
    pub fn unscoped(permission: LegacyPermission) -> Self {
        Self {
            permission,
            resource_definitions: Vec::new(),
        }
    }

    /// Creates a grant restricted by resource definitions.
    #[must_use]
    pub fn scoped(
        permission: LegacyPermission,
        resource_definitions: Vec<ResourceDefinition>,
    ) -> Self {
        Self {
            permission,
            resource_definitions,
        }
    }
}

/// Principal member of a legacy group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegacyPrincipal {
    /// Login name.
    pub username: String,
    /// Identity-provider user id, absent for principals never seen by the provider.
    pub user_id: Option<String>,
}

/// Legacy group a role is granted to through a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegacyGroup {
    /// Stable group identifier.
    pub id: String,
    /// Group members.
    #[serde(default)]
    pub principals: Vec<LegacyPrincipal>,
}

impl LegacyGroup {
    /// Returns user ids of members that carry one.
    pub fn member_user_ids(&self) -> impl Iterator<Item = &str> {
        self.principals
            .iter()
            .filter_map(|principal| principal.user_id.as_deref())
    }
}

/// The parts of a legacy role that drive translation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRoleDefinition {
    /// Ordered access grants.
    #[serde(default)]
    pub access: Vec<AccessGrant>,
    /// Groups the role is granted to.
    #[serde(default)]
    pub groups: Vec<LegacyGroup>,
}

/// Legacy attribute-based role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyRole {
    /// Stable role identifier.
    pub id: String,
    /// Role name in tenant scope.
    pub name: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Indicates a platform-defined system role.
    pub is_system: bool,
    /// Identifier of the external system the role is sourced from.
    pub external_role_id: Option<String>,
    /// Grants and groups.
    pub definition: LegacyRoleDefinition,
}

impl LegacyRole {
    /// Returns whether the role may seed the system role registry.
    #[must_use]
    pub fn is_registry_candidate(&self) -> bool {
        self.is_system && self.external_role_id.is_none()
    }
}
