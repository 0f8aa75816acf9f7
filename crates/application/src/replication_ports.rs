use std::collections::BTreeSet;

use async_trait::async_trait;

use relata_core::{AppResult, TenantId};
use relata_domain::{BindingMapping, LegacyRole, OutboxEvent};

/// Legacy applications whose permissions are no longer replicated.
pub const DEFAULT_DISABLED_APPLICATIONS: &[&str] =
    &["cost-management", "playbook-dispatcher", "approval"];

/// Domain prefixed to principal user ids in relationship subjects.
pub const DEFAULT_PRINCIPAL_USER_DOMAIN: &str = "redhat";

/// Settings that shape replication into the relationship model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationSettings {
    /// Gates every dual-write operation.
    pub enabled: bool,
    /// Domain prefixed to principal user ids.
    pub principal_user_domain: String,
    /// Legacy applications skipped during translation.
    pub disabled_applications: BTreeSet<String>,
}

impl ReplicationSettings {
    /// Returns default settings with the feature flag set as given.
    #[must_use]
    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            principal_user_domain: DEFAULT_PRINCIPAL_USER_DOMAIN.to_owned(),
            disabled_applications: DEFAULT_DISABLED_APPLICATIONS
                .iter()
                .map(|application| (*application).to_owned())
                .collect(),
        }
    }
}

/// Workspaces unscoped and null-scoped grants are bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceScope {
    /// Root workspace of the tenant.
    pub root_workspace_id: String,
    /// Default workspace of the tenant.
    pub default_workspace_id: String,
}

/// Binding mapping write applied together with the outbox event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingChange {
    /// Inserts the mapping or replaces the existing one in place.
    Upsert(BindingMapping),
    /// Removes the mapping of a deleted role.
    Remove {
        /// Legacy role id.
        role_id: String,
    },
}

/// Repository port for legacy roles flagged as system roles.
#[async_trait]
pub trait SystemRoleRepository: Send + Sync {
    /// Lists system roles in registry order.
    async fn list_system_roles(&self) -> AppResult<Vec<LegacyRole>>;
}

/// Repository port for reading legacy roles.
#[async_trait]
pub trait LegacyRoleRepository: Send + Sync {
    /// Lists non-system roles, optionally restricted to one tenant.
    async fn list_roles(&self, tenant_id: Option<TenantId>) -> AppResult<Vec<LegacyRole>>;

    /// Finds one role in tenant scope.
    async fn find_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<LegacyRole>>;
}

/// Repository port for tenant workspaces.
#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    /// Finds the root and default workspaces of a tenant.
    async fn find_workspace_scope(&self, tenant_id: TenantId) -> AppResult<Option<WorkspaceScope>>;
}

/// Repository port for binding mappings and the outbox.
///
/// Implementations insert each outbox row and delete it again in the same transaction, so
/// change-data-capture sees the event while the table stays empty.
#[async_trait]
pub trait ReplicationRepository: Send + Sync {
    /// Finds the mapping last published for a role.
    async fn find_binding_mapping(
        &self,
        tenant_id: TenantId,
        role_id: &str,
    ) -> AppResult<Option<BindingMapping>>;

    /// Applies the mapping change and publishes the event atomically.
    async fn commit_role_replication(
        &self,
        tenant_id: TenantId,
        change: MappingChange,
        event: Option<OutboxEvent>,
    ) -> AppResult<()>;

    /// Publishes an event that has no mapping counterpart.
    async fn publish_event(&self, tenant_id: TenantId, event: OutboxEvent) -> AppResult<()>;
}
