use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use relata_application::{
    LegacyRoleRepository, SystemRoleRepository, WorkspaceRepository, WorkspaceScope,
};
use relata_core::{AppError, AppResult, TenantId};
use relata_domain::LegacyRole;

/// In-memory legacy role and workspace store.
#[derive(Debug, Default)]
pub struct InMemoryLegacyRoleRepository {
    roles: RwLock<Vec<LegacyRole>>,
    workspaces: RwLock<HashMap<TenantId, WorkspaceScope>>,
}

impl InMemoryLegacyRoleRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a role, replacing any role with the same id.
    pub async fn save_role(&self, role: LegacyRole) {
        let mut roles = self.roles.write().await;
        match roles.iter_mut().find(|stored| stored.id == role.id) {
            Some(stored) => *stored = role,
            None => roles.push(role),
        }
    }

    /// Removes a role.
    pub async fn remove_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<LegacyRole> {
        let mut roles = self.roles.write().await;
        let position = roles
            .iter()
            .position(|role| role.tenant_id == tenant_id && role.id == role_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "legacy role '{role_id}' not found for tenant '{tenant_id}'"
                ))
            })?;

        Ok(roles.remove(position))
    }

    /// Sets the root and default workspaces of a tenant.
    pub async fn save_workspace_scope(&self, tenant_id: TenantId, scope: WorkspaceScope) {
        self.workspaces.write().await.insert(tenant_id, scope);
    }
}

#[async_trait]
impl SystemRoleRepository for InMemoryLegacyRoleRepository {
    async fn list_system_roles(&self) -> AppResult<Vec<LegacyRole>> {
        Ok(self
            .roles
            .read()
            .await
            .iter()
            .filter(|role| role.is_system)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LegacyRoleRepository for InMemoryLegacyRoleRepository {
    async fn list_roles(&self, tenant_id: Option<TenantId>) -> AppResult<Vec<LegacyRole>> {
        Ok(self
            .roles
            .read()
            .await
            .iter()
            .filter(|role| !role.is_system)
            .filter(|role| tenant_id.is_none_or(|tenant_id| role.tenant_id == tenant_id))
            .cloned()
            .collect())
    }

    async fn find_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<LegacyRole>> {
        Ok(self
            .roles
            .read()
            .await
            .iter()
            .find(|role| role.tenant_id == tenant_id && role.id == role_id)
            .cloned())
    }
}

#[async_trait]
impl WorkspaceRepository for InMemoryLegacyRoleRepository {
    async fn find_workspace_scope(&self, tenant_id: TenantId) -> AppResult<Option<WorkspaceScope>> {
        Ok(self.workspaces.read().await.get(&tenant_id).cloned())
    }
}
