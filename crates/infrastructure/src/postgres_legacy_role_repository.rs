use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use relata_application::{LegacyRoleRepository, SystemRoleRepository};
use relata_core::{AppError, AppResult, TenantId};
use relata_domain::{
    AccessGrant, LegacyGroup, LegacyPermission, LegacyPrincipal, LegacyRole,
    LegacyRoleDefinition, ResourceDefinition, ResourceOperation,
};

/// PostgreSQL-backed reader of legacy roles, their grants and their groups.
#[derive(Clone)]
pub struct PostgresLegacyRoleRepository {
    pool: PgPool,
}

impl PostgresLegacyRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: String,
    tenant_id: uuid::Uuid,
    name: String,
    is_system: bool,
    external_role_id: Option<String>,
}

#[derive(Debug, FromRow)]
struct AccessRow {
    role_id: String,
    access_id: i64,
    permission: String,
    attribute_key: Option<String>,
    operation: Option<String>,
    value: Option<String>,
}

#[derive(Debug, FromRow)]
struct GroupRow {
    role_id: String,
    group_id: String,
    username: Option<String>,
    user_id: Option<String>,
}

#[async_trait]
impl SystemRoleRepository for PostgresLegacyRoleRepository {
    async fn list_system_roles(&self) -> AppResult<Vec<LegacyRole>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, tenant_id, name, is_system, external_role_id
            FROM legacy_roles
            WHERE is_system = true
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list system roles: {error}")))?;

        self.hydrate(rows).await
    }
}

#[async_trait]
impl LegacyRoleRepository for PostgresLegacyRoleRepository {
    async fn list_roles(&self, tenant_id: Option<TenantId>) -> AppResult<Vec<LegacyRole>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, tenant_id, name, is_system, external_role_id
            FROM legacy_roles
            WHERE is_system = false
                AND ($1::uuid IS NULL OR tenant_id = $1)
            ORDER BY tenant_id, created_at, id
            "#,
        )
        .bind(tenant_id.map(|tenant_id| tenant_id.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list legacy roles: {error}")))?;

        self.hydrate(rows).await
    }

    async fn find_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<LegacyRole>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, tenant_id, name, is_system, external_role_id
            FROM legacy_roles
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find legacy role '{role_id}' in tenant '{tenant_id}': {error}"
            ))
        })?;

        Ok(self.hydrate(rows).await?.into_iter().next())
    }
}

impl PostgresLegacyRoleRepository {
    async fn hydrate(&self, rows: Vec<RoleRow>) -> AppResult<Vec<LegacyRole>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let role_ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let access_rows = sqlx::query_as::<_, AccessRow>(
            r#"
            SELECT
                access.role_id,
                access.id AS access_id,
                access.permission,
                definitions.attribute_key,
                definitions.operation,
                definitions.value
            FROM legacy_access AS access
            LEFT JOIN legacy_resource_definitions AS definitions
                ON definitions.access_id = access.id
            WHERE access.role_id = ANY($1)
            ORDER BY access.role_id, access.position, definitions.id
            "#,
        )
        .bind(&role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load legacy access: {error}")))?;

        let group_rows = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT
                group_roles.role_id,
                group_roles.group_id,
                principals.username,
                principals.user_id
            FROM legacy_group_roles AS group_roles
            LEFT JOIN legacy_group_principals AS principals
                ON principals.group_id = group_roles.group_id
            WHERE group_roles.role_id = ANY($1)
            ORDER BY group_roles.role_id, group_roles.group_id, principals.username
            "#,
        )
        .bind(&role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load legacy groups: {error}")))?;

        let mut access = aggregate_access(access_rows)?;
        let mut groups = aggregate_groups(group_rows);

        Ok(rows
            .into_iter()
            .map(|row| LegacyRole {
                definition: LegacyRoleDefinition {
                    access: access.remove(&row.id).unwrap_or_default(),
                    groups: groups.remove(&row.id).unwrap_or_default(),
                },
                id: row.id,
                name: row.name,
                tenant_id: TenantId::from_uuid(row.tenant_id),
                is_system: row.is_system,
                external_role_id: row.external_role_id,
            })
            .collect())
    }
}

fn aggregate_access(rows: Vec<AccessRow>) -> AppResult<HashMap<String, Vec<AccessGrant>>> {
    let mut grants_by_role: HashMap<String, Vec<AccessGrant>> = HashMap::new();
    let mut last_access_id = None;

    for row in rows {
        let grants = grants_by_role.entry(row.role_id).or_default();
        if last_access_id != Some(row.access_id) {
            grants.push(AccessGrant::unscoped(LegacyPermission::from_str(
                row.permission.as_str(),
            )?));
            last_access_id = Some(row.access_id);
        }

        if let (Some(key), Some(operation), Some(value), Some(grant)) =
            (row.attribute_key, row.operation, row.value, grants.last_mut())
        {
            grant.resource_definitions.push(ResourceDefinition::new(
                key,
                ResourceOperation::from_str(operation.as_str())?,
                value,
            )?);
        }
    }

    Ok(grants_by_role)
}

fn aggregate_groups(rows: Vec<GroupRow>) -> HashMap<String, Vec<LegacyGroup>> {
    let mut groups_by_role: HashMap<String, BTreeMap<String, Vec<LegacyPrincipal>>> =
        HashMap::new();

    for row in rows {
        let principals = groups_by_role
            .entry(row.role_id)
            .or_default()
            .entry(row.group_id)
            .or_default();
        if let Some(username) = row.username {
            principals.push(LegacyPrincipal {
                username,
                user_id: row.user_id,
            });
        }
    }

    groups_by_role
        .into_iter()
        .map(|(role_id, groups)| {
            let groups = groups
                .into_iter()
                .map(|(id, principals)| LegacyGroup { id, principals })
                .collect();
            (role_id, groups)
        })
        .collect()
}
