use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use relata_application::{WorkspaceRepository, WorkspaceScope};
use relata_core::{AppError, AppResult, TenantId};

/// PostgreSQL-backed workspace lookup.
#[derive(Clone)]
pub struct PostgresWorkspaceRepository {
    pool: PgPool,
}

impl PostgresWorkspaceRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct WorkspaceRow {
    id: String,
    kind: String,
}

#[async_trait]
impl WorkspaceRepository for PostgresWorkspaceRepository {
    async fn find_workspace_scope(&self, tenant_id: TenantId) -> AppResult<Option<WorkspaceScope>> {
        let rows = sqlx::query_as::<_, WorkspaceRow>(
            r#"
            SELECT id, kind
            FROM workspaces
            WHERE tenant_id = $1 AND kind IN ('root', 'default')
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load workspaces for tenant '{tenant_id}': {error}"
            ))
        })?;

        let find = |kind: &str| {
            rows.iter()
                .find(|row| row.kind == kind)
                .map(|row| row.id.clone())
        };

        Ok(find("root")
            .zip(find("default"))
            .map(|(root_workspace_id, default_workspace_id)| WorkspaceScope {
                root_workspace_id,
                default_workspace_id,
            }))
    }
}
