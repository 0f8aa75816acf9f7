use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use relata_application::{MappingChange, ReplicationRepository};
use relata_core::{AppError, AppResult, TenantId};
use relata_domain::{BindingMapping, OutboxEvent};

/// PostgreSQL-backed binding mapping store and outbox writer.
#[derive(Clone)]
pub struct PostgresReplicationRepository {
    pool: PgPool,
}

impl PostgresReplicationRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self, tenant_id: TenantId) -> AppResult<Transaction<'_, Postgres>> {
        self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start replication transaction for tenant '{tenant_id}': {error}"
            ))
        })
    }
}

#[async_trait]
impl ReplicationRepository for PostgresReplicationRepository {
    async fn find_binding_mapping(
        &self,
        tenant_id: TenantId,
        role_id: &str,
    ) -> AppResult<Option<BindingMapping>> {
        let document = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT mappings
            FROM relation_binding_mappings
            WHERE tenant_id = $1 AND role_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load binding mapping for role '{role_id}' in tenant '{tenant_id}': {error}"
            ))
        })?;

        document
            .map(|document| {
                serde_json::from_value::<BindingMapping>(document).map_err(|error| {
                    AppError::Internal(format!(
                        "failed to decode binding mapping for role '{role_id}' in tenant '{tenant_id}': {error}"
                    ))
                })
            })
            .transpose()
    }

    async fn commit_role_replication(
        &self,
        tenant_id: TenantId,
        change: MappingChange,
        event: Option<OutboxEvent>,
    ) -> AppResult<()> {
        let mut transaction = self.begin(tenant_id).await?;

        match change {
            MappingChange::Upsert(mapping) => {
                upsert_mapping(&mut transaction, tenant_id, &mapping).await?;
            }
            MappingChange::Remove { role_id } => {
                remove_mapping(&mut transaction, tenant_id, role_id.as_str()).await?;
            }
        }

        if let Some(event) = event {
            write_outbox_event(&mut transaction, tenant_id, &event).await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit role replication in tenant '{tenant_id}': {error}"
            ))
        })
    }

    async fn publish_event(&self, tenant_id: TenantId, event: OutboxEvent) -> AppResult<()> {
        let mut transaction = self.begin(tenant_id).await?;
        write_outbox_event(&mut transaction, tenant_id, &event).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit replication event for {} '{}' in tenant '{tenant_id}': {error}",
                event.aggregate_type.as_str(),
                event.aggregate_id
            ))
        })
    }
}

async fn upsert_mapping(
    transaction: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    mapping: &BindingMapping,
) -> AppResult<()> {
    let document = serde_json::to_value(mapping).map_err(|error| {
        AppError::Internal(format!(
            "failed to serialize binding mapping for role '{}': {error}",
            mapping.role_id()
        ))
    })?;

    sqlx::query(
        r#"
        INSERT INTO relation_binding_mappings (tenant_id, role_id, mappings, updated_at)
        VALUES ($1, $2, $3, now())
        ON CONFLICT (tenant_id, role_id)
        DO UPDATE SET mappings = EXCLUDED.mappings, updated_at = now()
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(mapping.role_id())
    .bind(document)
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to save binding mapping for role '{}' in tenant '{tenant_id}': {error}",
            mapping.role_id()
        ))
    })?;

    Ok(())
}

async fn remove_mapping(
    transaction: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    role_id: &str,
) -> AppResult<()> {
    sqlx::query(
        r#"
        DELETE FROM relation_binding_mappings
        WHERE tenant_id = $1 AND role_id = $2
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(role_id)
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to remove binding mapping for role '{role_id}' in tenant '{tenant_id}': {error}"
        ))
    })?;

    Ok(())
}

/// Inserts the event into the outbox and deletes it again inside the same transaction.
async fn write_outbox_event(
    transaction: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    event: &OutboxEvent,
) -> AppResult<()> {
    let outbox_id = Uuid::new_v4();
    let payload = event.payload_json()?;

    sqlx::query(
        r#"
        INSERT INTO relation_outbox (
            id,
            tenant_id,
            aggregate_type,
            aggregate_id,
            event_type,
            payload,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(outbox_id)
    .bind(tenant_id.as_uuid())
    .bind(event.aggregate_type.as_str())
    .bind(event.aggregate_id.as_str())
    .bind(event.event_type.as_str())
    .bind(payload)
    .bind(Utc::now())
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to write outbox event for {} '{}' in tenant '{tenant_id}': {error}",
            event.aggregate_type.as_str(),
            event.aggregate_id
        ))
    })?;

    sqlx::query(
        r#"
        DELETE FROM relation_outbox
        WHERE id = $1
        "#,
    )
    .bind(outbox_id)
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to clear outbox event '{outbox_id}' in tenant '{tenant_id}': {error}"
        ))
    })?;

    debug!(
        outbox_id = %outbox_id,
        tenant_id = %tenant_id,
        aggregate_type = event.aggregate_type.as_str(),
        aggregate_id = event.aggregate_id.as_str(),
        event_type = event.event_type.as_str(),
        "outbox event written"
    );

    Ok(())
}
