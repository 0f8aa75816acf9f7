use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use relata_application::{MappingChange, ReplicationRepository};
use relata_core::{AppResult, TenantId};
use relata_domain::{BindingMapping, OutboxEvent};

/// Outbox row as seen by change-data-capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutboxEvent {
    /// Outbox row id.
    pub id: Uuid,
    /// Tenant the event belongs to.
    pub tenant_id: TenantId,
    /// Published event.
    pub event: OutboxEvent,
    /// Insert time of the row.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ReplicationState {
    mappings: HashMap<(TenantId, String), BindingMapping>,
    outbox: Vec<CapturedOutboxEvent>,
    captured: Vec<CapturedOutboxEvent>,
}

impl ReplicationState {
    fn write_outbox_event(&mut self, tenant_id: TenantId, event: OutboxEvent) {
        let row = CapturedOutboxEvent {
            id: Uuid::new_v4(),
            tenant_id,
            event,
            created_at: Utc::now(),
        };
        let row_id = row.id;

        self.outbox.push(row.clone());
        self.captured.push(row);
        self.outbox.retain(|stored| stored.id != row_id);
    }
}

/// In-memory binding mapping store and outbox.
///
/// Every outbox insert is recorded in a captured log, the way a change-data-capture reader
/// would see it, before the row is deleted again.
#[derive(Debug, Default)]
pub struct InMemoryReplicationRepository {
    state: RwLock<ReplicationState>,
}

impl InMemoryReplicationRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every outbox row ever inserted, in insertion order.
    pub async fn captured_events(&self) -> Vec<CapturedOutboxEvent> {
        self.state.read().await.captured.clone()
    }

    /// Returns the number of rows left in the outbox table.
    pub async fn outbox_len(&self) -> usize {
        self.state.read().await.outbox.len()
    }
}

#[async_trait]
impl ReplicationRepository for InMemoryReplicationRepository {
    async fn find_binding_mapping(
        &self,
        tenant_id: TenantId,
        role_id: &str,
    ) -> AppResult<Option<BindingMapping>> {
        Ok(self
            .state
            .read()
            .await
            .mappings
            .get(&(tenant_id, role_id.to_owned()))
            .cloned())
    }

    async fn commit_role_replication(
        &self,
        tenant_id: TenantId,
        change: MappingChange,
        event: Option<OutboxEvent>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;

        match change {
            MappingChange::Upsert(mapping) => {
                state
                    .mappings
                    .insert((tenant_id, mapping.role_id().to_owned()), mapping);
            }
            MappingChange::Remove { role_id } => {
                state.mappings.remove(&(tenant_id, role_id));
            }
        }

        if let Some(event) = event {
            state.write_outbox_event(tenant_id, event);
        }

        Ok(())
    }

    async fn publish_event(&self, tenant_id: TenantId, event: OutboxEvent) -> AppResult<()> {
        self.state.write().await.write_outbox_event(tenant_id, event);
        Ok(())
    }
}
