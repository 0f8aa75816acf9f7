use std::fmt::{Display, Formatter};
use std::sync::Arc;

use tracing::{debug, info, warn};

use relata_core::{AppError, AppResult, RequestUser, TenantId};
use relata_domain::{
    AggregateType, BindingMapping, LegacyRole, LegacyRoleDefinition, OutboxEvent,
    ReplicationEvent, ReplicationEventType, RoleBinding,
};

use crate::replication_ports::{
    MappingChange, ReplicationRepository, ReplicationSettings, SystemRoleRepository,
    WorkspaceRepository, WorkspaceScope,
};
use crate::role_translation::{SystemRoleRegistry, TranslationContext, translate_role};

mod diff;

pub use diff::{diff_role_bindings, reconcile_ids};

/// Phase of a role dual write, reported when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DualWritePhase {
    LoadCurrent,
    ComputeNew,
    Persist,
}

impl Display for DualWritePhase {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            Self::LoadCurrent => "load_current",
            Self::ComputeNew => "compute_new",
            Self::Persist => "persist",
        })
    }
}

/// Relationship state last published for a role.
struct CurrentState {
    mapping: Option<BindingMapping>,
    bindings: Vec<RoleBinding>,
}

/// Target state of a role after the legacy write.
#[derive(Clone, Copy)]
enum TargetState<'a> {
    Live(&'a LegacyRoleDefinition),
    Deleted,
}

/// Replicates legacy role writes into the relationship model.
///
/// Callers must serialize writes per role, typically by locking the legacy role row, and
/// roll back the legacy write when an operation returns [`AppError::DualWrite`].
#[derive(Clone)]
pub struct RoleReplicationService {
    settings: ReplicationSettings,
    context: Arc<TranslationContext>,
    system_role_repository: Arc<dyn SystemRoleRepository>,
    workspace_repository: Arc<dyn WorkspaceRepository>,
    repository: Arc<dyn ReplicationRepository>,
}

impl RoleReplicationService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        settings: ReplicationSettings,
        context: Arc<TranslationContext>,
        system_role_repository: Arc<dyn SystemRoleRepository>,
        workspace_repository: Arc<dyn WorkspaceRepository>,
        repository: Arc<dyn ReplicationRepository>,
    ) -> Self {
        Self {
            settings,
            context,
            system_role_repository,
            workspace_repository,
            repository,
        }
    }

    /// Returns the shared translation context.
    #[must_use]
    pub fn context(&self) -> &Arc<TranslationContext> {
        &self.context
    }

    /// Publishes the difference between the role's last published state and its live state.
    ///
    /// Returns an empty event when replication is disabled.
    pub async fn replicate_role(
        &self,
        actor: &RequestUser,
        role: &LegacyRole,
        event_type: ReplicationEventType,
    ) -> AppResult<ReplicationEvent> {
        if !self.settings.enabled {
            return Ok(ReplicationEvent::default());
        }

        self.replicate(actor, role, event_type, TargetState::Live(&role.definition))
            .await
    }

    /// Publishes removal of everything last published for a deleted role.
    ///
    /// Returns an empty event when replication is disabled.
    pub async fn replicate_role_deletion(
        &self,
        actor: &RequestUser,
        role: &LegacyRole,
        event_type: ReplicationEventType,
    ) -> AppResult<ReplicationEvent> {
        if !self.settings.enabled {
            return Ok(ReplicationEvent::default());
        }

        self.replicate(actor, role, event_type, TargetState::Deleted)
            .await
    }

    async fn replicate(
        &self,
        actor: &RequestUser,
        role: &LegacyRole,
        event_type: ReplicationEventType,
        target: TargetState<'_>,
    ) -> AppResult<ReplicationEvent> {
        info!(
            role_id = %role.id,
            tenant_id = %role.tenant_id,
            actor = actor.username(),
            system_actor = actor.is_system(),
            active_actor = actor.is_active(),
            event_type = event_type.as_str(),
            "[dual write] replicating role '{}'",
            role.name
        );

        let (scope, registry) = self
            .translation_inputs(role.tenant_id)
            .await
            .map_err(|error| dual_write_failed(DualWritePhase::LoadCurrent, role, error))?;

        let current = self
            .load_current(role, &scope, &registry)
            .await
            .map_err(|error| dual_write_failed(DualWritePhase::LoadCurrent, role, error))?;

        let new_bindings = match target {
            TargetState::Live(definition) => self
                .compute_new(role, definition, current.mapping.as_ref(), &scope, &registry)
                .map_err(|error| dual_write_failed(DualWritePhase::ComputeNew, role, error))?,
            TargetState::Deleted => Vec::new(),
        };

        let payload = diff_role_bindings(&current.bindings, &new_bindings);
        let change = match target {
            TargetState::Live(definition) => MappingChange::Upsert(BindingMapping::new(
                role.id.as_str(),
                definition.clone(),
                &new_bindings,
            )),
            TargetState::Deleted => MappingChange::Remove {
                role_id: role.id.clone(),
            },
        };

        self.persist(role, event_type, change, &payload)
            .await
            .map_err(|error| dual_write_failed(DualWritePhase::Persist, role, error))?;

        Ok(payload)
    }

    async fn translation_inputs(
        &self,
        tenant_id: TenantId,
    ) -> AppResult<(WorkspaceScope, Arc<SystemRoleRegistry>)> {
        let scope = self
            .workspace_repository
            .find_workspace_scope(tenant_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("workspaces for tenant '{tenant_id}'"))
            })?;
        let registry = self
            .context
            .system_roles(self.system_role_repository.as_ref())
            .await?;

        Ok((scope, registry))
    }

    async fn load_current(
        &self,
        role: &LegacyRole,
        scope: &WorkspaceScope,
        registry: &SystemRoleRegistry,
    ) -> AppResult<CurrentState> {
        let Some(mapping) = self
            .repository
            .find_binding_mapping(role.tenant_id, role.id.as_str())
            .await?
        else {
            warn!(
                role_id = %role.id,
                tenant_id = %role.tenant_id,
                "[dual write] binding mapping not found for role '{}', assuming no current relations exist; if this is not the case, relations are inconsistent",
                role.name
            );
            return Ok(CurrentState {
                mapping: None,
                bindings: Vec::new(),
            });
        };

        info!(
            role_id = %role.id,
            published_bindings = mapping.bindings().len(),
            "[dual write] rebuilding current relations from binding mapping"
        );
        let bindings = translate_role(
            role.id.as_str(),
            mapping.definition(),
            scope,
            &self.settings,
            registry,
            &self.context,
        )?;
        let bindings = reconcile_ids(bindings, Some(&mapping));

        Ok(CurrentState {
            mapping: Some(mapping),
            bindings,
        })
    }

    fn compute_new(
        &self,
        role: &LegacyRole,
        definition: &LegacyRoleDefinition,
        mapping: Option<&BindingMapping>,
        scope: &WorkspaceScope,
        registry: &SystemRoleRegistry,
    ) -> AppResult<Vec<RoleBinding>> {
        info!(
            role_id = %role.id,
            "[dual write] generating new relations"
        );
        let bindings = translate_role(
            role.id.as_str(),
            definition,
            scope,
            &self.settings,
            registry,
            &self.context,
        )?;
        let bindings = reconcile_ids(bindings, mapping);

        for binding in &bindings {
            debug!(
                binding_id = binding.id(),
                origin_role_id = binding.origin_role_id(),
                system_role = binding.role().is_system(),
                resources = binding.resources().len(),
                group_members = binding
                    .groups()
                    .iter()
                    .map(|group| group.member_user_ids().len())
                    .sum::<usize>(),
                "[dual write] generated role binding"
            );
        }

        Ok(bindings)
    }

    async fn persist(
        &self,
        role: &LegacyRole,
        event_type: ReplicationEventType,
        change: MappingChange,
        payload: &ReplicationEvent,
    ) -> AppResult<()> {
        let event = (!payload.is_empty()).then(|| OutboxEvent {
            aggregate_type: AggregateType::Role,
            aggregate_id: role.id.clone(),
            event_type,
            payload: payload.clone(),
        });

        info!(
            role_id = %role.id,
            relations_to_add = payload.relations_to_add.len(),
            relations_to_remove = payload.relations_to_remove.len(),
            publishes_event = event.is_some(),
            "[dual write] saving binding mapping and replication event"
        );

        self.repository
            .commit_role_replication(role.tenant_id, change, event)
            .await
    }
}

fn dual_write_failed(phase: DualWritePhase, role: &LegacyRole, error: AppError) -> AppError {
    warn!(
        role_id = %role.id,
        tenant_id = %role.tenant_id,
        phase = %phase,
        error = %error,
        "[dual write] role replication failed"
    );
    AppError::dual_write(error)
}
