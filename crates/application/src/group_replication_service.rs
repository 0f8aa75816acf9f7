use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use relata_core::{AppError, AppResult, RequestUser, TenantId};
use relata_domain::{
    AggregateType, LegacyPrincipal, ObjectReference, ObjectType, OutboxEvent, Relationship,
    ReplicationEvent, ReplicationEventType, SubjectReference,
};

use crate::replication_ports::{ReplicationRepository, ReplicationSettings};

/// Replicates legacy group membership changes as `member` tuples.
#[derive(Clone)]
pub struct GroupReplicationService {
    settings: ReplicationSettings,
    repository: Arc<dyn ReplicationRepository>,
}

impl GroupReplicationService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(settings: ReplicationSettings, repository: Arc<dyn ReplicationRepository>) -> Self {
        Self {
            settings,
            repository,
        }
    }

    /// Publishes membership tuples for principals added to a group.
    pub async fn replicate_new_principals(
        &self,
        actor: &RequestUser,
        tenant_id: TenantId,
        group_id: &str,
        principals: &[LegacyPrincipal],
    ) -> AppResult<ReplicationEvent> {
        if !self.settings.enabled {
            return Ok(ReplicationEvent::default());
        }

        let payload = ReplicationEvent {
            relations_to_add: self.member_relationships(group_id, principals),
            relations_to_remove: Vec::new(),
        };
        self.publish(
            actor,
            tenant_id,
            group_id,
            ReplicationEventType::AddPrincipalsToGroup,
            payload,
        )
        .await
    }

    /// Publishes removal of membership tuples for principals removed from a group.
    pub async fn replicate_removed_principals(
        &self,
        actor: &RequestUser,
        tenant_id: TenantId,
        group_id: &str,
        principals: &[LegacyPrincipal],
    ) -> AppResult<ReplicationEvent> {
        if !self.settings.enabled {
            return Ok(ReplicationEvent::default());
        }

        let payload = ReplicationEvent {
            relations_to_add: Vec::new(),
            relations_to_remove: self.member_relationships(group_id, principals),
        };
        self.publish(
            actor,
            tenant_id,
            group_id,
            ReplicationEventType::RemovePrincipalsFromGroup,
            payload,
        )
        .await
    }

    fn member_relationships(
        &self,
        group_id: &str,
        principals: &[LegacyPrincipal],
    ) -> Vec<Relationship> {
        let group = ObjectReference::new(ObjectType::rbac("group"), group_id);
        let user_ids: BTreeSet<&str> = principals
            .iter()
            .filter_map(|principal| {
                let user_id = principal.user_id.as_deref();
                if user_id.is_none() {
                    warn!(
                        group_id,
                        username = principal.username.as_str(),
                        "[dual write] principal has no user id, skipping group membership"
                    );
                }
                user_id
            })
            .collect();

        user_ids
            .into_iter()
            .map(|user_id| {
                Relationship::new(
                    group.clone(),
                    "member",
                    SubjectReference::direct(ObjectReference::new(
                        ObjectType::rbac("principal"),
                        format!("{}/{user_id}", self.settings.principal_user_domain),
                    )),
                )
            })
            .collect()
    }

    async fn publish(
        &self,
        actor: &RequestUser,
        tenant_id: TenantId,
        group_id: &str,
        event_type: ReplicationEventType,
        payload: ReplicationEvent,
    ) -> AppResult<ReplicationEvent> {
        info!(
            group_id,
            tenant_id = %tenant_id,
            actor = actor.username(),
            event_type = event_type.as_str(),
            relations_to_add = payload.relations_to_add.len(),
            relations_to_remove = payload.relations_to_remove.len(),
            "[dual write] replicating group membership"
        );

        if payload.is_empty() {
            return Ok(payload);
        }

        let event = OutboxEvent {
            aggregate_type: AggregateType::Group,
            aggregate_id: group_id.to_owned(),
            event_type,
            payload: payload.clone(),
        };
        self.repository
            .publish_event(tenant_id, event)
            .await
            .map_err(|error| {
                warn!(
                    group_id,
                    tenant_id = %tenant_id,
                    error = %error,
                    "[dual write] group replication failed"
                );
                AppError::dual_write(error)
            })?;

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use relata_core::{AppError, AppResult, RequestUser, TenantId};
    use relata_domain::{
        AggregateType, BindingMapping, LegacyPrincipal, OutboxEvent, ReplicationEventType,
    };

    use crate::replication_ports::{MappingChange, ReplicationRepository, ReplicationSettings};

    use super::GroupReplicationService;

    #[derive(Default)]
    struct FakeReplicationRepository {
        published: Mutex<Vec<OutboxEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl ReplicationRepository for FakeReplicationRepository {
        async fn find_binding_mapping(
            &self,
            _tenant_id: TenantId,
            _role_id: &str,
        ) -> AppResult<Option<BindingMapping>> {
            Ok(None)
        }

        async fn commit_role_replication(
            &self,
            _tenant_id: TenantId,
            _change: MappingChange,
            _event: Option<OutboxEvent>,
        ) -> AppResult<()> {
            Err(AppError::Internal("not used by group replication".to_owned()))
        }

        async fn publish_event(&self, _tenant_id: TenantId, event: OutboxEvent) -> AppResult<()> {
            if self.fail {
                return Err(AppError::Internal("outbox unavailable".to_owned()));
            }
            self.published.lock().await.push(event);
            Ok(())
        }
    }

    fn principal(username: &str, user_id: Option<&str>) -> LegacyPrincipal {
        LegacyPrincipal {
            username: username.to_owned(),
            user_id: user_id.map(str::to_owned),
        }
    }

    fn actor() -> RequestUser {
        RequestUser::new("alice", Some("acct-1".to_owned())).with_admin(true)
    }

    #[tokio::test]
    async fn added_principals_become_member_tuples() {
        let repository = Arc::new(FakeReplicationRepository::default());
        let service =
            GroupReplicationService::new(ReplicationSettings::with_enabled(true), repository.clone());

        let event = service
            .replicate_new_principals(
                &actor(),
                TenantId::new(),
                "g1",
                &[principal("bob", Some("u-2")), principal("carol", Some("u-3"))],
            )
            .await
            .unwrap_or_else(|error| panic!("{error}"));

        let added: Vec<String> = event
            .relations_to_add
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            added,
            vec![
                "rbac/group:g1#member@rbac/principal:redhat/u-2".to_owned(),
                "rbac/group:g1#member@rbac/principal:redhat/u-3".to_owned(),
            ]
        );
        assert!(event.relations_to_remove.is_empty());

        let published = repository.published.lock().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].aggregate_type, AggregateType::Group);
        assert_eq!(published[0].aggregate_id, "g1");
        assert_eq!(
            published[0].event_type,
            ReplicationEventType::AddPrincipalsToGroup
        );
    }

    #[tokio::test]
    async fn removed_principals_use_configured_domain() {
        let repository = Arc::new(FakeReplicationRepository::default());
        let mut settings = ReplicationSettings::with_enabled(true);
        settings.principal_user_domain = "example".to_owned();
        let service = GroupReplicationService::new(settings, repository.clone());

        let event = service
            .replicate_removed_principals(
                &actor(),
                TenantId::new(),
                "g1",
                &[principal("bob", Some("u-2"))],
            )
            .await
            .unwrap_or_else(|error| panic!("{error}"));

        assert!(event.relations_to_add.is_empty());
        assert_eq!(
            event.relations_to_remove[0].to_string(),
            "rbac/group:g1#member@rbac/principal:example/u-2"
        );
        assert_eq!(
            repository.published.lock().await[0].event_type,
            ReplicationEventType::RemovePrincipalsFromGroup
        );
    }

    #[tokio::test]
    async fn principals_without_user_id_publish_nothing() {
        let repository = Arc::new(FakeReplicationRepository::default());
        let service =
            GroupReplicationService::new(ReplicationSettings::with_enabled(true), repository.clone());

        let event = service
            .replicate_new_principals(&actor(), TenantId::new(), "g1", &[principal("bob", None)])
            .await;

        assert!(event.is_ok());
        assert!(event.unwrap_or_default().is_empty());
        assert!(repository.published.lock().await.is_empty());
    }

    #[tokio::test]
    async fn disabled_replication_publishes_nothing() {
        let repository = Arc::new(FakeReplicationRepository::default());
        let service = GroupReplicationService::new(
            ReplicationSettings::with_enabled(false),
            repository.clone(),
        );

        let event = service
            .replicate_new_principals(
                &actor(),
                TenantId::new(),
                "g1",
                &[principal("bob", Some("u-2"))],
            )
            .await;

        assert!(event.unwrap_or_default().is_empty());
        assert!(repository.published.lock().await.is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_reported_as_dual_write_error() {
        let repository = Arc::new(FakeReplicationRepository {
            fail: true,
            ..FakeReplicationRepository::default()
        });
        let service = GroupReplicationService::new(ReplicationSettings::with_enabled(true), repository);

        let result = service
            .replicate_new_principals(
                &actor(),
                TenantId::new(),
                "g1",
                &[principal("bob", Some("u-2"))],
            )
            .await;

        assert!(matches!(result, Err(ref error) if error.is_dual_write()));
    }
}
