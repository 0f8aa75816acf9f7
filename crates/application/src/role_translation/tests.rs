use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

use relata_core::{AppResult, TenantId};
use relata_domain::{
    AccessGrant, BoundResource, LegacyGroup, LegacyPermission, LegacyPrincipal, LegacyRole,
    LegacyRoleDefinition, ResourceDefinition, ResourceOperation, RoleKey, V2Role,
};

use crate::replication_ports::{ReplicationSettings, SystemRoleRepository, WorkspaceScope};

use super::{
    RoleAssignments, SystemRoleRegistry, TranslationContext, bind_permissions,
    generate_role_bindings, match_system_roles, translate_role,
};

fn scope() -> WorkspaceScope {
    WorkspaceScope {
        root_workspace_id: "root".to_owned(),
        default_workspace_id: "default".to_owned(),
    }
}

fn permission(value: &str) -> LegacyPermission {
    LegacyPermission::parse(value).unwrap_or_else(|error| panic!("{error}"))
}

fn permissions(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

fn resource_definition(key: &str, operation: ResourceOperation, value: &str) -> ResourceDefinition {
    ResourceDefinition::new(key, operation, value).unwrap_or_else(|error| panic!("{error}"))
}

fn definition(access: Vec<AccessGrant>) -> LegacyRoleDefinition {
    LegacyRoleDefinition {
        access,
        groups: Vec::new(),
    }
}

fn group(id: &str, user_ids: &[&str]) -> LegacyGroup {
    LegacyGroup {
        id: id.to_owned(),
        principals: user_ids
            .iter()
            .map(|user_id| LegacyPrincipal {
                username: format!("user-{user_id}"),
                user_id: Some((*user_id).to_owned()),
            })
            .collect(),
    }
}

fn registry(roles: &[(&str, &[&str])]) -> SystemRoleRegistry {
    let mut registry = SystemRoleRegistry::new();
    for (id, role_permissions) in roles {
        registry.insert(V2Role::system(*id, permissions(role_permissions)));
    }
    registry
}

fn groupings_on_root(values: &[&str]) -> super::PermissionGroupings {
    BTreeMap::from([(BoundResource::workspace("root"), permissions(values))])
}

fn structural(assignments: &RoleAssignments) -> BTreeMap<RoleKey, BTreeSet<BoundResource>> {
    assignments
        .iter()
        .map(|(role, resources)| (role.key(), resources.clone()))
        .collect()
}

fn legacy_system_role(id: &str, grants: &[&str], external_role_id: Option<&str>) -> LegacyRole {
    LegacyRole {
        id: id.to_owned(),
        name: id.to_owned(),
        tenant_id: TenantId::new(),
        is_system: true,
        external_role_id: external_role_id.map(str::to_owned),
        definition: definition(
            grants
                .iter()
                .map(|grant| AccessGrant::unscoped(permission(grant)))
                .collect(),
        ),
    }
}

struct CountingSystemRoleRepository {
    roles: Vec<LegacyRole>,
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingSystemRoleRepository {
    fn new(roles: Vec<LegacyRole>, delay: Duration) -> Self {
        Self {
            roles,
            calls: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl SystemRoleRepository for CountingSystemRoleRepository {
    async fn list_system_roles(&self) -> AppResult<Vec<LegacyRole>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.roles.clone())
    }
}

#[test]
fn unscoped_grant_binds_to_root_workspace() {
    let groupings = bind_permissions(
        &definition(vec![AccessGrant::unscoped(permission("rbac:role:read"))]),
        &scope(),
        &BTreeSet::new(),
    )
    .unwrap_or_default();

    assert_eq!(groupings, groupings_on_root(&["rbac_role_read"]));
}

#[test]
fn disabled_application_grants_are_skipped() {
    let settings = ReplicationSettings::default();
    let groupings = bind_permissions(
        &definition(vec![
            AccessGrant::unscoped(permission("cost-management:cost_model:read")),
            AccessGrant::unscoped(permission("approval:requests:read")),
            AccessGrant::unscoped(permission("rbac:role:read")),
        ]),
        &scope(),
        &settings.disabled_applications,
    )
    .unwrap_or_default();

    assert_eq!(groupings, groupings_on_root(&["rbac_role_read"]));
}

#[test]
fn inventory_resource_definitions_bind_to_workspaces() {
    let groupings = bind_permissions(
        &definition(vec![AccessGrant::scoped(
            permission("inventory:hosts:read"),
            vec![resource_definition(
                "inventory.groups.id",
                ResourceOperation::In,
                r#"["w1", null]"#,
            )],
        )]),
        &scope(),
        &BTreeSet::new(),
    )
    .unwrap_or_default();

    assert_eq!(
        groupings,
        BTreeMap::from([
            (
                BoundResource::workspace("default"),
                permissions(&["inventory_hosts_read"])
            ),
            (
                BoundResource::workspace("w1"),
                permissions(&["inventory_hosts_read"])
            ),
        ])
    );
}

#[test]
fn in_literal_json_and_comma_forms_bind_three_resources() {
    for literal in ["[1,2,3]", "1,2,3"] {
        let groupings = bind_permissions(
            &definition(vec![AccessGrant::scoped(
                permission("inventory:hosts:read"),
                vec![resource_definition(
                    "inventory.groups.id",
                    ResourceOperation::In,
                    literal,
                )],
            )]),
            &scope(),
            &BTreeSet::new(),
        )
        .unwrap_or_default();

        let resources: Vec<&BoundResource> = groupings.keys().collect();
        assert_eq!(
            resources,
            vec![
                &BoundResource::workspace("1"),
                &BoundResource::workspace("2"),
                &BoundResource::workspace("3")
            ]
        );
    }
}

#[test]
fn non_inventory_definitions_use_application_resource_type() {
    let groupings = bind_permissions(
        &definition(vec![AccessGrant::scoped(
            permission("patch:system:read"),
            vec![resource_definition(
                "patch.system-profile.id",
                ResourceOperation::Equal,
                r#""s1""#,
            )],
        )]),
        &scope(),
        &BTreeSet::new(),
    )
    .unwrap_or_default();

    assert_eq!(
        groupings,
        BTreeMap::from([(
            BoundResource::new("patch/system_profile_id", "s1"),
            permissions(&["patch_system_read"])
        )])
    );
}

#[test]
fn null_id_outside_workspaces_is_rejected() {
    let result = bind_permissions(
        &definition(vec![AccessGrant::scoped(
            permission("patch:system:read"),
            vec![resource_definition(
                "patch.system.id",
                ResourceOperation::Equal,
                "null",
            )],
        )]),
        &scope(),
        &BTreeSet::new(),
    );

    assert!(result.is_err());
}

#[test]
fn exact_match_assigns_system_role_without_custom_role() {
    let context = TranslationContext::new();
    let registry = registry(&[("s1", &["app_x_read"])]);

    let assignments = match_system_roles(
        &groupings_on_root(&["app_x_read"]),
        &registry,
        &context,
        "legacy-1",
    );

    assert_eq!(assignments.len(), 1);
    assert!(assignments.keys().all(V2Role::is_system));
    assert_eq!(context.custom_roles_created(), 0);
}

#[test]
fn unmatched_permissions_become_one_custom_role() {
    let context = TranslationContext::new();
    let registry = registry(&[("s1", &["app_z_read"])]);

    let assignments = match_system_roles(
        &groupings_on_root(&["app_x_read", "app_y_write"]),
        &registry,
        &context,
        "legacy-1",
    );

    assert_eq!(assignments.len(), 1);
    let role = assignments.keys().next().cloned();
    assert!(role.as_ref().is_some_and(|role| !role.is_system()));
    assert_eq!(
        role.map(|role| role.permissions().clone()),
        Some(permissions(&["app_x_read", "app_y_write"]))
    );
    assert_eq!(context.custom_roles_created(), 1);
}

#[test]
fn greedy_cover_combines_system_roles() {
    let context = TranslationContext::new();
    let registry = registry(&[
        ("reader", &["app_x_read"]),
        ("writer", &["app_x_write"]),
        ("other", &["app_y_read"]),
    ]);

    let assignments = match_system_roles(
        &groupings_on_root(&["app_x_read", "app_x_write"]),
        &registry,
        &context,
        "legacy-1",
    );

    let ids: BTreeSet<&str> = assignments.keys().map(V2Role::id).collect();
    assert_eq!(ids, BTreeSet::from(["reader", "writer"]));
    assert_eq!(context.custom_roles_created(), 0);
}

#[test]
fn greedy_cover_is_first_fit_in_registry_order() {
    let context = TranslationContext::new();
    let registry = registry(&[
        ("reader", &["app_x_read"]),
        ("writer", &["app_x_write"]),
        ("admin", &["app_x_read", "app_x_write"]),
    ]);

    let assignments = match_system_roles(
        &groupings_on_root(&["app_x_read", "app_x_write", "app_y_read"]),
        &registry,
        &context,
        "legacy-1",
    );

    let system_ids: BTreeSet<&str> = assignments
        .keys()
        .filter(|role| role.is_system())
        .map(V2Role::id)
        .collect();
    assert_eq!(system_ids, BTreeSet::from(["reader", "writer"]));
}

#[test]
fn partial_cover_keeps_system_roles_and_adds_leftover_custom_role() {
    let context = TranslationContext::new();
    let registry = registry(&[("s1", &["app_x_read"])]);

    let assignments = match_system_roles(
        &groupings_on_root(&["app_x_read", "app_y_write"]),
        &registry,
        &context,
        "legacy-1",
    );

    let keys: BTreeSet<RoleKey> = assignments.keys().map(V2Role::key).collect();
    assert_eq!(
        keys,
        BTreeSet::from([
            RoleKey::System("s1".to_owned()),
            RoleKey::Custom(permissions(&["app_y_write"]))
        ])
    );
}

#[test]
fn leftovers_feed_candidate_system_roles() {
    let context = TranslationContext::new();
    let registry = registry(&[("s1", &["app_x_read"])]);

    for legacy_role_id in ["legacy-1", "legacy-2"] {
        match_system_roles(
            &groupings_on_root(&["app_x_read", "app_x_write", "other_y_read"]),
            &registry,
            &context,
            legacy_role_id,
        );
    }

    let diagnostics = context.diagnostics();
    assert_eq!(diagnostics.custom_roles_created, 2);
    assert_eq!(diagnostics.candidate_system_roles.len(), 2);
    let app_bundle = diagnostics
        .candidate_system_roles
        .iter()
        .find(|candidate| candidate.permissions == permissions(&["app_x_read", "app_x_write"]));
    assert_eq!(
        app_bundle.map(|candidate| candidate.legacy_role_ids.clone()),
        Some(BTreeSet::from(["legacy-1".to_owned(), "legacy-2".to_owned()]))
    );
}

#[test]
fn bindings_expand_per_group() {
    let mut assignments = RoleAssignments::new();
    assignments.insert(
        V2Role::system("s1", permissions(&["app_x_read"])),
        BTreeSet::from([BoundResource::workspace("w1"), BoundResource::workspace("w2")]),
    );

    let bindings = generate_role_bindings(
        "legacy-1",
        &assignments,
        &[group("g1", &["u1"]), group("g2", &[])],
    )
    .unwrap_or_default();

    assert_eq!(bindings.len(), 4);
    assert!(bindings.iter().all(|binding| binding.groups().len() == 1));
    assert!(bindings.iter().all(|binding| binding.resources().len() == 1));
    let ids: BTreeSet<&str> = bindings.iter().map(|binding| binding.id()).collect();
    assert_eq!(ids.len(), 4);
    assert!(
        bindings
            .iter()
            .all(|binding| binding.origin_role_id() == "legacy-1")
    );

    let members: BTreeSet<usize> = bindings
        .iter()
        .flat_map(|binding| binding.groups().iter())
        .map(|group| group.member_user_ids().len())
        .collect();
    assert_eq!(members, BTreeSet::from([0, 1]));
}

#[test]
fn bindings_without_groups_have_empty_group_set() {
    let mut assignments = RoleAssignments::new();
    assignments.insert(
        V2Role::system("s1", permissions(&["app_x_read"])),
        BTreeSet::from([BoundResource::workspace("w1")]),
    );

    let bindings = generate_role_bindings("legacy-1", &assignments, &[]).unwrap_or_default();

    assert_eq!(bindings.len(), 1);
    assert!(bindings.iter().all(|binding| binding.groups().is_empty()));
}

#[test]
fn translate_role_runs_full_pipeline() {
    let context = TranslationContext::new();
    let registry = registry(&[("viewer", &["workspace_read"])]);
    let mut role_definition = definition(vec![
        AccessGrant::unscoped(permission("inventory:groups:read")),
        AccessGrant::unscoped(permission("rbac:role:read")),
    ]);
    role_definition.groups = vec![group("g1", &["u1"])];

    let bindings = translate_role(
        "legacy-1",
        &role_definition,
        &scope(),
        &ReplicationSettings::default(),
        &registry,
        &context,
    )
    .unwrap_or_default();

    let keys: BTreeSet<RoleKey> = bindings.iter().map(|binding| binding.role().key()).collect();
    assert_eq!(
        keys,
        BTreeSet::from([
            RoleKey::System("viewer".to_owned()),
            RoleKey::Custom(permissions(&["rbac_role_read"]))
        ])
    );
    assert!(
        bindings
            .iter()
            .all(|binding| binding.group_ids() == BTreeSet::from(["g1".to_owned()]))
    );
}

#[test]
fn registry_skips_external_roles_and_replaces_duplicates_in_place() {
    let registry = SystemRoleRegistry::from_legacy_roles(&[
        legacy_system_role("first", &["app:x:read"], None),
        legacy_system_role("ocm", &["app:y:read"], Some("ocm-1")),
        legacy_system_role("second", &["app:x:write"], None),
        legacy_system_role("first-again", &["app:x:read"], None),
    ]);

    let ids: Vec<&str> = registry.iter().map(V2Role::id).collect();
    assert_eq!(ids, vec!["first-again", "second"]);
}

#[test]
fn registry_translates_inventory_group_permissions() {
    let registry =
        SystemRoleRegistry::from_legacy_roles(&[legacy_system_role("ws", &["inventory:groups:*"], None)]);

    assert!(registry.exact_match(&permissions(&["workspace_all"])).is_some());
}

#[tokio::test]
async fn registry_loads_once_until_reset() {
    let source = Arc::new(CountingSystemRoleRepository::new(
        vec![legacy_system_role("s1", &["app:x:read"], None)],
        Duration::ZERO,
    ));
    let context = TranslationContext::new();

    let first = context.system_roles(source.as_ref()).await;
    let second = context.system_roles(source.as_ref()).await;
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);

    context.reset_registry().await;
    let reloaded = context.system_roles(source.as_ref()).await;
    assert_eq!(reloaded.map(|registry| registry.len()).unwrap_or_default(), 1);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_readers_load_registry_once() {
    let source = Arc::new(CountingSystemRoleRepository::new(
        vec![legacy_system_role("s1", &["app:x:read"], None)],
        Duration::from_millis(50),
    ));
    let context = Arc::new(TranslationContext::new());

    let readers: Vec<_> = (0..16)
        .map(|_| {
            let source = Arc::clone(&source);
            let context = Arc::clone(&context);
            tokio::spawn(async move {
                context
                    .system_roles(source.as_ref())
                    .await
                    .map(|registry| registry.len())
            })
        })
        .collect();

    for reader in readers {
        let loaded = reader.await.unwrap_or_else(|error| panic!("{error}"));
        assert_eq!(loaded.unwrap_or_default(), 1);
    }
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

const PERMISSION_POOL: &[&str] = &[
    "app_x_read",
    "app_x_write",
    "app_y_read",
    "app_y_write",
    "rbac_role_read",
    "workspace_read",
];

fn permission_subset() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(prop::sample::select(PERMISSION_POOL), 1..PERMISSION_POOL.len())
        .prop_map(|values| values.into_iter().map(str::to_owned).collect())
}

proptest! {
    #[test]
    fn matching_is_idempotent_modulo_custom_role_ids(
        requested in permission_subset(),
        system_roles in prop::collection::vec(permission_subset(), 0..5),
    ) {
        let mut registry = SystemRoleRegistry::new();
        for (index, role_permissions) in system_roles.into_iter().enumerate() {
            registry.insert(V2Role::system(format!("s{index}"), role_permissions));
        }
        let groupings = BTreeMap::from([(BoundResource::workspace("root"), requested.clone())]);
        let context = TranslationContext::new();

        let first = match_system_roles(&groupings, &registry, &context, "legacy-1");
        let second = match_system_roles(&groupings, &registry, &context, "legacy-1");

        prop_assert_eq!(structural(&first), structural(&second));

        let covered: BTreeSet<String> = first
            .keys()
            .flat_map(|role| role.permissions().iter().cloned())
            .collect();
        prop_assert_eq!(covered, requested);
    }
}
