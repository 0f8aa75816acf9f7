//! Relata bulk replication of legacy roles into the relationship model.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::env;
use std::sync::Arc;

use relata_application::{
    DEFAULT_DISABLED_APPLICATIONS, DEFAULT_PRINCIPAL_USER_DOMAIN, LegacyRoleRepository,
    ReplicationSettings, RoleReplicationService, TranslationContext,
};
use relata_core::{AppError, AppResult, RequestUser, TenantId};
use relata_domain::{LegacyRole, ReplicationEventType};
use relata_infrastructure::{
    PostgresLegacyRoleRepository, PostgresReplicationRepository, PostgresWorkspaceRepository,
};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const MIGRATOR_PRINCIPAL: &str = "relata-migrator";

#[derive(Debug, Clone)]
struct MigratorConfig {
    database_url: String,
    tenant_id: Option<TenantId>,
    role_id: Option<String>,
    max_connections: u32,
    settings: ReplicationSettings,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = MigratorConfig::load()?;
    let pool = connect_pool(config.database_url.as_str(), config.max_connections).await?;
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if !config.settings.enabled {
        warn!("REPLICATION_TO_RELATION_ENABLED is off; migrating anyway");
    }

    let legacy_roles = Arc::new(PostgresLegacyRoleRepository::new(pool.clone()));
    let service = build_role_replication_service(pool, legacy_roles.clone(), &config);

    info!(
        tenant_id = ?config.tenant_id.map(|tenant_id| tenant_id.to_string()),
        role_id = ?config.role_id,
        principal_user_domain = %config.settings.principal_user_domain,
        disabled_applications = ?config.settings.disabled_applications,
        "relata-migrator started"
    );

    let roles = select_roles(legacy_roles.as_ref(), config.tenant_id, config.role_id.as_deref())
        .await?;
    let actor = RequestUser::system(MIGRATOR_PRINCIPAL);
    let mut migrated_roles = 0_usize;
    let mut failed_roles = 0_usize;
    let mut published_relations = 0_usize;

    for role in &roles {
        match service
            .replicate_role(&actor, role, ReplicationEventType::MigrateRole)
            .await
        {
            Ok(event) => {
                migrated_roles = migrated_roles.saturating_add(1);
                published_relations = published_relations
                    .saturating_add(event.relations_to_add.len())
                    .saturating_add(event.relations_to_remove.len());
            }
            Err(error) => {
                failed_roles = failed_roles.saturating_add(1);
                warn!(
                    role_id = %role.id,
                    tenant_id = %role.tenant_id,
                    error = %error,
                    "failed to migrate legacy role"
                );
            }
        }
    }

    let diagnostics = service.context().diagnostics();
    for candidate in &diagnostics.candidate_system_roles {
        info!(
            permissions = ?candidate.permissions,
            legacy_roles = candidate.legacy_role_ids.len(),
            legacy_role_ids = ?candidate.legacy_role_ids,
            "candidate system role"
        );
    }

    info!(
        total_roles = roles.len(),
        migrated_roles,
        failed_roles,
        published_relations,
        custom_roles_created = diagnostics.custom_roles_created,
        candidate_system_roles = diagnostics.candidate_system_roles.len(),
        "relata-migrator finished"
    );

    Ok(())
}

async fn connect_pool(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

/// Loads the roles to migrate: one named role, or every custom role in scope.
async fn select_roles(
    repository: &dyn LegacyRoleRepository,
    tenant_id: Option<TenantId>,
    role_id: Option<&str>,
) -> AppResult<Vec<LegacyRole>> {
    let Some(role_id) = role_id else {
        return repository.list_roles(tenant_id).await;
    };

    let tenant_id = tenant_id.ok_or_else(|| {
        AppError::Validation("MIGRATOR_ROLE_ID requires MIGRATOR_TENANT_ID".to_owned())
    })?;
    let role = repository
        .find_role(tenant_id, role_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "legacy role '{role_id}' not found for tenant '{tenant_id}'"
            ))
        })?;

    if role.is_system {
        return Err(AppError::Validation(format!(
            "legacy role '{role_id}' is a system role and is not migrated"
        )));
    }

    Ok(vec![role])
}

fn build_role_replication_service(
    pool: PgPool,
    legacy_roles: Arc<PostgresLegacyRoleRepository>,
    config: &MigratorConfig,
) -> RoleReplicationService {
    let settings = ReplicationSettings {
        enabled: true,
        ..config.settings.clone()
    };

    RoleReplicationService::new(
        settings,
        Arc::new(TranslationContext::new()),
        legacy_roles,
        Arc::new(PostgresWorkspaceRepository::new(pool.clone())),
        Arc::new(PostgresReplicationRepository::new(pool)),
    )
}

impl MigratorConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let tenant_id = optional_env("MIGRATOR_TENANT_ID")
            .map(|value| parse_tenant_id("MIGRATOR_TENANT_ID", value.as_str()))
            .transpose()?;
        let role_id = optional_env("MIGRATOR_ROLE_ID");
        if role_id.is_some() && tenant_id.is_none() {
            return Err(AppError::Validation(
                "MIGRATOR_ROLE_ID requires MIGRATOR_TENANT_ID".to_owned(),
            ));
        }
        let max_connections = match optional_env("MIGRATOR_MAX_CONNECTIONS") {
            Some(value) => parse_u32("MIGRATOR_MAX_CONNECTIONS", value.as_str())?,
            None => 5,
        };

        if max_connections == 0 {
            return Err(AppError::Validation(
                "MIGRATOR_MAX_CONNECTIONS must be greater than zero".to_owned(),
            ));
        }

        let enabled = match optional_env("REPLICATION_TO_RELATION_ENABLED") {
            Some(value) => parse_bool("REPLICATION_TO_RELATION_ENABLED", value.as_str())?,
            None => false,
        };
        let principal_user_domain = optional_env("PRINCIPAL_USER_DOMAIN")
            .unwrap_or_else(|| DEFAULT_PRINCIPAL_USER_DOMAIN.to_owned());
        let disabled_applications = match optional_env("REPLICATION_DISABLED_APPLICATIONS") {
            Some(value) => parse_list(value.as_str()),
            None => DEFAULT_DISABLED_APPLICATIONS
                .iter()
                .map(|application| (*application).to_owned())
                .collect(),
        };

        Ok(Self {
            database_url,
            tenant_id,
            role_id,
            max_connections,
            settings: ReplicationSettings {
                enabled,
                principal_user_domain,
                disabled_applications,
            },
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_u32(name: &str, value: &str) -> AppResult<u32> {
    value.parse::<u32>().map_err(|error| {
        AppError::Validation(format!("invalid {name} value '{value}': {error}"))
    })
}

fn parse_bool(name: &str, value: &str) -> AppResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "invalid {name} value '{value}': expected a boolean"
        ))),
    }
}

fn parse_tenant_id(name: &str, value: &str) -> AppResult<TenantId> {
    Uuid::parse_str(value)
        .map(TenantId::from_uuid)
        .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}")))
}

fn parse_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}
