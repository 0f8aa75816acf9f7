//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_legacy_role_repository;
mod in_memory_replication_repository;
mod postgres_legacy_role_repository;
mod postgres_replication_repository;
mod postgres_workspace_repository;

pub use in_memory_legacy_role_repository::InMemoryLegacyRoleRepository;
pub use in_memory_replication_repository::{CapturedOutboxEvent, InMemoryReplicationRepository};
pub use postgres_legacy_role_repository::PostgresLegacyRoleRepository;
pub use postgres_replication_repository::PostgresReplicationRepository;
pub use postgres_workspace_repository::PostgresWorkspaceRepository;
