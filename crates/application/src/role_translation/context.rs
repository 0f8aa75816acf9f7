use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::RwLock;
use tracing::info;

use relata_core::AppResult;
use relata_domain::{LegacyRole, V2Role};

use crate::replication_ports::SystemRoleRepository;

/// Known system roles keyed by their exact permission set, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemRoleRegistry {
    roles: Vec<V2Role>,
    positions: HashMap<BTreeSet<String>, usize>,
}

impl SystemRoleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from legacy system roles.
    ///
    /// Roles sourced from an external system and roles without permissions are skipped.
    #[must_use]
    pub fn from_legacy_roles(roles: &[LegacyRole]) -> Self {
        let mut registry = Self::new();
        for role in roles.iter().filter(|role| role.is_registry_candidate()) {
            let permissions: BTreeSet<String> = role
                .definition
                .access
                .iter()
                .map(|grant| grant.permission.v2_permission())
                .collect();
            if permissions.is_empty() {
                continue;
            }

            registry.insert(V2Role::system(role.id.clone(), permissions));
        }

        registry
    }

    /// Adds a system role.
    ///
    /// A role with an already registered permission set replaces the earlier one in place.
    pub fn insert(&mut self, role: V2Role) {
        match self.positions.get(role.permissions()) {
            Some(position) => self.roles[*position] = role,
            None => {
                self.positions
                    .insert(role.permissions().clone(), self.roles.len());
                self.roles.push(role);
            }
        }
    }

    /// Finds the role whose permission set equals `permissions` exactly.
    #[must_use]
    pub fn exact_match(&self, permissions: &BTreeSet<String>) -> Option<&V2Role> {
        self.positions
            .get(permissions)
            .and_then(|position| self.roles.get(*position))
    }

    /// Iterates roles in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &V2Role> {
        self.roles.iter()
    }

    /// Returns the number of registered roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns whether no role is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Permission bundle that repeatedly needed a custom role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSystemRole {
    /// Permissions granted together on one resource for one application.
    pub permissions: BTreeSet<String>,
    /// Legacy roles that granted this bundle.
    pub legacy_role_ids: BTreeSet<String>,
}

/// Snapshot of translation diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationDiagnostics {
    /// Custom roles synthesized since process start.
    pub custom_roles_created: u64,
    /// Bundles that may be worth promoting to system roles, most frequent first.
    pub candidate_system_roles: Vec<CandidateSystemRole>,
}

/// Process-scoped state shared by every translation.
///
/// Holds the lazily loaded system role registry and the diagnostic accumulators.
#[derive(Debug, Default)]
pub struct TranslationContext {
    registry: RwLock<Option<Arc<SystemRoleRegistry>>>,
    candidates: Mutex<BTreeMap<BTreeSet<String>, BTreeSet<String>>>,
    custom_roles_created: AtomicU64,
}

impl TranslationContext {
    /// Creates a context whose registry loads on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registry, loading it from `source` the first time.
    ///
    /// Concurrent first callers wait on the write lock; only one of them loads.
    pub async fn system_roles(
        &self,
        source: &dyn SystemRoleRepository,
    ) -> AppResult<Arc<SystemRoleRegistry>> {
        if let Some(registry) = self.registry.read().await.as_ref() {
            return Ok(Arc::clone(registry));
        }

        let mut slot = self.registry.write().await;
        if let Some(registry) = slot.as_ref() {
            return Ok(Arc::clone(registry));
        }

        let roles = source.list_system_roles().await?;
        let registry = Arc::new(SystemRoleRegistry::from_legacy_roles(&roles));
        info!(
            system_roles = registry.len(),
            "loaded system role registry"
        );
        *slot = Some(Arc::clone(&registry));

        Ok(registry)
    }

    /// Drops the cached registry so the next translation reloads it.
    pub async fn reset_registry(&self) {
        *self.registry.write().await = None;
    }

    pub(crate) fn record_custom_role(&self, legacy_role_id: &str, bundles: Vec<BTreeSet<String>>) {
        {
            let mut candidates = self
                .candidates
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for bundle in bundles {
                candidates
                    .entry(bundle)
                    .or_default()
                    .insert(legacy_role_id.to_owned());
            }
        }

        self.custom_roles_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of custom roles synthesized so far.
    #[must_use]
    pub fn custom_roles_created(&self) -> u64 {
        self.custom_roles_created.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of the diagnostic accumulators.
    #[must_use]
    pub fn diagnostics(&self) -> TranslationDiagnostics {
        let mut candidate_system_roles: Vec<CandidateSystemRole> = self
            .candidates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(permissions, legacy_role_ids)| CandidateSystemRole {
                permissions: permissions.clone(),
                legacy_role_ids: legacy_role_ids.clone(),
            })
            .collect();
        candidate_system_roles.sort_by(|left, right| {
            right
                .legacy_role_ids
                .len()
                .cmp(&left.legacy_role_ids.len())
                .then_with(|| left.permissions.cmp(&right.permissions))
        });

        TranslationDiagnostics {
            custom_roles_created: self.custom_roles_created(),
            candidate_system_roles,
        }
    }
}
