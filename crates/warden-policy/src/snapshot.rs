//! Organization-keyed, versioned policy snapshots.
//!
//! A [`PolicySnapshot`] is an immutable, evaluation-ready view of one
//! organization's active policies. Readers hold an `Arc` to the snapshot
//! they started with; a reload installs a new snapshot by swapping the
//! `Arc` in the cache, so a single evaluation never observes a mix of
//! two policy sets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use warden_core::{OrganizationId, PolicyVersion, Timestamp};

use crate::error::{PolicyError, PolicyResult};
use crate::evaluator::PolicyEvaluator;
use crate::permissions::EffectivePermissionsCalculator;
use crate::types::AuthorizationPolicy;

#[derive(Debug)]
pub struct PolicySnapshot {
    organization_id: OrganizationId,
    version: PolicyVersion,
    policies: Vec<AuthorizationPolicy>,
    loaded_at: Timestamp,
    loaded_instant: Instant,
}

impl PolicySnapshot {
    pub fn new(
        organization_id: OrganizationId,
        version: PolicyVersion,
        policies: Vec<AuthorizationPolicy>,
    ) -> Self {
        Self {
            organization_id,
            version,
            policies,
            loaded_at: Timestamp::now(),
            loaded_instant: Instant::now(),
        }
    }

    pub fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    pub fn version(&self) -> PolicyVersion {
        self.version
    }

    pub fn policies(&self) -> &[AuthorizationPolicy] {
        &self.policies
    }

    pub fn loaded_at(&self) -> Timestamp {
        self.loaded_at
    }

    pub fn evaluator(&self) -> PolicyEvaluator<'_> {
        PolicyEvaluator::new(&self.policies)
    }

    pub fn permissions(&self) -> EffectivePermissionsCalculator<'_> {
        EffectivePermissionsCalculator::new(&self.policies)
    }

    fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        ttl.map_or(true, |ttl| self.loaded_instant.elapsed() < ttl)
    }
}

#[derive(Default)]
struct OrgSlot {
    /// Bumped on every invalidation of this organization.
    generation: u64,
    last_version: Option<PolicyVersion>,
    current: Option<Arc<PolicySnapshot>>,
}

#[derive(Default)]
struct CacheState {
    /// Bumped by `invalidate_all`.
    epoch: u64,
    slots: HashMap<OrganizationId, OrgSlot>,
}

/// Cache of per-organization snapshots.
///
/// Loads run outside the lock. A load that started before an invalidation
/// of its organization is handed back to its caller but never installed.
pub struct SnapshotCache {
    ttl: Option<Duration>,
    state: Mutex<CacheState>,
}

impl SnapshotCache {
    /// `ttl = None` keeps snapshots until they are invalidated.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn lock_state(&self) -> PolicyResult<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|e| PolicyError::Internal(format!("snapshot cache lock poisoned: {}", e)))
    }

    /// The cached snapshot for `organization_id`, if present and fresh.
    pub fn current(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Option<Arc<PolicySnapshot>>> {
        let state = self.lock_state()?;
        Ok(state
            .slots
            .get(organization_id)
            .and_then(|slot| slot.current.as_ref())
            .filter(|s| s.is_fresh(self.ttl))
            .cloned())
    }

    /// Return the cached snapshot, or build one from `load` and install it.
    pub fn get_or_load<F>(
        &self,
        organization_id: &OrganizationId,
        load: F,
    ) -> PolicyResult<Arc<PolicySnapshot>>
    where
        F: FnOnce(&OrganizationId) -> PolicyResult<Vec<AuthorizationPolicy>>,
    {
        let (epoch, generation) = {
            let state = self.lock_state()?;
            let slot = state.slots.get(organization_id);
            if let Some(snapshot) = slot
                .and_then(|s| s.current.as_ref())
                .filter(|s| s.is_fresh(self.ttl))
            {
                return Ok(snapshot.clone());
            }
            (state.epoch, slot.map_or(0, |s| s.generation))
        };

        let policies = load(organization_id)?;

        let mut state = self.lock_state()?;
        let current_epoch = state.epoch;
        let slot = state.slots.entry(organization_id.clone()).or_default();
        let version = slot
            .last_version
            .map_or_else(PolicyVersion::initial, |v| v.next());
        slot.last_version = Some(version);
        let snapshot = Arc::new(PolicySnapshot::new(
            organization_id.clone(),
            version,
            policies,
        ));

        if current_epoch == epoch && slot.generation == generation {
            slot.current = Some(snapshot.clone());
            tracing::debug!(
                organization_id = %organization_id,
                version = %version,
                policies = snapshot.policies().len(),
                loaded_at = %snapshot.loaded_at(),
                "policy snapshot installed"
            );
        } else {
            tracing::debug!(
                organization_id = %organization_id,
                version = %version,
                "policy snapshot superseded during load; not cached"
            );
        }
        Ok(snapshot)
    }

    /// Drop the snapshot for one organization. Must be called after every
    /// committed write to that organization's policies.
    pub fn invalidate(&self, organization_id: &OrganizationId) -> PolicyResult<()> {
        let mut state = self.lock_state()?;
        let slot = state.slots.entry(organization_id.clone()).or_default();
        slot.generation += 1;
        slot.current = None;
        tracing::debug!(organization_id = %organization_id, "policy snapshot invalidated");
        Ok(())
    }

    pub fn invalidate_all(&self) -> PolicyResult<()> {
        let mut state = self.lock_state()?;
        state.epoch += 1;
        for slot in state.slots.values_mut() {
            slot.generation += 1;
            slot.current = None;
        }
        Ok(())
    }
}
