//! Authorization service: the guarded repository, the snapshot cache, and
//! the evaluator wired together.

use std::sync::Arc;
use warden_core::{OrganizationId, PolicyId, PolicyVersion};
use warden_policy::{
    AccessRequest, AuditSink, AuthorizationPolicy, Decision, EffectivePermissions, Evaluation,
    GuardedRepository, NewPolicy, PermissionContext, PolicyChanges, PolicyError,
    PolicyRepository, PolicyResult, PolicySnapshot, SnapshotCache,
};

use crate::config::WardenConfig;

pub struct AuthorizationService<R> {
    repository: GuardedRepository<R>,
    cache: Option<SnapshotCache>,
    wildcard_short_circuit: bool,
}

impl<R: PolicyRepository> AuthorizationService<R> {
    pub fn new(repository: R, config: &WardenConfig) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| SnapshotCache::new(config.cache.ttl()));
        Self {
            repository: GuardedRepository::new(repository),
            cache,
            wildcard_short_circuit: config.evaluation.wildcard_short_circuit,
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.repository = self.repository.with_audit_sink(sink);
        self
    }

    pub fn repository(&self) -> &GuardedRepository<R> {
        &self.repository
    }

    /// The active policies of `organization_id`, from the cache when enabled.
    pub fn snapshot(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Arc<PolicySnapshot>> {
        match &self.cache {
            Some(cache) => cache.get_or_load(organization_id, |org| {
                self.repository.find_active_by_organization(org)
            }),
            None => {
                let policies = self.repository.find_active_by_organization(organization_id)?;
                Ok(Arc::new(PolicySnapshot::new(
                    organization_id.clone(),
                    PolicyVersion::initial(),
                    policies,
                )))
            }
        }
    }

    pub fn evaluate(&self, request: &AccessRequest) -> PolicyResult<Decision> {
        Ok(self.explain(request)?.decision)
    }

    pub fn explain(&self, request: &AccessRequest) -> PolicyResult<Evaluation> {
        let snapshot = self.snapshot(&request.organization_id)?;
        Ok(snapshot.evaluator().explain(request))
    }

    pub fn effective_permissions<S: AsRef<str>>(
        &self,
        context: &PermissionContext,
        catalog: &[S],
    ) -> PolicyResult<EffectivePermissions> {
        let snapshot = self.snapshot(&context.organization_id)?;
        Ok(snapshot
            .permissions()
            .with_short_circuit(self.wildcard_short_circuit)
            .calculate(context, catalog))
    }

    /// Every policy of the organization, inactive and undecodable ones
    /// included.
    pub fn list_policies(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Vec<AuthorizationPolicy>> {
        self.repository.find_by_organization(organization_id)
    }

    pub fn get_policy(&self, id: &PolicyId) -> PolicyResult<AuthorizationPolicy> {
        self.repository
            .find_by_id(id)?
            .ok_or_else(|| PolicyError::NotFound(id.clone()))
    }

    pub fn create_policy(
        &self,
        organization_id: &OrganizationId,
        input: NewPolicy,
    ) -> PolicyResult<AuthorizationPolicy> {
        let created = self.repository.create(organization_id, input)?;
        self.invalidate(organization_id);
        Ok(created)
    }

    pub fn update_policy(
        &self,
        id: &PolicyId,
        changes: PolicyChanges,
    ) -> PolicyResult<AuthorizationPolicy> {
        let updated = self.repository.update(id, changes)?;
        self.invalidate(&updated.organization_id);
        Ok(updated)
    }

    pub fn delete_policy(&self, id: &PolicyId) -> PolicyResult<()> {
        let existing = self.get_policy(id)?;
        self.repository.delete(id)?;
        self.invalidate(&existing.organization_id);
        Ok(())
    }

    fn invalidate(&self, organization_id: &OrganizationId) {
        if let Some(cache) = &self.cache {
            // A poisoned cache fails every later read, so no stale snapshot
            // can be served.
            if let Err(e) = cache.invalidate(organization_id) {
                tracing::error!(organization_id = %organization_id, error = %e, "failed to invalidate policy snapshot");
            }
        }
    }
}
