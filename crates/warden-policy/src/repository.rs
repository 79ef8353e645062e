use std::sync::Arc;
use warden_core::{OrganizationId, PolicyId};

use crate::error::PolicyResult;
use crate::types::{AuthorizationPolicy, NewPolicy, PolicyChanges};

// ---------------------------------------------------------------------------
// PolicyRepository: persistence collaborator
//
// Implementations decode stored condition blobs at this boundary and are
// responsible for serializing concurrent writes to the same policy id.
// ---------------------------------------------------------------------------

pub trait PolicyRepository: Send + Sync {
    /// Active policies of one organization, for evaluation.
    fn find_active_by_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Vec<AuthorizationPolicy>>;

    /// Every policy of one organization, including inactive ones.
    fn find_by_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Vec<AuthorizationPolicy>>;

    fn find_by_id(&self, id: &PolicyId) -> PolicyResult<Option<AuthorizationPolicy>>;

    fn create(
        &self,
        organization_id: &OrganizationId,
        input: NewPolicy,
    ) -> PolicyResult<AuthorizationPolicy>;

    fn update(&self, id: &PolicyId, changes: PolicyChanges) -> PolicyResult<AuthorizationPolicy>;

    fn delete(&self, id: &PolicyId) -> PolicyResult<()>;
}

impl<R: PolicyRepository + ?Sized> PolicyRepository for Arc<R> {
    fn find_active_by_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Vec<AuthorizationPolicy>> {
        (**self).find_active_by_organization(organization_id)
    }

    fn find_by_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Vec<AuthorizationPolicy>> {
        (**self).find_by_organization(organization_id)
    }

    fn find_by_id(&self, id: &PolicyId) -> PolicyResult<Option<AuthorizationPolicy>> {
        (**self).find_by_id(id)
    }

    fn create(
        &self,
        organization_id: &OrganizationId,
        input: NewPolicy,
    ) -> PolicyResult<AuthorizationPolicy> {
        (**self).create(organization_id, input)
    }

    fn update(&self, id: &PolicyId, changes: PolicyChanges) -> PolicyResult<AuthorizationPolicy> {
        (**self).update(id, changes)
    }

    fn delete(&self, id: &PolicyId) -> PolicyResult<()> {
        (**self).delete(id)
    }
}
