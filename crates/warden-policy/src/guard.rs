//! Protection of built-in (system) policies on the write path.
//!
//! [`GuardedRepository`] wraps any [`PolicyRepository`] and is the single
//! enforcement point: updates and deletes re-read the target from the
//! inner repository immediately before the check, never from a cache.

use std::sync::Arc;
use warden_core::{OrganizationId, PolicyId, Timestamp};

use crate::audit::{AuditSink, PolicyAuditEvent, PolicyAuditEventKind};
use crate::error::{PolicyError, PolicyResult};
use crate::repository::PolicyRepository;
use crate::types::{AuthorizationPolicy, NewPolicy, PolicyChanges};
use crate::validation::{validate_changes, validate_new_policy};

/// Reject updates to system policies.
pub fn guard_update(policy: &AuthorizationPolicy) -> PolicyResult<()> {
    if policy.is_system_policy {
        return Err(PolicyError::SystemPolicyProtected(policy.id.clone()));
    }
    Ok(())
}

/// Reject deletion of system policies.
pub fn guard_delete(policy: &AuthorizationPolicy) -> PolicyResult<()> {
    if policy.is_system_policy {
        return Err(PolicyError::SystemPolicyProtected(policy.id.clone()));
    }
    Ok(())
}

/// Repository decorator enforcing system-policy immutability and input
/// validation. Creation is unrestricted: [`NewPolicy`] cannot express a
/// system policy.
pub struct GuardedRepository<R> {
    inner: R,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl<R: PolicyRepository> GuardedRepository<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            audit_sink: None,
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn fresh(&self, id: &PolicyId) -> PolicyResult<AuthorizationPolicy> {
        self.inner
            .find_by_id(id)?
            .ok_or_else(|| PolicyError::NotFound(id.clone()))
    }

    fn check(
        &self,
        policy: &AuthorizationPolicy,
        guard: fn(&AuthorizationPolicy) -> PolicyResult<()>,
        operation: &str,
    ) -> PolicyResult<()> {
        if let Err(e) = guard(policy) {
            tracing::warn!(
                policy_id = %policy.id,
                organization_id = %policy.organization_id,
                operation,
                "rejected mutation of system policy"
            );
            self.record(
                PolicyAuditEventKind::ProtectionViolation,
                &policy.id,
                Some(&policy.organization_id),
                format!("{} rejected: system policy", operation),
            );
            return Err(e);
        }
        Ok(())
    }

    fn record(
        &self,
        kind: PolicyAuditEventKind,
        policy_id: &PolicyId,
        organization_id: Option<&OrganizationId>,
        summary: String,
    ) {
        let Some(sink) = &self.audit_sink else {
            return;
        };
        let event = PolicyAuditEvent {
            event_kind: kind,
            timestamp: Timestamp::now(),
            policy_id: policy_id.clone(),
            organization_id: organization_id.cloned(),
            summary: Some(summary),
        };
        if let Err(e) = sink.emit(&event) {
            tracing::error!(policy_id = %policy_id, error = %e, "failed to emit policy audit event");
        }
    }
}

impl<R: PolicyRepository> PolicyRepository for GuardedRepository<R> {
    fn find_active_by_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Vec<AuthorizationPolicy>> {
        self.inner.find_active_by_organization(organization_id)
    }

    fn find_by_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Vec<AuthorizationPolicy>> {
        self.inner.find_by_organization(organization_id)
    }

    fn find_by_id(&self, id: &PolicyId) -> PolicyResult<Option<AuthorizationPolicy>> {
        self.inner.find_by_id(id)
    }

    fn create(
        &self,
        organization_id: &OrganizationId,
        input: NewPolicy,
    ) -> PolicyResult<AuthorizationPolicy> {
        validate_new_policy(&input)?;
        let created = self.inner.create(organization_id, input)?;
        tracing::info!(policy_id = %created.id, organization_id = %organization_id, "policy created");
        self.record(
            PolicyAuditEventKind::PolicyCreated,
            &created.id,
            Some(organization_id),
            format!("created '{}' ({} at priority {})", created.name, created.effect, created.priority),
        );
        Ok(created)
    }

    fn update(&self, id: &PolicyId, changes: PolicyChanges) -> PolicyResult<AuthorizationPolicy> {
        let current = self.fresh(id)?;
        self.check(&current, guard_update, "update")?;
        validate_changes(&changes)?;
        let conditions_changed = changes.touches_conditions();
        let updated = self.inner.update(id, changes)?;
        tracing::info!(
            policy_id = %id,
            organization_id = %updated.organization_id,
            conditions_changed,
            "policy updated"
        );
        let summary = if conditions_changed {
            format!("updated '{}' (conditions changed)", updated.name)
        } else {
            format!("updated '{}'", updated.name)
        };
        self.record(
            PolicyAuditEventKind::PolicyUpdated,
            id,
            Some(&updated.organization_id),
            summary,
        );
        Ok(updated)
    }

    fn delete(&self, id: &PolicyId) -> PolicyResult<()> {
        let current = self.fresh(id)?;
        self.check(&current, guard_delete, "delete")?;
        self.inner.delete(id)?;
        tracing::info!(policy_id = %id, organization_id = %current.organization_id, "policy deleted");
        self.record(
            PolicyAuditEventKind::PolicyDeleted,
            id,
            Some(&current.organization_id),
            format!("deleted '{}'", current.name),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::condition::{
        ActionCondition, ConditionState, PolicyConditions, ResourceCondition, SubjectCondition,
    };
    use crate::types::Effect;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Minimal repository that applies mutations without any checks.
    #[derive(Default)]
    struct StubRepository {
        policies: Mutex<HashMap<PolicyId, AuthorizationPolicy>>,
    }

    impl StubRepository {
        fn with(policies: Vec<AuthorizationPolicy>) -> Self {
            Self {
                policies: Mutex::new(policies.into_iter().map(|p| (p.id.clone(), p)).collect()),
            }
        }
    }

    impl PolicyRepository for StubRepository {
        fn find_active_by_organization(
            &self,
            organization_id: &OrganizationId,
        ) -> PolicyResult<Vec<AuthorizationPolicy>> {
            Ok(self
                .find_by_organization(organization_id)?
                .into_iter()
                .filter(|p| p.is_active)
                .collect())
        }

        fn find_by_organization(
            &self,
            organization_id: &OrganizationId,
        ) -> PolicyResult<Vec<AuthorizationPolicy>> {
            Ok(self
                .policies
                .lock()
                .unwrap()
                .values()
                .filter(|p| &p.organization_id == organization_id)
                .cloned()
                .collect())
        }

        fn find_by_id(&self, id: &PolicyId) -> PolicyResult<Option<AuthorizationPolicy>> {
            Ok(self.policies.lock().unwrap().get(id).cloned())
        }

        fn create(
            &self,
            organization_id: &OrganizationId,
            input: NewPolicy,
        ) -> PolicyResult<AuthorizationPolicy> {
            let mut policy = make_policy("created", false);
            policy.organization_id = organization_id.clone();
            policy.name = input.name;
            self.policies
                .lock()
                .unwrap()
                .insert(policy.id.clone(), policy.clone());
            Ok(policy)
        }

        fn update(
            &self,
            id: &PolicyId,
            changes: PolicyChanges,
        ) -> PolicyResult<AuthorizationPolicy> {
            let mut policies = self.policies.lock().unwrap();
            let policy = policies
                .get_mut(id)
                .ok_or_else(|| PolicyError::NotFound(id.clone()))?;
            if let Some(name) = changes.name {
                policy.name = name;
            }
            Ok(policy.clone())
        }

        fn delete(&self, id: &PolicyId) -> PolicyResult<()> {
            self.policies
                .lock()
                .unwrap()
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| PolicyError::NotFound(id.clone()))
        }
    }

    fn make_policy(id: &str, system: bool) -> AuthorizationPolicy {
        AuthorizationPolicy {
            id: PolicyId::new(id),
            organization_id: OrganizationId::new("org-1"),
            name: id.to_string(),
            description: String::new(),
            conditions: ConditionState::Decoded(PolicyConditions {
                subject: SubjectCondition::any(),
                resource: ResourceCondition::any(),
                action: ActionCondition::any(),
                environment: None,
            }),
            effect: Effect::Allow,
            priority: 100,
            is_system_policy: system,
            is_active: true,
            created_at: Timestamp::from_seconds(0),
            updated_at: Timestamp::from_seconds(0),
            created_by: None,
        }
    }

    fn rename(name: &str) -> PolicyChanges {
        PolicyChanges {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_guard_functions() {
        assert!(guard_update(&make_policy("custom", false)).is_ok());
        assert!(guard_delete(&make_policy("custom", false)).is_ok());
        assert!(matches!(
            guard_update(&make_policy("sys", true)),
            Err(PolicyError::SystemPolicyProtected(_))
        ));
        assert!(matches!(
            guard_delete(&make_policy("sys", true)),
            Err(PolicyError::SystemPolicyProtected(_))
        ));
    }

    #[test]
    fn test_update_of_system_policy_is_rejected_and_audited() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let repo = GuardedRepository::new(StubRepository::with(vec![make_policy("sys", true)]))
            .with_audit_sink(sink.clone());

        let err = repo.update(&PolicyId::new("sys"), rename("x")).unwrap_err();
        assert!(matches!(err, PolicyError::SystemPolicyProtected(_)));
        assert_eq!(repo.find_by_id(&PolicyId::new("sys")).unwrap().unwrap().name, "sys");
        assert_eq!(sink.count(PolicyAuditEventKind::ProtectionViolation), 1);
    }

    #[test]
    fn test_delete_of_system_policy_is_rejected() {
        let repo = GuardedRepository::new(StubRepository::with(vec![make_policy("sys", true)]));
        let err = repo.delete(&PolicyId::new("sys")).unwrap_err();
        assert!(matches!(err, PolicyError::SystemPolicyProtected(_)));
        assert!(repo.find_by_id(&PolicyId::new("sys")).unwrap().is_some());
    }

    #[test]
    fn test_custom_policy_mutations_pass_through() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let repo = GuardedRepository::new(StubRepository::with(vec![make_policy("custom", false)]))
            .with_audit_sink(sink.clone());

        let updated = repo.update(&PolicyId::new("custom"), rename("renamed")).unwrap();
        assert_eq!(updated.name, "renamed");
        repo.delete(&PolicyId::new("custom")).unwrap();
        assert!(repo.find_by_id(&PolicyId::new("custom")).unwrap().is_none());
        assert_eq!(sink.count(PolicyAuditEventKind::PolicyUpdated), 1);
        assert_eq!(sink.count(PolicyAuditEventKind::PolicyDeleted), 1);
    }

    #[test]
    fn test_update_summary_notes_condition_changes() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let repo = GuardedRepository::new(StubRepository::with(vec![make_policy("custom", false)]))
            .with_audit_sink(sink.clone());

        repo.update(&PolicyId::new("custom"), rename("renamed")).unwrap();
        let narrowed = PolicyChanges {
            action: Some(ActionCondition::of(["journal_entry:read"])),
            ..Default::default()
        };
        repo.update(&PolicyId::new("custom"), narrowed).unwrap();

        let summaries: Vec<String> = sink
            .events()
            .into_iter()
            .filter_map(|e| e.summary)
            .collect();
        assert_eq!(
            summaries,
            vec![
                "updated 'renamed'".to_string(),
                "updated 'renamed' (conditions changed)".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_policy_is_not_found() {
        let repo = GuardedRepository::new(StubRepository::default());
        assert!(matches!(
            repo.update(&PolicyId::new("ghost"), rename("x")),
            Err(PolicyError::NotFound(_))
        ));
        assert!(matches!(
            repo.delete(&PolicyId::new("ghost")),
            Err(PolicyError::NotFound(_))
        ));
    }

    #[test]
    fn test_guard_reads_fresh_state() {
        // The policy becomes a system policy after the guard was built; the
        // next update must still be rejected.
        let inner = Arc::new(StubRepository::with(vec![make_policy("p", false)]));
        let repo = GuardedRepository::new(inner.clone());
        inner
            .policies
            .lock()
            .unwrap()
            .get_mut(&PolicyId::new("p"))
            .unwrap()
            .is_system_policy = true;
        assert!(matches!(
            repo.update(&PolicyId::new("p"), rename("x")),
            Err(PolicyError::SystemPolicyProtected(_))
        ));
    }

    #[test]
    fn test_invalid_changes_are_rejected_before_write() {
        let repo = GuardedRepository::new(StubRepository::with(vec![make_policy("custom", false)]));
        let err = repo.update(&PolicyId::new("custom"), rename("")).unwrap_err();
        assert!(matches!(err, PolicyError::Validation(_)));
        assert_eq!(
            repo.find_by_id(&PolicyId::new("custom")).unwrap().unwrap().name,
            "custom"
        );
    }

    #[test]
    fn test_create_validates_input() {
        let repo = GuardedRepository::new(StubRepository::default());
        let input = NewPolicy {
            name: "Bad actions".into(),
            description: String::new(),
            subject: SubjectCondition::any(),
            resource: ResourceCondition::any(),
            action: ActionCondition::of(["post"]),
            environment: None,
            effect: Effect::Allow,
            priority: 0,
            is_active: true,
            created_by: None,
        };
        assert!(matches!(
            repo.create(&OrganizationId::new("org-1"), input),
            Err(PolicyError::Validation(_))
        ));
    }
}
