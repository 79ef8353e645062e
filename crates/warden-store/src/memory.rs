use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use warden_core::{OrganizationId, PolicyId, Timestamp};
use warden_policy::{
    parse_records, AuthorizationPolicy, NewPolicy, PolicyChanges, PolicyError, PolicyRecord,
    PolicyRepository, PolicyResult,
};

type RecordMap = HashMap<PolicyId, PolicyRecord>;

/// In-memory policy repository implementing [`PolicyRepository`].
///
/// A single mutex serializes all writes. This type applies no protection
/// rules of its own; wrap it in [`warden_policy::GuardedRepository`] for
/// system-policy immutability and input validation.
pub struct InMemoryPolicyRepository {
    records: Mutex<RecordMap>,
}

fn lock_records(mutex: &Mutex<RecordMap>) -> PolicyResult<MutexGuard<'_, RecordMap>> {
    mutex
        .lock()
        .map_err(|e| PolicyError::Storage(format!("lock poisoned: {}", e)))
}

/// Priority descending, then oldest first.
fn sort_for_listing(policies: &mut [AuthorizationPolicy]) {
    policies.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl InMemoryPolicyRepository {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Build a repository from stored rows, e.g. an export of the policy
    /// table. Later rows replace earlier ones with the same id.
    pub fn from_records(records: impl IntoIterator<Item = PolicyRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }

    /// Load a JSON array of stored rows. Rows whose columns cannot be read
    /// are logged and skipped; see [`warden_policy::parse_records`].
    pub fn from_json(json: &str) -> PolicyResult<Self> {
        let parsed = parse_records(json)?;
        Ok(Self::from_records(parsed.records))
    }

    /// Create a built-in policy for `organization_id`.
    ///
    /// Imported rows (`from_records`, `from_json`) keep their stored
    /// `is_system_policy` flag; past import, this is the only way to add a
    /// system policy.
    pub fn seed_system_policy(
        &self,
        organization_id: &OrganizationId,
        input: NewPolicy,
    ) -> PolicyResult<AuthorizationPolicy> {
        let mut record = new_record(organization_id, &input)?;
        record.is_system_policy = true;
        let policy = AuthorizationPolicy::from_record(&record);
        lock_records(&self.records)?.insert(record.id.clone(), record);
        tracing::info!(policy_id = %policy.id, organization_id = %organization_id, "system policy seeded");
        Ok(policy)
    }

    /// Snapshot of every stored row, ordered by id.
    pub fn records(&self) -> PolicyResult<Vec<PolicyRecord>> {
        let mut records: Vec<PolicyRecord> =
            lock_records(&self.records)?.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Number of stored policies.
    pub fn count(&self) -> usize {
        lock_records(&self.records).map(|r| r.len()).unwrap_or(0)
    }

    fn decode_where<F>(&self, keep: F) -> PolicyResult<Vec<AuthorizationPolicy>>
    where
        F: Fn(&PolicyRecord) -> bool,
    {
        let records = lock_records(&self.records)?;
        let mut policies: Vec<AuthorizationPolicy> = records
            .values()
            .filter(|r| keep(r))
            .map(AuthorizationPolicy::from_record)
            .collect();
        sort_for_listing(&mut policies);
        Ok(policies)
    }
}

impl Default for InMemoryPolicyRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn new_record(organization_id: &OrganizationId, input: &NewPolicy) -> PolicyResult<PolicyRecord> {
    let now = Timestamp::now();
    let mut record = PolicyRecord {
        id: PolicyId::new(uuid::Uuid::new_v4().to_string()),
        organization_id: organization_id.clone(),
        name: input.name.clone(),
        description: input.description.clone(),
        subject_condition: serde_json::Value::Null,
        resource_condition: serde_json::Value::Null,
        action_condition: serde_json::Value::Null,
        environment_condition: None,
        effect: input.effect,
        priority: input.priority,
        is_system_policy: false,
        is_active: input.is_active,
        created_at: now,
        updated_at: now,
        created_by: input.created_by.clone(),
    };
    record.set_conditions(&input.conditions())?;
    Ok(record)
}

/// Apply a partial update in place. Each condition facet is re-encoded on
/// its own, so untouched blobs are kept byte-for-byte.
fn apply_changes(record: &mut PolicyRecord, changes: PolicyChanges) -> PolicyResult<()> {
    if let Some(name) = changes.name {
        record.name = name;
    }
    if let Some(description) = changes.description {
        record.description = description;
    }
    if let Some(subject) = changes.subject {
        record.subject_condition = serde_json::to_value(subject)?;
    }
    if let Some(resource) = changes.resource {
        record.resource_condition = serde_json::to_value(resource)?;
    }
    if let Some(action) = changes.action {
        record.action_condition = serde_json::to_value(action)?;
    }
    if let Some(environment) = changes.environment {
        record.environment_condition = environment.map(serde_json::to_value).transpose()?;
    }
    if let Some(effect) = changes.effect {
        record.effect = effect;
    }
    if let Some(priority) = changes.priority {
        record.priority = priority;
    }
    if let Some(is_active) = changes.is_active {
        record.is_active = is_active;
    }
    record.updated_at = Timestamp::now();
    Ok(())
}

impl PolicyRepository for InMemoryPolicyRepository {
    fn find_active_by_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Vec<AuthorizationPolicy>> {
        self.decode_where(|r| r.is_active && &r.organization_id == organization_id)
    }

    fn find_by_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> PolicyResult<Vec<AuthorizationPolicy>> {
        self.decode_where(|r| &r.organization_id == organization_id)
    }

    fn find_by_id(&self, id: &PolicyId) -> PolicyResult<Option<AuthorizationPolicy>> {
        let records = lock_records(&self.records)?;
        Ok(records.get(id).map(AuthorizationPolicy::from_record))
    }

    fn create(
        &self,
        organization_id: &OrganizationId,
        input: NewPolicy,
    ) -> PolicyResult<AuthorizationPolicy> {
        let record = new_record(organization_id, &input)?;
        let policy = AuthorizationPolicy::from_record(&record);
        lock_records(&self.records)?.insert(record.id.clone(), record);
        Ok(policy)
    }

    fn update(&self, id: &PolicyId, changes: PolicyChanges) -> PolicyResult<AuthorizationPolicy> {
        let mut records = lock_records(&self.records)?;
        let record = records
            .get_mut(id)
            .ok_or_else(|| PolicyError::NotFound(id.clone()))?;
        let mut updated = record.clone();
        apply_changes(&mut updated, changes)?;
        *record = updated;
        Ok(AuthorizationPolicy::from_record(record))
    }

    fn delete(&self, id: &PolicyId) -> PolicyResult<()> {
        let mut records = lock_records(&self.records)?;
        records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PolicyError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_policy::{
        ActionCondition, ConditionState, Effect, EnvironmentCondition, GuardedRepository,
        ResourceCondition, SubjectCondition,
    };

    fn org() -> OrganizationId {
        OrganizationId::new("org-1")
    }

    fn new_policy(name: &str, priority: i32) -> NewPolicy {
        NewPolicy {
            name: name.to_string(),
            description: String::new(),
            subject: SubjectCondition::any(),
            resource: ResourceCondition::of_type("journal_entry"),
            action: ActionCondition::of(["journal_entry:read"]),
            environment: None,
            effect: Effect::Allow,
            priority,
            is_active: true,
            created_by: None,
        }
    }

    #[test]
    fn test_create_and_find() {
        let repo = InMemoryPolicyRepository::new();
        let created = repo.create(&org(), new_policy("read", 10)).unwrap();
        assert!(!created.is_system_policy);
        assert!(matches!(created.conditions, ConditionState::Decoded(_)));

        let found = repo.find_by_id(&created.id).unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(repo.count(), 1);
    }

    #[test]
    fn test_created_ids_are_unique() {
        let repo = InMemoryPolicyRepository::new();
        let a = repo.create(&org(), new_policy("a", 0)).unwrap();
        let b = repo.create(&org(), new_policy("b", 0)).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_active_filter_and_org_scope() {
        let repo = InMemoryPolicyRepository::new();
        let mut inactive = new_policy("off", 5);
        inactive.is_active = false;
        repo.create(&org(), inactive).unwrap();
        repo.create(&org(), new_policy("on", 5)).unwrap();
        repo.create(&OrganizationId::new("org-2"), new_policy("other", 5))
            .unwrap();

        assert_eq!(repo.find_active_by_organization(&org()).unwrap().len(), 1);
        assert_eq!(repo.find_by_organization(&org()).unwrap().len(), 2);
    }

    #[test]
    fn test_listing_is_priority_ordered() {
        let repo = InMemoryPolicyRepository::new();
        repo.create(&org(), new_policy("low", 1)).unwrap();
        repo.create(&org(), new_policy("high", 50)).unwrap();
        let names: Vec<String> = repo
            .find_by_organization(&org())
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[test]
    fn test_update_applies_partial_changes() {
        let repo = InMemoryPolicyRepository::new();
        let created = repo.create(&org(), new_policy("read", 10)).unwrap();
        let updated = repo
            .update(
                &created.id,
                PolicyChanges {
                    priority: Some(20),
                    environment: Some(Some(EnvironmentCondition::from(
                        warden_core::Attributes::new().with("network", "office"),
                    ))),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "read");
        assert_eq!(updated.priority, 20);
        let conditions = updated.conditions.decoded().unwrap();
        assert!(conditions.environment.is_some());
        assert_eq!(conditions.action, ActionCondition::of(["journal_entry:read"]));

        let cleared = repo
            .update(
                &created.id,
                PolicyChanges {
                    environment: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(cleared.conditions.decoded().unwrap().environment.is_none());
    }

    #[test]
    fn test_update_and_delete_missing() {
        let repo = InMemoryPolicyRepository::new();
        let ghost = PolicyId::new("ghost");
        assert!(matches!(
            repo.update(&ghost, PolicyChanges::default()),
            Err(PolicyError::NotFound(_))
        ));
        assert!(matches!(repo.delete(&ghost), Err(PolicyError::NotFound(_))));
    }

    #[test]
    fn test_seeded_policies_are_system_policies() {
        let repo = InMemoryPolicyRepository::new();
        let seeded = repo.seed_system_policy(&org(), new_policy("builtin", 100)).unwrap();
        assert!(seeded.is_system_policy);
        assert!(repo.find_by_id(&seeded.id).unwrap().unwrap().is_system_policy);
    }

    #[test]
    fn test_malformed_rows_decode_as_undecodable() {
        let repo = InMemoryPolicyRepository::from_json(
            &json!([{
                "id": "legacy",
                "organization_id": "org-1",
                "name": "legacy row",
                "subject_condition": {},
                "resource_condition": "journal_entry",
                "action_condition": {"actions": ["*"]},
                "effect": "allow"
            }])
            .to_string(),
        )
        .unwrap();
        let policy = repo.find_by_id(&PolicyId::new("legacy")).unwrap().unwrap();
        assert!(matches!(policy.conditions, ConditionState::Undecodable(_)));
        assert_eq!(repo.find_active_by_organization(&org()).unwrap().len(), 1);
    }

    #[test]
    fn test_unreadable_row_is_skipped_on_import() {
        let repo = InMemoryPolicyRepository::from_json(
            &json!([
                {
                    "id": "typo",
                    "organization_id": "org-1",
                    "name": "bad effect",
                    "subject_condition": {},
                    "resource_condition": {"type": "*"},
                    "action_condition": {"actions": ["*"]},
                    "effect": "permit"
                },
                {
                    "id": "read",
                    "organization_id": "org-1",
                    "name": "read",
                    "subject_condition": {},
                    "resource_condition": {"type": "*"},
                    "action_condition": {"actions": ["journal_entry:read"]},
                    "effect": "allow"
                }
            ])
            .to_string(),
        )
        .unwrap();
        assert_eq!(repo.count(), 1);
        assert!(repo.find_by_id(&PolicyId::new("typo")).unwrap().is_none());
        assert!(repo.find_by_id(&PolicyId::new("read")).unwrap().is_some());
        assert!(InMemoryPolicyRepository::from_json("{}").is_err());
    }

    #[test]
    fn test_imported_system_rows_stay_protected() {
        let repo = GuardedRepository::new(
            InMemoryPolicyRepository::from_json(
                &json!([{
                    "id": "owners",
                    "organization_id": "org-1",
                    "name": "owners",
                    "subject_condition": {"role": "owner"},
                    "resource_condition": {"type": "*"},
                    "action_condition": {"actions": ["*"]},
                    "effect": "allow",
                    "priority": 1000,
                    "is_system_policy": true
                }])
                .to_string(),
            )
            .unwrap(),
        );
        let id = PolicyId::new("owners");
        assert!(repo.find_by_id(&id).unwrap().unwrap().is_system_policy);
        assert!(matches!(
            repo.update(&id, PolicyChanges { priority: Some(1), ..Default::default() }),
            Err(PolicyError::SystemPolicyProtected(_))
        ));
        assert!(matches!(repo.delete(&id), Err(PolicyError::SystemPolicyProtected(_))));
    }

    #[test]
    fn test_records_export_round_trips() {
        let repo = InMemoryPolicyRepository::new();
        repo.create(&org(), new_policy("read", 10)).unwrap();
        let exported = serde_json::to_string(&repo.records().unwrap()).unwrap();
        let reloaded = InMemoryPolicyRepository::from_json(&exported).unwrap();
        assert_eq!(
            reloaded.find_by_organization(&org()).unwrap(),
            repo.find_by_organization(&org()).unwrap()
        );
    }
}
