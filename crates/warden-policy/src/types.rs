use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use warden_core::{Attributes, AttributeValue, OrganizationId, PolicyId, Timestamp, UserId};

use crate::condition::{
    ActionCondition, ConditionState, EnvironmentCondition, PolicyConditions, ResourceCondition,
    SubjectCondition,
};

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthorizationPolicy: decoded, organization-scoped policy
// ---------------------------------------------------------------------------

/// An organization-scoped access-control policy with decoded conditions.
///
/// Built from a [`crate::record::PolicyRecord`] at the repository boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationPolicy {
    pub id: PolicyId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub description: String,
    pub conditions: ConditionState,
    pub effect: Effect,
    pub priority: i32,
    pub is_system_policy: bool,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub created_by: Option<UserId>,
}

impl AuthorizationPolicy {
    /// True if the policy can take part in evaluating a request for `org`.
    pub fn participates_in(&self, org: &OrganizationId) -> bool {
        self.is_active && &self.organization_id == org
    }
}

// ---------------------------------------------------------------------------
// Mutation inputs
// ---------------------------------------------------------------------------

/// Input for creating a custom policy.
///
/// Carries no `is_system_policy` flag. System policies are only seeded
/// through the repository's bootstrap path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewPolicy {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: SubjectCondition,
    pub resource: ResourceCondition,
    pub action: ActionCondition,
    #[serde(default)]
    pub environment: Option<EnvironmentCondition>,
    pub effect: Effect,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

impl NewPolicy {
    pub fn conditions(&self) -> PolicyConditions {
        PolicyConditions {
            subject: self.subject.clone(),
            resource: self.resource.clone(),
            action: self.action.clone(),
            environment: self.environment.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Partial update. `None` leaves a field unchanged; for `environment`,
/// `Some(None)` (an explicit JSON `null`) clears the constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subject: Option<SubjectCondition>,
    #[serde(default)]
    pub resource: Option<ResourceCondition>,
    #[serde(default)]
    pub action: Option<ActionCondition>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub environment: Option<Option<EnvironmentCondition>>,
    #[serde(default)]
    pub effect: Option<Effect>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// A present field, `null` included, becomes `Some`; an absent one falls
/// back to `default`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl PolicyChanges {
    pub fn touches_conditions(&self) -> bool {
        self.subject.is_some()
            || self.resource.is_some()
            || self.action.is_some()
            || self.environment.is_some()
    }
}

// ---------------------------------------------------------------------------
// AccessRequest: evaluation input, never persisted
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDescriptor {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ResourceDescriptor {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(name, value);
        self
    }
}

/// Who wants to do what, on which resource, under which conditions.
/// Subject attributes arrive already resolved by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessRequest {
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub subject: Attributes,
    pub resource: ResourceDescriptor,
    pub action: String,
    #[serde(default)]
    pub environment: Attributes,
}

/// An access request without an action, used to enumerate effective
/// permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionContext {
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub subject: Attributes,
    pub resource: ResourceDescriptor,
    #[serde(default)]
    pub environment: Attributes,
}

impl PermissionContext {
    pub fn request_for(&self, action: impl Into<String>) -> AccessRequest {
        AccessRequest {
            organization_id: self.organization_id.clone(),
            subject: self.subject.clone(),
            resource: self.resource.clone(),
            action: action.into(),
            environment: self.environment.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Deny => write!(f, "deny"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// No active, organization-matching policy matched the request.
    NoMatchingPolicy,
    /// Every policy in the highest matching tier allows.
    AllowedByTier,
    /// At least one policy in the highest matching tier denies.
    DenyInTier,
}

/// A decision together with the policies that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub reason: DecisionReason,
    /// Priority of the deciding tier; `None` when nothing matched.
    pub tier_priority: Option<i32>,
    /// Policies in the deciding tier, in evaluation order.
    pub deciding_policy_ids: Vec<PolicyId>,
    pub candidate_count: usize,
}

impl Evaluation {
    pub fn no_match() -> Self {
        Self {
            decision: Decision::Deny,
            reason: DecisionReason::NoMatchingPolicy,
            tier_priority: None,
            deciding_policy_ids: Vec::new(),
            candidate_count: 0,
        }
    }
}
