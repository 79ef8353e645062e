//! Structural matching of conditions against an access request.
//!
//! Every facet uses the same subset rule for attributes: each key the
//! condition names must be present in the request with a matching value.
//!
//! | expected | actual | matches when                 |
//! |----------|--------|------------------------------|
//! | scalar   | scalar | equal                        |
//! | list     | scalar | actual is in the list        |
//! | scalar   | list   | expected is in the list      |
//! | list     | list   | the two lists share a value  |

use warden_core::{AttributeValue, Attributes};

use crate::condition::{
    ActionCondition, ConditionState, EnvironmentCondition, ResourceCondition,
    ResourceTypeSelector, SubjectCondition, WILDCARD,
};
use crate::types::{AccessRequest, AuthorizationPolicy, ResourceDescriptor};

/// Does `actual` satisfy `expected` under the table above?
pub fn value_matches(expected: &AttributeValue, actual: &AttributeValue) -> bool {
    expected
        .as_slice()
        .iter()
        .any(|e| actual.as_slice().iter().any(|a| e.same_as(a)))
}

/// Every key in `expected` is present in `actual` with a matching value.
pub fn attributes_match(expected: &Attributes, actual: &Attributes) -> bool {
    expected.iter().all(|(name, want)| {
        actual
            .get(name)
            .map(|have| value_matches(want, have))
            .unwrap_or(false)
    })
}

pub fn match_subject(condition: &SubjectCondition, subject: &Attributes) -> bool {
    attributes_match(&condition.0, subject)
}

pub fn match_resource(condition: &ResourceCondition, resource: &ResourceDescriptor) -> bool {
    let type_matches = match &condition.resource_type {
        ResourceTypeSelector::Any => true,
        ResourceTypeSelector::Exact(t) => *t == resource.resource_type,
    };
    if !type_matches {
        return false;
    }
    match &condition.attributes {
        Some(attrs) => attributes_match(attrs, &resource.attributes),
        None => true,
    }
}

pub fn match_action(condition: &ActionCondition, action: &str) -> bool {
    condition
        .actions
        .iter()
        .any(|a| a == WILDCARD || a == action)
}

pub fn match_environment(
    condition: Option<&EnvironmentCondition>,
    environment: &Attributes,
) -> bool {
    match condition {
        None => true,
        Some(c) => attributes_match(&c.0, environment),
    }
}

/// All four facets of `policy` match `request`. Undecodable policies never
/// match. Activity and organization scope are checked by the evaluator.
pub fn policy_matches(policy: &AuthorizationPolicy, request: &AccessRequest) -> bool {
    policy_matches_ignoring_action(policy, request)
        && match &policy.conditions {
            ConditionState::Decoded(c) => match_action(&c.action, &request.action),
            ConditionState::Undecodable(_) => false,
        }
}

/// Subject, resource, and environment facets match. Used to enumerate
/// permissions where the action varies.
pub fn policy_matches_ignoring_action(
    policy: &AuthorizationPolicy,
    request: &AccessRequest,
) -> bool {
    match &policy.conditions {
        ConditionState::Decoded(c) => {
            match_subject(&c.subject, &request.subject)
                && match_resource(&c.resource, &request.resource)
                && match_environment(c.environment.as_ref(), &request.environment)
        }
        ConditionState::Undecodable(e) => {
            tracing::warn!(
                policy_id = %policy.id,
                facet = %e.facet,
                "skipping policy with undecodable conditions"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionFacet, PolicyConditions};
    use crate::error::ConditionDecodeError;
    use crate::types::Effect;
    use warden_core::{OrganizationId, PolicyId, Timestamp};

    fn request(action: &str) -> AccessRequest {
        AccessRequest {
            organization_id: OrganizationId::new("org-1"),
            subject: Attributes::new()
                .with("role", "accountant")
                .with("functionalRoles", vec!["approver", "poster"]),
            resource: ResourceDescriptor::new("journal_entry").with_attribute("status", "draft"),
            action: action.to_string(),
            environment: Attributes::new().with("network", "office"),
        }
    }

    fn policy(conditions: ConditionState) -> AuthorizationPolicy {
        AuthorizationPolicy {
            id: PolicyId::new("p1"),
            organization_id: OrganizationId::new("org-1"),
            name: "test".into(),
            description: String::new(),
            conditions,
            effect: Effect::Allow,
            priority: 0,
            is_system_policy: false,
            is_active: true,
            created_at: Timestamp::from_seconds(0),
            updated_at: Timestamp::from_seconds(0),
            created_by: None,
        }
    }

    #[test]
    fn test_empty_subject_matches_anyone() {
        assert!(match_subject(&SubjectCondition::any(), &Attributes::new()));
    }

    #[test]
    fn test_subject_scalar_equality() {
        let cond = SubjectCondition(Attributes::new().with("role", "accountant"));
        assert!(match_subject(&cond, &request("x").subject));
        let cond = SubjectCondition(Attributes::new().with("role", "auditor"));
        assert!(!match_subject(&cond, &request("x").subject));
    }

    #[test]
    fn test_subject_expected_list_is_set_membership() {
        let cond = SubjectCondition(Attributes::new().with("role", vec!["admin", "accountant"]));
        assert!(match_subject(&cond, &request("x").subject));
    }

    #[test]
    fn test_subject_actual_list_contains_expected() {
        let cond = SubjectCondition(Attributes::new().with("functionalRoles", "poster"));
        assert!(match_subject(&cond, &request("x").subject));
        let cond = SubjectCondition(Attributes::new().with("functionalRoles", "controller"));
        assert!(!match_subject(&cond, &request("x").subject));
    }

    #[test]
    fn test_subject_list_against_list_intersects() {
        let cond = SubjectCondition(
            Attributes::new().with("functionalRoles", vec!["controller", "approver"]),
        );
        assert!(match_subject(&cond, &request("x").subject));
    }

    #[test]
    fn test_subject_missing_key_does_not_match() {
        let cond = SubjectCondition(Attributes::new().with("department", "finance"));
        assert!(!match_subject(&cond, &request("x").subject));
    }

    #[test]
    fn test_resource_wildcard_and_exact_type() {
        let resource = request("x").resource;
        assert!(match_resource(&ResourceCondition::any(), &resource));
        assert!(match_resource(
            &ResourceCondition::of_type("journal_entry"),
            &resource
        ));
        assert!(!match_resource(&ResourceCondition::of_type("account"), &resource));
    }

    #[test]
    fn test_resource_attributes_subset() {
        let resource = request("x").resource;
        let draft = ResourceCondition::of_type("journal_entry")
            .with_attributes(Attributes::new().with("status", "draft"));
        assert!(match_resource(&draft, &resource));
        let posted = ResourceCondition::any()
            .with_attributes(Attributes::new().with("status", "posted"));
        assert!(!match_resource(&posted, &resource));
    }

    #[test]
    fn test_action_wildcard_and_membership() {
        assert!(match_action(&ActionCondition::any(), "anything:at_all"));
        let cond = ActionCondition::of(["journal_entry:read"]);
        assert!(match_action(&cond, "journal_entry:read"));
        assert!(!match_action(&cond, "journal_entry:post"));
    }

    #[test]
    fn test_empty_action_list_matches_nothing() {
        assert!(!match_action(&ActionCondition::default(), "journal_entry:read"));
        assert!(!match_action(&ActionCondition::default(), "*"));
    }

    #[test]
    fn test_environment_absent_is_unconstrained() {
        assert!(match_environment(None, &Attributes::new()));
        let office = EnvironmentCondition(Attributes::new().with("network", "office"));
        assert!(match_environment(Some(&office), &request("x").environment));
        assert!(!match_environment(Some(&office), &Attributes::new()));
    }

    #[test]
    fn test_policy_matches_requires_all_facets() {
        let conditions = PolicyConditions {
            subject: SubjectCondition(Attributes::new().with("role", "accountant")),
            resource: ResourceCondition::of_type("journal_entry"),
            action: ActionCondition::of(["journal_entry:post"]),
            environment: Some(EnvironmentCondition(
                Attributes::new().with("network", "office"),
            )),
        };
        let p = policy(ConditionState::Decoded(conditions));
        assert!(policy_matches(&p, &request("journal_entry:post")));
        assert!(!policy_matches(&p, &request("journal_entry:read")));

        let mut remote = request("journal_entry:post");
        remote.environment = Attributes::new().with("network", "vpn");
        assert!(!policy_matches(&p, &remote));
    }

    #[test]
    fn test_undecodable_policy_never_matches() {
        let p = policy(ConditionState::Undecodable(ConditionDecodeError::new(
            ConditionFacet::Action,
            "expected a map",
        )));
        assert!(!policy_matches(&p, &request("journal_entry:read")));
        assert!(!policy_matches_ignoring_action(&p, &request("journal_entry:read")));
    }
}
