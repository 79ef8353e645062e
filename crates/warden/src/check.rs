//! Offline lint of stored policies.

use serde::Serialize;
use warden_core::{OrganizationId, PolicyId};
use warden_policy::validation::validate_new_policy;
use warden_policy::{AuthorizationPolicy, ConditionState, NewPolicy, PolicyError};

/// One problem found in one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyIssue {
    pub policy_id: PolicyId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub problem: String,
}

/// Report undecodable conditions and policies that would fail validation
/// if submitted today.
pub fn check_policies(policies: &[AuthorizationPolicy]) -> Vec<PolicyIssue> {
    let mut issues = Vec::new();
    for policy in policies {
        let issue = |problem: String| PolicyIssue {
            policy_id: policy.id.clone(),
            organization_id: policy.organization_id.clone(),
            name: policy.name.clone(),
            problem,
        };
        match &policy.conditions {
            ConditionState::Undecodable(e) => issues.push(issue(e.to_string())),
            ConditionState::Decoded(c) => {
                let resubmitted = NewPolicy {
                    name: policy.name.clone(),
                    description: policy.description.clone(),
                    subject: c.subject.clone(),
                    resource: c.resource.clone(),
                    action: c.action.clone(),
                    environment: c.environment.clone(),
                    effect: policy.effect,
                    priority: policy.priority,
                    is_active: policy.is_active,
                    created_by: policy.created_by.clone(),
                };
                if let Err(PolicyError::Validation(msg)) = validate_new_policy(&resubmitted) {
                    issues.extend(msg.split("; ").map(|p| issue(p.to_string())));
                }
            }
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_policy::decode_records;

    #[test]
    fn test_reports_each_problem() {
        let policies = decode_records(
            r#"[
                {"id": "ok", "organization_id": "o", "name": "fine",
                 "subject_condition": {}, "resource_condition": {"type": "*"},
                 "action_condition": {"actions": ["invoice:read"]}, "effect": "allow"},
                {"id": "broken", "organization_id": "o", "name": "broken",
                 "subject_condition": {}, "resource_condition": {"kind": "x"},
                 "action_condition": {"actions": ["*"]}, "effect": "deny"},
                {"id": "legacy", "organization_id": "o", "name": "",
                 "subject_condition": {}, "resource_condition": {"type": "Invoice"},
                 "action_condition": {"actions": ["read"]}, "effect": "allow"}
            ]"#,
        )
        .unwrap();

        let issues = check_policies(&policies);
        assert!(issues.iter().all(|i| i.policy_id.as_str() != "ok"));
        assert_eq!(
            issues.iter().filter(|i| i.policy_id.as_str() == "broken").count(),
            1
        );
        assert_eq!(
            issues.iter().filter(|i| i.policy_id.as_str() == "legacy").count(),
            3
        );
    }

    #[test]
    fn test_clean_set_has_no_issues() {
        assert!(check_policies(&[]).is_empty());
    }
}
