use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::condition::{ConditionState, WILDCARD};
use crate::evaluator::PolicyEvaluator;
use crate::matcher::policy_matches_ignoring_action;
use crate::types::{AuthorizationPolicy, Effect, PermissionContext};

/// The actions a subject may perform, as consumed by the permissions matrix.
///
/// Serialized as `"*"` when unrestricted, otherwise as a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PermissionsRepr", into = "PermissionsRepr")]
pub enum EffectivePermissions {
    /// Every action in the catalog is allowed.
    Unrestricted,
    Actions(BTreeSet<String>),
}

impl EffectivePermissions {
    pub fn allows(&self, action: &str) -> bool {
        match self {
            EffectivePermissions::Unrestricted => true,
            EffectivePermissions::Actions(set) => set.contains(action),
        }
    }

    /// Expand to a concrete set over `catalog`.
    pub fn to_action_set<S: AsRef<str>>(&self, catalog: &[S]) -> BTreeSet<String> {
        match self {
            EffectivePermissions::Unrestricted => {
                catalog.iter().map(|a| a.as_ref().to_string()).collect()
            }
            EffectivePermissions::Actions(set) => set.clone(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, EffectivePermissions::Unrestricted)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PermissionsRepr {
    Sentinel(String),
    Actions(BTreeSet<String>),
}

impl TryFrom<PermissionsRepr> for EffectivePermissions {
    type Error = String;

    fn try_from(repr: PermissionsRepr) -> Result<Self, Self::Error> {
        match repr {
            PermissionsRepr::Sentinel(s) if s == WILDCARD => Ok(EffectivePermissions::Unrestricted),
            PermissionsRepr::Sentinel(s) => Err(format!(
                "expected \"{}\" or a list of actions, got \"{}\"",
                WILDCARD, s
            )),
            PermissionsRepr::Actions(set) => Ok(EffectivePermissions::Actions(set)),
        }
    }
}

impl From<EffectivePermissions> for PermissionsRepr {
    fn from(p: EffectivePermissions) -> Self {
        match p {
            EffectivePermissions::Unrestricted => PermissionsRepr::Sentinel(WILDCARD.to_string()),
            EffectivePermissions::Actions(set) => PermissionsRepr::Actions(set),
        }
    }
}

/// Enumerates allowed actions by evaluating each catalog action in turn.
///
/// When the wildcard short-circuit is enabled and the top matching tier
/// holds an `allow` on `"*"` with no `deny` beside it, every action would
/// be allowed, so the per-action loop is skipped and
/// [`EffectivePermissions::Unrestricted`] is returned.
#[derive(Debug, Clone, Copy)]
pub struct EffectivePermissionsCalculator<'a> {
    evaluator: PolicyEvaluator<'a>,
    short_circuit: bool,
}

impl<'a> EffectivePermissionsCalculator<'a> {
    pub fn new(policies: &'a [AuthorizationPolicy]) -> Self {
        Self {
            evaluator: PolicyEvaluator::new(policies),
            short_circuit: true,
        }
    }

    pub fn with_short_circuit(mut self, enabled: bool) -> Self {
        self.short_circuit = enabled;
        self
    }

    pub fn calculate<S: AsRef<str>>(
        &self,
        context: &PermissionContext,
        catalog: &[S],
    ) -> EffectivePermissions {
        if self.short_circuit && self.has_unrestricted_grant(context) {
            tracing::debug!(
                organization_id = %context.organization_id,
                resource_type = %context.resource.resource_type,
                "wildcard grant at top tier; permissions unrestricted"
            );
            return EffectivePermissions::Unrestricted;
        }

        let mut allowed = BTreeSet::new();
        for action in catalog {
            let action: &str = action.as_ref();
            if self.evaluator.evaluate(&context.request_for(action)).is_allowed() {
                allowed.insert(action.to_string());
            }
        }
        EffectivePermissions::Actions(allowed)
    }

    /// True if every action is allowed for `context`: among policies whose
    /// subject, resource, and environment match, the highest tier contains
    /// an `allow` covering `"*"` and no `deny`.
    fn has_unrestricted_grant(&self, context: &PermissionContext) -> bool {
        let wildcard_request = context.request_for(WILDCARD);
        let matching: Vec<&AuthorizationPolicy> = self
            .evaluator
            .policies()
            .iter()
            .filter(|p| p.participates_in(&context.organization_id))
            .filter(|p| policy_matches_ignoring_action(p, &wildcard_request))
            .collect();

        let Some(top) = matching.iter().map(|p| p.priority).max() else {
            return false;
        };
        let mut wildcard_allow = false;
        for policy in matching.iter().filter(|p| p.priority == top) {
            match policy.effect {
                Effect::Deny => return false,
                Effect::Allow => {
                    if let ConditionState::Decoded(c) = &policy.conditions {
                        wildcard_allow |= c.action.is_wildcard();
                    }
                }
            }
        }
        wildcard_allow
    }
}
