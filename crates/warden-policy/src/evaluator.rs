use crate::matcher::policy_matches;
use crate::types::{
    AccessRequest, AuthorizationPolicy, Decision, DecisionReason, Effect, Evaluation,
};

/// Evaluates access requests against a fixed set of policies.
///
/// Pure and synchronous: the policy slice is read-only for the lifetime of
/// the evaluator, so one evaluator (or many over the same snapshot) can be
/// shared across threads without locking.
///
/// Combining algorithm:
/// 1. candidates = active, organization-matching policies whose four
///    conditions all match;
/// 2. no candidates → `Deny`;
/// 3. the highest-priority tier among candidates is authoritative: any
///    `deny` in it → `Deny`, otherwise `Allow`. Lower tiers are never
///    consulted.
#[derive(Debug, Clone, Copy)]
pub struct PolicyEvaluator<'a> {
    policies: &'a [AuthorizationPolicy],
}

impl<'a> PolicyEvaluator<'a> {
    pub const fn new(policies: &'a [AuthorizationPolicy]) -> Self {
        Self { policies }
    }

    pub fn policies(&self) -> &'a [AuthorizationPolicy] {
        self.policies
    }

    pub fn evaluate(&self, request: &AccessRequest) -> Decision {
        self.explain(request).decision
    }

    /// Evaluate and report which tier and policies decided the outcome.
    pub fn explain(&self, request: &AccessRequest) -> Evaluation {
        let candidates = self.candidates(request);
        let evaluation = decide(&candidates);
        tracing::debug!(
            organization_id = %request.organization_id,
            action = %request.action,
            resource_type = %request.resource.resource_type,
            decision = %evaluation.decision,
            tier_priority = ?evaluation.tier_priority,
            candidates = evaluation.candidate_count,
            "access request evaluated"
        );
        evaluation
    }

    /// Matching policies in evaluation order: priority descending, then
    /// oldest first within a priority.
    pub fn candidates(&self, request: &AccessRequest) -> Vec<&'a AuthorizationPolicy> {
        let mut candidates: Vec<&AuthorizationPolicy> = self
            .policies
            .iter()
            .filter(|p| p.participates_in(&request.organization_id))
            .filter(|p| policy_matches(p, request))
            .collect();
        sort_for_evaluation(&mut candidates);
        candidates
    }
}

/// Priority descending, `created_at` ascending, then id for a total order.
pub(crate) fn sort_for_evaluation(policies: &mut [&AuthorizationPolicy]) {
    policies.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Tier aggregation over candidates already sorted for evaluation.
pub(crate) fn decide(candidates: &[&AuthorizationPolicy]) -> Evaluation {
    let Some(top) = candidates.first() else {
        return Evaluation::no_match();
    };
    let tier: Vec<&AuthorizationPolicy> = candidates
        .iter()
        .take_while(|p| p.priority == top.priority)
        .copied()
        .collect();

    let (decision, reason) = if tier.iter().any(|p| p.effect == Effect::Deny) {
        (Decision::Deny, DecisionReason::DenyInTier)
    } else {
        (Decision::Allow, DecisionReason::AllowedByTier)
    };

    Evaluation {
        decision,
        reason,
        tier_priority: Some(top.priority),
        deciding_policy_ids: tier.iter().map(|p| p.id.clone()).collect(),
        candidate_count: candidates.len(),
    }
}
