//! Warden Policy Engine
//!
//! Attribute-based authorization for multi-tenant applications. Every
//! request is evaluated as Subject + Resource + Action + Environment
//! against an organization's active policies, producing `Allow` or `Deny`.
//!
//! Key features:
//! - Priority tiers: only the highest matching tier decides
//! - Deny-overrides within a tier, default deny when nothing matches
//! - Fail-closed decoding: a malformed stored condition never matches
//! - Effective permission enumeration with a wildcard short-circuit
//! - System policies that cannot be updated or deleted
//! - Versioned per-organization snapshots with atomic swap

pub mod audit;
pub mod condition;
pub mod error;
pub mod evaluator;
pub mod guard;
pub mod matcher;
pub mod permissions;
pub mod record;
pub mod repository;
pub mod snapshot;
pub mod types;
pub mod validation;

// Re-export primary types for convenience
pub use audit::{AuditSink, InMemoryAuditSink, PolicyAuditEvent, PolicyAuditEventKind};
pub use condition::{
    ActionCondition, ConditionFacet, ConditionState, EnvironmentCondition, PolicyConditions,
    ResourceCondition, ResourceTypeSelector, SubjectCondition, WILDCARD,
};
pub use error::{ConditionDecodeError, PolicyError, PolicyErrorKind, PolicyResult};
pub use evaluator::PolicyEvaluator;
pub use guard::{guard_delete, guard_update, GuardedRepository};
pub use permissions::{EffectivePermissions, EffectivePermissionsCalculator};
pub use record::{decode_records, parse_records, ParsedRecords, PolicyRecord, RejectedRow};
pub use repository::PolicyRepository;
pub use snapshot::{PolicySnapshot, SnapshotCache};
pub use types::{
    AccessRequest, AuthorizationPolicy, Decision, DecisionReason, Effect, Evaluation, NewPolicy,
    PermissionContext, PolicyChanges, ResourceDescriptor,
};
