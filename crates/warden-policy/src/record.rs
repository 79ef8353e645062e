//! Stored form of a policy and the boundary decoding into
//! [`AuthorizationPolicy`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_core::{OrganizationId, PolicyId, Timestamp, UserId};

use crate::condition::{decode_conditions, encode_conditions, ConditionState, PolicyConditions};
use crate::error::PolicyResult;
use crate::types::{AuthorizationPolicy, Effect};

/// A policy row as persisted: conditions are opaque JSON blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: PolicyId,
    pub organization_id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub subject_condition: Value,
    pub resource_condition: Value,
    pub action_condition: Value,
    #[serde(default)]
    pub environment_condition: Option<Value>,
    pub effect: Effect,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub is_system_policy: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "epoch")]
    pub created_at: Timestamp,
    #[serde(default = "epoch")]
    pub updated_at: Timestamp,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

fn default_true() -> bool {
    true
}

fn epoch() -> Timestamp {
    Timestamp::from_seconds(0)
}

impl PolicyRecord {
    /// Replace the stored condition blobs with the encoding of `conditions`.
    pub fn set_conditions(&mut self, conditions: &PolicyConditions) -> PolicyResult<()> {
        let (subject, resource, action, environment) = encode_conditions(conditions)?;
        self.subject_condition = subject;
        self.resource_condition = resource;
        self.action_condition = action;
        self.environment_condition = environment;
        Ok(())
    }
}

impl AuthorizationPolicy {
    /// Decode a stored record. Never fails: undecodable conditions are kept
    /// as [`ConditionState::Undecodable`] so the policy stays visible to list
    /// APIs but can never match a request.
    pub fn from_record(record: &PolicyRecord) -> Self {
        let conditions = match decode_conditions(
            &record.subject_condition,
            &record.resource_condition,
            &record.action_condition,
            record.environment_condition.as_ref(),
        ) {
            Ok(c) => ConditionState::Decoded(c),
            Err(e) => {
                tracing::warn!(
                    policy_id = %record.id,
                    organization_id = %record.organization_id,
                    facet = %e.facet,
                    error = %e.message,
                    "policy conditions failed to decode; policy will not match"
                );
                ConditionState::Undecodable(e)
            }
        };

        Self {
            id: record.id.clone(),
            organization_id: record.organization_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            conditions,
            effect: record.effect,
            priority: record.priority,
            is_system_policy: record.is_system_policy,
            is_active: record.is_active,
            created_at: record.created_at,
            updated_at: record.updated_at,
            created_by: record.created_by.clone(),
        }
    }
}

/// A stored row whose non-condition columns could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// Position in the exported array.
    pub index: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Rows read from an export of the policy table.
#[derive(Debug, Default)]
pub struct ParsedRecords {
    pub records: Vec<PolicyRecord>,
    pub rejected: Vec<RejectedRow>,
}

/// Read a JSON array of stored rows one row at a time.
///
/// Only a document that is not a JSON array is an error. A row with a bad
/// column (unknown effect, non-numeric priority, missing id) is logged and
/// reported in [`ParsedRecords::rejected`]; the remaining rows still load.
pub fn parse_records(json: &str) -> PolicyResult<ParsedRecords> {
    let rows: Vec<Value> = serde_json::from_str(json)?;
    let mut parsed = ParsedRecords::default();
    for (index, row) in rows.into_iter().enumerate() {
        let id = row.get("id").and_then(Value::as_str).map(str::to_string);
        match serde_json::from_value::<PolicyRecord>(row) {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                tracing::warn!(
                    row = index,
                    policy_id = id.as_deref().unwrap_or("<none>"),
                    error = %e,
                    "stored policy row rejected; skipping"
                );
                parsed.rejected.push(RejectedRow {
                    index,
                    id,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(parsed)
}

/// Decode a JSON array of stored records, as exported from the policy table.
/// Rows rejected by [`parse_records`] are skipped.
pub fn decode_records(json: &str) -> PolicyResult<Vec<AuthorizationPolicy>> {
    Ok(parse_records(json)?
        .records
        .iter()
        .map(AuthorizationPolicy::from_record)
        .collect())
}
