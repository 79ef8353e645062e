use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use warden_core::{OrganizationId, PolicyId, Timestamp};

/// Kinds of auditable events on the policy write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAuditEventKind {
    PolicyCreated,
    PolicyUpdated,
    PolicyDeleted,
    /// A mutation of a system policy was attempted and rejected.
    ProtectionViolation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAuditEvent {
    pub event_kind: PolicyAuditEventKind,
    pub timestamp: Timestamp,
    pub policy_id: PolicyId,
    pub organization_id: Option<OrganizationId>,
    pub summary: Option<String>,
}

/// Receives policy audit events.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &PolicyAuditEvent) -> Result<(), String>;
}

/// In-memory audit sink for testing.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<PolicyAuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PolicyAuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: PolicyAuditEventKind) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_kind == kind)
            .count()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: &PolicyAuditEvent) -> Result<(), String> {
        self.events
            .lock()
            .map_err(|_| "audit sink lock poisoned".to_string())?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_sink_records_events() {
        let sink = InMemoryAuditSink::new();
        let event = PolicyAuditEvent {
            event_kind: PolicyAuditEventKind::ProtectionViolation,
            timestamp: Timestamp::from_seconds(1),
            policy_id: PolicyId::new("sys"),
            organization_id: Some(OrganizationId::new("org-1")),
            summary: Some("update rejected".into()),
        };
        sink.emit(&event).unwrap();
        assert_eq!(sink.events(), vec![event]);
        assert_eq!(sink.count(PolicyAuditEventKind::ProtectionViolation), 1);
        assert_eq!(sink.count(PolicyAuditEventKind::PolicyDeleted), 0);
    }

    #[test]
    fn test_event_kind_serde() {
        let json = serde_json::to_string(&PolicyAuditEventKind::PolicyUpdated).unwrap();
        assert_eq!(json, "\"policy_updated\"");
    }
}
