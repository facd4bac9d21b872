//! Side channel for successful mutations.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use nubem_secrets_spec::Caller;
use serde::Serialize;
use tracing::info;

pub const AUDIT_TARGET: &str = "nubem_secrets::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    /// `None` for system callers.
    pub identity: Option<String>,
    pub action: AuditAction,
    pub name: String,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn now(caller: &Caller, action: AuditAction, name: impl Into<String>) -> Self {
        Self {
            identity: caller.identity().map(|identity| identity.email().to_string()),
            action,
            name: name.into(),
            at: Utc::now(),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Emits each record as a structured event on the audit target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        info!(
            target: AUDIT_TARGET,
            identity = record.identity.as_deref().unwrap_or("system"),
            action = record.action.as_str(),
            name = %record.name,
            at = %record.at.to_rfc3339(),
            "secret mutated"
        );
    }
}

/// Keeps records in memory; used by tests and embedded callers.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_carry_identity_for_users_only() {
        let user = AuditRecord::now(&Caller::user("alice@example.com"), AuditAction::Create, "k");
        assert_eq!(user.identity.as_deref(), Some("alice@example.com"));

        let system = AuditRecord::now(&Caller::System, AuditAction::Delete, "k");
        assert!(system.identity.is_none());
    }

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        let caller = Caller::user("alice@example.com");
        sink.record(&AuditRecord::now(&caller, AuditAction::Create, "a"));
        sink.record(&AuditRecord::now(&caller, AuditAction::Update, "a"));
        let actions: Vec<_> = sink.records().iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![AuditAction::Create, AuditAction::Update]);
    }
}
