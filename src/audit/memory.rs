//! In-memory audit sink

use crate::core::traits::AuditSink;
use crate::types::{AuditEntry, AuditQuery, StoreError};
use std::sync::RwLock;

/// Append-only audit trail held in memory
///
/// Entries are kept in recording order. An entry id that was already recorded
/// is refused, so a retried `record` can never duplicate an entry.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, oldest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::unavailable("audit trail lock poisoned"))?;

        if entries.iter().any(|existing| existing.entry_id == entry.entry_id) {
            return Err(StoreError::DuplicateKey {
                key: entry.entry_id.clone(),
            });
        }

        entries.push(entry.clone());
        Ok(())
    }

    fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::unavailable("audit trail lock poisoned"))?;

        Ok(entries
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuditAction, TRANSACTION_REQUEST_ENTITY};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn entry(entity_id: &str, action: AuditAction) -> AuditEntry {
        AuditEntry {
            entry_id: AuditEntry::next_id(),
            action,
            entity_type: TRANSACTION_REQUEST_ENTITY.to_string(),
            entity_id: entity_id.to_string(),
            user_id: "alice".to_string(),
            actor_id: "admin".to_string(),
            previous_balance: Decimal::ZERO,
            new_balance: Decimal::new(100, 0),
            amount: Decimal::new(100, 0),
            fee: None,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_record_appends_in_order() {
        let sink = MemoryAuditSink::new();

        sink.record(&entry("r1", AuditAction::DepositApproved)).unwrap();
        sink.record(&entry("r2", AuditAction::WithdrawalRejected)).unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entity_id, "r1");
        assert_eq!(entries[1].entity_id, "r2");
    }

    #[test]
    fn test_record_refuses_duplicate_entry_id() {
        let sink = MemoryAuditSink::new();
        let e = entry("r1", AuditAction::DepositApproved);

        sink.record(&e).unwrap();
        let result = sink.record(&e);

        assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_query_by_entity() {
        let sink = MemoryAuditSink::new();
        sink.record(&entry("r1", AuditAction::DepositApproved)).unwrap();
        sink.record(&entry("r2", AuditAction::DepositApproved)).unwrap();

        let found = sink.query(&AuditQuery::for_entity("r2")).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_id, "r2");
    }
}
