//! Thread-safe in-memory request store
//!
//! Stores transaction requests in a `DashMap` keyed by request id. The only
//! mutation after insert is `finalize`, which applies a terminal status while
//! holding the entry lock and only if the request is still `Pending`, so two
//! writers can never both move the same request out of `Pending`.

use crate::core::traits::RequestStore;
use crate::types::{
    Finalization, RequestId, RequestStatus, StoreError, TransactionRequest,
};
use dashmap::DashMap;

/// Thread-safe request store backed by `DashMap`
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    requests: DashMap<RequestId, TransactionRequest>,
}

impl InMemoryRequestStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl RequestStore for InMemoryRequestStore {
    fn insert(&self, request: TransactionRequest) -> Result<(), StoreError> {
        let key = request.id.clone();
        let mut inserted = false;

        // First writer wins; the closure only runs when the slot is vacant
        self.requests.entry(key.clone()).or_insert_with(|| {
            inserted = true;
            request
        });

        if inserted {
            Ok(())
        } else {
            Err(StoreError::DuplicateKey { key })
        }
    }

    fn get(&self, request_id: &str) -> Result<Option<TransactionRequest>, StoreError> {
        Ok(self
            .requests
            .get(request_id)
            .map(|entry| entry.value().clone()))
    }

    fn finalize(
        &self,
        request_id: &str,
        finalization: Finalization,
    ) -> Result<TransactionRequest, StoreError> {
        let mut entry = self
            .requests
            .get_mut(request_id)
            .ok_or_else(|| StoreError::NotFound {
                key: request_id.to_string(),
            })?;

        let request = entry.value_mut();
        if request.status != RequestStatus::Pending || !finalization.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                key: request_id.to_string(),
                current: request.status,
            });
        }

        request.status = finalization.status;
        request.decided_at = Some(finalization.decided_at);
        request.decided_by = Some(finalization.decided_by);
        request.rejection_reason = finalization.rejection_reason;
        request.fee = finalization.fee;

        Ok(request.clone())
    }

    fn list(&self) -> Result<Vec<TransactionRequest>, StoreError> {
        Ok(self
            .requests
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewRequest, RequestKind};
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::thread;

    fn pending(id: &str) -> TransactionRequest {
        TransactionRequest::pending(
            NewRequest {
                id: id.to_string(),
                kind: RequestKind::Deposit,
                user_id: "alice".to_string(),
                amount: Decimal::new(100, 0),
                method: "bank_transfer".to_string(),
            },
            Utc::now(),
        )
    }

    fn finalization(status: RequestStatus) -> Finalization {
        Finalization {
            status,
            decided_at: Utc::now(),
            decided_by: "admin".to_string(),
            rejection_reason: None,
            fee: None,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = InMemoryRequestStore::new();

        store.insert(pending("r1")).unwrap();

        let request = store.get("r1").unwrap().unwrap();
        assert_eq!(request.id, "r1");
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(store.get("r2").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_keeps_first() {
        let store = InMemoryRequestStore::new();
        store.insert(pending("r1")).unwrap();

        let mut duplicate = pending("r1");
        duplicate.amount = Decimal::new(999, 0);
        let result = store.insert(duplicate);

        assert_eq!(
            result.unwrap_err(),
            StoreError::DuplicateKey {
                key: "r1".to_string()
            }
        );
        assert_eq!(store.get("r1").unwrap().unwrap().amount, Decimal::new(100, 0));
    }

    #[rstest]
    #[case::approve(RequestStatus::Approved)]
    #[case::reject(RequestStatus::Rejected)]
    fn test_finalize_pending_request(#[case] status: RequestStatus) {
        let store = InMemoryRequestStore::new();
        store.insert(pending("r1")).unwrap();

        let request = store.finalize("r1", finalization(status)).unwrap();

        assert_eq!(request.status, status);
        assert_eq!(request.decided_by.as_deref(), Some("admin"));
        assert!(request.decided_at.is_some());
        assert_eq!(store.get("r1").unwrap().unwrap().status, status);
    }

    #[rstest]
    #[case::approved_then_rejected(RequestStatus::Approved, RequestStatus::Rejected)]
    #[case::rejected_then_approved(RequestStatus::Rejected, RequestStatus::Approved)]
    #[case::approved_twice(RequestStatus::Approved, RequestStatus::Approved)]
    fn test_finalize_terminal_request_fails(
        #[case] first: RequestStatus,
        #[case] second: RequestStatus,
    ) {
        let store = InMemoryRequestStore::new();
        store.insert(pending("r1")).unwrap();
        store.finalize("r1", finalization(first)).unwrap();

        let result = store.finalize("r1", finalization(second));

        assert_eq!(
            result.unwrap_err(),
            StoreError::InvalidTransition {
                key: "r1".to_string(),
                current: first,
            }
        );
        assert_eq!(store.get("r1").unwrap().unwrap().status, first);
    }

    #[test]
    fn test_finalize_back_to_pending_is_refused() {
        let store = InMemoryRequestStore::new();
        store.insert(pending("r1")).unwrap();

        let result = store.finalize("r1", finalization(RequestStatus::Pending));

        assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));
    }

    #[test]
    fn test_finalize_missing_request() {
        let store = InMemoryRequestStore::new();

        let result = store.finalize("missing", finalization(RequestStatus::Approved));

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_list_by_status() {
        let store = InMemoryRequestStore::new();
        store.insert(pending("r1")).unwrap();
        store.insert(pending("r2")).unwrap();
        store.insert(pending("r3")).unwrap();
        store.finalize("r2", finalization(RequestStatus::Approved)).unwrap();

        let mut pending_ids: Vec<String> = store
            .list_by_status(RequestStatus::Pending)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        pending_ids.sort();

        assert_eq!(pending_ids, vec!["r1".to_string(), "r3".to_string()]);
        assert_eq!(store.list().unwrap().len(), 3);
    }

    #[test]
    fn test_concurrent_finalize_single_winner() {
        let store = Arc::new(InMemoryRequestStore::new());
        store.insert(pending("r1")).unwrap();
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let status = if i % 2 == 0 {
                    RequestStatus::Approved
                } else {
                    RequestStatus::Rejected
                };
                store.finalize("r1", finalization(status)).is_ok()
            }));
        }

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
    }
}
