//! Approval orchestration for deposit and withdrawal requests
//!
//! This module provides the `ReconciliationEngine`, which turns an operator's
//! approve or reject call into a terminal request status, exactly one ledger
//! mutation (for approvals) and exactly one audit entry.
//!
//! # Design
//!
//! The engine holds Arc-wrapped store components and is cheap to clone, so one
//! instance can be shared by every task deciding requests concurrently.
//!
//! ```text
//! ReconciliationEngine
//!     ├── Arc<dyn LedgerStore>        (balances + applied-mutation tokens)
//!     ├── Arc<dyn RequestStore>       (request lifecycle)
//!     ├── Arc<dyn AuditSink>          (append-only trail)
//!     ├── Arc<IdempotencyGuard>       (per-request leases)
//!     └── Option<NotificationDispatcher>
//! ```
//!
//! # Approval sequence
//!
//! 1. Take the request's lease; fail fast with `AlreadyProcessing`
//! 2. Load the request; it must still be `Pending`
//! 3. Apply the delta with a compare-and-swap carrying the request id as token
//! 4. Write the terminal status, retrying transient failures with the same token
//! 5. Record the audit entry, retrying a bounded number of times
//! 6. Release the lease, then enqueue the notification
//!
//! If step 4 never succeeds the request is left `Pending` with its token applied
//! (a stalled approval). Any later approve, reject or
//! [`reconcile_stalled`](ReconciliationEngine::reconcile_stalled) call finds
//! the token and finishes the status write from the recorded mutation, without
//! touching the balance again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::audit::MemoryAuditSink;
use crate::notify::{NotificationDispatcher, NotificationEvent};
use crate::types::{
    AppliedMutation, AuditAction, AuditEntry, AuditQuery, Decision, EngineError, FeeError,
    Finalization, InvalidRequestReason, LedgerAccount, NewRequest, RequestId, RequestKind,
    RequestStatus, StoreError, TransactionRequest, TRANSACTION_REQUEST_ENTITY,
};

use super::config::EngineConfig;
use super::fee::FeeSchedule;
use super::guard::IdempotencyGuard;
use super::ledger_store::InMemoryLedgerStore;
use super::request_store::InMemoryRequestStore;
use super::traits::{AuditSink, LedgerStore, RequestStore};

/// Outcome of a [`ReconciliationEngine::reconcile_stalled`] sweep
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Stalled approvals whose status and audit entry were completed
    pub completed: Vec<RequestId>,

    /// Pending requests skipped because another caller holds their lease
    pub in_flight: Vec<RequestId>,

    /// Requests whose completion failed, with the error
    pub failed: Vec<(RequestId, EngineError)>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Decides transaction requests and keeps ledger, status and audit consistent
///
/// # Thread Safety
///
/// Clones share every component. Concurrent calls on the same request are
/// serialized by the idempotency guard; concurrent calls on different requests
/// of the same user race on the ledger compare-and-swap and retry, so no
/// update is lost.
#[derive(Clone)]
pub struct ReconciliationEngine {
    ledger: Arc<dyn LedgerStore>,
    requests: Arc<dyn RequestStore>,
    audit: Arc<dyn AuditSink>,
    guard: Arc<IdempotencyGuard>,
    notifier: Option<NotificationDispatcher>,
    config: EngineConfig,
}

impl fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("guard", &self.guard)
            .field("notifier", &self.notifier.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    /// Create an engine over the given stores
    ///
    /// # Arguments
    ///
    /// * `ledger` - Balance store supporting versioned compare-and-swap
    /// * `requests` - Request store supporting guarded finalization
    /// * `audit` - Append-only audit sink
    /// * `config` - Fee schedule, lease TTL and retry budgets
    ///
    /// # Returns
    ///
    /// A new `ReconciliationEngine` without notifications; see
    /// [`with_notifier`](Self::with_notifier).
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        requests: Arc<dyn RequestStore>,
        audit: Arc<dyn AuditSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            requests,
            audit,
            guard: Arc::new(IdempotencyGuard::new(config.lease_ttl)),
            notifier: None,
            config,
        }
    }

    /// Create an engine backed entirely by in-memory stores
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryRequestStore::new()),
            Arc::new(MemoryAuditSink::new()),
            config,
        )
    }

    /// Hand decisions off to `dispatcher` after they complete
    pub fn with_notifier(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.notifier = Some(dispatcher);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The per-request guard shared by all clones
    pub fn guard(&self) -> &IdempotencyGuard {
        &self.guard
    }

    /// Store a new `Pending` request
    ///
    /// # Arguments
    ///
    /// * `new` - Intake data; the id must be unused
    ///
    /// # Returns
    ///
    /// * `Ok(TransactionRequest)` - The stored request
    /// * `Err(EngineError::InvalidRequest)` - Empty id or user, non-positive
    ///   amount, an amount finer than `currency_scale`, or duplicate id
    /// * `Err(EngineError::Storage)` - If the request store failed
    pub fn submit(&self, new: NewRequest) -> Result<TransactionRequest, EngineError> {
        let reason = if new.id.trim().is_empty() {
            Some(InvalidRequestReason::MissingId)
        } else if new.user_id.trim().is_empty() {
            Some(InvalidRequestReason::MissingUser)
        } else if new.amount <= Decimal::ZERO {
            Some(InvalidRequestReason::NonPositiveAmount)
        } else if new.amount.normalize().scale() > self.config.fees.currency_scale {
            Some(InvalidRequestReason::ExcessPrecision)
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(EngineError::invalid_request(&new.id, reason));
        }

        let request = TransactionRequest::pending(new, Utc::now());
        match self.requests.insert(request.clone()) {
            Ok(()) => {
                debug!(
                    request_id = %request.id,
                    user_id = %request.user_id,
                    kind = %request.kind,
                    amount = %request.amount,
                    "request submitted"
                );
                Ok(request)
            }
            Err(StoreError::DuplicateKey { .. }) => Err(EngineError::invalid_request(
                &request.id,
                InvalidRequestReason::DuplicateId,
            )),
            Err(e) => Err(EngineError::storage(&request.id, e)),
        }
    }

    /// Approve a pending request and apply it to the user's balance
    ///
    /// # Arguments
    ///
    /// * `request_id` - Request to approve
    /// * `actor_id` - Operator making the decision
    ///
    /// # Returns
    ///
    /// * `Ok(Decision)` - Ledger, status and audit trail all updated
    /// * `Err(EngineError::AlreadyProcessing)` - Another caller holds the lease
    /// * `Err(EngineError::NotFound)` / `Err(EngineError::AlreadyDecided)`
    /// * `Err(EngineError::InsufficientBalance)` - Nothing changed
    /// * `Err(EngineError::Conflict)` - CAS attempts exhausted, nothing changed
    /// * `Err(EngineError::Storage)` - Status write failed after the ledger was
    ///   updated; the request is a stalled approval and a retry completes it
    /// * `Err(EngineError::PartialSuccess)` - Decision applied, audit degraded
    pub async fn approve(&self, request_id: &str, actor_id: &str) -> Result<Decision, EngineError> {
        let lease = self
            .guard
            .try_lock(request_id)
            .ok_or_else(|| EngineError::already_processing(request_id))?;

        let request = self.load_pending(request_id)?;

        let applied = self
            .ledger
            .applied_mutation(&request.user_id, request_id)
            .map_err(|e| EngineError::storage(request_id, e))?;

        let mutation = match applied {
            Some(mutation) => {
                info!(
                    request_id,
                    user_id = %request.user_id,
                    "ledger already carries this approval, completing status write"
                );
                mutation
            }
            None => self.apply_to_ledger(&request, actor_id).await?,
        };

        let outcome = self.complete_approval(&request, mutation).await;
        drop(lease);
        self.dispatch(&outcome);
        outcome
    }

    /// Reject a pending request without touching the ledger
    ///
    /// If the request turns out to be a stalled approval (its delta is already
    /// in the ledger) the approval is completed instead and the call reports
    /// `AlreadyDecided` with status `Approved`.
    ///
    /// # Arguments
    ///
    /// * `request_id` - Request to reject
    /// * `actor_id` - Operator making the decision
    /// * `reason` - Optional operator-supplied reason
    pub async fn reject(
        &self,
        request_id: &str,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<Decision, EngineError> {
        let lease = self
            .guard
            .try_lock(request_id)
            .ok_or_else(|| EngineError::already_processing(request_id))?;

        let request = self.load_pending(request_id)?;

        let applied = self
            .ledger
            .applied_mutation(&request.user_id, request_id)
            .map_err(|e| EngineError::storage(request_id, e))?;

        if let Some(mutation) = applied {
            warn!(
                request_id,
                actor_id,
                "reject on a request whose ledger delta is already applied, completing approval"
            );
            let outcome = self.complete_approval(&request, mutation).await;
            drop(lease);
            self.dispatch(&outcome);
            return match outcome {
                Ok(_) => Err(EngineError::already_decided(
                    request_id,
                    RequestStatus::Approved,
                )),
                Err(e) => Err(e),
            };
        }

        let balance = self
            .ledger
            .get(&request.user_id)
            .map_err(|e| EngineError::storage(request_id, e))?
            .map(|account| account.balance)
            .unwrap_or(Decimal::ZERO);

        let finalization = Finalization {
            status: RequestStatus::Rejected,
            decided_at: Utc::now(),
            decided_by: actor_id.to_string(),
            rejection_reason: reason.map(str::to_string),
            fee: None,
        };
        let finalized = self.finalize_with_retry(request_id, finalization).await?;

        let decision = Decision {
            request_id: request.id.clone(),
            kind: request.kind,
            user_id: request.user_id.clone(),
            status: RequestStatus::Rejected,
            previous_balance: balance,
            new_balance: balance,
            amount: request.amount,
            fee: None,
            decided_at: finalized.decided_at.unwrap_or_else(Utc::now),
            decided_by: actor_id.to_string(),
            reason: finalized.rejection_reason,
            audit_entry_id: None,
        };

        info!(
            request_id,
            user_id = %decision.user_id,
            kind = %decision.kind,
            actor_id,
            "request rejected"
        );

        let outcome = self.record_audit(decision).await;
        drop(lease);
        self.dispatch(&outcome);
        outcome
    }

    /// Complete every stalled approval
    ///
    /// Scans `Pending` requests and, for each one whose ledger token is already
    /// applied, writes the `Approved` status and audit entry from the recorded
    /// mutation. Requests with a live lease are left to their holder.
    ///
    /// # Returns
    ///
    /// * `Ok(RecoveryReport)` - Per-request outcomes of the sweep
    /// * `Err(StoreError)` - If the pending requests could not be listed
    pub async fn reconcile_stalled(&self) -> Result<RecoveryReport, StoreError> {
        let mut report = RecoveryReport::default();

        let expired = self.guard.purge_expired();
        if !expired.is_empty() {
            warn!(count = expired.len(), "dropped expired approval leases");
        }

        let pending = self.requests.list_by_status(RequestStatus::Pending)?;

        for request in pending {
            if self.guard.is_held(&request.id) {
                report.in_flight.push(request.id);
                continue;
            }

            let mutation = match self.ledger.applied_mutation(&request.user_id, &request.id) {
                Ok(Some(mutation)) => mutation,
                Ok(None) => continue,
                Err(e) => {
                    let error = EngineError::storage(&request.id, e);
                    report.failed.push((request.id, error));
                    continue;
                }
            };

            let Some(lease) = self.guard.try_lock(&request.id) else {
                report.in_flight.push(request.id);
                continue;
            };

            // Status may have moved while we were scanning
            let current = match self.load_pending(&request.id) {
                Ok(current) => current,
                Err(EngineError::AlreadyDecided { .. }) => continue,
                Err(e) => {
                    report.failed.push((request.id, e));
                    continue;
                }
            };

            let outcome = self.complete_approval(&current, mutation).await;
            drop(lease);
            self.dispatch(&outcome);

            match outcome {
                Ok(_) => report.completed.push(current.id),
                Err(e) => report.failed.push((current.id, e)),
            }
        }

        if !report.completed.is_empty() || !report.failed.is_empty() {
            info!(
                completed = report.completed.len(),
                in_flight = report.in_flight.len(),
                failed = report.failed.len(),
                "stalled approval sweep finished"
            );
        }

        Ok(report)
    }

    /// Get a request by id
    pub fn request(&self, request_id: &str) -> Result<Option<TransactionRequest>, StoreError> {
        self.requests.get(request_id)
    }

    /// Get a user's ledger account, if one exists
    pub fn account(&self, user_id: &str) -> Result<Option<LedgerAccount>, StoreError> {
        self.ledger.get(user_id)
    }

    /// All ledger accounts sorted by user id
    pub fn accounts(&self) -> Result<Vec<LedgerAccount>, StoreError> {
        let mut accounts = self.ledger.list()?;
        accounts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(accounts)
    }

    /// Requests still awaiting a decision, oldest first
    pub fn pending_requests(&self) -> Result<Vec<TransactionRequest>, StoreError> {
        let mut pending = self.requests.list_by_status(RequestStatus::Pending)?;
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    /// Read back the audit trail
    pub fn audit_trail(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        self.audit.query(query)
    }

    fn load_pending(&self, request_id: &str) -> Result<TransactionRequest, EngineError> {
        let request = self
            .requests
            .get(request_id)
            .map_err(|e| EngineError::storage(request_id, e))?
            .ok_or_else(|| EngineError::not_found(request_id))?;

        if request.status.is_terminal() {
            return Err(EngineError::already_decided(request_id, request.status));
        }

        Ok(request)
    }

    /// Apply the request's delta with bounded compare-and-swap retries
    async fn apply_to_ledger(
        &self,
        request: &TransactionRequest,
        actor_id: &str,
    ) -> Result<AppliedMutation, EngineError> {
        let request_id = request.id.as_str();
        let user_id = request.user_id.as_str();

        let fee = self
            .config
            .fees
            .assess(request.kind, request.amount)
            .map_err(|e| match e {
                FeeError::InvalidRate { rate, .. } => {
                    EngineError::invalid_fee_rate(request_id, rate)
                }
                FeeError::Overflow => EngineError::arithmetic_overflow(request_id, user_id),
            })?;
        let delta = FeeSchedule::ledger_delta(request.kind, request.amount, &fee);

        let attempts = self.config.max_cas_attempts.max(1);
        let mut last_transient = None;

        for attempt in 1..=attempts {
            let account = self
                .ledger
                .get_or_create(user_id)
                .map_err(|e| EngineError::storage(request_id, e))?;

            let new_balance = account
                .balance
                .checked_add(delta)
                .ok_or_else(|| EngineError::arithmetic_overflow(request_id, user_id))?;

            if new_balance < Decimal::ZERO {
                return Err(EngineError::insufficient_balance(
                    request_id,
                    user_id,
                    account.balance,
                    request.amount,
                ));
            }

            let mutation = AppliedMutation {
                request_id: request.id.clone(),
                actor_id: actor_id.to_string(),
                delta,
                previous_balance: account.balance,
                new_balance,
                fee,
                version: account.version + 1,
                applied_at: Utc::now(),
            };

            match self.ledger.compare_and_swap(
                user_id,
                account.version,
                new_balance,
                mutation.clone(),
            ) {
                Ok(updated) => {
                    return Ok(AppliedMutation {
                        version: updated.version,
                        ..mutation
                    })
                }
                Err(StoreError::VersionConflict {
                    expected, actual, ..
                }) => {
                    debug!(
                        request_id,
                        user_id, attempt, expected, actual, "ledger version conflict"
                    );
                    last_transient = None;
                }
                Err(StoreError::TokenAlreadyApplied { .. }) => {
                    return self
                        .ledger
                        .applied_mutation(user_id, request_id)
                        .map_err(|e| EngineError::storage(request_id, e))?
                        .ok_or_else(|| {
                            EngineError::storage(
                                request_id,
                                StoreError::NotFound {
                                    key: request_id.to_string(),
                                },
                            )
                        });
                }
                Err(StoreError::NegativeBalance { .. }) => {
                    return Err(EngineError::insufficient_balance(
                        request_id,
                        user_id,
                        account.balance,
                        request.amount,
                    ));
                }
                Err(e) if e.is_transient() => {
                    warn!(request_id, user_id, attempt, error = %e, "ledger write failed, retrying");
                    last_transient = Some(e);
                }
                Err(e) => return Err(EngineError::storage(request_id, e)),
            }

            if attempt < attempts {
                let delay = jittered(self.config.cas_backoff);
                tokio::time::sleep(delay).await;
            }
        }

        match last_transient {
            Some(e) => Err(EngineError::storage(request_id, e)),
            None => {
                warn!(request_id, user_id, attempts, "ledger conflict retries exhausted");
                Err(EngineError::conflict(request_id, user_id, attempts))
            }
        }
    }

    /// Write the `Approved` status and audit entry for an applied mutation
    async fn complete_approval(
        &self,
        request: &TransactionRequest,
        mutation: AppliedMutation,
    ) -> Result<Decision, EngineError> {
        let finalization = Finalization {
            status: RequestStatus::Approved,
            decided_at: Utc::now(),
            decided_by: mutation.actor_id.clone(),
            rejection_reason: None,
            fee: Some(mutation.fee),
        };
        let finalized = self.finalize_with_retry(&request.id, finalization).await?;

        let decision = Decision {
            request_id: request.id.clone(),
            kind: request.kind,
            user_id: request.user_id.clone(),
            status: RequestStatus::Approved,
            previous_balance: mutation.previous_balance,
            new_balance: mutation.new_balance,
            amount: request.amount,
            fee: Some(mutation.fee),
            decided_at: finalized.decided_at.unwrap_or(mutation.applied_at),
            decided_by: mutation.actor_id,
            reason: None,
            audit_entry_id: None,
        };

        info!(
            request_id = %decision.request_id,
            user_id = %decision.user_id,
            kind = %decision.kind,
            actor_id = %decision.decided_by,
            previous_balance = %decision.previous_balance,
            new_balance = %decision.new_balance,
            "request approved"
        );

        self.record_audit(decision).await
    }

    /// Move the request to its terminal status, retrying transient failures
    async fn finalize_with_retry(
        &self,
        request_id: &str,
        finalization: Finalization,
    ) -> Result<TransactionRequest, EngineError> {
        let attempts = self.config.max_status_write_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.requests.finalize(request_id, finalization.clone()) {
                Ok(request) => return Ok(request),
                Err(StoreError::InvalidTransition { current, .. }) => {
                    return Err(EngineError::already_decided(request_id, current))
                }
                Err(StoreError::NotFound { .. }) => return Err(EngineError::not_found(request_id)),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        request_id,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "status write failed, retrying"
                    );
                    tokio::time::sleep(self.config.status_write_delay).await;
                }
                Err(e) => {
                    warn!(request_id, error = %e, "status write abandoned");
                    return Err(EngineError::storage(request_id, e));
                }
            }
        }
    }

    /// Record the audit entry for a decision
    ///
    /// Returns `PartialSuccess` carrying the decision when every attempt fails.
    async fn record_audit(&self, mut decision: Decision) -> Result<Decision, EngineError> {
        let entry = audit_entry_for(&decision);
        let attempts = self.config.max_audit_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.audit.record(&entry) {
                // A retried write that landed the first time
                Ok(()) | Err(StoreError::DuplicateKey { .. }) => {
                    decision.audit_entry_id = Some(entry.entry_id);
                    return Ok(decision);
                }
                Err(e) => {
                    warn!(
                        request_id = %decision.request_id,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "audit record failed"
                    );
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.audit_retry_delay).await;
            }
        }

        let source = last_error.unwrap_or_else(|| StoreError::unavailable("audit sink"));
        warn!(
            request_id = %decision.request_id,
            status = %decision.status,
            "decision applied without audit entry"
        );
        Err(EngineError::PartialSuccess {
            decision: Box::new(decision),
            source,
        })
    }

    fn dispatch(&self, outcome: &Result<Decision, EngineError>) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        match outcome {
            Ok(decision) => notifier.notify(NotificationEvent::from_decision(decision)),
            Err(EngineError::PartialSuccess { decision, .. }) => {
                notifier.notify(NotificationEvent::from_decision(decision))
            }
            Err(_) => {}
        }
    }
}

fn audit_entry_for(decision: &Decision) -> AuditEntry {
    let action = match (decision.kind, decision.is_approved()) {
        (RequestKind::Deposit, true) => AuditAction::DepositApproved,
        (RequestKind::Deposit, false) => AuditAction::DepositRejected,
        (RequestKind::Withdrawal, true) => AuditAction::WithdrawalApproved,
        (RequestKind::Withdrawal, false) => AuditAction::WithdrawalRejected,
    };

    AuditEntry {
        entry_id: AuditEntry::next_id(),
        action,
        entity_type: TRANSACTION_REQUEST_ENTITY.to_string(),
        entity_id: decision.request_id.clone(),
        user_id: decision.user_id.clone(),
        actor_id: decision.decided_by.clone(),
        previous_balance: decision.previous_balance,
        new_balance: decision.new_balance,
        amount: decision.amount,
        fee: decision.fee,
        reason: decision.reason.clone(),
        timestamp: decision.decided_at,
    }
}

/// Uniform random delay in `[0, max]`
fn jittered(max: Duration) -> Duration {
    let max_micros = max.as_micros() as u64;
    if max_micros == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rand::thread_rng().gen_range(0..=max_micros))
}
