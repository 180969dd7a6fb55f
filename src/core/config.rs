//! Engine configuration

use crate::core::fee::FeeSchedule;
use std::time::Duration;

/// Tuning knobs for the Reconciliation Engine
///
/// Every retry loop in the engine is bounded by one of these values; nothing
/// waits indefinitely.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Fee rates and currency scale
    pub fees: FeeSchedule,

    /// How long an approval lease stays valid before another caller may reclaim it
    pub lease_ttl: Duration,

    /// Ledger compare-and-swap attempts before returning `Conflict`
    pub max_cas_attempts: u32,

    /// Upper bound of the random delay between CAS attempts
    pub cas_backoff: Duration,

    /// Attempts at the request status write once the ledger has been updated
    pub max_status_write_attempts: u32,

    /// Delay between status write attempts
    pub status_write_delay: Duration,

    /// Attempts at recording the audit entry before returning `PartialSuccess`
    pub max_audit_attempts: u32,

    /// Delay between audit attempts
    pub audit_retry_delay: Duration,

    /// Backoff before the single notification retry per channel
    pub notify_retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            lease_ttl: Duration::from_secs(30),
            max_cas_attempts: 5,
            cas_backoff: Duration::from_millis(5),
            max_status_write_attempts: 5,
            status_write_delay: Duration::from_millis(20),
            max_audit_attempts: 3,
            audit_retry_delay: Duration::from_millis(20),
            notify_retry_backoff: Duration::from_millis(500),
        }
    }
}
