//! Per-request idempotency guard with expiring leases
//!
//! The guard is the single serialization point for decisions on one request id.
//! Acquisition never blocks: a caller that finds the request held gets `None`
//! (or `false`) straight away and reports "already processing".
//!
//! # Leases
//!
//! Every acquisition is a lease with a deadline. A lease left behind by a caller
//! that died mid-approval stops blocking the request once its deadline passes,
//! and the next caller reclaims it. Reclaiming is safe only because the engine
//! re-reads the request status and the ledger's idempotency token before it
//! mutates anything.
//!
//! # Fencing
//!
//! Each lease carries a fence number. The scoped [`LeaseGuard`] releases only
//! the lease it acquired, so a slow holder whose lease expired and was reclaimed
//! cannot drop the new holder's lease on its way out.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// A held lease
#[derive(Debug, Clone, Copy)]
struct Lease {
    fence: u64,
    expires_at: Instant,
}

/// Non-blocking mutual exclusion keyed by request id
#[derive(Debug)]
pub struct IdempotencyGuard {
    leases: DashMap<String, Lease>,
    ttl: Duration,
    next_fence: AtomicU64,
}

impl IdempotencyGuard {
    /// Create a guard whose leases expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: DashMap::new(),
            ttl,
            next_fence: AtomicU64::new(1),
        }
    }

    /// Lease time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the guard for `request_id`
    ///
    /// Returns `true` if the caller now holds it. The caller is responsible for
    /// calling [`release`](Self::release); prefer [`try_lock`](Self::try_lock),
    /// which releases on drop.
    pub fn acquire(&self, request_id: &str) -> bool {
        self.acquire_fenced(request_id).is_some()
    }

    /// Release the guard for `request_id`
    ///
    /// Idempotent: releasing a request that is not held is a no-op.
    pub fn release(&self, request_id: &str) {
        self.leases.remove(request_id);
    }

    /// Take the guard as a scoped lease that releases itself when dropped
    ///
    /// Returns `None` if another caller holds a live lease.
    pub fn try_lock(&self, request_id: &str) -> Option<LeaseGuard<'_>> {
        self.acquire_fenced(request_id).map(|fence| LeaseGuard {
            guard: self,
            request_id: request_id.to_string(),
            fence,
        })
    }

    /// Whether a live (unexpired) lease is held for `request_id`
    pub fn is_held(&self, request_id: &str) -> bool {
        let now = Instant::now();
        self.leases
            .get(request_id)
            .map(|lease| lease.expires_at > now)
            .unwrap_or(false)
    }

    /// Number of live leases
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.leases
            .iter()
            .filter(|entry| entry.value().expires_at > now)
            .count()
    }

    /// Drop every expired lease, returning the request ids that were freed
    pub fn purge_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .leases
            .iter()
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .into_iter()
            .filter(|request_id| {
                self.leases
                    .remove_if(request_id, |_, lease| lease.expires_at <= now)
                    .is_some()
            })
            .collect()
    }

    fn acquire_fenced(&self, request_id: &str) -> Option<u64> {
        let now = Instant::now();

        if self
            .leases
            .remove_if(request_id, |_, lease| lease.expires_at <= now)
            .is_some()
        {
            warn!(request_id, "reclaiming expired approval lease");
        }

        let fence = self.next_fence.fetch_add(1, Ordering::Relaxed);
        let mut acquired = false;
        self.leases
            .entry(request_id.to_string())
            .or_insert_with(|| {
                acquired = true;
                Lease {
                    fence,
                    expires_at: now + self.ttl,
                }
            });

        acquired.then_some(fence)
    }

    fn release_fenced(&self, request_id: &str, fence: u64) {
        self.leases
            .remove_if(request_id, |_, lease| lease.fence == fence);
    }
}

/// Scoped ownership of one request's guard
///
/// Dropping the value releases the lease, on every exit path.
#[derive(Debug)]
pub struct LeaseGuard<'a> {
    guard: &'a IdempotencyGuard,
    request_id: String,
    fence: u64,
}

impl LeaseGuard<'_> {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.guard.release_fenced(&self.request_id, self.fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const LONG_TTL: Duration = Duration::from_secs(30);

    #[test]
    fn test_acquire_is_exclusive() {
        let guard = IdempotencyGuard::new(LONG_TTL);

        assert!(guard.acquire("r1"));
        assert!(!guard.acquire("r1"));
        assert!(guard.acquire("r2"));
        assert_eq!(guard.in_flight(), 2);
    }

    #[test]
    fn test_release_allows_reacquire() {
        let guard = IdempotencyGuard::new(LONG_TTL);

        assert!(guard.acquire("r1"));
        guard.release("r1");

        assert!(!guard.is_held("r1"));
        assert!(guard.acquire("r1"));
    }

    #[test]
    fn test_release_without_acquire_is_noop() {
        let guard = IdempotencyGuard::new(LONG_TTL);

        guard.release("never-held");
        guard.release("never-held");

        assert_eq!(guard.in_flight(), 0);
        assert!(guard.acquire("never-held"));
    }

    #[test]
    fn test_scoped_lease_releases_on_drop() {
        let guard = IdempotencyGuard::new(LONG_TTL);

        {
            let lease = guard.try_lock("r1").unwrap();
            assert_eq!(lease.request_id(), "r1");
            assert!(guard.is_held("r1"));
            assert!(guard.try_lock("r1").is_none());
        }

        assert!(!guard.is_held("r1"));
        assert!(guard.try_lock("r1").is_some());
    }

    #[test]
    fn test_scoped_lease_releases_on_early_return() {
        fn fails_midway(guard: &IdempotencyGuard) -> Result<(), &'static str> {
            let _lease = guard.try_lock("r1").ok_or("held")?;
            Err("boom")
        }

        let guard = IdempotencyGuard::new(LONG_TTL);

        assert_eq!(fails_midway(&guard), Err("boom"));
        assert!(!guard.is_held("r1"));
    }

    #[test]
    fn test_expired_lease_is_reclaimed() {
        let guard = IdempotencyGuard::new(Duration::from_millis(10));

        assert!(guard.acquire("r1"));
        thread::sleep(Duration::from_millis(30));

        assert!(!guard.is_held("r1"));
        assert!(guard.acquire("r1"));
        assert!(guard.is_held("r1"));
    }

    #[test]
    fn test_stale_holder_does_not_release_new_lease() {
        let guard = IdempotencyGuard::new(Duration::from_millis(10));

        let stale = guard.try_lock("r1").unwrap();
        thread::sleep(Duration::from_millis(30));
        let fresh = guard.try_lock("r1").unwrap();

        drop(stale);
        assert!(guard.is_held("r1"));

        drop(fresh);
        assert!(!guard.is_held("r1"));
    }

    #[test]
    fn test_purge_expired() {
        let guard = IdempotencyGuard::new(Duration::from_millis(10));
        assert!(guard.acquire("r1"));
        assert!(guard.acquire("r2"));
        thread::sleep(Duration::from_millis(30));

        let mut freed = guard.purge_expired();
        freed.sort();

        assert_eq!(freed, vec!["r1".to_string(), "r2".to_string()]);
        assert_eq!(guard.in_flight(), 0);
    }

    #[test]
    fn test_concurrent_acquire_single_winner() {
        let guard = Arc::new(IdempotencyGuard::new(LONG_TTL));
        let mut handles = vec![];

        for _ in 0..32 {
            let guard = Arc::clone(&guard);
            handles.push(thread::spawn(move || guard.acquire("r1")));
        }

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
    }
}
