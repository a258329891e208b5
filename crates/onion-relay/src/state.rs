//! Forwarding job state machine and per-relay bookkeeping.
//!
//! Each inbound envelope is handled by its own job:
//! - IDLE: nothing in progress
//! - RECEIVING: envelope accepted off the wire
//! - UNWRAPPING: removing this relay's layer
//! - FORWARDING: remainder goes to the next relay
//! - DELIVERING: remainder is plaintext for a user
//!
//! Success and failure both end back in IDLE. Jobs share no state with each
//! other apart from the counters and the last-seen values below.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use onion_core::{NextHop, NodeId};
use tokio::sync::RwLock;
use tracing::debug;

/// Forwarding job states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    Receiving,
    Unwrapping,
    Forwarding,
    Delivering,
}

impl RelayPhase {
    /// Whether `next` may follow `self`.
    pub fn can_advance_to(self, next: RelayPhase) -> bool {
        use RelayPhase::*;
        matches!(
            (self, next),
            (Idle, Receiving)
                | (Receiving, Unwrapping)
                | (Unwrapping, Forwarding)
                | (Unwrapping, Delivering)
                | (Receiving | Unwrapping | Forwarding | Delivering, Idle)
        )
    }
}

/// One envelope's trip through the relay.
#[derive(Debug)]
pub struct ForwardJob {
    node_id: NodeId,
    phase: RelayPhase,
}

impl ForwardJob {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            phase: RelayPhase::Idle,
        }
    }

    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    pub fn advance(&mut self, next: RelayPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!("relay {} job: {:?} -> {:?}", self.node_id, self.phase, next);
        self.phase = next;
    }

    /// Return to IDLE, whatever the outcome.
    pub fn finish(&mut self) {
        if self.phase != RelayPhase::Idle {
            self.advance(RelayPhase::Idle);
        }
    }
}

/// Last-seen values, kept for inspection only.
///
/// Scoped to one relay instance; nothing here feeds back into forwarding.
#[derive(Debug, Default)]
pub struct Observations {
    last_envelope: RwLock<Option<String>>,
    last_decrypted: RwLock<Option<String>>,
    last_destination: RwLock<Option<NextHop>>,
}

impl Observations {
    pub async fn record_envelope(&self, envelope: &str) {
        *self.last_envelope.write().await = Some(envelope.to_string());
    }

    pub async fn record_peeled(&self, decrypted: &str, destination: NextHop) {
        *self.last_decrypted.write().await = Some(decrypted.to_string());
        *self.last_destination.write().await = Some(destination);
    }

    /// Most recently received envelope, as transport text.
    pub async fn last_envelope(&self) -> Option<String> {
        self.last_envelope.read().await.clone()
    }

    /// Most recently removed layer's remainder: the next hop's envelope, or
    /// the plaintext at the exit.
    pub async fn last_decrypted(&self) -> Option<String> {
        self.last_decrypted.read().await.clone()
    }

    pub async fn last_destination(&self) -> Option<NextHop> {
        *self.last_destination.read().await
    }
}

/// Forwarding counters
#[derive(Debug, Default)]
pub struct RelayStats {
    in_flight: AtomicUsize,
    forwarded: AtomicU64,
    delivered: AtomicU64,
    rejected: AtomicU64,
}

impl RelayStats {
    /// Count a job as in flight until the guard is dropped.
    pub fn begin(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard { stats: self }
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

pub struct InFlightGuard<'a> {
    stats: &'a RelayStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onion_core::UserId;

    #[test]
    fn test_legal_transitions() {
        use RelayPhase::*;
        assert!(Idle.can_advance_to(Receiving));
        assert!(Unwrapping.can_advance_to(Forwarding));
        assert!(Unwrapping.can_advance_to(Delivering));
        assert!(Receiving.can_advance_to(Idle));

        assert!(!Idle.can_advance_to(Forwarding));
        assert!(!Receiving.can_advance_to(Delivering));
        assert!(!Forwarding.can_advance_to(Delivering));
        assert!(!Idle.can_advance_to(Idle));
    }

    #[test]
    fn test_job_ends_idle() {
        let mut job = ForwardJob::new(NodeId(1));
        job.advance(RelayPhase::Receiving);
        job.advance(RelayPhase::Unwrapping);
        job.advance(RelayPhase::Delivering);
        job.finish();
        assert_eq!(job.phase(), RelayPhase::Idle);

        // Finishing an idle job is a no-op
        job.finish();
        assert_eq!(job.phase(), RelayPhase::Idle);
    }

    #[test]
    fn test_in_flight_guard() {
        let stats = RelayStats::default();
        {
            let _a = stats.begin();
            let _b = stats.begin();
            assert_eq!(stats.in_flight(), 2);
        }
        assert_eq!(stats.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_observations_start_empty() {
        let obs = Observations::default();
        assert!(obs.last_envelope().await.is_none());
        assert!(obs.last_decrypted().await.is_none());
        assert!(obs.last_destination().await.is_none());

        obs.record_envelope("AAAA").await;
        obs.record_peeled("hello", NextHop::User(UserId(7))).await;
        assert_eq!(obs.last_envelope().await.as_deref(), Some("AAAA"));
        assert_eq!(obs.last_decrypted().await.as_deref(), Some("hello"));
        assert_eq!(
            obs.last_destination().await,
            Some(NextHop::User(UserId(7)))
        );
    }
}
