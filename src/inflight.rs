use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::fingerprint::Fingerprint;
use crate::situation::Decision;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlightError {
    #[error("leader abandoned the computation")]
    LeaderAbandoned,
    #[error("leader failed: {0}")]
    LeaderFailed(String),
}

/// What the leader publishes to every waiter of its fingerprint.
pub type FlightOutcome = Result<Decision, FlightError>;

#[derive(Debug, Error)]
#[error("follower deadline elapsed before leader finished")]
pub struct WaitTimeout;

type Ticket = watch::Sender<Option<FlightOutcome>>;

#[derive(Default)]
struct Inner {
    tickets: Mutex<HashMap<String, Ticket>>,
}

/// Single-flight coordination: the first caller for a fingerprint becomes
/// the leader and computes; concurrent callers become followers and await
/// the leader's outcome. The ticket table is keyed per fingerprint, so
/// unrelated flights never contend on one lock for long.
#[derive(Clone, Default)]
pub struct InFlight {
    inner: Arc<Inner>,
}

pub enum FlightRole {
    Leader(LeaderGuard),
    Follower(FlightWaiter),
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, fingerprint: &Fingerprint) -> FlightRole {
        let key = fingerprint.as_str().to_string();
        let mut tickets = self.inner.tickets.lock();
        if let Some(tx) = tickets.get(&key) {
            debug!(%fingerprint, "joining in-flight computation as follower");
            return FlightRole::Follower(FlightWaiter { rx: tx.subscribe() });
        }

        let (tx, _rx) = watch::channel(None);
        tickets.insert(key.clone(), tx);
        FlightRole::Leader(LeaderGuard {
            inner: self.inner.clone(),
            key,
            completed: false,
        })
    }

    /// Number of live tickets; diagnostic only.
    pub fn in_flight(&self) -> usize {
        self.inner.tickets.lock().len()
    }
}

/// Held by the leader while it computes. `complete` retires the ticket and
/// releases all followers with one shared outcome; dropping the guard
/// without completing releases them with `LeaderAbandoned` so nobody waits
/// on a dead flight.
pub struct LeaderGuard {
    inner: Arc<Inner>,
    key: String,
    completed: bool,
}

impl LeaderGuard {
    pub fn complete(mut self, outcome: FlightOutcome) {
        self.completed = true;
        self.retire(outcome);
    }

    fn retire(&self, outcome: FlightOutcome) {
        // Remove the ticket before publishing: a fresh acquire may start a
        // new flight the moment followers are released.
        let tx = self.inner.tickets.lock().remove(&self.key);
        if let Some(tx) = tx {
            let _ = tx.send(Some(outcome));
        }
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.retire(Err(FlightError::LeaderAbandoned));
        }
    }
}

pub struct FlightWaiter {
    rx: watch::Receiver<Option<FlightOutcome>>,
}

impl FlightWaiter {
    /// Waits for the leader's outcome, bounded by the follower's own
    /// deadline. On expiry the follower abandons the flight; the caller
    /// falls back to the cheapest synchronous decision.
    pub async fn wait(mut self, timeout: Duration) -> Result<FlightOutcome, WaitTimeout> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().clone() {
                return Ok(outcome);
            }
            match tokio::time::timeout_at(deadline, self.rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Ok(Err(FlightError::LeaderAbandoned)),
                Err(_) => return Err(WaitTimeout),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Normalizer, NormalizedFeatures, BettingPattern, PositionClass};
    use crate::situation::{ActionKind, Street};

    fn fingerprint() -> Fingerprint {
        let features = NormalizedFeatures {
            street: Street::Flop,
            strength_bucket: 5,
            pot_odds_bucket: 4,
            position: PositionClass::Late,
            pattern: BettingPattern::SingleRaised,
            stack_bucket: 3,
        };
        Normalizer::default().fingerprint(&features)
    }

    fn decision() -> Decision {
        Decision::new(ActionKind::Call, Some(6.0), 0.9)
    }

    #[tokio::test]
    async fn followers_receive_leader_outcome() {
        let inflight = InFlight::new();
        let fp = fingerprint();

        let leader = match inflight.acquire(&fp) {
            FlightRole::Leader(guard) => guard,
            FlightRole::Follower(_) => panic!("first acquire must lead"),
        };
        let follower = match inflight.acquire(&fp) {
            FlightRole::Follower(waiter) => waiter,
            FlightRole::Leader(_) => panic!("second acquire must follow"),
        };

        let wait = tokio::spawn(follower.wait(Duration::from_secs(1)));
        leader.complete(Ok(decision()));

        let outcome = wait.await.unwrap().expect("no timeout");
        assert_eq!(outcome.unwrap(), decision());
        assert_eq!(inflight.in_flight(), 0);
    }

    #[tokio::test]
    async fn dropped_leader_releases_followers_with_abandonment() {
        let inflight = InFlight::new();
        let fp = fingerprint();

        let leader = match inflight.acquire(&fp) {
            FlightRole::Leader(guard) => guard,
            FlightRole::Follower(_) => panic!("first acquire must lead"),
        };
        let follower = match inflight.acquire(&fp) {
            FlightRole::Follower(waiter) => waiter,
            FlightRole::Leader(_) => panic!("second acquire must follow"),
        };

        drop(leader);
        let outcome = follower.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome.unwrap_err(), FlightError::LeaderAbandoned);
    }

    #[tokio::test(start_paused = true)]
    async fn follower_wait_respects_its_own_deadline() {
        let inflight = InFlight::new();
        let fp = fingerprint();

        let _leader = match inflight.acquire(&fp) {
            FlightRole::Leader(guard) => guard,
            FlightRole::Follower(_) => panic!("first acquire must lead"),
        };
        let follower = match inflight.acquire(&fp) {
            FlightRole::Follower(waiter) => waiter,
            FlightRole::Leader(_) => panic!("second acquire must follow"),
        };

        let result = follower.wait(Duration::from_millis(50)).await;
        assert!(result.is_err(), "follower must time out while leader runs");
    }

    #[tokio::test]
    async fn retired_ticket_allows_fresh_leader() {
        let inflight = InFlight::new();
        let fp = fingerprint();

        match inflight.acquire(&fp) {
            FlightRole::Leader(guard) => guard.complete(Ok(decision())),
            FlightRole::Follower(_) => panic!("first acquire must lead"),
        }

        assert!(matches!(inflight.acquire(&fp), FlightRole::Leader(_)));
    }
}
