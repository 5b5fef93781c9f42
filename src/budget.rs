use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct BudgetConfig {
    /// Rolling window length; spend resets when it elapses.
    pub window: Duration,
    /// Maximum cost units spendable per window.
    pub limit: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(24 * 60 * 60),
            limit: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetSnapshot {
    pub spent: u64,
    pub remaining: u64,
    pub calls: u64,
}

/// Rolling-window spend tracker gating escalation to the expensive tier.
///
/// Counters are atomics; the window edge is guarded by a mutex taken only
/// on rollover checks. Calls that complete after a rollover are charged to
/// the window active at completion time, matching upstream billing.
#[derive(Debug)]
pub struct BudgetManager {
    config: BudgetConfig,
    window_start: Mutex<Instant>,
    spent: AtomicU64,
    calls: AtomicU64,
    elapsed_ms: AtomicU64,
}

impl BudgetManager {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            window_start: Mutex::new(Instant::now()),
            spent: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    fn roll_if_needed(&self) {
        let mut start = self.window_start.lock();
        if start.elapsed() >= self.config.window {
            *start = Instant::now();
            self.spent.store(0, Ordering::SeqCst);
            self.calls.store(0, Ordering::SeqCst);
            self.elapsed_ms.store(0, Ordering::SeqCst);
            debug!("budget window rolled over");
        }
    }

    /// Whether an expensive call with the given estimated cost fits the
    /// window's remaining budget.
    pub fn can_escalate(&self, estimated_cost: u64) -> bool {
        self.roll_if_needed();
        let spent = self.spent.load(Ordering::SeqCst);
        spent.saturating_add(estimated_cost) <= self.config.limit
    }

    /// Charges an actual spend to the currently active window.
    pub fn record(&self, actual_cost: u64, elapsed: Duration) {
        self.roll_if_needed();
        self.spent.fetch_add(actual_cost, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn remaining_budget(&self) -> u64 {
        self.roll_if_needed();
        self.config
            .limit
            .saturating_sub(self.spent.load(Ordering::SeqCst))
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        self.roll_if_needed();
        let spent = self.spent.load(Ordering::SeqCst);
        BudgetSnapshot {
            spent,
            remaining: self.config.limit.saturating_sub(spent),
            calls: self.calls.load(Ordering::SeqCst),
        }
    }
}

impl Default for BudgetManager {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}
