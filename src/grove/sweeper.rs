//! Periodic sweep that nudges spawning and trade expiry along.
//!
//! The sweep is only a trigger. Spawn capacity, spawn intervals and trade
//! expiry are all re-checked inside store transactions, so running a sweep
//! twice, late, or concurrently with user requests never changes the outcome
//! beyond what those requests could have produced on their own.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use super::errors::GroveError;
use super::storage::GroveStore;

/// Default gap between sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
/// Longest gap between sweeps; larger intervals are clamped to this.
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Counters for one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub trees_checked: usize,
    pub trees_spawned: usize,
    pub fruits_spawned: usize,
    pub trades_expired: usize,
}

/// Visit every tree, spawn where due, then expire stale trade offers.
pub fn sweep(store: &GroveStore) -> Result<SweepStats, GroveError> {
    sweep_at(store, Utc::now())
}

pub fn sweep_at(store: &GroveStore, now: DateTime<Utc>) -> Result<SweepStats, GroveError> {
    let mut stats = SweepStats::default();
    for tree_id in store.list_tree_ids()? {
        stats.trees_checked += 1;
        match store.spawn_if_due_at(&tree_id, now) {
            Ok(spawned) if !spawned.is_empty() => {
                stats.trees_spawned += 1;
                stats.fruits_spawned += spawned.len();
            }
            Ok(_) => {}
            // A tree removed between listing and spawning is not worth failing the pass.
            Err(GroveError::NotFound(what)) => warn!("Sweep skipped missing {}", what),
            Err(err) => return Err(err),
        }
    }
    stats.trades_expired = store.cleanup_expired_at(now)?;
    debug!(
        "Sweep complete: {} trees checked, {} fruit spawned, {} trades expired",
        stats.trees_checked, stats.fruits_spawned, stats.trades_expired
    );
    Ok(stats)
}

/// Tracks when the next sweep is due.
#[derive(Debug, Clone)]
pub struct SweepScheduler {
    interval: Duration,
    last_run: Option<DateTime<Utc>>,
    runs: u64,
}

impl SweepScheduler {
    pub fn new(interval_secs: u64) -> Self {
        let secs = interval_secs.clamp(1, MAX_SWEEP_INTERVAL_SECS) as i64;
        Self {
            interval: Duration::try_seconds(secs).unwrap_or_else(|| Duration::seconds(DEFAULT_SWEEP_INTERVAL_SECS as i64)),
            last_run: None,
            runs: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// The first check always runs; afterwards once per interval.
    pub fn should_run(&self, now: DateTime<Utc>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.interval,
        }
    }

    pub fn mark_ran(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
        self.runs += 1;
    }

    pub fn next_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run.map(|last| last + self.interval)
    }

    /// Sweep if due. Returns `None` when it was not yet time.
    pub fn run_if_due(&mut self, store: &GroveStore, now: DateTime<Utc>) -> Result<Option<SweepStats>, GroveError> {
        if !self.should_run(now) {
            return Ok(None);
        }
        let stats = sweep_at(store, now)?;
        self.mark_ran(now);
        if stats.fruits_spawned > 0 || stats.trades_expired > 0 {
            info!(
                "Sweep #{}: spawned {} fruit on {} tree(s), expired {} trade(s)",
                self.runs, stats.fruits_spawned, stats.trees_spawned, stats.trades_expired
            );
        }
        Ok(Some(stats))
    }
}

impl Default for SweepScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL_SECS)
    }
}
