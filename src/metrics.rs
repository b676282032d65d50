//! Process-local counters for grove activity.
//! Read by the `status` command through `snapshot()`.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static CHECK_INS: AtomicU64 = AtomicU64::new(0);
static ENCOURAGEMENTS: AtomicU64 = AtomicU64::new(0);
static TREE_RESETS: AtomicU64 = AtomicU64::new(0);
static FRUITS_SPAWNED: AtomicU64 = AtomicU64::new(0);
static FRUITS_COLLECTED: AtomicU64 = AtomicU64::new(0);
static COLLECT_CONFLICTS: AtomicU64 = AtomicU64::new(0);
static TRADES_CREATED: AtomicU64 = AtomicU64::new(0);
static TRADES_ACCEPTED: AtomicU64 = AtomicU64::new(0);
static TRADES_CANCELLED: AtomicU64 = AtomicU64::new(0);
static TRADES_EXPIRED: AtomicU64 = AtomicU64::new(0);

pub fn inc_check_ins() {
    CHECK_INS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_encouragements() {
    ENCOURAGEMENTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_tree_resets() {
    TREE_RESETS.fetch_add(1, Ordering::Relaxed);
}
pub fn add_fruits_spawned(count: u64) {
    FRUITS_SPAWNED.fetch_add(count, Ordering::Relaxed);
}
pub fn inc_fruits_collected() {
    FRUITS_COLLECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_collect_conflicts() {
    COLLECT_CONFLICTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_trades_created() {
    TRADES_CREATED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_trades_accepted() {
    TRADES_ACCEPTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_trades_cancelled() {
    TRADES_CANCELLED.fetch_add(1, Ordering::Relaxed);
}
pub fn add_trades_expired(count: u64) {
    TRADES_EXPIRED.fetch_add(count, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub check_ins: u64,
    pub encouragements: u64,
    pub tree_resets: u64,
    pub fruits_spawned: u64,
    pub fruits_collected: u64,
    pub collect_conflicts: u64,
    pub trades_created: u64,
    pub trades_accepted: u64,
    pub trades_cancelled: u64,
    pub trades_expired: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        check_ins: CHECK_INS.load(Ordering::Relaxed),
        encouragements: ENCOURAGEMENTS.load(Ordering::Relaxed),
        tree_resets: TREE_RESETS.load(Ordering::Relaxed),
        fruits_spawned: FRUITS_SPAWNED.load(Ordering::Relaxed),
        fruits_collected: FRUITS_COLLECTED.load(Ordering::Relaxed),
        collect_conflicts: COLLECT_CONFLICTS.load(Ordering::Relaxed),
        trades_created: TRADES_CREATED.load(Ordering::Relaxed),
        trades_accepted: TRADES_ACCEPTED.load(Ordering::Relaxed),
        trades_cancelled: TRADES_CANCELLED.load(Ordering::Relaxed),
        trades_expired: TRADES_EXPIRED.load(Ordering::Relaxed),
    }
}
