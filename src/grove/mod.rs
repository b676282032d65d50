//! Tree growth and fruit economy engine.
//! Mood check-ins grow a tree through stages, grown trees spawn collectible
//! fruit, and users barter fruit with each other. Everything persists in a
//! sled database whose transactions carry the atomicity guarantees.

pub mod cooldown;
pub mod errors;
pub mod inventory;
pub mod market;
pub mod mood;
pub mod spawn;
pub mod stage;
pub mod storage;
pub mod sweeper;
pub mod types;

pub use cooldown::{can_act, can_act_at, CooldownGate, CooldownStatus};
pub use errors::{ErrorKind, GroveError};
pub use mood::{context_bonus, score_check_in, validate_check_in};
pub use spawn::{pick_fruit_kind, remaining_capacity, should_spawn, CollectOutcome};
pub use stage::{points_until_next, stage_of, Stage, StageTable, DEFAULT_STAGE_THRESHOLDS};
pub use storage::{GroveStore, GroveStoreBuilder, StoreCounts};
pub use sweeper::{sweep, sweep_at, SweepScheduler, SweepStats};
pub use types::*;
