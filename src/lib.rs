//! # Moodgrove - Tree Growth & Fruit Economy Engine
//!
//! Moodgrove is the rules engine behind a mood-journaling app: emotional
//! check-ins grow a virtual tree, grown trees bear collectible fruit, and
//! users barter fruit with each other.
//!
//! ## Features
//!
//! - **Growth**: Check-ins score 0-10 and accumulate into one of six stages (seed to blooming).
//! - **Cooldowns**: One check-in per hour and one tree reset per day, via a shared time-lock.
//! - **Fruit**: Stage-dependent spawn cadence and capacity with weighted fruit selection.
//! - **Inventory**: Per-user fruit ledger that never goes negative.
//! - **Market**: Barter offers with expiry and all-or-nothing settlement.
//! - **Persistence**: sled transactions make collect, spawn, check-in and settlement atomic.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use moodgrove::grove::{CheckInInput, GroveStore};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = GroveStore::open("data/grove")?;
//!     let tree = store.plant_tree("alice", true)?;
//!
//!     let input = CheckInInput::new(5)
//!         .with_descriptions(["calm", "hopeful"])
//!         .with_context("Long walk by the river after work.");
//!     let outcome = store.check_in(&tree.id, "alice", &input)?;
//!     println!("score +{} -> {}", outcome.check_in.score, outcome.tree.stage());
//!
//!     for fruit in store.spawn_if_due(&tree.id)? {
//!         store.collect(&fruit.id, "alice")?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`grove`] - stage engine, cooldown gate, mood accumulator, spawn scheduler,
//!   inventory ledger, trade market and the sled store they share
//! - [`config`] - TOML configuration and validation
//! - [`validation`] - input normalisation for ids, item names and tags
//! - [`metrics`] - process-local activity counters

pub mod config;
pub mod grove;
pub mod metrics;
pub mod validation;
