//! Fruit spawning and collection.
//!
//! Per-tree capacity and the most recent spawn time live in a `SpawnState`
//! aggregate that is rewritten in the same transaction as every fruit insert
//! and every collect. Concurrent spawners and collectors therefore serialize
//! on that one key and can never push a tree past its capacity or collect a
//! fruit twice.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use sled::transaction::TransactionalTree;
use sled::Transactional;

use super::errors::{abort, GroveError};
use super::inventory::tx_credit;
use super::stage::Stage;
use super::storage::{decode, decode_record, encode, key_string, tx, tx_load_tree, GroveStore, TxResult};
use super::types::{FruitInstance, FruitKind, SpawnSettings, SpawnState, FRUIT_SCHEMA_VERSION};
use crate::metrics;
use crate::validation::validate_user_id;

/// Placement stays inside this band (percent of the canopy box) so fruit never hugs the edge.
const PLACEMENT_MIN: f32 = 10.0;
const PLACEMENT_MAX: f32 = 90.0;

/// Whether a tree at `stage` with the given spawn history is due for new fruit.
pub fn should_spawn(stage: Stage, state: &SpawnState, settings: &SpawnSettings, now: DateTime<Utc>) -> bool {
    let setting = settings.get(stage);
    if setting.spawn_interval_hours == 0 {
        return false;
    }
    if state.uncollected >= setting.max_fruits_per_tree {
        return false;
    }
    match state.last_spawned_at {
        None => true,
        Some(last) => {
            now.signed_duration_since(last) >= Duration::hours(i64::from(setting.spawn_interval_hours))
        }
    }
}

/// How many more uncollected fruits the tree may hold.
pub fn remaining_capacity(stage: Stage, state: &SpawnState, settings: &SpawnSettings) -> u32 {
    let setting = settings.get(stage);
    if setting.spawn_interval_hours == 0 {
        return 0;
    }
    setting.max_fruits_per_tree.saturating_sub(state.uncollected)
}

/// Weighted choice among the kinds unlocked at `stage`.
pub fn pick_fruit_kind<'a, R: Rng + ?Sized>(
    catalog: &'a [FruitKind],
    stage: Stage,
    rng: &mut R,
) -> Option<&'a FruitKind> {
    let eligible: Vec<&FruitKind> = catalog
        .iter()
        .filter(|kind| kind.min_stage <= stage && kind.weight > 0)
        .collect();
    let index = WeightedIndex::new(eligible.iter().map(|kind| kind.weight)).ok()?;
    Some(eligible[index.sample(rng)])
}

fn tree_fruit_key(tree_id: &str, spawned_at: DateTime<Utc>, fruit_id: &str) -> Vec<u8> {
    let nanos = spawned_at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| spawned_at.timestamp_micros() * 1000);
    format!("{}:{:020}:{}", tree_id, nanos.max(0), fruit_id).into_bytes()
}

fn tx_load_spawn_state(spawn_state: &TransactionalTree, tree_id: &str) -> TxResult<SpawnState> {
    match spawn_state.get(tree_id.as_bytes())? {
        Some(bytes) => tx(decode(&bytes)),
        None => Ok(SpawnState::default()),
    }
}

fn tx_store_spawn_state(spawn_state: &TransactionalTree, tree_id: &str, state: &SpawnState) -> TxResult<()> {
    spawn_state.insert(tree_id.as_bytes(), tx(encode(state))?)?;
    Ok(())
}

/// Result of a successful collect.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectOutcome {
    pub fruit: FruitInstance,
    /// Collector's quantity of this fruit type after the credit.
    pub quantity: u64,
}

impl GroveStore {
    pub fn spawn_state(&self, tree_id: &str) -> Result<SpawnState, GroveError> {
        match self.spawn_state.get(tree_id.as_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Ok(SpawnState::default()),
        }
    }

    pub fn should_spawn_at(&self, tree_id: &str, now: DateTime<Utc>) -> Result<bool, GroveError> {
        let tree = self.get_tree(tree_id)?;
        let state = self.spawn_state(tree_id)?;
        Ok(should_spawn(tree.stage(), &state, &self.rules.spawn.settings, now))
    }

    pub fn should_spawn(&self, tree_id: &str) -> Result<bool, GroveError> {
        self.should_spawn_at(tree_id, Utc::now())
    }

    /// Spawn fruit if the tree is due; returns the new fruit (empty when not due).
    pub fn spawn_if_due(&self, tree_id: &str) -> Result<Vec<FruitInstance>, GroveError> {
        self.spawn_if_due_at(tree_id, Utc::now())
    }

    pub fn spawn_if_due_at(&self, tree_id: &str, now: DateTime<Utc>) -> Result<Vec<FruitInstance>, GroveError> {
        self.spawn_inner(tree_id, now, true)
    }

    /// Spawn up to the remaining capacity regardless of the interval.
    /// Stages with a zero interval still never spawn.
    pub fn spawn_at(&self, tree_id: &str, now: DateTime<Utc>) -> Result<Vec<FruitInstance>, GroveError> {
        self.spawn_inner(tree_id, now, false)
    }

    fn spawn_inner(
        &self,
        tree_id: &str,
        now: DateTime<Utc>,
        require_due: bool,
    ) -> Result<Vec<FruitInstance>, GroveError> {
        let spawn_rules = &self.rules.spawn;
        let (stage, spawned) = (&self.trees, &self.spawn_state, &self.fruits, &self.tree_fruits)
            .transaction(|(trees, spawn_state, fruits, tree_fruits)| -> TxResult<(Stage, Vec<FruitInstance>)> {
                let tree = tx_load_tree(trees, tree_id)?;
                let stage = tree.stage();
                let mut state = tx_load_spawn_state(spawn_state, tree_id)?;
                if require_due && !should_spawn(stage, &state, &spawn_rules.settings, now) {
                    return Ok((stage, Vec::new()));
                }
                let count = remaining_capacity(stage, &state, &spawn_rules.settings)
                    .min(spawn_rules.spawn_batch);

                let mut rng = rand::thread_rng();
                let mut spawned = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let Some(kind) = pick_fruit_kind(&spawn_rules.catalog, stage, &mut rng) else {
                        break;
                    };
                    let fruit = FruitInstance {
                        id: uuid::Uuid::new_v4().to_string(),
                        tree_id: tree_id.to_string(),
                        fruit_type: kind.name.clone(),
                        position_x: rng.gen_range(PLACEMENT_MIN..=PLACEMENT_MAX),
                        position_y: rng.gen_range(PLACEMENT_MIN..=PLACEMENT_MAX),
                        spawned_at: now,
                        is_collected: false,
                        collected_by: None,
                        collected_at: None,
                        schema_version: FRUIT_SCHEMA_VERSION,
                    };
                    fruits.insert(fruit.id.as_bytes(), tx(encode(&fruit))?)?;
                    tree_fruits.insert(tree_fruit_key(tree_id, now, &fruit.id), fruit.id.as_bytes())?;
                    spawned.push(fruit);
                }

                if !spawned.is_empty() {
                    state.uncollected += spawned.len() as u32;
                    state.total_spawned += spawned.len() as u64;
                    state.last_spawned_at = Some(now);
                    tx_store_spawn_state(spawn_state, tree_id, &state)?;
                }
                Ok((stage, spawned))
            })?;

        if spawned.is_empty() {
            debug!("Tree {} ({}) not due for fruit", tree_id, stage);
            return Ok(spawned);
        }
        self.persist()?;
        metrics::add_fruits_spawned(spawned.len() as u64);
        info!("Spawned {} fruit on tree {} ({})", spawned.len(), tree_id, stage);
        Ok(spawned)
    }

    /// Collect a fruit into `user_id`'s inventory. The first collector wins;
    /// everyone after gets `AlreadyCollected`.
    pub fn collect(&self, fruit_id: &str, user_id: &str) -> Result<CollectOutcome, GroveError> {
        self.collect_at(fruit_id, user_id, Utc::now())
    }

    pub fn collect_at(
        &self,
        fruit_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CollectOutcome, GroveError> {
        validate_user_id(user_id)?;
        let result = (&self.fruits, &self.spawn_state, &self.inventory).transaction(
            |(fruits, spawn_state, inventory)| -> TxResult<CollectOutcome> {
                let mut fruit: FruitInstance = match fruits.get(fruit_id.as_bytes())? {
                    Some(bytes) => tx(decode_record(&bytes))?,
                    None => return abort(GroveError::NotFound(format!("fruit: {}", fruit_id))),
                };
                if fruit.is_collected {
                    return abort(GroveError::AlreadyCollected(fruit_id.to_string()));
                }
                fruit.is_collected = true;
                fruit.collected_by = Some(user_id.to_string());
                fruit.collected_at = Some(now);
                fruits.insert(fruit.id.as_bytes(), tx(encode(&fruit))?)?;

                let mut state = tx_load_spawn_state(spawn_state, &fruit.tree_id)?;
                state.uncollected = state.uncollected.saturating_sub(1);
                tx_store_spawn_state(spawn_state, &fruit.tree_id, &state)?;

                let quantity = tx_credit(inventory, user_id, &fruit.fruit_type, 1)?;
                Ok(CollectOutcome { fruit, quantity })
            },
        );

        match result {
            Ok(outcome) => {
                self.persist()?;
                metrics::inc_fruits_collected();
                info!(
                    "{} collected {} from tree {}",
                    user_id, outcome.fruit.fruit_type, outcome.fruit.tree_id
                );
                Ok(outcome)
            }
            Err(err) => {
                let err = GroveError::from(err);
                if matches!(err, GroveError::AlreadyCollected(_)) {
                    metrics::inc_collect_conflicts();
                    warn!("{} lost the race for fruit {}", user_id, fruit_id);
                }
                Err(err)
            }
        }
    }

    pub fn get_fruit(&self, fruit_id: &str) -> Result<FruitInstance, GroveError> {
        let Some(bytes) = self.fruits.get(fruit_id.as_bytes())? else {
            return Err(GroveError::NotFound(format!("fruit: {}", fruit_id)));
        };
        decode_record(&bytes)
    }

    /// Every fruit ever spawned on a tree, oldest first.
    pub fn list_fruits(&self, tree_id: &str) -> Result<Vec<FruitInstance>, GroveError> {
        let prefix = format!("{}:", tree_id);
        let mut fruits = Vec::new();
        for entry in self.tree_fruits.scan_prefix(prefix.as_bytes()) {
            let (_, fruit_id) = entry?;
            fruits.push(self.get_fruit(&key_string(&fruit_id))?);
        }
        Ok(fruits)
    }

    pub fn uncollected_fruits(&self, tree_id: &str) -> Result<Vec<FruitInstance>, GroveError> {
        Ok(self
            .list_fruits(tree_id)?
            .into_iter()
            .filter(|fruit| !fruit.is_collected)
            .collect())
    }
}
