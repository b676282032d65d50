//! Check-in scoring and every write path that changes a tree's score.
//!
//! All score changes go through `TreeRecord::add_points` / `reset_score`
//! inside a sled transaction, so the stored stage always matches the stored
//! score.

use chrono::{DateTime, Utc};
use log::{debug, info};
use sled::Transactional;

use super::cooldown::CooldownStatus;
use super::errors::{abort, GroveError};
use super::stage::Stage;
use super::storage::{decode_record, encode, tx, tx_load_tree, tx_store_tree, GroveStore, TxResult};
use super::types::{CheckInInput, CheckInOutcome, CheckInRecord, TreeRecord, CHECK_IN_SCHEMA_VERSION};
use crate::metrics;
use crate::validation::{normalize_tags, preview_for_log};

pub const MIN_EMOTION_LEVEL: u8 = 1;
pub const MAX_EMOTION_LEVEL: u8 = 7;
/// Highest possible raw value: emotion 7 + descriptions 2 + impacts 2 + context 3.
const RAW_SCORE_CEILING: f64 = 14.0;
pub const MAX_CHECK_IN_SCORE: u8 = 10;

fn description_bonus(count: usize) -> f64 {
    (count as f64 * 0.5).min(2.0)
}

fn impact_bonus(count: usize) -> f64 {
    (count as f64 * 0.67).min(2.0)
}

/// Bonus for elaborating, by trimmed character count.
pub fn context_bonus(context: Option<&str>) -> u8 {
    let len = context.map(|c| c.trim().chars().count()).unwrap_or(0);
    match len {
        0..=24 => 0,
        25..=74 => 1,
        75..=149 => 2,
        _ => 3,
    }
}

/// Score contribution of one check-in, in `0..=10`.
pub fn score_check_in(input: &CheckInInput) -> u8 {
    let raw = f64::from(input.emotion_level)
        + description_bonus(input.descriptions.len())
        + impact_bonus(input.impacts.len())
        + f64::from(context_bonus(input.context.as_deref()));
    let scaled = (raw / RAW_SCORE_CEILING * 10.0).min(10.0).round();
    scaled.clamp(0.0, f64::from(MAX_CHECK_IN_SCORE)) as u8
}

fn check_in_key(tree_id: &str, created_at: DateTime<Utc>, id: &str) -> Vec<u8> {
    let nanos = created_at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| created_at.timestamp_micros() * 1000);
    format!("{}:{:020}:{}", tree_id, nanos.max(0), id).into_bytes()
}

/// Reject malformed input and return the normalised payload that will be stored.
pub fn validate_check_in(input: &CheckInInput, max_context_chars: usize) -> Result<CheckInInput, GroveError> {
    if !(MIN_EMOTION_LEVEL..=MAX_EMOTION_LEVEL).contains(&input.emotion_level) {
        return Err(GroveError::InvalidCheckIn(format!(
            "emotion level {} outside {}..={}",
            input.emotion_level, MIN_EMOTION_LEVEL, MAX_EMOTION_LEVEL
        )));
    }
    let context = input
        .context
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if let Some(text) = context {
        let len = text.chars().count();
        if len > max_context_chars {
            return Err(GroveError::InvalidCheckIn(format!(
                "context is {} characters, limit is {}",
                len, max_context_chars
            )));
        }
    }
    Ok(CheckInInput {
        emotion_level: input.emotion_level,
        descriptions: normalize_tags(&input.descriptions),
        impacts: normalize_tags(&input.impacts),
        context: context.map(str::to_string),
    })
}

impl GroveStore {
    /// Record a check-in on the caller's tree and grow it by the check-in's score.
    pub fn check_in(
        &self,
        tree_id: &str,
        user_id: &str,
        input: &CheckInInput,
    ) -> Result<CheckInOutcome, GroveError> {
        self.check_in_at(tree_id, user_id, input, Utc::now())
    }

    pub fn check_in_at(
        &self,
        tree_id: &str,
        user_id: &str,
        input: &CheckInInput,
        now: DateTime<Utc>,
    ) -> Result<CheckInOutcome, GroveError> {
        let growth = &self.rules.growth;
        let input = validate_check_in(input, growth.max_context_chars)?;
        let score = score_check_in(&input);

        let outcome = (&self.trees, &self.check_ins).transaction(|(trees, check_ins)| -> TxResult<CheckInOutcome> {
            let mut tree = tx_load_tree(trees, tree_id)?;
            if tree.owner_id != user_id {
                return abort(GroveError::NotOwner(format!("tree {}", tree_id)));
            }
            tx(growth.check_in_gate.status_at(tree.last_check_in, now).into_result())?;

            let record = CheckInRecord {
                id: uuid::Uuid::new_v4().to_string(),
                tree_id: tree_id.to_string(),
                emotion_level: input.emotion_level,
                descriptions: input.descriptions.clone(),
                impacts: input.impacts.clone(),
                context: input.context.clone(),
                score,
                created_at: now,
                schema_version: CHECK_IN_SCHEMA_VERSION,
            };
            check_ins.insert(
                check_in_key(tree_id, now, &record.id),
                tx(encode(&record))?,
            )?;

            let stage_change = tree.add_points(u32::from(score), &growth.stages);
            tree.last_check_in = Some(now);
            tree.updated_at = now;
            tx_store_tree(trees, &tree)?;
            Ok(CheckInOutcome {
                check_in: record,
                tree,
                stage_change,
            })
        })?;
        self.persist()?;
        metrics::inc_check_ins();

        debug!(
            "Check-in on tree {}: level {}, score {}, context '{}'",
            tree_id,
            input.emotion_level,
            score,
            preview_for_log(input.context.as_deref().unwrap_or(""), 40)
        );
        if let Some((from, to)) = outcome.stage_change {
            info!("Tree {} grew from {} to {}", tree_id, from, to);
        }
        Ok(outcome)
    }

    /// Cooldown status for the next check-in, without attempting one.
    pub fn check_in_status_at(&self, tree_id: &str, now: DateTime<Utc>) -> Result<CooldownStatus, GroveError> {
        let tree = self.get_tree(tree_id)?;
        Ok(self.rules.growth.check_in_gate.status_at(tree.last_check_in, now))
    }

    pub fn check_in_status(&self, tree_id: &str) -> Result<CooldownStatus, GroveError> {
        self.check_in_status_at(tree_id, Utc::now())
    }

    /// Grow a tree for a received encouragement message. Not cooldown-gated.
    pub fn receive_encouragement(&self, tree_id: &str) -> Result<TreeRecord, GroveError> {
        self.receive_encouragement_at(tree_id, Utc::now())
    }

    pub fn receive_encouragement_at(&self, tree_id: &str, now: DateTime<Utc>) -> Result<TreeRecord, GroveError> {
        let growth = &self.rules.growth;
        let (tree, stage_change) = self.trees.transaction(|trees| -> TxResult<(TreeRecord, Option<(Stage, Stage)>)> {
            let mut tree = tx_load_tree(trees, tree_id)?;
            let change = tree.add_points(growth.encouragement_points, &growth.stages);
            tree.updated_at = now;
            tx_store_tree(trees, &tree)?;
            Ok((tree, change))
        })?;
        self.persist()?;
        metrics::inc_encouragements();
        if let Some((from, to)) = stage_change {
            info!("Tree {} grew from {} to {} after encouragement", tree_id, from, to);
        }
        Ok(tree)
    }

    /// Owner-only reset of the score to zero, at most once per reset window.
    pub fn reset_tree(&self, tree_id: &str, user_id: &str) -> Result<TreeRecord, GroveError> {
        self.reset_tree_at(tree_id, user_id, Utc::now())
    }

    pub fn reset_tree_at(
        &self,
        tree_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TreeRecord, GroveError> {
        let growth = &self.rules.growth;
        let tree = self.trees.transaction(|trees| -> TxResult<TreeRecord> {
            let mut tree = tx_load_tree(trees, tree_id)?;
            if tree.owner_id != user_id {
                return abort(GroveError::NotOwner(format!("tree {}", tree_id)));
            }
            tx(growth.reset_gate.status_at(tree.last_reset, now).into_result())?;
            tree.reset_score(&growth.stages);
            tree.last_reset = Some(now);
            tree.updated_at = now;
            tx_store_tree(trees, &tree)?;
            Ok(tree)
        })?;
        self.persist()?;
        metrics::inc_tree_resets();
        info!("Tree {} reset by {}", tree_id, user_id);
        Ok(tree)
    }

    /// Most recent check-ins first.
    pub fn check_in_history(&self, tree_id: &str, limit: usize) -> Result<Vec<CheckInRecord>, GroveError> {
        let prefix = format!("{}:", tree_id);
        self.check_ins
            .scan_prefix(prefix.as_bytes())
            .rev()
            .take(limit)
            .map(|entry| {
                entry
                    .map_err(GroveError::from)
                    .and_then(|(_key, value)| decode_record(&value))
            })
            .collect()
    }
}
