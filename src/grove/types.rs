use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::cooldown::CooldownGate;
use super::errors::GroveError;
use super::stage::{Stage, StageTable};
use crate::validation::validate_item_name;

pub const TREE_SCHEMA_VERSION: u8 = 1;
pub const CHECK_IN_SCHEMA_VERSION: u8 = 1;
pub const FRUIT_SCHEMA_VERSION: u8 = 1;
pub const TRADE_SCHEMA_VERSION: u8 = 1;

// ============================================================================
// Trees
// ============================================================================

/// A user's tree. `stage` is a cached projection of `mood_score` and is only
/// ever written together with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeRecord {
    pub id: String,
    pub owner_id: String,
    mood_score: u32,
    stage: Stage,
    pub last_check_in: Option<DateTime<Utc>>,
    pub last_reset: Option<DateTime<Utc>>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub schema_version: u8,
}

impl TreeRecord {
    pub fn new(owner_id: &str, is_public: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            mood_score: 0,
            stage: Stage::Seed,
            last_check_in: None,
            last_reset: None,
            is_public,
            created_at: now,
            updated_at: now,
            schema_version: TREE_SCHEMA_VERSION,
        }
    }

    pub fn mood_score(&self) -> u32 {
        self.mood_score
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Add points and re-derive the stage. Returns `(old, new)` when the stage changed.
    pub fn add_points(&mut self, points: u32, stages: &StageTable) -> Option<(Stage, Stage)> {
        self.set_score(self.mood_score.saturating_add(points), stages)
    }

    /// Drop the score back to zero (explicit reset is the only way down).
    pub fn reset_score(&mut self, stages: &StageTable) -> Option<(Stage, Stage)> {
        self.set_score(0, stages)
    }

    /// Re-derive the cached stage under `stages`, e.g. after thresholds changed.
    pub fn restage(&mut self, stages: &StageTable) -> Option<(Stage, Stage)> {
        self.set_score(self.mood_score, stages)
    }

    fn set_score(&mut self, score: u32, stages: &StageTable) -> Option<(Stage, Stage)> {
        let before = self.stage;
        self.mood_score = score;
        self.stage = stages.stage_of(score);
        (before != self.stage).then_some((before, self.stage))
    }

    pub fn progress(&self, stages: &StageTable) -> TreeProgress {
        TreeProgress {
            mood_score: self.mood_score,
            stage: self.stage,
            next_stage: self.stage.next(),
            points_until_next: stages.points_until_next(self.mood_score),
        }
    }
}

/// Display-oriented summary of where a tree stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeProgress {
    pub mood_score: u32,
    pub stage: Stage,
    pub next_stage: Option<Stage>,
    pub points_until_next: u32,
}

// ============================================================================
// Check-ins
// ============================================================================

/// Raw check-in payload supplied by the journaling UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckInInput {
    /// Emotion intensity, 1 (lowest) to 7 (highest).
    pub emotion_level: u8,
    pub descriptions: BTreeSet<String>,
    pub impacts: BTreeSet<String>,
    pub context: Option<String>,
}

impl CheckInInput {
    pub fn new(emotion_level: u8) -> Self {
        Self {
            emotion_level,
            ..Self::default()
        }
    }

    pub fn with_descriptions<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptions.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_impacts<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.impacts.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// A persisted check-in. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckInRecord {
    pub id: String,
    pub tree_id: String,
    pub emotion_level: u8,
    pub descriptions: BTreeSet<String>,
    pub impacts: BTreeSet<String>,
    pub context: Option<String>,
    /// Score contribution in 0..=10, fixed at creation.
    pub score: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub schema_version: u8,
}

/// Result of a successful check-in: the stored entry and the tree after it was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInOutcome {
    pub check_in: CheckInRecord,
    pub tree: TreeRecord,
    pub stage_change: Option<(Stage, Stage)>,
}

// ============================================================================
// Fruit
// ============================================================================

/// Spawn cadence and capacity for one stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpawnSetting {
    /// Zero means trees at this stage never spawn.
    pub spawn_interval_hours: u32,
    pub max_fruits_per_tree: u32,
}

impl SpawnSetting {
    pub const fn new(spawn_interval_hours: u32, max_fruits_per_tree: u32) -> Self {
        Self {
            spawn_interval_hours,
            max_fruits_per_tree,
        }
    }

    pub fn spawns(&self) -> bool {
        self.spawn_interval_hours > 0 && self.max_fruits_per_tree > 0
    }
}

/// Read-only spawn reference data keyed by stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpawnSettings {
    by_stage: [SpawnSetting; 6],
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            by_stage: [
                SpawnSetting::new(0, 0),
                SpawnSetting::new(24, 1),
                SpawnSetting::new(12, 2),
                SpawnSetting::new(8, 3),
                SpawnSetting::new(6, 4),
                SpawnSetting::new(4, 5),
            ],
        }
    }
}

impl SpawnSettings {
    pub fn new(by_stage: [SpawnSetting; 6]) -> Self {
        Self { by_stage }
    }

    pub fn get(&self, stage: Stage) -> SpawnSetting {
        self.by_stage[stage.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, SpawnSetting)> + '_ {
        Stage::ALL.iter().copied().zip(self.by_stage.iter().copied())
    }
}

/// A collectible fruit type and where it starts appearing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FruitKind {
    pub name: String,
    pub min_stage: Stage,
    /// Relative likelihood among the kinds eligible for a stage.
    pub weight: u32,
}

impl FruitKind {
    pub fn new(name: &str, min_stage: Stage, weight: u32) -> Self {
        Self {
            name: name.to_string(),
            min_stage,
            weight,
        }
    }
}

pub fn default_fruit_catalog() -> Vec<FruitKind> {
    vec![
        FruitKind::new("apple", Stage::Sprout, 50),
        FruitKind::new("cherry", Stage::Sapling, 30),
        FruitKind::new("peach", Stage::Young, 20),
        FruitKind::new("golden_pear", Stage::Mature, 10),
        FruitKind::new("starfruit", Stage::Blooming, 5),
    ]
}

/// One spawned fruit. Moves from uncollected to collected exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FruitInstance {
    pub id: String,
    pub tree_id: String,
    pub fruit_type: String,
    /// Placement within the canopy, in percent of its width/height.
    pub position_x: f32,
    pub position_y: f32,
    pub spawned_at: DateTime<Utc>,
    pub is_collected: bool,
    pub collected_by: Option<String>,
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub schema_version: u8,
}

/// Per-tree aggregate maintained alongside every fruit insert and collect.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpawnState {
    pub uncollected: u32,
    pub last_spawned_at: Option<DateTime<Utc>>,
    pub total_spawned: u64,
}

// ============================================================================
// Trading
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    Accepted,
    Cancelled,
    Expired,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TradeStatus::Open => "open",
            TradeStatus::Accepted => "accepted",
            TradeStatus::Cancelled => "cancelled",
            TradeStatus::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// Fruit name to positive quantity.
pub type FruitBundle = BTreeMap<String, u64>;

/// A barter offer. Nothing is escrowed; both sides are checked at acceptance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeOffer {
    pub id: String,
    pub creator_user_id: String,
    pub offered_fruits: FruitBundle,
    pub requested_fruits: FruitBundle,
    pub status: TradeStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub accepted_by: Option<String>,
    /// When the offer left `open`.
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub schema_version: u8,
}

impl TradeOffer {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Open and not yet past its expiration time.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && !self.is_past_expiry(now)
    }

    pub fn close(&mut self, status: TradeStatus, now: DateTime<Utc>) {
        self.status = status;
        self.closed_at = Some(now);
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Score pacing and the cooldowns around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrowthRules {
    pub stages: StageTable,
    pub check_in_gate: CooldownGate,
    pub reset_gate: CooldownGate,
    pub encouragement_points: u32,
    pub max_context_chars: usize,
}

impl Default for GrowthRules {
    fn default() -> Self {
        Self {
            stages: StageTable::default(),
            check_in_gate: CooldownGate::check_in(),
            reset_gate: CooldownGate::reset(),
            encouragement_points: 2,
            max_context_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRules {
    pub settings: SpawnSettings,
    /// Upper bound on fruits created by one spawn.
    pub spawn_batch: u32,
    pub catalog: Vec<FruitKind>,
}

impl Default for SpawnRules {
    fn default() -> Self {
        Self {
            settings: SpawnSettings::default(),
            spawn_batch: 1,
            catalog: default_fruit_catalog(),
        }
    }
}

impl SpawnRules {
    /// Catalog names normalised like inventory keys, with batch size and
    /// stage coverage checked. The store only ever runs normalised rules.
    pub fn normalized(&self) -> Result<SpawnRules, GroveError> {
        if self.spawn_batch == 0 {
            return Err(GroveError::InvalidRules("spawn_batch must be at least 1".to_string()));
        }
        if self.catalog.is_empty() {
            return Err(GroveError::InvalidRules("fruit catalog must not be empty".to_string()));
        }
        let mut seen = BTreeSet::new();
        let mut catalog = Vec::with_capacity(self.catalog.len());
        for kind in &self.catalog {
            let name = validate_item_name(&kind.name)?;
            if kind.weight == 0 {
                return Err(GroveError::InvalidRules(format!("fruit '{}' must have a positive weight", name)));
            }
            if !seen.insert(name.clone()) {
                return Err(GroveError::InvalidRules(format!("fruit '{}' appears twice in the catalog", name)));
            }
            catalog.push(FruitKind {
                name,
                min_stage: kind.min_stage,
                weight: kind.weight,
            });
        }
        for (stage, setting) in self.settings.iter() {
            if setting.spawns() && !catalog.iter().any(|kind| kind.min_stage <= stage) {
                return Err(GroveError::InvalidRules(format!(
                    "stage {} spawns fruit but no catalog entry is unlocked by then",
                    stage
                )));
            }
        }
        Ok(SpawnRules {
            settings: self.settings.clone(),
            spawn_batch: self.spawn_batch,
            catalog,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketRules {
    pub default_expiration_hours: i64,
    pub max_expiration_hours: i64,
}

impl Default for MarketRules {
    fn default() -> Self {
        Self {
            default_expiration_hours: 24,
            max_expiration_hours: 168,
        }
    }
}

/// Everything the store needs to know about pacing, spawning and trading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroveRules {
    pub growth: GrowthRules,
    pub spawn: SpawnRules,
    pub market: MarketRules,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn stage_follows_score_through_every_mutation() {
        let stages = StageTable::default();
        let mut tree = TreeRecord::new("alice", false, Utc::now());
        assert_eq!(tree.stage(), Stage::Seed);

        assert_eq!(tree.add_points(19, &stages), None);
        assert_eq!(tree.add_points(1, &stages), Some((Stage::Seed, Stage::Sprout)));
        assert_eq!(tree.stage(), stages.stage_of(tree.mood_score()));

        tree.add_points(500, &stages);
        assert_eq!(tree.stage(), Stage::Blooming);

        assert_eq!(tree.reset_score(&stages), Some((Stage::Blooming, Stage::Seed)));
        assert_eq!(tree.mood_score(), 0);
    }

    #[test]
    fn score_saturates_instead_of_wrapping() {
        let stages = StageTable::default();
        let mut tree = TreeRecord::new("bob", true, Utc::now());
        tree.add_points(u32::MAX, &stages);
        tree.add_points(10, &stages);
        assert_eq!(tree.mood_score(), u32::MAX);
    }

    #[test]
    fn restage_follows_new_thresholds() {
        let mut tree = TreeRecord::new("carol", false, Utc::now());
        tree.add_points(30, &StageTable::default());
        assert_eq!(tree.stage(), Stage::Sprout);

        let stricter = StageTable::new([40, 60, 90, 130, 210]).unwrap();
        assert_eq!(tree.restage(&stricter), Some((Stage::Sprout, Stage::Seed)));
        assert_eq!(tree.restage(&stricter), None);
        assert_eq!(tree.mood_score(), 30);
    }

    #[test]
    fn spawn_rules_normalise_catalog_names() {
        let rules = SpawnRules {
            catalog: vec![FruitKind::new("  Apple ", Stage::Sprout, 3)],
            ..SpawnRules::default()
        };
        let normalized = rules.normalized().unwrap();
        assert_eq!(normalized.catalog[0].name, "apple");
        assert_eq!(normalized.catalog[0].weight, 3);

        let duplicate = SpawnRules {
            catalog: vec![
                FruitKind::new("apple", Stage::Sprout, 1),
                FruitKind::new("APPLE", Stage::Young, 1),
            ],
            ..SpawnRules::default()
        };
        assert!(matches!(duplicate.normalized(), Err(GroveError::InvalidRules(_))));

        let no_batch = SpawnRules {
            spawn_batch: 0,
            ..SpawnRules::default()
        };
        assert!(matches!(no_batch.normalized(), Err(GroveError::InvalidRules(_))));
    }

    #[test]
    fn seed_never_spawns_by_default() {
        let settings = SpawnSettings::default();
        assert!(!settings.get(Stage::Seed).spawns());
        assert!(settings.get(Stage::Sprout).spawns());
        assert_eq!(settings.iter().count(), 6);
    }

    #[test]
    fn trade_liveness_depends_on_status_and_time() {
        let now = Utc::now();
        let mut offer = TradeOffer {
            id: "t1".into(),
            creator_user_id: "alice".into(),
            offered_fruits: FruitBundle::from([("apple".to_string(), 1)]),
            requested_fruits: FruitBundle::from([("cherry".to_string(), 1)]),
            status: TradeStatus::Open,
            expires_at: now + Duration::hours(1),
            created_at: now,
            accepted_by: None,
            closed_at: None,
            schema_version: TRADE_SCHEMA_VERSION,
        };
        assert!(offer.is_live(now));
        assert!(!offer.is_live(now + Duration::hours(1)));
        offer.close(TradeStatus::Cancelled, now);
        assert!(!offer.is_live(now));
        assert_eq!(offer.status.to_string(), "cancelled");
    }
}
