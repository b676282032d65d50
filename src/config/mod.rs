//! # Configuration Management Module
//!
//! Loads, validates and writes the Moodgrove TOML configuration and turns it
//! into the [`GroveRules`] the store runs with.
//!
//! ## Configuration Structure
//!
//! - [`StorageConfig`] - where the sled database lives
//! - [`LoggingConfig`] - log level and optional log file
//! - [`GrowthConfig`] - stage thresholds, cooldowns and check-in limits
//! - [`SpawnConfig`] - per-stage spawn cadence and the fruit catalog
//! - [`MarketConfig`] - trade expiry bounds
//! - [`SweeperConfig`] - how often the background sweep runs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use moodgrove::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("moodgrove.toml").await?;
//!     let config = Config::load("moodgrove.toml").await?;
//!     let rules = config.rules()?;
//!     println!("Check-in cooldown: {} min", rules.growth.check_in_gate.window().num_minutes());
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "./data/grove"
//!
//! [growth]
//! stage_thresholds = [20, 50, 80, 120, 200]
//! check_in_cooldown_minutes = 60
//!
//! [spawn.blooming]
//! spawn_interval_hours = 4
//! max_fruits_per_tree = 5
//!
//! [[spawn.catalog]]
//! name = "apple"
//! min_stage = "sprout"
//! weight = 50
//! ```
//!
//! Every section and field has a default, so a partial file is fine.

use anyhow::{anyhow, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::grove::cooldown::{CHECK_IN_WINDOW_MINUTES, RESET_WINDOW_HOURS};
use crate::grove::sweeper::{DEFAULT_SWEEP_INTERVAL_SECS, MAX_SWEEP_INTERVAL_SECS};
use crate::grove::{
    default_fruit_catalog, CooldownGate, FruitKind, GroveRules, GrowthRules, MarketRules, SpawnRules,
    SpawnSetting, SpawnSettings, Stage, StageTable, DEFAULT_STAGE_THRESHOLDS,
};

/// Offers may stay open for at most ten years.
const MAX_EXPIRATION_HOURS: i64 = 24 * 365 * 10;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
    #[serde(default)]
    pub spawn: SpawnConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/grove".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("moodgrove.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Minimum score for sprout, sapling, young, mature and blooming.
    pub stage_thresholds: [u32; 5],
    pub check_in_cooldown_minutes: i64,
    pub reset_cooldown_hours: i64,
    pub encouragement_points: u32,
    pub max_context_chars: usize,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            stage_thresholds: DEFAULT_STAGE_THRESHOLDS,
            check_in_cooldown_minutes: CHECK_IN_WINDOW_MINUTES,
            reset_cooldown_hours: RESET_WINDOW_HOURS,
            encouragement_points: 2,
            max_context_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub seed: SpawnSetting,
    pub sprout: SpawnSetting,
    pub sapling: SpawnSetting,
    pub young: SpawnSetting,
    pub mature: SpawnSetting,
    pub blooming: SpawnSetting,
    /// Most fruit a single spawn may create; remaining capacity still applies.
    pub spawn_batch: u32,
    pub catalog: Vec<FruitKind>,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        let defaults = SpawnSettings::default();
        Self {
            seed: defaults.get(Stage::Seed),
            sprout: defaults.get(Stage::Sprout),
            sapling: defaults.get(Stage::Sapling),
            young: defaults.get(Stage::Young),
            mature: defaults.get(Stage::Mature),
            blooming: defaults.get(Stage::Blooming),
            spawn_batch: 1,
            catalog: default_fruit_catalog(),
        }
    }
}

impl SpawnConfig {
    pub fn settings(&self) -> SpawnSettings {
        SpawnSettings::new([
            self.seed,
            self.sprout,
            self.sapling,
            self.young,
            self.mature,
            self.blooming,
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub default_expiration_hours: i64,
    pub max_expiration_hours: i64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        let defaults = MarketRules::default();
        Self {
            default_expiration_hours: defaults.default_expiration_hours,
            max_expiration_hours: defaults.max_expiration_hours,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Load and validate configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config
            .validate()
            .map_err(|e| anyhow!("Invalid config file {}: {}", path, e))?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.rules().map(|_| ())
    }

    /// Build the engine rules, rejecting values the store cannot run with.
    pub fn rules(&self) -> Result<GroveRules> {
        let growth = &self.growth;
        let stages = StageTable::new(growth.stage_thresholds).map_err(|e| anyhow!(e))?;
        if growth.check_in_cooldown_minutes < 0 || growth.reset_cooldown_hours < 0 {
            return Err(anyhow!("cooldowns must not be negative"));
        }
        let check_in_window = Duration::try_minutes(growth.check_in_cooldown_minutes)
            .ok_or_else(|| anyhow!("check_in_cooldown_minutes is too large"))?;
        let reset_window = Duration::try_hours(growth.reset_cooldown_hours)
            .ok_or_else(|| anyhow!("reset_cooldown_hours is too large"))?;
        if growth.max_context_chars == 0 {
            return Err(anyhow!("max_context_chars must be positive"));
        }

        let spawn = SpawnRules {
            settings: self.spawn.settings(),
            spawn_batch: self.spawn.spawn_batch,
            catalog: self.spawn.catalog.clone(),
        }
        .normalized()
        .map_err(|e| anyhow!("spawn: {}", e))?;

        let market = &self.market;
        if !(1..=MAX_EXPIRATION_HOURS).contains(&market.max_expiration_hours) {
            return Err(anyhow!(
                "max_expiration_hours must be between 1 and {}",
                MAX_EXPIRATION_HOURS
            ));
        }
        if !(1..=market.max_expiration_hours).contains(&market.default_expiration_hours) {
            return Err(anyhow!(
                "default_expiration_hours must be between 1 and {}",
                market.max_expiration_hours
            ));
        }

        if !(1..=MAX_SWEEP_INTERVAL_SECS).contains(&self.sweeper.interval_secs) {
            return Err(anyhow!(
                "sweeper interval_secs must be between 1 and {}",
                MAX_SWEEP_INTERVAL_SECS
            ));
        }

        Ok(GroveRules {
            growth: GrowthRules {
                stages,
                check_in_gate: CooldownGate::new(check_in_window),
                reset_gate: CooldownGate::new(reset_window),
                encouragement_points: growth.encouragement_points,
                max_context_chars: growth.max_context_chars,
            },
            spawn,
            market: MarketRules {
                default_expiration_hours: market.default_expiration_hours,
                max_expiration_hours: market.max_expiration_hours,
            },
        })
    }
}
