//! Growth stages and the score thresholds that separate them.
//!
//! The threshold table is plain data so deployments can tune pacing through
//! configuration; the mapping from score to stage is pure and total.

use serde::{Deserialize, Serialize};

/// Default lower bounds for `sprout`, `sapling`, `young`, `mature` and `blooming`.
pub const DEFAULT_STAGE_THRESHOLDS: [u32; 5] = [20, 50, 80, 120, 200];

/// Ordered growth stages of a tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Seed,
    Sprout,
    Sapling,
    Young,
    Mature,
    Blooming,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Seed,
        Stage::Sprout,
        Stage::Sapling,
        Stage::Young,
        Stage::Mature,
        Stage::Blooming,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Seed => "seed",
            Stage::Sprout => "sprout",
            Stage::Sapling => "sapling",
            Stage::Young => "young",
            Stage::Mature => "mature",
            Stage::Blooming => "blooming",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}

/// Score thresholds at which each stage after `seed` begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTable {
    thresholds: [u32; 5],
}

impl Default for StageTable {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_STAGE_THRESHOLDS,
        }
    }
}

impl StageTable {
    /// Build a table; thresholds must be strictly ascending.
    pub fn new(thresholds: [u32; 5]) -> Result<Self, String> {
        if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(format!(
                "stage thresholds must be strictly ascending, got {:?}",
                thresholds
            ));
        }
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> [u32; 5] {
        self.thresholds
    }

    /// Lowest score belonging to `stage`.
    pub fn threshold_of(&self, stage: Stage) -> u32 {
        match stage.index() {
            0 => 0,
            i => self.thresholds[i - 1],
        }
    }

    pub fn stage_of(&self, score: u32) -> Stage {
        let reached = self.thresholds.iter().filter(|&&t| score >= t).count();
        Stage::ALL[reached]
    }

    /// Points still needed to reach the next stage; zero once blooming.
    pub fn points_until_next(&self, score: u32) -> u32 {
        match self.stage_of(score).next() {
            Some(next) => self.threshold_of(next) - score,
            None => 0,
        }
    }
}

/// Stage for `score` under the default thresholds.
pub fn stage_of(score: u32) -> Stage {
    StageTable::default().stage_of(score)
}

/// Points until the next stage under the default thresholds.
pub fn points_until_next(score: u32) -> u32 {
    StageTable::default().points_until_next(score)
}
