// Scoring engine: raw signals + weight profile -> one smart score per player.

pub mod cache;
pub mod engine;
pub mod normalize;
pub mod profile;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::slate::player::{Player, Variant};

pub use cache::{CacheKey, CacheStats, ScoreCache};
pub use engine::{score_players, ScoreRun, ScoringEngine};
pub use profile::{BlendRule, FactorWeights, Fingerprint, ProjectionSource, ScoreConfig, WeightProfile};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    #[error("no slate loaded for week {week} ({variant})")]
    UnknownWeek { week: u32, variant: Variant },

    #[error("slate for week {week} ({variant}) has no players")]
    EmptyPool { week: u32, variant: Variant },

    #[error("invalid weight profile field `{field}`: {message}")]
    InvalidProfile { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Scored player
// ---------------------------------------------------------------------------

/// A player with its derived score under one profile fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPlayer {
    #[serde(flatten)]
    pub player: Player,
    /// Finite and non-negative.
    pub smart_score: f64,
    pub fingerprint: Fingerprint,
}
