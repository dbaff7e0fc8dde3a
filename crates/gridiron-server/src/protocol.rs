// JSON request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

use gridiron_core::optimizer::{OptimizationSettings, PositionCounts, Selection, Shortfall, Strategy};
use gridiron_core::scoring::{CacheStats, FactorWeights, Fingerprint, ScoreConfig, ScoredPlayer, WeightProfile};
use gridiron_core::slate::player::Variant;
use gridiron_core::store::SavedSelection;

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Inline scoring configuration, used instead of a stored profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineProfile {
    pub weights: FactorWeights,
    #[serde(default)]
    pub config: ScoreConfig,
}

impl InlineProfile {
    pub fn into_profile(self) -> WeightProfile {
        WeightProfile::new("inline", self.weights, self.config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub week: u32,
    #[serde(default)]
    pub variant: Variant,
    /// Takes precedence over `profile_name`.
    #[serde(default)]
    pub profile: Option<InlineProfile>,
    #[serde(default)]
    pub profile_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub week: u32,
    pub variant: Variant,
    pub fingerprint: Fingerprint,
    pub players: Vec<ScoredPlayer>,
    pub duration_ms: u64,
    pub cached: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvalidateRequest {
    /// Absent means every week.
    #[serde(default)]
    pub week: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateResponse {
    /// `"week N"` or `"all"`.
    pub invalidated: String,
    pub entries_removed: usize,
}

// ---------------------------------------------------------------------------
// Lineups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupRequest {
    pub week: u32,
    pub settings: OptimizationSettings,
    /// Pre-scored pool. When absent the week is scored first.
    #[serde(default)]
    pub players: Option<Vec<ScoredPlayer>>,
    #[serde(default)]
    pub profile_name: Option<String>,
    /// Persist the returned selections.
    #[serde(default)]
    pub save: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupResponse {
    pub success: bool,
    pub week: u32,
    pub settings: OptimizationSettings,
    pub selections: Vec<Selection>,
    pub requested: usize,
    pub achieved: usize,
    pub position_counts: PositionCounts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shortfalls: Vec<Shortfall>,
    #[serde(default)]
    pub strategy_used: Option<Strategy>,
    pub duration_ms: u64,
    #[serde(default)]
    pub saved_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSelectionsResponse {
    pub week: u32,
    pub selections: Vec<SavedSelection>,
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesResponse {
    pub profiles: Vec<WeightProfile>,
}

/// Body of `POST /profiles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveProfileRequest {
    pub name: String,
    pub weights: FactorWeights,
    #[serde(default)]
    pub config: ScoreConfig,
    /// Also make this the default profile.
    #[serde(default)]
    pub make_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub profile: WeightProfile,
    pub fingerprint: Fingerprint,
}

// ---------------------------------------------------------------------------
// Health and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlateSummary {
    pub week: u32,
    pub variant: Variant,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub slates: Vec<SlateSummary>,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
