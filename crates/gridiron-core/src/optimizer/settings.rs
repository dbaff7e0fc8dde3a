// Generation settings: the per-request knobs, the configured limits they fall
// back to, and the validated form the model builder consumes.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::slate::player::Variant;

use super::OptimizerError;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// How aggressively ranked selections must differ from one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Differ from every prior ranked selection by at least one player.
    Cash,
    /// At least two players.
    #[default]
    Balanced,
    /// At least three players.
    Tournament,
}

impl Strategy {
    /// Minimum number of players a new selection must swap out relative to
    /// each accepted one.
    pub fn min_difference(&self) -> usize {
        match self {
            Strategy::Cash => 1,
            Strategy::Balanced => 2,
            Strategy::Tournament => 3,
        }
    }

    /// The next weaker rule, or `None` at the weakest.
    pub fn relaxed(&self) -> Option<Strategy> {
        match self {
            Strategy::Tournament => Some(Strategy::Balanced),
            Strategy::Balanced => Some(Strategy::Cash),
            Strategy::Cash => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Cash => "cash",
            Strategy::Balanced => "balanced",
            Strategy::Tournament => "tournament",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Configured limits
// ---------------------------------------------------------------------------

/// Salary cap and concentration defaults for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantLimits {
    pub salary_cap: i64,
    pub max_players_per_team: i64,
    pub max_players_per_game: i64,
}

/// Optimizer section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerOptions {
    /// Upper bound on `lineup_count` for a single request.
    pub max_lineups: i64,
    /// Wall-clock budget for one solve: the baseline or a single ranked
    /// iteration. A solve that runs out counts as infeasible for that
    /// iteration only.
    pub solve_timeout_ms: u64,
    /// Wall-clock budget for all ranked iterations of one request. When it
    /// runs out the lineups already built are returned.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Search-node budget for one solve.
    pub node_limit: u64,
    /// Score and salary scale applied to the captain slot.
    pub captain_multiplier: f64,
    pub standard: VariantLimits,
    pub captain: VariantLimits,
}

impl OptimizerOptions {
    pub fn limits(&self, variant: Variant) -> &VariantLimits {
        match variant {
            Variant::Standard => &self.standard,
            Variant::Captain => &self.captain,
        }
    }

    pub fn solve_timeout(&self) -> Duration {
        Duration::from_millis(self.solve_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            max_lineups: 150,
            solve_timeout_ms: 5_000,
            request_timeout_ms: default_request_timeout_ms(),
            node_limit: 5_000_000,
            captain_multiplier: 1.5,
            standard: VariantLimits {
                salary_cap: 50_000,
                max_players_per_team: 4,
                max_players_per_game: 6,
            },
            captain: VariantLimits {
                salary_cap: 50_000,
                max_players_per_team: 5,
                max_players_per_game: 6,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Request settings
// ---------------------------------------------------------------------------

/// Settings supplied with a generation request.
///
/// Integer fields are signed so that out-of-range values reach validation
/// instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSettings {
    pub lineup_count: i64,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub variant: Variant,
    #[serde(default)]
    pub max_players_per_team: Option<i64>,
    #[serde(default)]
    pub max_players_per_game: Option<i64>,
    /// Players scoring below this are excluded before modeling.
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Restrict the pool to these player ids.
    #[serde(default)]
    pub player_ids: Option<Vec<String>>,
    /// Override of the configured salary cap.
    #[serde(default)]
    pub salary_cap: Option<i64>,
    /// Captain variant: the single game every selected player must come from.
    #[serde(default)]
    pub game: Option<String>,
}

impl OptimizationSettings {
    pub fn new(lineup_count: i64, variant: Variant) -> Self {
        Self {
            lineup_count,
            strategy: Strategy::default(),
            variant,
            max_players_per_team: None,
            max_players_per_game: None,
            min_score: None,
            player_ids: None,
            salary_cap: None,
            game: None,
        }
    }

    /// Check every field and fill defaults from `options`.
    pub fn resolve(&self, options: &OptimizerOptions) -> Result<ResolvedSettings, OptimizerError> {
        let limits = options.limits(self.variant);

        if self.lineup_count < 1 || self.lineup_count > options.max_lineups {
            return Err(invalid(
                "lineup_count",
                format!("must be between 1 and {}, got {}", options.max_lineups, self.lineup_count),
            ));
        }

        let salary_cap = self.salary_cap.unwrap_or(limits.salary_cap);
        if salary_cap <= 0 {
            return Err(invalid("salary_cap", format!("must be positive, got {salary_cap}")));
        }

        let max_per_team = self.max_players_per_team.unwrap_or(limits.max_players_per_team);
        if max_per_team < 1 {
            return Err(invalid(
                "max_players_per_team",
                format!("must be at least 1, got {max_per_team}"),
            ));
        }

        let max_per_game = self.max_players_per_game.unwrap_or(limits.max_players_per_game);
        if max_per_game < 1 {
            return Err(invalid(
                "max_players_per_game",
                format!("must be at least 1, got {max_per_game}"),
            ));
        }

        if let Some(min) = self.min_score {
            if !min.is_finite() {
                return Err(invalid("min_score", format!("must be a finite number, got {min}")));
            }
        }

        if self.game.is_some() && self.variant != Variant::Captain {
            return Err(invalid("game", "only applies to the captain variant".to_string()));
        }

        if !options.captain_multiplier.is_finite() || options.captain_multiplier <= 0.0 {
            return Err(invalid(
                "captain_multiplier",
                format!("must be positive, got {}", options.captain_multiplier),
            ));
        }

        Ok(ResolvedSettings {
            lineup_count: self.lineup_count as usize,
            strategy: self.strategy,
            variant: self.variant,
            salary_cap,
            max_players_per_team: max_per_team as usize,
            max_players_per_game: max_per_game as usize,
            min_score: self.min_score,
            player_ids: self
                .player_ids
                .as_ref()
                .map(|ids| ids.iter().cloned().collect()),
            game: self.game.clone(),
            captain_multiplier: options.captain_multiplier,
            solve_timeout: options.solve_timeout(),
            request_timeout: options.request_timeout(),
            node_limit: options.node_limit,
        })
    }
}

fn invalid(field: &str, message: String) -> OptimizerError {
    OptimizerError::InvalidSettings {
        field: field.to_string(),
        message,
    }
}

/// Validated settings with every default applied.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub lineup_count: usize,
    pub strategy: Strategy,
    pub variant: Variant,
    pub salary_cap: i64,
    pub max_players_per_team: usize,
    pub max_players_per_game: usize,
    pub min_score: Option<f64>,
    pub player_ids: Option<HashSet<String>>,
    pub game: Option<String>,
    pub captain_multiplier: f64,
    pub solve_timeout: Duration,
    pub request_timeout: Duration,
    pub node_limit: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: OptimizerError) -> String {
        match err {
            OptimizerError::InvalidSettings { field, .. } => field,
            other => panic!("expected InvalidSettings, got {other:?}"),
        }
    }

    #[test]
    fn defaults_fill_from_variant_limits() {
        let options = OptimizerOptions::default();
        let resolved = OptimizationSettings::new(3, Variant::Captain)
            .resolve(&options)
            .unwrap();
        assert_eq!(resolved.lineup_count, 3);
        assert_eq!(resolved.salary_cap, options.captain.salary_cap);
        assert_eq!(resolved.max_players_per_team, 5);
        assert_eq!(resolved.strategy, Strategy::Balanced);
        assert_eq!(resolved.captain_multiplier, 1.5);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let mut settings = OptimizationSettings::new(1, Variant::Standard);
        settings.salary_cap = Some(60_000);
        settings.max_players_per_team = Some(2);
        settings.player_ids = Some(vec!["a".into(), "b".into(), "a".into()]);
        let resolved = settings.resolve(&OptimizerOptions::default()).unwrap();
        assert_eq!(resolved.salary_cap, 60_000);
        assert_eq!(resolved.max_players_per_team, 2);
        assert_eq!(resolved.player_ids.unwrap().len(), 2);
    }

    #[test]
    fn rejects_non_positive_lineup_count() {
        let options = OptimizerOptions::default();
        for count in [0, -3] {
            let err = OptimizationSettings::new(count, Variant::Standard)
                .resolve(&options)
                .unwrap_err();
            assert_eq!(field_of(err), "lineup_count");
        }
    }

    #[test]
    fn rejects_lineup_count_above_max() {
        let options = OptimizerOptions::default();
        let err = OptimizationSettings::new(options.max_lineups + 1, Variant::Standard)
            .resolve(&options)
            .unwrap_err();
        assert_eq!(field_of(err), "lineup_count");
    }

    #[test]
    fn rejects_non_positive_cap() {
        let mut settings = OptimizationSettings::new(1, Variant::Standard);
        settings.salary_cap = Some(0);
        let err = settings.resolve(&OptimizerOptions::default()).unwrap_err();
        assert_eq!(field_of(err), "salary_cap");
    }

    #[test]
    fn rejects_zero_limits() {
        let mut settings = OptimizationSettings::new(1, Variant::Standard);
        settings.max_players_per_game = Some(0);
        let err = settings.resolve(&OptimizerOptions::default()).unwrap_err();
        assert_eq!(field_of(err), "max_players_per_game");
    }

    #[test]
    fn rejects_game_on_standard_variant() {
        let mut settings = OptimizationSettings::new(1, Variant::Standard);
        settings.game = Some("BUF@KC".into());
        let err = settings.resolve(&OptimizerOptions::default()).unwrap_err();
        assert_eq!(field_of(err), "game");
    }

    #[test]
    fn strategy_relaxes_toward_cash() {
        assert_eq!(Strategy::Tournament.relaxed(), Some(Strategy::Balanced));
        assert_eq!(Strategy::Balanced.relaxed(), Some(Strategy::Cash));
        assert_eq!(Strategy::Cash.relaxed(), None);
        assert!(Strategy::Tournament.min_difference() > Strategy::Cash.min_difference());
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: OptimizationSettings = serde_json::from_str(r#"{"lineup_count": 2}"#).unwrap();
        assert_eq!(settings, OptimizationSettings::new(2, Variant::Standard));

        let settings: OptimizationSettings =
            serde_json::from_str(r#"{"lineup_count": 1, "strategy": "tournament", "variant": "captain", "game": "BUF@KC"}"#)
                .unwrap();
        assert_eq!(settings.strategy, Strategy::Tournament);
        assert_eq!(settings.variant, Variant::Captain);
        assert_eq!(settings.game.as_deref(), Some("BUF@KC"));
    }
}
