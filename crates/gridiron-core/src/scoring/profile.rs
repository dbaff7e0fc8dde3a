// Weight profiles: per-factor coefficients plus auxiliary scoring toggles.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ScoringError;

// ---------------------------------------------------------------------------
// Factor weights
// ---------------------------------------------------------------------------

/// Contribution share for each scoring factor.
///
/// The engine does not require the coefficients to sum to 1, but profiles
/// conventionally do so that `smart_score` lands in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub projection: f64,
    pub value: f64,
    pub matchup: f64,
    pub market: f64,
    pub trend: f64,
    pub consistency: f64,
    pub ownership: f64,
}

impl FactorWeights {
    /// Number of scoring factors.
    pub const LEN: usize = 7;

    /// Coefficients in fixed factor order, paired with their names.
    pub fn named(&self) -> [(&'static str, f64); Self::LEN] {
        [
            ("projection", self.projection),
            ("value", self.value),
            ("matchup", self.matchup),
            ("market", self.market),
            ("trend", self.trend),
            ("consistency", self.consistency),
            ("ownership", self.ownership),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.named().iter().map(|(_, w)| w).sum()
    }
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            projection: 0.35,
            value: 0.20,
            matchup: 0.15,
            market: 0.15,
            trend: 0.05,
            consistency: 0.05,
            ownership: 0.05,
        }
    }
}

// ---------------------------------------------------------------------------
// Score config
// ---------------------------------------------------------------------------

/// Which projection figure feeds the projection and value factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionSource {
    #[default]
    Base,
    Floor,
    Ceiling,
    /// Mean of floor and ceiling.
    Midpoint,
}

impl ProjectionSource {
    fn tag(&self) -> u64 {
        match self {
            ProjectionSource::Base => 0,
            ProjectionSource::Floor => 1,
            ProjectionSource::Ceiling => 2,
            ProjectionSource::Midpoint => 3,
        }
    }
}

impl fmt::Display for ProjectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectionSource::Base => "base",
            ProjectionSource::Floor => "floor",
            ProjectionSource::Ceiling => "ceiling",
            ProjectionSource::Midpoint => "midpoint",
        };
        f.write_str(s)
    }
}

/// Conditional blend: when a player's relative floor/ceiling spread reaches
/// `spread_threshold`, mix `alternate_weight` of the alternate projection into
/// the primary one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendRule {
    /// Relative spread `(ceiling - floor) / primary` that activates the blend.
    pub spread_threshold: f64,
    pub alternate: ProjectionSource,
    /// Share of the alternate projection, in `0..=1`.
    pub alternate_weight: f64,
}

/// Feature toggles applied before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreConfig {
    #[serde(default)]
    pub projection_source: ProjectionSource,
    #[serde(default)]
    pub blend: Option<BlendRule>,
}

// ---------------------------------------------------------------------------
// Weight profile
// ---------------------------------------------------------------------------

/// A named, reusable scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightProfile {
    pub name: String,
    pub weights: FactorWeights,
    #[serde(default)]
    pub config: ScoreConfig,
    #[serde(default)]
    pub is_default: bool,
}

impl WeightProfile {
    pub fn new(name: impl Into<String>, weights: FactorWeights, config: ScoreConfig) -> Self {
        Self {
            name: name.into(),
            weights,
            config,
            is_default: false,
        }
    }

    /// Identity of the scoring behavior, independent of name and storage.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.weights, &self.config)
    }

    /// Reject coefficients and thresholds the engine cannot interpret.
    pub fn validate(&self) -> Result<(), ScoringError> {
        for (name, w) in self.weights.named() {
            if !w.is_finite() || w < 0.0 {
                return Err(ScoringError::InvalidProfile {
                    field: format!("weights.{name}"),
                    message: format!("must be a finite non-negative number, got {w}"),
                });
            }
        }
        if let Some(blend) = &self.config.blend {
            if !blend.spread_threshold.is_finite() || blend.spread_threshold < 0.0 {
                return Err(ScoringError::InvalidProfile {
                    field: "config.blend.spread_threshold".into(),
                    message: format!("must be >= 0, got {}", blend.spread_threshold),
                });
            }
            if !(0.0..=1.0).contains(&blend.alternate_weight) {
                return Err(ScoringError::InvalidProfile {
                    field: "config.blend.alternate_weight".into(),
                    message: format!(
                        "must be between 0.0 and 1.0 inclusive, got {}",
                        blend.alternate_weight
                    ),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable 64-bit FNV-1a hash of a profile's coefficients and config.
///
/// Two profiles with identical weights and config share a fingerprint (and
/// therefore cache entries) regardless of their names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn of(weights: &FactorWeights, config: &ScoreConfig) -> Self {
        let mut hash = FNV_OFFSET;
        let mut feed = |word: u64| {
            for byte in word.to_le_bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        };

        for (_, w) in weights.named() {
            // Normalize -0.0 so it hashes like 0.0.
            feed((w + 0.0).to_bits());
        }
        feed(config.projection_source.tag());
        match &config.blend {
            None => feed(0),
            Some(blend) => {
                feed(1);
                feed((blend.spread_threshold + 0.0).to_bits());
                feed(blend.alternate.tag());
                feed((blend.alternate_weight + 0.0).to_bits());
            }
        }
        Fingerprint(hash)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        u64::from_str_radix(&s, 16)
            .map(Fingerprint)
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn blend() -> BlendRule {
        BlendRule {
            spread_threshold: 0.8,
            alternate: ProjectionSource::Ceiling,
            alternate_weight: 0.4,
        }
    }

    #[test]
    fn default_weights_sum_to_one() {
        assert!((FactorWeights::default().sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fingerprint_ignores_name_and_default_flag() {
        let a = WeightProfile::new("alpha", FactorWeights::default(), ScoreConfig::default());
        let mut b = WeightProfile::new("beta", FactorWeights::default(), ScoreConfig::default());
        b.is_default = true;
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_any_weight() {
        let base = WeightProfile::new("p", FactorWeights::default(), ScoreConfig::default());
        let mut tweaked = base.clone();
        tweaked.weights.ownership += 0.01;
        assert_ne!(base.fingerprint(), tweaked.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_config() {
        let base = WeightProfile::new("p", FactorWeights::default(), ScoreConfig::default());
        let ceiling = WeightProfile::new(
            "p",
            FactorWeights::default(),
            ScoreConfig {
                projection_source: ProjectionSource::Ceiling,
                blend: None,
            },
        );
        let blended = WeightProfile::new(
            "p",
            FactorWeights::default(),
            ScoreConfig {
                projection_source: ProjectionSource::Base,
                blend: Some(blend()),
            },
        );
        assert_ne!(base.fingerprint(), ceiling.fingerprint());
        assert_ne!(base.fingerprint(), blended.fingerprint());
        assert_ne!(ceiling.fingerprint(), blended.fingerprint());
    }

    #[test]
    fn fingerprint_treats_negative_zero_as_zero() {
        let mut a = FactorWeights::default();
        a.trend = 0.0;
        let mut b = a;
        b.trend = -0.0;
        let config = ScoreConfig::default();
        assert_eq!(Fingerprint::of(&a, &config), Fingerprint::of(&b, &config));
    }

    #[test]
    fn fingerprint_serializes_as_hex() {
        let fp = Fingerprint(0xdead_beef);
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, "\"00000000deadbeef\"");
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn validate_rejects_negative_weight() {
        let mut p = WeightProfile::new("p", FactorWeights::default(), ScoreConfig::default());
        p.weights.market = -0.1;
        let err = p.validate().unwrap_err();
        assert!(matches!(err, ScoringError::InvalidProfile { ref field, .. } if field == "weights.market"));
    }

    #[test]
    fn validate_rejects_nan_weight() {
        let mut p = WeightProfile::new("p", FactorWeights::default(), ScoreConfig::default());
        p.weights.value = f64::NAN;
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_blend_weight() {
        let mut rule = blend();
        rule.alternate_weight = 1.5;
        let p = WeightProfile::new(
            "p",
            FactorWeights::default(),
            ScoreConfig {
                projection_source: ProjectionSource::Base,
                blend: Some(rule),
            },
        );
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_accepts_weights_not_summing_to_one() {
        let weights = FactorWeights {
            projection: 2.0,
            value: 0.0,
            matchup: 0.0,
            market: 0.0,
            trend: 0.0,
            consistency: 0.0,
            ownership: 0.0,
        };
        let p = WeightProfile::new("p", weights, ScoreConfig::default());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn score_config_deserializes_with_defaults() {
        let config: ScoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ScoreConfig::default());

        let config: ScoreConfig = serde_json::from_str(
            r#"{"projection_source":"midpoint","blend":{"spread_threshold":1.0,"alternate":"ceiling","alternate_weight":0.5}}"#,
        )
        .unwrap();
        assert_eq!(config.projection_source, ProjectionSource::Midpoint);
        assert_eq!(config.blend.unwrap().alternate, ProjectionSource::Ceiling);
    }
}
