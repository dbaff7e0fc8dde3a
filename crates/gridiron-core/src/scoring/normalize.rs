// Signal normalization: every factor maps into `[0, 1]`, missing => 0.5.

use crate::slate::player::Signals;

use super::profile::{ProjectionSource, ScoreConfig};

/// Normalized value used for any missing or unusable signal.
pub const NEUTRAL: f64 = 0.5;

/// Threshold below which standard deviation is treated as zero.
const STDEV_EPSILON: f64 = 1e-9;

/// Z-scores at or beyond this magnitude saturate to 0 or 1.
const Z_SATURATION: f64 = 3.0;

/// Usage-trend change that maps to roughly 0.88 (tanh(1)).
const TREND_SCALE: f64 = 0.25;

/// Worst and best opponent ranks.
const RANK_MIN: f64 = 1.0;
const RANK_MAX: f64 = 32.0;

// ---------------------------------------------------------------------------
// Pool statistics
// ---------------------------------------------------------------------------

/// Mean and standard deviation for a single signal across a player pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolStats {
    pub mean: f64,
    pub stdev: f64,
}

/// Compute population mean and standard deviation for a slice of values.
///
/// Returns `PoolStats { mean: 0.0, stdev: 0.0 }` for an empty slice.
pub fn compute_pool_stats(values: &[f64]) -> PoolStats {
    if values.is_empty() {
        return PoolStats {
            mean: 0.0,
            stdev: 0.0,
        };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    PoolStats {
        mean,
        stdev: variance.sqrt(),
    }
}

/// Compute a z-score given a value and pool stats.
///
/// Returns 0.0 if the standard deviation is approximately zero.
pub fn compute_zscore(value: f64, stats: &PoolStats) -> f64 {
    if stats.stdev < STDEV_EPSILON {
        return 0.0;
    }
    (value - stats.mean) / stats.stdev
}

/// Map a z-score into `[0, 1]`, centered on 0.5.
pub fn zscore_to_unit(z: f64) -> f64 {
    (NEUTRAL + z / (2.0 * Z_SATURATION)).clamp(0.0, 1.0)
}

/// Pool-relative unit score for an optional value. Missing => neutral.
pub fn pool_unit(value: Option<f64>, stats: &PoolStats) -> f64 {
    match value.filter(|v| v.is_finite()) {
        Some(v) => zscore_to_unit(compute_zscore(v, stats)),
        None => NEUTRAL,
    }
}

// ---------------------------------------------------------------------------
// Projection resolution
// ---------------------------------------------------------------------------

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Read one projection figure from the signals.
///
/// `Floor`, `Ceiling`, and `Midpoint` fall back to the base projection when
/// the requested figure is missing.
pub fn projection_figure(signals: &Signals, source: ProjectionSource) -> Option<f64> {
    let base = finite(signals.projection);
    let floor = finite(signals.floor);
    let ceiling = finite(signals.ceiling);
    match source {
        ProjectionSource::Base => base,
        ProjectionSource::Floor => floor.or(base),
        ProjectionSource::Ceiling => ceiling.or(base),
        ProjectionSource::Midpoint => match (floor, ceiling) {
            (Some(f), Some(c)) => Some((f + c) / 2.0),
            _ => base,
        },
    }
}

/// Relative floor/ceiling spread against the primary projection.
///
/// `None` when either bound is missing or the primary projection is not
/// positive.
pub fn relative_spread(signals: &Signals, primary: f64) -> Option<f64> {
    let floor = finite(signals.floor)?;
    let ceiling = finite(signals.ceiling)?;
    if primary <= STDEV_EPSILON {
        return None;
    }
    Some((ceiling - floor).abs() / primary)
}

/// Resolve the projection that feeds the projection and value factors.
///
/// Applies `projection_source`, then the conditional blend when the spread
/// reaches its threshold. Returns `None` when no projection figure exists.
pub fn resolve_projection(signals: &Signals, config: &ScoreConfig) -> Option<f64> {
    let primary = projection_figure(signals, config.projection_source)?;
    let Some(blend) = &config.blend else {
        return Some(primary);
    };
    match relative_spread(signals, primary) {
        Some(spread) if spread >= blend.spread_threshold => {
            let alternate = projection_figure(signals, blend.alternate).unwrap_or(primary);
            Some((1.0 - blend.alternate_weight) * primary + blend.alternate_weight * alternate)
        }
        _ => Some(primary),
    }
}

/// Projected points per $1,000 of salary. `None` for invalid salary or a
/// missing projection.
pub fn points_per_kilo(projection: Option<f64>, salary: i64) -> Option<f64> {
    if salary <= 0 {
        return None;
    }
    projection.map(|p| p / (salary as f64 / 1000.0))
}

// ---------------------------------------------------------------------------
// Absolute-scale factors
// ---------------------------------------------------------------------------

/// Opponent rank 1..=32 mapped linearly; higher rank is a softer matchup.
pub fn matchup_unit(opponent_rank: Option<f64>) -> f64 {
    match finite(opponent_rank) {
        Some(rank) => ((rank.clamp(RANK_MIN, RANK_MAX) - RANK_MIN) / (RANK_MAX - RANK_MIN)).clamp(0.0, 1.0),
        None => NEUTRAL,
    }
}

/// Rising usage pushes toward 1, falling usage toward 0.
pub fn trend_unit(usage_trend: Option<f64>) -> f64 {
    match finite(usage_trend) {
        Some(t) => NEUTRAL + NEUTRAL * (t / TREND_SCALE).tanh(),
        None => NEUTRAL,
    }
}

/// Lower week-to-week variation scores higher: `1 / (1 + cv)`.
pub fn consistency_unit(coefficient_of_variation: Option<f64>) -> f64 {
    match finite(coefficient_of_variation) {
        Some(cv) => 1.0 / (1.0 + cv.max(0.0)),
        None => NEUTRAL,
    }
}

/// Lower projected ownership scores higher.
pub fn ownership_unit(ownership_pct: Option<f64>) -> f64 {
    match finite(ownership_pct) {
        Some(own) => 1.0 - own.clamp(0.0, 100.0) / 100.0,
        None => NEUTRAL,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
