// Scoring pipeline and the cached engine in front of it.
//
// Per player: normalize each signal into [0, 1] (missing => neutral),
// resolve and conditionally blend the projection, apply the profile weights,
// sum, scale to 0..100, clamp non-negative.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::slate::player::{Player, Variant};
use crate::store::SignalStore;

use super::cache::{CacheKey, CacheStats, ScoreCache};
use super::normalize::{
    compute_pool_stats, consistency_unit, matchup_unit, ownership_unit, points_per_kilo, pool_unit,
    resolve_projection, trend_unit, PoolStats,
};
use super::profile::{Fingerprint, WeightProfile};
use super::{ScoredPlayer, ScoringError};

/// Weighted unit sums are scaled by this so scores read like 0..100.
const SCORE_SCALE: f64 = 100.0;

// ---------------------------------------------------------------------------
// Per-factor breakdown
// ---------------------------------------------------------------------------

/// Normalized factor values for one player, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorUnits {
    pub projection: f64,
    pub value: f64,
    pub matchup: f64,
    pub market: f64,
    pub trend: f64,
    pub consistency: f64,
    pub ownership: f64,
}

impl FactorUnits {
    fn weighted_sum(&self, profile: &WeightProfile) -> f64 {
        let w = &profile.weights;
        self.projection * w.projection
            + self.value * w.value
            + self.matchup * w.matchup
            + self.market * w.market
            + self.trend * w.trend
            + self.consistency * w.consistency
            + self.ownership * w.ownership
    }
}

/// Pool statistics for the pool-relative factors.
#[derive(Debug, Clone, Copy)]
struct SlatePoolStats {
    projection: PoolStats,
    value: PoolStats,
    market: PoolStats,
}

fn compute_slate_stats(players: &[Player], projections: &[Option<f64>]) -> SlatePoolStats {
    let mut proj_vals = Vec::with_capacity(players.len());
    let mut value_vals = Vec::with_capacity(players.len());
    let mut market_vals = Vec::with_capacity(players.len());

    for (player, projection) in players.iter().zip(projections) {
        // Structurally invalid players stay out of the pool statistics.
        if !player.has_valid_salary() {
            continue;
        }
        if let Some(p) = projection {
            proj_vals.push(*p);
        }
        if let Some(v) = points_per_kilo(*projection, player.salary) {
            value_vals.push(v);
        }
        if let Some(m) = player.signals.implied_total.filter(|m| m.is_finite()) {
            market_vals.push(m);
        }
    }

    SlatePoolStats {
        projection: compute_pool_stats(&proj_vals),
        value: compute_pool_stats(&value_vals),
        market: compute_pool_stats(&market_vals),
    }
}

fn factor_units(player: &Player, projection: Option<f64>, stats: &SlatePoolStats) -> FactorUnits {
    let s = &player.signals;
    FactorUnits {
        projection: pool_unit(projection, &stats.projection),
        value: pool_unit(points_per_kilo(projection, player.salary), &stats.value),
        matchup: matchup_unit(s.opponent_rank),
        market: pool_unit(s.implied_total, &stats.market),
        trend: trend_unit(s.usage_trend),
        consistency: consistency_unit(s.consistency),
        ownership: ownership_unit(s.ownership),
    }
}

/// Clamp to a finite, non-negative score.
fn clamp_score(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.max(0.0)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Uncached pipeline
// ---------------------------------------------------------------------------

/// Score every player in `players` under `profile`.
///
/// Never fails and never drops a player: missing signals contribute the
/// neutral midpoint, and a player with a non-positive salary is returned with
/// a score of zero. The result is sorted by descending score, ties broken by
/// player id, so identical inputs always yield identical output.
pub fn score_players(players: &[Player], profile: &WeightProfile) -> Vec<ScoredPlayer> {
    let fingerprint = profile.fingerprint();
    let projections: Vec<Option<f64>> = players
        .iter()
        .map(|p| resolve_projection(&p.signals, &profile.config))
        .collect();
    let stats = compute_slate_stats(players, &projections);

    let mut scored: Vec<ScoredPlayer> = players
        .iter()
        .zip(&projections)
        .map(|(player, projection)| {
            let smart_score = if player.has_valid_salary() {
                let units = factor_units(player, *projection, &stats);
                clamp_score(units.weighted_sum(profile) * SCORE_SCALE)
            } else {
                debug!(player = %player.id, salary = player.salary, "non-positive salary, scoring as zero");
                0.0
            };
            ScoredPlayer {
                player: player.clone(),
                smart_score,
                fingerprint,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.smart_score
            .partial_cmp(&a.smart_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.player.id.cmp(&b.player.id))
    });
    scored
}

// ---------------------------------------------------------------------------
// Cached engine
// ---------------------------------------------------------------------------

/// Result of one scoring call.
#[derive(Debug, Clone)]
pub struct ScoreRun {
    pub players: Arc<Vec<ScoredPlayer>>,
    pub fingerprint: Fingerprint,
    /// Whether the result was served from the cache.
    pub cached: bool,
    pub duration: Duration,
}

/// Scores slates from a [`SignalStore`], caching by (week, variant,
/// profile fingerprint).
pub struct ScoringEngine {
    signals: Arc<dyn SignalStore>,
    cache: ScoreCache,
    allow_empty_pool: bool,
}

impl ScoringEngine {
    pub fn new(signals: Arc<dyn SignalStore>, allow_empty_pool: bool) -> Self {
        Self {
            signals,
            cache: ScoreCache::new(),
            allow_empty_pool,
        }
    }

    /// Score the week's slate under `profile`.
    ///
    /// Players are fetched fresh from the signal store on a cache miss.
    /// Errors only for an invalid profile, an unknown week/variant, or an
    /// empty slate when empty slates are not permitted.
    pub fn score(&self, week: u32, variant: Variant, profile: &WeightProfile) -> Result<ScoreRun, ScoringError> {
        profile.validate()?;

        let start = Instant::now();
        let fingerprint = profile.fingerprint();
        let key = CacheKey {
            week,
            variant,
            fingerprint,
        };

        let (players, cached) = self.cache.get_or_compute(key, || {
            let players = self
                .signals
                .load_players(week, variant)
                .ok_or(ScoringError::UnknownWeek { week, variant })?;
            if players.is_empty() && !self.allow_empty_pool {
                return Err(ScoringError::EmptyPool { week, variant });
            }
            Ok(score_players(&players, profile))
        })?;

        let duration = start.elapsed();
        info!(
            "Scored week {} ({}) with profile '{}' [{}]: {} players in {:?}{}",
            week,
            variant,
            profile.name,
            fingerprint,
            players.len(),
            duration,
            if cached { " (cached)" } else { "" }
        );

        Ok(ScoreRun {
            players,
            fingerprint,
            cached,
            duration,
        })
    }

    /// Drop cached results for one week. Returns the number of entries removed.
    pub fn invalidate_week(&self, week: u32) -> usize {
        let removed = self.cache.invalidate_week(week);
        info!("Invalidated {} cached score sets for week {}", removed, week);
        removed
    }

    /// Drop every cached result. Returns the number of entries removed.
    pub fn invalidate_all(&self) -> usize {
        let removed = self.cache.invalidate_all();
        info!("Invalidated all {} cached score sets", removed);
        removed
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::profile::{BlendRule, FactorWeights, ProjectionSource, ScoreConfig};
    use crate::slate::player::{Position, Signals};
    use crate::store::MemorySignalStore;

    // ---- Helpers ----

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn profile() -> WeightProfile {
        WeightProfile::new("test", FactorWeights::default(), ScoreConfig::default())
    }

    fn only_projection() -> WeightProfile {
        WeightProfile::new(
            "projection-only",
            FactorWeights {
                projection: 1.0,
                value: 0.0,
                matchup: 0.0,
                market: 0.0,
                trend: 0.0,
                consistency: 0.0,
                ownership: 0.0,
            },
            ScoreConfig::default(),
        )
    }

    fn make_player(id: &str, position: Position, salary: i64, projection: Option<f64>) -> Player {
        Player {
            id: id.into(),
            name: format!("Player {id}"),
            team: "KC".into(),
            opponent: Some("BUF".into()),
            game: None,
            position,
            salary,
            variant: Variant::Standard,
            signals: Signals {
                projection,
                floor: projection.map(|p| p * 0.7),
                ceiling: projection.map(|p| p * 1.4),
                ownership: Some(12.0),
                opponent_rank: Some(16.0),
                implied_total: Some(24.0),
                usage_trend: Some(0.02),
                consistency: Some(0.4),
            },
        }
    }

    fn sample_pool() -> Vec<Player> {
        vec![
            make_player("qb", Position::QB, 8000, Some(24.0)),
            make_player("rb", Position::RB, 7000, Some(19.0)),
            make_player("wr", Position::WR, 6500, Some(16.0)),
            make_player("te", Position::TE, 4500, Some(9.0)),
            make_player("dst", Position::DST, 3000, Some(7.0)),
        ]
    }

    fn engine_with(week: u32, players: Vec<Player>) -> (ScoringEngine, Arc<MemorySignalStore>) {
        let store = Arc::new(MemorySignalStore::new());
        store.insert_slate(week, Variant::Standard, players);
        let engine = ScoringEngine::new(store.clone(), false);
        (engine, store)
    }

    // ---- Pipeline ----

    #[test]
    fn higher_projection_scores_higher_under_projection_weight() {
        let scored = score_players(&sample_pool(), &only_projection());
        let ids: Vec<&str> = scored.iter().map(|s| s.player.id.as_str()).collect();
        assert_eq!(ids, vec!["qb", "rb", "wr", "te", "dst"]);
    }

    #[test]
    fn all_missing_signals_score_neutral_midpoint() {
        let bare = Player {
            signals: Signals::default(),
            ..make_player("bare", Position::WR, 5000, None)
        };
        let scored = score_players(&[bare], &profile());
        assert_eq!(scored.len(), 1);
        // Every factor neutral (0.5) and weights summing to 1 => 50.
        assert!(approx_eq(scored[0].smart_score, 50.0, 1e-9));
    }

    #[test]
    fn missing_signals_yield_finite_non_negative_scores() {
        let mut pool = sample_pool();
        pool.push(Player {
            signals: Signals {
                projection: Some(f64::NAN),
                ownership: Some(f64::INFINITY),
                ..Signals::default()
            },
            ..make_player("weird", Position::RB, 4000, None)
        });
        for s in score_players(&pool, &profile()) {
            assert!(s.smart_score.is_finite());
            assert!(s.smart_score >= 0.0);
        }
    }

    #[test]
    fn non_positive_salary_scores_zero_but_is_kept() {
        let mut pool = sample_pool();
        pool.push(make_player("free", Position::WR, 0, Some(30.0)));
        pool.push(make_player("negative", Position::RB, -100, Some(30.0)));

        let scored = score_players(&pool, &profile());
        assert_eq!(scored.len(), pool.len());
        for id in ["free", "negative"] {
            let s = scored.iter().find(|s| s.player.id == id).unwrap();
            assert_eq!(s.smart_score, 0.0);
        }
    }

    #[test]
    fn invalid_salary_players_do_not_shift_pool_stats() {
        let clean = score_players(&sample_pool(), &profile());
        let mut noisy_pool = sample_pool();
        noisy_pool.push(make_player("free", Position::WR, 0, Some(300.0)));
        let noisy = score_players(&noisy_pool, &profile());

        for s in &clean {
            let other = noisy.iter().find(|n| n.player.id == s.player.id).unwrap();
            assert!(approx_eq(s.smart_score, other.smart_score, 1e-12));
        }
    }

    #[test]
    fn scores_are_clamped_non_negative() {
        // With only ownership weighted and 100% ownership, the unit is 0.
        let weights = FactorWeights {
            projection: 0.0,
            value: 0.0,
            matchup: 0.0,
            market: 0.0,
            trend: 0.0,
            consistency: 0.0,
            ownership: 1.0,
        };
        let p = WeightProfile::new("own", weights, ScoreConfig::default());
        let chalk = Player {
            signals: Signals {
                ownership: Some(100.0),
                ..Signals::default()
            },
            ..make_player("chalk", Position::QB, 7000, Some(20.0))
        };
        let scored = score_players(&[chalk], &p);
        assert_eq!(scored[0].smart_score, 0.0);
    }

    #[test]
    fn blend_changes_scores_only_for_volatile_players() {
        let steady = make_player("steady", Position::WR, 6000, Some(15.0));
        let mut volatile = make_player("volatile", Position::WR, 6000, Some(15.0));
        volatile.signals.floor = Some(3.0);
        volatile.signals.ceiling = Some(40.0);
        let pool = vec![steady, volatile, make_player("anchor", Position::WR, 6000, Some(10.0))];

        let plain = score_players(&pool, &only_projection());
        let mut blended_profile = only_projection();
        blended_profile.config = ScoreConfig {
            projection_source: ProjectionSource::Base,
            blend: Some(BlendRule {
                spread_threshold: 1.5,
                alternate: ProjectionSource::Ceiling,
                alternate_weight: 0.5,
            }),
        };
        let blended = score_players(&pool, &blended_profile);

        let score_of = |v: &[ScoredPlayer], id: &str| v.iter().find(|s| s.player.id == id).unwrap().smart_score;
        assert!(approx_eq(score_of(&plain, "steady"), score_of(&plain, "volatile"), 1e-12));
        assert!(score_of(&blended, "volatile") > score_of(&blended, "steady"));
    }

    #[test]
    fn scoring_is_deterministic() {
        let a = score_players(&sample_pool(), &profile());
        let b = score_players(&sample_pool(), &profile());
        assert_eq!(a, b);
    }

    #[test]
    fn output_ties_break_by_id() {
        let pool = vec![
            make_player("b", Position::WR, 5000, Some(10.0)),
            make_player("a", Position::WR, 5000, Some(10.0)),
        ];
        let scored = score_players(&pool, &profile());
        assert_eq!(scored[0].player.id, "a");
        assert_eq!(scored[1].player.id, "b");
    }

    #[test]
    fn every_scored_player_carries_the_fingerprint() {
        let p = profile();
        for s in score_players(&sample_pool(), &p) {
            assert_eq!(s.fingerprint, p.fingerprint());
        }
    }

    // ---- Engine + cache ----

    #[test]
    fn engine_caches_by_fingerprint_not_name() {
        let (engine, _store) = engine_with(5, sample_pool());
        let first = engine.score(5, Variant::Standard, &profile()).unwrap();
        assert!(!first.cached);

        let mut renamed = profile();
        renamed.name = "renamed".into();
        let second = engine.score(5, Variant::Standard, &renamed).unwrap();
        assert!(second.cached);
        assert_eq!(first.players, second.players);
        assert_eq!(engine.cache_stats().computations, 1);
    }

    #[test]
    fn engine_hit_and_miss_agree() {
        let (engine, _store) = engine_with(5, sample_pool());
        let miss = engine.score(5, Variant::Standard, &profile()).unwrap();
        let hit = engine.score(5, Variant::Standard, &profile()).unwrap();
        assert!(hit.cached);
        assert_eq!(*miss.players, *hit.players);
        assert_eq!(*miss.players, score_players(&sample_pool(), &profile()));
    }

    #[test]
    fn invalidation_reflects_new_signals() {
        let (engine, store) = engine_with(5, sample_pool());
        let before = engine.score(5, Variant::Standard, &only_projection()).unwrap();
        assert_eq!(before.players[0].player.id, "qb");

        // New signals land: the DST is now projected far above everyone.
        let mut updated = sample_pool();
        updated[4].signals.projection = Some(60.0);
        store.insert_slate(5, Variant::Standard, updated);

        // Still cached until invalidated.
        let stale = engine.score(5, Variant::Standard, &only_projection()).unwrap();
        assert!(stale.cached);
        assert_eq!(stale.players[0].player.id, "qb");

        assert_eq!(engine.invalidate_week(5), 1);
        let fresh = engine.score(5, Variant::Standard, &only_projection()).unwrap();
        assert!(!fresh.cached);
        assert_eq!(fresh.players[0].player.id, "dst");
    }

    #[test]
    fn invalidate_all_forces_recompute() {
        let (engine, _store) = engine_with(5, sample_pool());
        engine.score(5, Variant::Standard, &profile()).unwrap();
        engine.invalidate_all();
        let run = engine.score(5, Variant::Standard, &profile()).unwrap();
        assert!(!run.cached);
        assert_eq!(engine.cache_stats().computations, 2);
    }

    #[test]
    fn unknown_week_is_an_error() {
        let (engine, _store) = engine_with(5, sample_pool());
        let err = engine.score(6, Variant::Standard, &profile()).unwrap_err();
        assert_eq!(
            err,
            ScoringError::UnknownWeek {
                week: 6,
                variant: Variant::Standard
            }
        );
        let err = engine.score(5, Variant::Captain, &profile()).unwrap_err();
        assert!(matches!(err, ScoringError::UnknownWeek { .. }));
    }

    #[test]
    fn empty_pool_rejected_unless_permitted() {
        let (engine, store) = engine_with(5, Vec::new());
        let err = engine.score(5, Variant::Standard, &profile()).unwrap_err();
        assert!(matches!(err, ScoringError::EmptyPool { .. }));

        let permissive = ScoringEngine::new(store, true);
        let run = permissive.score(5, Variant::Standard, &profile()).unwrap();
        assert!(run.players.is_empty());
    }

    #[test]
    fn invalid_profile_rejected_before_scoring() {
        let (engine, _store) = engine_with(5, sample_pool());
        let mut bad = profile();
        bad.weights.trend = -1.0;
        assert!(matches!(
            engine.score(5, Variant::Standard, &bad),
            Err(ScoringError::InvalidProfile { .. })
        ));
        assert_eq!(engine.cache_stats().misses, 0);
    }
}
