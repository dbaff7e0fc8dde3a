// Assignment optimizer: scored players + settings -> ranked, distinct lineups.

pub mod diversity;
pub mod model;
pub mod settings;
pub mod slots;
pub mod solver;

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::scoring::ScoredPlayer;
use crate::slate::player::{Position, Variant};

use diversity::{generate_diverse, DiversityOutcome};
use model::LineupModel;
use solver::{Solution, SolveLimits, SolveStatus};

pub use settings::{OptimizationSettings, OptimizerOptions, ResolvedSettings, Strategy, VariantLimits};
pub use slots::{PositionCounts, Shortfall};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("invalid setting `{field}`: {message}")]
    InvalidSettings { field: String, message: String },

    /// A produced lineup broke a model constraint.
    #[error("internal optimizer error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One filled slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub label: String,
    pub player_id: String,
    pub name: String,
    pub team: String,
    pub game: String,
    pub position: Position,
    pub multiplier: f64,
    /// Salary with the multiplier applied.
    pub salary: f64,
    /// Score with the multiplier applied.
    pub score: f64,
}

/// A complete, constraint-valid lineup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Negative for the baseline, `1..` for ranked alternatives.
    pub selection_index: i32,
    pub variant: Variant,
    pub slots: Vec<SlotAssignment>,
    /// Captain variant: the player in the captain slot.
    pub captain: Option<String>,
    pub total_salary: f64,
    pub total_score: f64,
}

impl Selection {
    pub const BASELINE_INDEX: i32 = -1;

    pub fn is_baseline(&self) -> bool {
        self.selection_index < 0
    }

    pub fn player_ids(&self) -> BTreeSet<&str> {
        self.slots.iter().map(|s| s.player_id.as_str()).collect()
    }
}

/// Result of one `generate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Baseline first (when one was found), then ranked selections.
    pub selections: Vec<Selection>,
    pub requested: usize,
    /// Ranked selections produced.
    pub achieved: usize,
    pub position_counts: PositionCounts,
    pub shortfalls: Vec<Shortfall>,
    /// Human-readable suggestion when fewer lineups than requested came back.
    pub hint: Option<String>,
    /// Diversity rule in force at the end of the batch.
    pub strategy_used: Option<Strategy>,
    pub nodes: u64,
}

impl Generation {
    pub fn success(&self) -> bool {
        self.achieved > 0
    }

    pub fn ranked(&self) -> impl Iterator<Item = &Selection> {
        self.selections.iter().filter(|s| !s.is_baseline())
    }

    pub fn baseline(&self) -> Option<&Selection> {
        self.selections.iter().find(|s| s.is_baseline())
    }

    fn empty(requested: usize, position_counts: PositionCounts, shortfalls: Vec<Shortfall>, hint: String, nodes: u64) -> Self {
        Generation {
            selections: Vec::new(),
            requested,
            achieved: 0,
            position_counts,
            shortfalls,
            hint: Some(hint),
            strategy_used: None,
            nodes,
        }
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// Stateless lineup generator; independent calls share nothing mutable.
#[derive(Debug, Clone, Default)]
pub struct LineupOptimizer {
    options: OptimizerOptions,
}

impl LineupOptimizer {
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    /// Generate up to `settings.lineup_count` distinct lineups.
    ///
    /// Only invalid settings and internal faults are errors. An insufficient
    /// pool or an infeasible model comes back as an empty `Generation`
    /// carrying position counts and a hint; a short batch is a success.
    pub fn generate(&self, players: &[ScoredPlayer], settings: &OptimizationSettings) -> Result<Generation, OptimizerError> {
        let start = Instant::now();
        let resolved = settings.resolve(&self.options)?;

        let pool = prefilter(players, &resolved);
        let position_counts = PositionCounts::from_pool(&pool);
        let template = slots::template(resolved.variant, resolved.captain_multiplier);
        let listed = slots::relevant_positions(&template);

        let shortfalls = slots::precheck(&template, &pool, &position_counts, resolved.variant);
        if !shortfalls.is_empty() {
            let hint = slots::shortfall_hint(&position_counts, &listed, &shortfalls);
            info!("Lineup precheck failed for {} pool of {}: {}", resolved.variant, pool.len(), hint);
            return Ok(Generation::empty(resolved.lineup_count, position_counts, shortfalls, hint, 0));
        }

        let base = LineupModel::build(&pool, template, &resolved);
        let limits = SolveLimits {
            timeout: resolved.solve_timeout,
            node_limit: resolved.node_limit,
        };

        let deadline = start + resolved.request_timeout;
        let outcome = generate_diverse(&base, resolved.strategy, resolved.lineup_count, &limits, deadline).map_err(|violation| {
            error!("Solver produced an invalid lineup: {}", violation);
            OptimizerError::Internal(violation.to_string())
        })?;

        let generation = match outcome {
            DiversityOutcome::NoBaseline { status, nodes } => {
                let hint = no_lineup_hint(&status, &resolved, &position_counts, &listed);
                info!("No {} lineup found: {}", resolved.variant, hint);
                Generation::empty(resolved.lineup_count, position_counts, Vec::new(), hint, nodes)
            }
            DiversityOutcome::Found {
                baseline,
                ranked,
                rule,
                out_of_time,
                nodes,
            } => {
                let mut selections = Vec::with_capacity(ranked.len() + 1);
                selections.push(build_selection(&base, &pool, &baseline, Selection::BASELINE_INDEX, resolved.variant));
                for (i, solution) in ranked.iter().enumerate() {
                    selections.push(build_selection(&base, &pool, solution, i as i32 + 1, resolved.variant));
                }
                let achieved = ranked.len();
                let hint = (achieved < resolved.lineup_count).then(|| {
                    if out_of_time {
                        format!(
                            "request time budget of {}ms ran out after {} of {} lineups; request fewer lineups or narrow the pool",
                            resolved.request_timeout.as_millis(),
                            achieved,
                            resolved.lineup_count
                        )
                    } else {
                        format!(
                            "only {} of {} distinct lineups fit the constraints; widen the player pool or relax the team/game limits",
                            achieved, resolved.lineup_count
                        )
                    }
                });
                Generation {
                    selections,
                    requested: resolved.lineup_count,
                    achieved,
                    position_counts,
                    shortfalls: Vec::new(),
                    hint,
                    strategy_used: Some(rule),
                    nodes,
                }
            }
        };

        info!(
            "Generated {}/{} {} lineups ({}) from {} players in {:?}",
            generation.achieved,
            generation.requested,
            resolved.variant,
            resolved.strategy,
            pool.len(),
            start.elapsed()
        );
        Ok(generation)
    }
}

/// Apply the id subset, the score floor, the declared captain game, and drop
/// structurally invalid players: another variant's slate, a non-positive
/// salary, or a score that is negative or not finite. The first occurrence of
/// a duplicated id wins.
fn prefilter(players: &[ScoredPlayer], settings: &ResolvedSettings) -> Vec<ScoredPlayer> {
    let mut seen: HashSet<&str> = HashSet::new();
    players
        .iter()
        .filter(|sp| sp.player.variant == settings.variant)
        .filter(|sp| {
            settings
                .player_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&sp.player.id))
        })
        .filter(|sp| settings.min_score.map_or(true, |min| sp.smart_score >= min))
        .filter(|sp| {
            settings
                .game
                .as_deref()
                .map_or(true, |game| sp.player.game_key() == game)
        })
        .filter(|sp| sp.player.has_valid_salary() && sp.smart_score.is_finite() && sp.smart_score >= 0.0)
        .filter(|sp| seen.insert(sp.player.id.as_str()))
        .cloned()
        .collect()
}

fn no_lineup_hint(status: &SolveStatus, settings: &ResolvedSettings, counts: &PositionCounts, listed: &[Position]) -> String {
    match status {
        SolveStatus::TimedOut => format!(
            "solver hit its {}ms budget; narrow the pool with min_score or player_ids (available: {})",
            settings.solve_timeout.as_millis(),
            counts.describe(listed)
        ),
        _ => format!(
            "no lineup fits salary cap {} with at most {} per team and {} per game; raise the cap or relax the limits (available: {})",
            settings.salary_cap,
            settings.max_players_per_team,
            settings.max_players_per_game,
            counts.describe(listed)
        ),
    }
}

fn build_selection(model: &LineupModel, pool: &[ScoredPlayer], solution: &Solution, index: i32, variant: Variant) -> Selection {
    let slots: Vec<SlotAssignment> = solution
        .assignment
        .iter()
        .map(|&v| {
            let var = &model.vars[v];
            let slot = &model.slots[var.slot];
            let player = &pool[var.player].player;
            SlotAssignment {
                label: slot.label.clone(),
                player_id: player.id.clone(),
                name: player.name.clone(),
                team: player.team.clone(),
                game: player.game_key(),
                position: player.position,
                multiplier: slot.multiplier,
                salary: var.salary,
                score: var.objective,
            }
        })
        .collect();

    let captain = solution
        .assignment
        .iter()
        .find(|&&v| model.slots[model.vars[v].slot].is_captain)
        .map(|&v| pool[model.vars[v].player].player.id.clone());

    Selection {
        selection_index: index,
        variant,
        total_salary: slots.iter().map(|s| s.salary).sum(),
        total_score: slots.iter().map(|s| s.score).sum(),
        slots,
        captain,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
