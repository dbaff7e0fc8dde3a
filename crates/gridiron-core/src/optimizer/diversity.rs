// Multi-selection iteration: a baseline solve, then one solve per additional
// ranked selection with overlap rows against everything already accepted.

use std::time::Instant;

use tracing::{debug, warn};

use super::model::{LineupModel, Violation};
use super::settings::Strategy;
use super::solver::{solve, Solution, SolveLimits, SolveStatus};

#[derive(Debug, Clone)]
pub enum DiversityOutcome {
    Found {
        baseline: Solution,
        /// Ranked solutions; the first is the baseline solution itself.
        ranked: Vec<Solution>,
        /// Rule in force when the batch ended.
        rule: Strategy,
        /// The request deadline passed before `count` was reached.
        out_of_time: bool,
        nodes: u64,
    },
    /// The unconstrained solve produced nothing.
    NoBaseline { status: SolveStatus, nodes: u64 },
}

/// Pool indices of the players a solution uses.
pub fn players_of(model: &LineupModel, solution: &Solution) -> Vec<usize> {
    solution
        .assignment
        .iter()
        .map(|&v| model.vars[v].player)
        .collect()
}

/// Produce up to `count` ranked solutions from `base`.
///
/// Each new solution may share at most `slots - strategy.min_difference()`
/// players with every accepted one. When a solve fails the rule relaxes one
/// step toward `Cash` and the same iteration retries; a failure under `Cash`
/// ends the batch, since every further attempt would face the same model.
/// Every solution is checked against the exact model it was solved under.
///
/// `limits` bound each solve. `deadline` bounds the ranked iterations as a
/// whole: no iteration starts after it and none runs past it. The baseline
/// solve only answers to `limits`.
pub fn generate_diverse(
    base: &LineupModel,
    strategy: Strategy,
    count: usize,
    limits: &SolveLimits,
    deadline: Instant,
) -> Result<DiversityOutcome, Violation> {
    let report = solve(base, limits);
    let mut nodes = report.nodes;
    let baseline = match report.status {
        SolveStatus::Optimal(solution) => solution,
        status => return Ok(DiversityOutcome::NoBaseline { status, nodes }),
    };
    base.check(&baseline.assignment)?;
    debug!(objective = baseline.objective, "baseline solved");

    let slots = base.slot_count();
    let mut ranked = vec![baseline.clone()];
    let mut rule = strategy;
    let mut out_of_time = false;

    while ranked.len() < count {
        let now = Instant::now();
        if now >= deadline {
            warn!(
                "request time budget ran out, stopping at {} of {}",
                ranked.len(),
                count
            );
            out_of_time = true;
            break;
        }
        let iteration_limits = SolveLimits {
            timeout: limits.timeout.min(deadline - now),
            node_limit: limits.node_limit,
        };

        let max_overlap = slots.saturating_sub(rule.min_difference());
        let mut model = base.clone();
        for (i, accepted) in ranked.iter().enumerate() {
            model.add_overlap_limit(i + 1, &players_of(base, accepted), max_overlap);
        }

        let report = solve(&model, &iteration_limits);
        nodes += report.nodes;
        match report.status {
            SolveStatus::Optimal(solution) => {
                model.check(&solution.assignment)?;
                debug!(
                    index = ranked.len() + 1,
                    rule = %rule,
                    objective = solution.objective,
                    "ranked selection solved"
                );
                ranked.push(solution);
            }
            status => {
                let timed_out = status == SolveStatus::TimedOut;
                match rule.relaxed() {
                    Some(weaker) => {
                        warn!(
                            index = ranked.len() + 1,
                            timed_out,
                            "no selection under '{}' overlap rule, relaxing to '{}'",
                            rule,
                            weaker
                        );
                        rule = weaker;
                    }
                    None => {
                        warn!(
                            index = ranked.len() + 1,
                            timed_out,
                            "no further distinct selection, stopping at {} of {}",
                            ranked.len(),
                            count
                        );
                        break;
                    }
                }
            }
        }
    }

    Ok(DiversityOutcome::Found {
        baseline,
        ranked,
        rule,
        out_of_time,
        nodes,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
