// Exact depth-first branch-and-bound over a `LineupModel`.
//
// Slots are filled one at a time, most constrained first. Slot and player
// rows are enforced structurally; every other `<=` row is tracked
// incrementally and pruned with the smallest contribution the unfilled slots
// can still add. Interchangeable slots only take candidates in increasing
// rank order, so each player set is visited once per slot group.
//
// Two bounds cut the tree: the best unused candidate per remaining slot, and
// a Lagrangian relaxation of the salary row at a few fixed multipliers.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use tracing::debug;

use super::model::{LineupModel, RowKind, Sense, VarId, EPSILON};

/// Deadline checks are amortized over this many nodes.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

/// Salary multipliers tried, as fractions of the root score-per-salary ratio.
const LAGRANGE_SCALES: [f64; 4] = [0.5, 0.75, 1.0, 1.25];

#[derive(Debug, Clone, Copy)]
pub struct SolveLimits {
    pub timeout: Duration,
    pub node_limit: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// One variable per slot, in slot order.
    pub assignment: Vec<VarId>,
    pub objective: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveStatus {
    Optimal(Solution),
    Infeasible,
    /// Deadline or node budget exhausted before the search finished.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct SolveReport {
    pub status: SolveStatus,
    pub nodes: u64,
    pub elapsed: Duration,
}

/// Maximize the model objective subject to every row.
pub fn solve(model: &LineupModel, limits: &SolveLimits) -> SolveReport {
    let start = Instant::now();
    let mut search = Search::new(model, limits, start);
    if search.feasible_root() {
        search.descend(0);
    }

    let status = if search.aborted {
        SolveStatus::TimedOut
    } else {
        match search.best.take() {
            Some((order_assignment, objective)) => {
                let mut assignment = vec![0; model.slot_count()];
                for (depth, &v) in order_assignment.iter().enumerate() {
                    assignment[search.order[depth]] = v;
                }
                SolveStatus::Optimal(Solution { assignment, objective })
            }
            None => SolveStatus::Infeasible,
        }
    };

    let elapsed = start.elapsed();
    debug!(
        nodes = search.nodes,
        elapsed_ms = elapsed.as_millis() as u64,
        status = status_label(&status),
        "solve finished"
    );
    SolveReport {
        status,
        nodes: search.nodes,
        elapsed,
    }
}

fn status_label(status: &SolveStatus) -> &'static str {
    match status {
        SolveStatus::Optimal(_) => "optimal",
        SolveStatus::Infeasible => "infeasible",
        SolveStatus::TimedOut => "timed_out",
    }
}

// ---------------------------------------------------------------------------
// Search state
// ---------------------------------------------------------------------------

struct Search<'a> {
    model: &'a LineupModel,
    /// Slot index at each depth.
    order: Vec<usize>,
    /// Candidate variables at each depth, best objective first.
    candidates: Vec<Vec<VarId>>,
    /// Whether the slot at this depth is interchangeable with the previous depth.
    continues_group: Vec<bool>,
    /// Per variable: (tracked row, coefficient).
    var_rows: Vec<Vec<(usize, f64)>>,
    rhs: Vec<f64>,
    /// `min_rest[row][depth]`: least total the slots at `depth..` add to a row.
    min_rest: Vec<Vec<f64>>,
    activity: Vec<f64>,
    /// Tracked index of the salary row.
    salary_row: Option<usize>,
    lambdas: Vec<f64>,
    used: Vec<bool>,
    chosen: Vec<VarId>,
    chosen_rank: Vec<usize>,
    objective: f64,
    best: Option<(Vec<VarId>, f64)>,
    nodes: u64,
    node_limit: u64,
    deadline: Instant,
    aborted: bool,
}

impl<'a> Search<'a> {
    fn new(model: &'a LineupModel, limits: &SolveLimits, start: Instant) -> Self {
        let slot_count = model.slot_count();

        let mut order: Vec<usize> = (0..slot_count).collect();
        // Group id: first slot index interchangeable with this one.
        let group: Vec<usize> = (0..slot_count)
            .map(|s| {
                (0..=s)
                    .find(|&t| model.slots[t].interchangeable_with(&model.slots[s]))
                    .unwrap_or(s)
            })
            .collect();
        order.sort_by_key(|&s| (model.slot_vars[s].len(), group[s], s));

        let candidates: Vec<Vec<VarId>> = order
            .iter()
            .map(|&s| {
                let mut c = model.slot_vars[s].clone();
                c.sort_by(|&a, &b| {
                    let (va, vb) = (&model.vars[a], &model.vars[b]);
                    vb.objective
                        .partial_cmp(&va.objective)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| model.player_ids[va.player].cmp(&model.player_ids[vb.player]))
                });
                c
            })
            .collect();

        let continues_group: Vec<bool> = (0..slot_count)
            .map(|d| d > 0 && group[order[d]] == group[order[d - 1]])
            .collect();

        // Rows tracked numerically: every `<=` row except per-player rows,
        // which the `used` set already enforces.
        let tracked: Vec<usize> = model
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.sense == Sense::Le && !matches!(r.kind, RowKind::Player(_)))
            .map(|(i, _)| i)
            .collect();

        let mut var_rows = vec![Vec::new(); model.vars.len()];
        for (t, &r) in tracked.iter().enumerate() {
            for &(v, c) in &model.rows[r].terms {
                var_rows[v].push((t, c));
            }
        }
        let rhs: Vec<f64> = tracked.iter().map(|&r| model.rows[r].rhs).collect();
        let salary_row = tracked
            .iter()
            .position(|&r| model.rows[r].kind == RowKind::Salary);

        // Score per unit of salary across each slot's best candidate.
        let (top_objective, top_salary) = candidates
            .iter()
            .filter_map(|c| c.first())
            .fold((0.0, 0.0), |(o, s), &v| (o + model.vars[v].objective, s + model.vars[v].salary));
        let lambdas = if salary_row.is_some() && top_salary > 0.0 && top_objective > 0.0 {
            let ratio = top_objective / top_salary;
            LAGRANGE_SCALES.iter().map(|k| k * ratio).collect()
        } else {
            Vec::new()
        };

        let mut min_rest = vec![vec![0.0; slot_count + 1]; tracked.len()];
        for d in (0..slot_count).rev() {
            let cands = &candidates[d];
            let mut mins = vec![f64::INFINITY; tracked.len()];
            let mut hits = vec![0usize; tracked.len()];
            for &v in cands {
                for &(t, c) in &var_rows[v] {
                    mins[t] = mins[t].min(c);
                    hits[t] += 1;
                }
            }
            for t in 0..tracked.len() {
                // A candidate outside the row contributes zero.
                let least = if hits[t] < cands.len() { 0.0f64.min(mins[t]) } else { mins[t] };
                let least = if least.is_finite() { least } else { 0.0 };
                min_rest[t][d] = min_rest[t][d + 1] + least;
            }
        }

        Search {
            model,
            order,
            candidates,
            continues_group,
            var_rows,
            activity: vec![0.0; rhs.len()],
            rhs,
            min_rest,
            salary_row,
            lambdas,
            used: vec![false; model.player_ids.len()],
            chosen: Vec::with_capacity(slot_count),
            chosen_rank: Vec::with_capacity(slot_count),
            objective: 0.0,
            best: None,
            nodes: 0,
            node_limit: limits.node_limit,
            deadline: start + limits.timeout,
            aborted: false,
        }
    }

    /// Cheap infeasibility detection before searching.
    fn feasible_root(&self) -> bool {
        if self.candidates.iter().any(|c| c.is_empty()) {
            return false;
        }
        (0..self.rhs.len()).all(|t| self.min_rest[t][0] <= self.rhs[t] + EPSILON)
    }

    fn out_of_budget(&mut self) -> bool {
        if self.aborted {
            return true;
        }
        if self.nodes >= self.node_limit
            || (self.nodes % CLOCK_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline)
        {
            self.aborted = true;
        }
        self.aborted
    }

    /// Upper bound on what depths `from..` can add, given the current `used`
    /// set. `group_floor` is the first rank the slot at `from` may take when it
    /// continues a group.
    fn optimistic_rest(&self, from: usize, group_floor: usize) -> f64 {
        let mut total = 0.0;
        let mut depth = from;
        let mut rank = group_floor;
        while depth < self.order.len() {
            if depth > from && !self.continues_group[depth] {
                rank = 0;
            }
            let cands = &self.candidates[depth];
            while rank < cands.len() && self.used[self.model.vars[cands[rank]].player] {
                rank += 1;
            }
            match cands.get(rank) {
                Some(&v) => total += self.model.vars[v].objective,
                None => return f64::NEG_INFINITY,
            }
            rank += 1;
            depth += 1;
        }
        total
    }

    /// Lagrangian bound pieces for depths `from..`, one per multiplier:
    /// `objective + lambda * remaining_cap + sum(max(obj - lambda * salary))`.
    /// A candidate at `from - 1` adds `obj - lambda * salary` on top.
    fn lagrangian_bases(&self, from: usize) -> Vec<f64> {
        let Some(salary_row) = self.salary_row else {
            return Vec::new();
        };
        let remaining_cap = self.rhs[salary_row] - self.activity[salary_row];
        self.lambdas
            .iter()
            .map(|&lambda| {
                let mut total = self.objective + lambda * remaining_cap;
                for cands in &self.candidates[from.min(self.order.len())..] {
                    let best = cands
                        .iter()
                        .map(|&v| &self.model.vars[v])
                        .filter(|var| !self.used[var.player])
                        .map(|var| var.objective - lambda * var.salary)
                        .fold(f64::NEG_INFINITY, f64::max);
                    total += best;
                }
                total
            })
            .collect()
    }

    fn fits_rows(&self, var: VarId, depth: usize) -> bool {
        self.var_rows[var]
            .iter()
            .all(|&(t, c)| self.activity[t] + c + self.min_rest[t][depth + 1] <= self.rhs[t] + EPSILON)
    }

    fn descend(&mut self, depth: usize) {
        if depth == self.order.len() {
            let improves = match &self.best {
                Some((_, best)) => self.objective > best + EPSILON,
                None => true,
            };
            if improves {
                self.best = Some((self.chosen.clone(), self.objective));
            }
            return;
        }

        let first_rank = if self.continues_group[depth] {
            self.chosen_rank[depth - 1] + 1
        } else {
            0
        };

        let lagrangian = self.lagrangian_bases(depth + 1);

        for rank in first_rank..self.candidates[depth].len() {
            if self.out_of_budget() {
                return;
            }
            let var = self.candidates[depth][rank];
            let (player, gain) = {
                let v = &self.model.vars[var];
                (v.player, v.objective)
            };
            if self.used[player] {
                continue;
            }

            // Candidates are sorted, so once the bound fails it fails for
            // every later rank too.
            if let Some((_, best)) = &self.best {
                let rest_floor = if depth + 1 < self.order.len() && self.continues_group[depth + 1] {
                    rank + 1
                } else {
                    0
                };
                let bound = self.objective + gain + self.optimistic_rest(depth + 1, rest_floor);
                if bound <= best + EPSILON {
                    break;
                }

                let salary = self.model.vars[var].salary;
                let relaxed = self
                    .lambdas
                    .iter()
                    .zip(&lagrangian)
                    .map(|(lambda, base)| base + gain - lambda * salary)
                    .fold(f64::INFINITY, f64::min);
                if relaxed <= best + EPSILON {
                    continue;
                }
            }

            if !self.fits_rows(var, depth) {
                continue;
            }

            self.nodes += 1;
            self.apply(var, rank, 1.0);
            self.descend(depth + 1);
            self.apply(var, rank, -1.0);
        }
    }

    fn apply(&mut self, var: VarId, rank: usize, sign: f64) {
        let v = &self.model.vars[var];
        for &(t, c) in &self.var_rows[var] {
            self.activity[t] += sign * c;
        }
        self.objective += sign * v.objective;
        if sign > 0.0 {
            self.used[v.player] = true;
            self.chosen.push(var);
            self.chosen_rank.push(rank);
        } else {
            self.used[v.player] = false;
            self.chosen.pop();
            self.chosen_rank.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
