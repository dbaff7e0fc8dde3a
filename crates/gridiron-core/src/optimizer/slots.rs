// Lineup slot templates and pool sufficiency checks.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::scoring::ScoredPlayer;
use crate::slate::player::{Position, Variant};

/// One labeled slot in a lineup template.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSpec {
    pub label: String,
    /// Positions that may fill the slot.
    pub eligible: Vec<Position>,
    /// Applied to the occupant's score and salary.
    pub multiplier: f64,
    pub is_captain: bool,
}

impl SlotSpec {
    fn new(label: impl Into<String>, eligible: &[Position]) -> Self {
        Self {
            label: label.into(),
            eligible: eligible.to_vec(),
            multiplier: 1.0,
            is_captain: false,
        }
    }

    pub fn accepts(&self, position: Position) -> bool {
        self.eligible.contains(&position)
    }

    /// Two slots are interchangeable when any occupant of one could move to
    /// the other with identical effect.
    pub fn interchangeable_with(&self, other: &SlotSpec) -> bool {
        self.eligible == other.eligible && self.multiplier == other.multiplier && self.is_captain == other.is_captain
    }
}

fn flex_positions() -> Vec<Position> {
    Position::ALL.into_iter().filter(Position::is_flex_eligible).collect()
}

/// Slots for a variant, in display order.
pub fn template(variant: Variant, captain_multiplier: f64) -> Vec<SlotSpec> {
    match variant {
        Variant::Standard => vec![
            SlotSpec::new("QB", &[Position::QB]),
            SlotSpec::new("RB1", &[Position::RB]),
            SlotSpec::new("RB2", &[Position::RB]),
            SlotSpec::new("WR1", &[Position::WR]),
            SlotSpec::new("WR2", &[Position::WR]),
            SlotSpec::new("WR3", &[Position::WR]),
            SlotSpec::new("TE", &[Position::TE]),
            SlotSpec::new("FLEX", &flex_positions()),
            SlotSpec::new("DST", &[Position::DST]),
        ],
        Variant::Captain => {
            let mut slots = vec![SlotSpec {
                label: "CPT".into(),
                eligible: Position::ALL.to_vec(),
                multiplier: captain_multiplier,
                is_captain: true,
            }];
            for i in 1..=5 {
                slots.push(SlotSpec::new(format!("FLEX{i}"), &Position::ALL));
            }
            slots
        }
    }
}

// ---------------------------------------------------------------------------
// Position counts and precheck
// ---------------------------------------------------------------------------

/// Count of filtered-pool players per position. Every position is present,
/// zero when absent from the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCounts(pub BTreeMap<Position, usize>);

impl PositionCounts {
    pub fn from_pool(players: &[ScoredPlayer]) -> Self {
        let mut counts: BTreeMap<Position, usize> = Position::ALL.iter().map(|&p| (p, 0)).collect();
        for sp in players {
            *counts.entry(sp.player.position).or_insert(0) += 1;
        }
        PositionCounts(counts)
    }

    pub fn get(&self, position: Position) -> usize {
        self.0.get(&position).copied().unwrap_or(0)
    }

    /// Total across a set of positions.
    pub fn sum_of(&self, positions: &[Position]) -> usize {
        positions.iter().map(|&p| self.get(p)).sum()
    }

    /// `QB:3, RB:1, ...` restricted to `positions`.
    pub fn describe(&self, positions: &[Position]) -> String {
        positions
            .iter()
            .map(|p| format!("{}:{}", p, self.get(*p)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One unmet minimum found by the precheck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    /// Position, position union (`RB/WR/TE`), or `GAME`.
    pub category: String,
    pub required: usize,
    pub available: usize,
}

/// Label for a set of positions: `RB`, `RB/WR/TE`, or `ANY`.
fn category_label(positions: &[Position]) -> String {
    if positions.len() == Position::ALL.len() {
        return "ANY".to_string();
    }
    positions
        .iter()
        .map(|p| p.display_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// Verify the pool can fill every slot before any solving.
///
/// For each distinct eligibility set among the slots, the pool must contain at
/// least as many players in that set as there are slots whose eligibility is
/// contained in it. The captain variant additionally needs one game holding
/// enough players for the whole lineup.
pub fn precheck(slots: &[SlotSpec], players: &[ScoredPlayer], counts: &PositionCounts, variant: Variant) -> Vec<Shortfall> {
    let mut shortfalls = Vec::new();

    let mut sets: Vec<&Vec<Position>> = Vec::new();
    for slot in slots {
        if !sets.contains(&&slot.eligible) {
            sets.push(&slot.eligible);
        }
    }

    for set in sets {
        let required = slots
            .iter()
            .filter(|s| s.eligible.iter().all(|p| set.contains(p)))
            .count();
        let available = counts.sum_of(set);
        if available < required {
            shortfalls.push(Shortfall {
                category: category_label(set),
                required,
                available,
            });
        }
    }

    if variant == Variant::Captain {
        let mut per_game: HashMap<String, usize> = HashMap::new();
        for sp in players {
            *per_game.entry(sp.player.game_key()).or_insert(0) += 1;
        }
        let largest = per_game.values().copied().max().unwrap_or(0);
        if largest < slots.len() {
            shortfalls.push(Shortfall {
                category: "GAME".to_string(),
                required: slots.len(),
                available: largest,
            });
        }
    }

    shortfalls
}

/// Positions worth listing in diagnostics for a template.
pub fn relevant_positions(slots: &[SlotSpec]) -> Vec<Position> {
    Position::ALL
        .iter()
        .copied()
        .filter(|p| slots.iter().any(|s| s.accepts(*p)))
        .collect()
}

/// `available: QB:3, RB:1 — required RB:2`
pub fn shortfall_hint(counts: &PositionCounts, positions: &[Position], shortfalls: &[Shortfall]) -> String {
    let required = shortfalls
        .iter()
        .map(|s| format!("{}:{}", s.category, s.required))
        .collect::<Vec<_>>()
        .join(", ");
    format!("available: {} — required {}", counts.describe(positions), required)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Fingerprint;
    use crate::slate::player::{Player, Signals};

    fn scored(id: &str, position: Position, team: &str, opp: &str) -> ScoredPlayer {
        ScoredPlayer {
            player: Player {
                id: id.into(),
                name: id.into(),
                team: team.into(),
                opponent: Some(opp.into()),
                game: None,
                position,
                salary: 5000,
                variant: Variant::Standard,
                signals: Signals::default(),
            },
            smart_score: 10.0,
            fingerprint: Fingerprint(0),
        }
    }

    fn standard_pool() -> Vec<ScoredPlayer> {
        let mut pool = vec![scored("qb", Position::QB, "KC", "BUF"), scored("dst", Position::DST, "KC", "BUF")];
        for i in 0..3 {
            pool.push(scored(&format!("rb{i}"), Position::RB, "KC", "BUF"));
        }
        for i in 0..4 {
            pool.push(scored(&format!("wr{i}"), Position::WR, "KC", "BUF"));
        }
        pool.push(scored("te", Position::TE, "KC", "BUF"));
        pool
    }

    #[test]
    fn standard_template_shape() {
        let slots = template(Variant::Standard, 1.5);
        let labels: Vec<&str> = slots.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["QB", "RB1", "RB2", "WR1", "WR2", "WR3", "TE", "FLEX", "DST"]);
        assert_eq!(slots[7].eligible, vec![Position::RB, Position::WR, Position::TE]);
        assert!(!slots[7].accepts(Position::QB));
        assert!(slots[1].interchangeable_with(&slots[2]));
        assert!(!slots[2].interchangeable_with(&slots[3]));
    }

    #[test]
    fn captain_template_shape() {
        let slots = template(Variant::Captain, 1.5);
        assert_eq!(slots.len(), 6);
        assert!(slots[0].is_captain);
        assert_eq!(slots[0].multiplier, 1.5);
        assert!(slots[1..].iter().all(|s| !s.is_captain && s.multiplier == 1.0));
        assert!(!slots[0].interchangeable_with(&slots[1]));
        assert!(slots[1].interchangeable_with(&slots[5]));
    }

    #[test]
    fn position_counts_include_zeros() {
        let counts = PositionCounts::from_pool(&standard_pool());
        assert_eq!(counts.get(Position::RB), 3);
        assert_eq!(counts.get(Position::K), 0);
        assert_eq!(counts.0.len(), Position::ALL.len());
    }

    #[test]
    fn sufficient_standard_pool_passes() {
        let pool = standard_pool();
        let slots = template(Variant::Standard, 1.5);
        let counts = PositionCounts::from_pool(&pool);
        assert!(precheck(&slots, &pool, &counts, Variant::Standard).is_empty());
    }

    #[test]
    fn missing_rb_is_reported() {
        let pool: Vec<_> = standard_pool()
            .into_iter()
            .filter(|sp| sp.player.position != Position::RB)
            .collect();
        let slots = template(Variant::Standard, 1.5);
        let counts = PositionCounts::from_pool(&pool);
        let shortfalls = precheck(&slots, &pool, &counts, Variant::Standard);

        assert!(shortfalls.contains(&Shortfall {
            category: "RB".into(),
            required: 2,
            available: 0,
        }));
        let hint = shortfall_hint(&counts, &relevant_positions(&slots), &shortfalls);
        assert!(hint.starts_with("available: QB:1, RB:0, WR:4, TE:1, DST:1"), "{hint}");
        assert!(hint.contains("required RB:2"), "{hint}");
    }

    #[test]
    fn flex_union_shortfall_detected() {
        // Exactly 2 RB, 3 WR, 1 TE: each position meets its own minimum but
        // nobody is left for FLEX.
        let pool: Vec<_> = standard_pool()
            .into_iter()
            .filter(|sp| sp.player.id != "rb2" && sp.player.id != "wr3")
            .collect();
        let slots = template(Variant::Standard, 1.5);
        let counts = PositionCounts::from_pool(&pool);
        let shortfalls = precheck(&slots, &pool, &counts, Variant::Standard);
        assert_eq!(
            shortfalls,
            vec![Shortfall {
                category: "RB/WR/TE".into(),
                required: 7,
                available: 6,
            }]
        );
    }

    #[test]
    fn captain_needs_one_full_game() {
        let slots = template(Variant::Captain, 1.5);
        let mut pool: Vec<_> = (0..4)
            .map(|i| scored(&format!("a{i}"), Position::WR, "KC", "BUF"))
            .collect();
        pool.extend((0..4).map(|i| scored(&format!("b{i}"), Position::WR, "DAL", "NYG")));
        let counts = PositionCounts::from_pool(&pool);
        let shortfalls = precheck(&slots, &pool, &counts, Variant::Captain);
        assert_eq!(
            shortfalls,
            vec![Shortfall {
                category: "GAME".into(),
                required: 6,
                available: 4,
            }]
        );

        pool.extend((4..6).map(|i| scored(&format!("a{i}"), Position::RB, "BUF", "KC")));
        let counts = PositionCounts::from_pool(&pool);
        assert!(precheck(&slots, &pool, &counts, Variant::Captain).is_empty());
    }
}
