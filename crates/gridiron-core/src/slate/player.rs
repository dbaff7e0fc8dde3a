// Player identity, positions, and the raw per-week signals attached to them.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Football positions that can appear in a slate.
///
/// `DST` is the team defense/special-teams pseudo-position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    QB,
    RB,
    WR,
    TE,
    K,
    DST,
}

impl Position {
    /// All positions in display order.
    pub const ALL: [Position; 6] = [
        Position::QB,
        Position::RB,
        Position::WR,
        Position::TE,
        Position::K,
        Position::DST,
    ];

    /// Parse a position string.
    ///
    /// Handles the common site abbreviations:
    /// - "D", "DEF", "D/ST", "DST" -> DST
    /// - "PK", "K" -> K
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "QB" => Some(Position::QB),
            "RB" => Some(Position::RB),
            "WR" => Some(Position::WR),
            "TE" => Some(Position::TE),
            "K" | "PK" => Some(Position::K),
            "DST" | "D/ST" | "DEF" | "D" => Some(Position::DST),
            _ => None,
        }
    }

    /// Return the display string for this position.
    pub fn display_str(&self) -> &'static str {
        match self {
            Position::QB => "QB",
            Position::RB => "RB",
            Position::WR => "WR",
            Position::TE => "TE",
            Position::K => "K",
            Position::DST => "DST",
        }
    }

    /// Whether this position may fill a standard-slate FLEX slot.
    pub fn is_flex_eligible(&self) -> bool {
        matches!(self, Position::RB | Position::WR | Position::TE)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// Which slate type a player (or a request) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Multi-game slate with fixed position slots.
    #[default]
    Standard,
    /// Single-game slate with one premium captain slot.
    Captain,
}

impl Variant {
    pub fn from_str_variant(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "classic" => Some(Variant::Standard),
            "captain" | "showdown" => Some(Variant::Captain),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Standard => "standard",
            Variant::Captain => "captain",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Raw scoring signals for a player in a given week.
///
/// Every field is optional. The scoring engine treats a missing signal as a
/// neutral contribution rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    /// Base fantasy-point projection.
    #[serde(default)]
    pub projection: Option<f64>,
    /// Low-end projection.
    #[serde(default)]
    pub floor: Option<f64>,
    /// High-end projection.
    #[serde(default)]
    pub ceiling: Option<f64>,
    /// Projected ownership, in percent (0..100).
    #[serde(default)]
    pub ownership: Option<f64>,
    /// Opponent defensive rank against this position, 1..=32. Higher is a
    /// softer matchup.
    #[serde(default)]
    pub opponent_rank: Option<f64>,
    /// Market-implied team point total.
    #[serde(default)]
    pub implied_total: Option<f64>,
    /// Fractional change in usage share over recent weeks (0.1 = +10%).
    #[serde(default)]
    pub usage_trend: Option<f64>,
    /// Coefficient of variation of recent weekly fantasy points.
    #[serde(default)]
    pub consistency: Option<f64>,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// A candidate player for one week and slate variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Stable identity key across weeks.
    pub id: String,
    pub name: String,
    pub team: String,
    #[serde(default)]
    pub opponent: Option<String>,
    /// Real-world game this player participates in. When absent, derived from
    /// team and opponent via [`Player::game_key`].
    #[serde(default)]
    pub game: Option<String>,
    pub position: Position,
    pub salary: i64,
    #[serde(default)]
    pub variant: Variant,
    #[serde(default)]
    pub signals: Signals,
}

impl Player {
    /// Grouping key used for per-game limits.
    ///
    /// Uses the explicit `game` when present, otherwise the alphabetically
    /// ordered `AAA@BBB` pair so both sides of a matchup agree. A player with
    /// neither a game nor an opponent is grouped by team alone.
    pub fn game_key(&self) -> String {
        if let Some(game) = self.game.as_deref().filter(|g| !g.trim().is_empty()) {
            return game.to_string();
        }
        match self.opponent.as_deref().filter(|o| !o.trim().is_empty()) {
            Some(opp) => {
                let (a, b) = if self.team.as_str() <= opp {
                    (self.team.as_str(), opp)
                } else {
                    (opp, self.team.as_str())
                };
                format!("{a}@{b}")
            }
            None => self.team.clone(),
        }
    }

    /// Whether the player carries structurally valid data for optimization.
    pub fn has_valid_salary(&self) -> bool {
        self.salary > 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn player(team: &str, opponent: Option<&str>, game: Option<&str>) -> Player {
        Player {
            id: "p1".into(),
            name: "Test Player".into(),
            team: team.into(),
            opponent: opponent.map(Into::into),
            game: game.map(Into::into),
            position: Position::WR,
            salary: 5000,
            variant: Variant::Standard,
            signals: Signals::default(),
        }
    }

    #[test]
    fn position_parses_aliases() {
        assert_eq!(Position::from_str_pos("qb"), Some(Position::QB));
        assert_eq!(Position::from_str_pos(" D/ST "), Some(Position::DST));
        assert_eq!(Position::from_str_pos("DEF"), Some(Position::DST));
        assert_eq!(Position::from_str_pos("PK"), Some(Position::K));
        assert_eq!(Position::from_str_pos("FB"), None);
    }

    #[test]
    fn flex_eligibility() {
        assert!(Position::RB.is_flex_eligible());
        assert!(Position::WR.is_flex_eligible());
        assert!(Position::TE.is_flex_eligible());
        assert!(!Position::QB.is_flex_eligible());
        assert!(!Position::DST.is_flex_eligible());
    }

    #[test]
    fn variant_parses_site_names() {
        assert_eq!(Variant::from_str_variant("Showdown"), Some(Variant::Captain));
        assert_eq!(Variant::from_str_variant("classic"), Some(Variant::Standard));
        assert_eq!(Variant::from_str_variant("tiers"), None);
    }

    #[test]
    fn variant_serializes_lowercase() {
        let json = serde_json::to_string(&Variant::Captain).unwrap();
        assert_eq!(json, "\"captain\"");
    }

    #[test]
    fn game_key_prefers_explicit_game() {
        let p = player("KC", Some("BUF"), Some("BUF@KC-SNF"));
        assert_eq!(p.game_key(), "BUF@KC-SNF");
    }

    #[test]
    fn game_key_is_symmetric_across_opponents() {
        let home = player("KC", Some("BUF"), None);
        let away = player("BUF", Some("KC"), None);
        assert_eq!(home.game_key(), "BUF@KC");
        assert_eq!(home.game_key(), away.game_key());
    }

    #[test]
    fn game_key_falls_back_to_team() {
        let p = player("KC", None, Some("  "));
        assert_eq!(p.game_key(), "KC");
    }

    #[test]
    fn missing_signals_deserialize_as_none() {
        let json = r#"{"id":"x","name":"X","team":"NYJ","position":"RB","salary":4000}"#;
        let p: Player = serde_json::from_str(json).unwrap();
        assert_eq!(p.signals, Signals::default());
        assert_eq!(p.variant, Variant::Standard);
    }
}
