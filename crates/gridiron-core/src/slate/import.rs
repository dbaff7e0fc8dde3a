// Slate CSV loading.
//
// Each slate file holds one week and variant and is named
// `week{N}_{variant}.csv` (e.g. `week7_standard.csv`, `week7_captain.csv`).
// Signal columns may be blank; blank cells load as missing signals.

use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use super::player::{Player, Position, Signals, Variant};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

// ---------------------------------------------------------------------------
// Raw CSV row (private)
// ---------------------------------------------------------------------------

/// One slate CSV row. Unknown extra columns are ignored by the reader.
#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct RawSlateRow {
    ID: String,
    Name: String,
    Team: String,
    #[serde(default)]
    Opp: Option<String>,
    #[serde(default)]
    Game: Option<String>,
    #[serde(alias = "Position")]
    Pos: String,
    Salary: f64,
    #[serde(default, alias = "Projection")]
    Proj: Option<f64>,
    #[serde(default)]
    Floor: Option<f64>,
    #[serde(default, alias = "Ceiling")]
    Ceil: Option<f64>,
    #[serde(default, alias = "Ownership")]
    Own: Option<f64>,
    #[serde(default)]
    OppRank: Option<f64>,
    #[serde(default)]
    Implied: Option<f64>,
    #[serde(default)]
    Trend: Option<f64>,
    #[serde(default)]
    CV: Option<f64>,
}

/// A slate loaded from disk.
#[derive(Debug, Clone)]
pub struct SlateFile {
    pub week: u32,
    pub variant: Variant,
    pub players: Vec<Player>,
}

/// Drop non-finite values so they load as missing signals.
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Reader-based loader
// ---------------------------------------------------------------------------

/// Parse slate rows from any reader, tagging every player with `variant`.
///
/// Rows with an unknown position, a blank id, or a non-finite salary are
/// skipped with a warning. A zero or negative salary is kept: the scoring
/// engine reports such players with a zero score.
pub fn load_players_from_reader<R: Read>(rdr: R, variant: Variant) -> Result<Vec<Player>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawSlateRow>() {
        match result {
            Ok(raw) => {
                let Some(position) = Position::from_str_pos(&raw.Pos) else {
                    warn!("skipping player '{}': unknown position '{}'", raw.Name, raw.Pos);
                    continue;
                };
                if raw.ID.trim().is_empty() {
                    warn!("skipping player '{}': blank ID", raw.Name);
                    continue;
                }
                if !raw.Salary.is_finite() {
                    warn!("skipping player '{}': non-finite salary", raw.Name);
                    continue;
                }
                players.push(Player {
                    id: raw.ID.trim().to_string(),
                    name: raw.Name.trim().to_string(),
                    team: raw.Team.trim().to_uppercase(),
                    opponent: non_blank(raw.Opp).map(|o| o.to_uppercase()),
                    game: non_blank(raw.Game),
                    position,
                    salary: raw.Salary.round() as i64,
                    variant,
                    signals: Signals {
                        projection: finite(raw.Proj),
                        floor: finite(raw.Floor),
                        ceiling: finite(raw.Ceil),
                        ownership: finite(raw.Own),
                        opponent_rank: finite(raw.OppRank),
                        implied_total: finite(raw.Implied),
                        usage_trend: finite(raw.Trend),
                        consistency: finite(raw.CV),
                    },
                });
            }
            Err(e) => {
                warn!("skipping malformed slate row: {}", e);
            }
        }
    }
    Ok(players)
}

// ---------------------------------------------------------------------------
// Path-based loaders
// ---------------------------------------------------------------------------

/// Parse `week7_captain.csv` into `(7, Variant::Captain)`.
pub fn parse_slate_file_name(file_name: &str) -> Option<(u32, Variant)> {
    let stem = file_name.strip_suffix(".csv")?;
    let rest = stem.strip_prefix("week")?;
    let (week, variant) = rest.split_once('_')?;
    let week: u32 = week.parse().ok()?;
    let variant = Variant::from_str_variant(variant)?;
    Some((week, variant))
}

/// Load a single slate file.
pub fn load_slate(path: &Path, variant: Variant) -> Result<Vec<Player>, ImportError> {
    let file = std::fs::File::open(path).map_err(|e| ImportError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_players_from_reader(file, variant).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load every `week{N}_{variant}.csv` file in `dir`, sorted by week then
/// variant. A missing directory yields no slates. Files whose names do not
/// follow the convention are ignored.
pub fn load_slate_dir(dir: &Path) -> Result<Vec<SlateFile>, ImportError> {
    if !dir.exists() {
        warn!("slate directory {} does not exist; no slates loaded", dir.display());
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|e| ImportError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut slates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ImportError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((week, variant)) = parse_slate_file_name(name) else {
            continue;
        };
        let players = load_slate(&path, variant)?;
        info!("Loaded {} players for week {} ({})", players.len(), week, variant);
        slates.push(SlateFile {
            week,
            variant,
            players,
        });
    }
    slates.sort_by_key(|s| (s.week, s.variant));
    Ok(slates)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
