// Collaborator interfaces the core depends on, plus the in-memory signal store.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::optimizer::Selection;
use crate::scoring::{ScoringError, WeightProfile};
use crate::slate::import::SlateFile;
use crate::slate::player::{Player, Variant};

// ---------------------------------------------------------------------------
// Signal store
// ---------------------------------------------------------------------------

/// Read-only source of per-week player signals.
pub trait SignalStore: Send + Sync {
    /// Players for a week and variant, or `None` when no slate is loaded.
    fn load_players(&self, week: u32, variant: Variant) -> Option<Vec<Player>>;

    /// Loaded (week, variant) pairs, sorted.
    fn slates(&self) -> Vec<(u32, Variant)>;
}

/// Signal store backed by a map, refreshed by replacing whole slates.
#[derive(Default)]
pub struct MemorySignalStore {
    slates: RwLock<HashMap<(u32, Variant), Vec<Player>>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slates(files: Vec<SlateFile>) -> Self {
        let store = Self::new();
        for file in files {
            store.insert_slate(file.week, file.variant, file.players);
        }
        store
    }

    /// Replace the slate for a week and variant.
    pub fn insert_slate(&self, week: u32, variant: Variant, players: Vec<Player>) {
        self.slates.write().insert((week, variant), players);
    }
}

impl SignalStore for MemorySignalStore {
    fn load_players(&self, week: u32, variant: Variant) -> Option<Vec<Player>> {
        self.slates.read().get(&(week, variant)).cloned()
    }

    fn slates(&self) -> Vec<(u32, Variant)> {
        let keys: BTreeSet<(u32, Variant)> = self.slates.read().keys().copied().collect();
        keys.into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Weight profile store
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("weight profile `{0}` not found")]
    NotFound(String),

    #[error("weight profile `{0}` is the default and cannot be deleted")]
    DefaultNotDeletable(String),

    #[error("no default weight profile is set")]
    NoDefault,

    #[error(transparent)]
    Invalid(#[from] ScoringError),

    #[error("profile storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Named weight profiles with exactly one default.
pub trait WeightProfileStore: Send + Sync {
    fn get_profile(&self, name: &str) -> Result<WeightProfile, ProfileError>;

    fn default_profile(&self) -> Result<WeightProfile, ProfileError>;

    /// All profiles, sorted by name.
    fn list_profiles(&self) -> Result<Vec<WeightProfile>, ProfileError>;

    /// Insert or replace by name. The stored `is_default` flag is left as is;
    /// use `set_default` to move it.
    fn save_profile(&self, profile: &WeightProfile) -> Result<(), ProfileError>;

    /// Make `name` the only default profile.
    fn set_default(&self, name: &str) -> Result<(), ProfileError>;

    /// Refuses to delete the current default.
    fn delete_profile(&self, name: &str) -> Result<(), ProfileError>;
}

// ---------------------------------------------------------------------------
// Selection store
// ---------------------------------------------------------------------------

/// A persisted selection with its storage identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSelection {
    pub id: i64,
    pub week: u32,
    pub saved_at: DateTime<Utc>,
    pub selection: Selection,
}

/// Persistence for accepted selections.
pub trait SelectionStore: Send + Sync {
    /// Save every selection or none. Returns the new ids in input order.
    fn save_selections(&self, week: u32, selections: &[Selection]) -> anyhow::Result<Vec<i64>>;

    /// Saved selections for a week, oldest first.
    fn load_selections(&self, week: u32) -> anyhow::Result<Vec<SavedSelection>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slate::player::{Position, Signals};

    fn player(id: &str) -> Player {
        Player {
            id: id.into(),
            name: id.into(),
            team: "KC".into(),
            opponent: None,
            game: None,
            position: Position::RB,
            salary: 5000,
            variant: Variant::Standard,
            signals: Signals::default(),
        }
    }

    #[test]
    fn memory_store_returns_none_for_unknown_slate() {
        let store = MemorySignalStore::new();
        assert!(store.load_players(1, Variant::Standard).is_none());
        assert!(store.slates().is_empty());
    }

    #[test]
    fn insert_replaces_whole_slate() {
        let store = MemorySignalStore::new();
        store.insert_slate(3, Variant::Standard, vec![player("a"), player("b")]);
        store.insert_slate(3, Variant::Standard, vec![player("c")]);
        let players = store.load_players(3, Variant::Standard).unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id, "c");
    }

    #[test]
    fn from_slates_indexes_by_week_and_variant() {
        let store = MemorySignalStore::from_slates(vec![
            SlateFile {
                week: 2,
                variant: Variant::Captain,
                players: vec![player("x")],
            },
            SlateFile {
                week: 1,
                variant: Variant::Standard,
                players: vec![player("y")],
            },
        ]);
        assert_eq!(store.slates(), vec![(1, Variant::Standard), (2, Variant::Captain)]);
        assert!(store.load_players(2, Variant::Standard).is_none());
    }
}
