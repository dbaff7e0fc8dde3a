// SQLite persistence for weight profiles and saved selections.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::optimizer::Selection;
use crate::scoring::{FactorWeights, ScoreConfig, ScoringError, WeightProfile};
use crate::store::{ProfileError, SavedSelection, SelectionStore, WeightProfileStore};

/// SQLite-backed weight profile and selection store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS weight_profiles (
                name       TEXT PRIMARY KEY,
                weights    TEXT NOT NULL,
                config     TEXT NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_weight_profiles_single_default
                ON weight_profiles(is_default) WHERE is_default = 1;

            CREATE TABLE IF NOT EXISTS saved_selections (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                week            INTEGER NOT NULL,
                selection_index INTEGER NOT NULL,
                payload         TEXT NOT NULL,
                saved_at        TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_saved_selections_week ON saved_selections(week);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Weight profiles
    // ------------------------------------------------------------------

    /// Store `profile` as the default unless some default already exists.
    /// Returns `true` when the seed was applied.
    pub fn seed_default_profile(&self, profile: &WeightProfile) -> Result<bool, ProfileError> {
        validate_profile(profile)?;
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin seed transaction")?;

        let has_default: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM weight_profiles WHERE is_default = 1)",
                [],
                |row| row.get(0),
            )
            .context("failed to check for a default profile")?;
        if has_default {
            return Ok(false);
        }

        let (weights, config) = encode_profile(profile)?;
        tx.execute(
            "INSERT INTO weight_profiles (name, weights, config, is_default)
             VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(name) DO UPDATE SET
                weights    = excluded.weights,
                config     = excluded.config,
                is_default = 1,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![profile.name, weights, config],
        )
        .context("failed to seed default profile")?;
        tx.commit().context("failed to commit default profile seed")?;

        info!("Seeded default weight profile '{}'", profile.name);
        Ok(true)
    }

    fn query_profile(&self, sql: &str, name: Option<&str>) -> Result<Option<WeightProfile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql).context("failed to prepare profile query")?;
        let row = match name {
            Some(name) => stmt.query_row(params![name], read_profile_row),
            None => stmt.query_row([], read_profile_row),
        }
        .optional()
        .context("failed to query weight profile")?;
        row.map(decode_profile).transpose()
    }
}

type ProfileRow = (String, String, String, bool);

fn read_profile_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_profile((name, weights, config, is_default): ProfileRow) -> Result<WeightProfile> {
    let weights: FactorWeights = serde_json::from_str(&weights)
        .with_context(|| format!("failed to deserialize weights for profile {name}"))?;
    let config: ScoreConfig = serde_json::from_str(&config)
        .with_context(|| format!("failed to deserialize config for profile {name}"))?;
    Ok(WeightProfile {
        name,
        weights,
        config,
        is_default,
    })
}

fn encode_profile(profile: &WeightProfile) -> Result<(String, String)> {
    let weights = serde_json::to_string(&profile.weights).context("failed to serialize weights")?;
    let config = serde_json::to_string(&profile.config).context("failed to serialize score config")?;
    Ok((weights, config))
}

fn validate_profile(profile: &WeightProfile) -> Result<(), ProfileError> {
    if profile.name.trim().is_empty() {
        return Err(ProfileError::Invalid(ScoringError::InvalidProfile {
            field: "name".into(),
            message: "must not be empty".into(),
        }));
    }
    profile.validate()?;
    Ok(())
}

const PROFILE_COLUMNS: &str = "SELECT name, weights, config, is_default FROM weight_profiles";

impl WeightProfileStore for Database {
    fn get_profile(&self, name: &str) -> Result<WeightProfile, ProfileError> {
        self.query_profile(&format!("{PROFILE_COLUMNS} WHERE name = ?1"), Some(name))?
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))
    }

    fn default_profile(&self) -> Result<WeightProfile, ProfileError> {
        self.query_profile(&format!("{PROFILE_COLUMNS} WHERE is_default = 1"), None)?
            .ok_or(ProfileError::NoDefault)
    }

    fn list_profiles(&self) -> Result<Vec<WeightProfile>, ProfileError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!("{PROFILE_COLUMNS} ORDER BY name"))
            .context("failed to prepare list_profiles query")?;
        let rows = stmt
            .query_map([], read_profile_row)
            .context("failed to query weight profiles")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map weight profile rows")?;
        let profiles = rows
            .into_iter()
            .map(decode_profile)
            .collect::<Result<Vec<_>>>()?;
        Ok(profiles)
    }

    fn save_profile(&self, profile: &WeightProfile) -> Result<(), ProfileError> {
        validate_profile(profile)?;
        let (weights, config) = encode_profile(profile)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO weight_profiles (name, weights, config)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                weights    = excluded.weights,
                config     = excluded.config,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![profile.name, weights, config],
        )
        .context("failed to save weight profile")?;
        Ok(())
    }

    /// Clears the old default and sets the new one in a single transaction.
    fn set_default(&self, name: &str) -> Result<(), ProfileError> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin set_default transaction")?;

        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM weight_profiles WHERE name = ?1)",
                params![name],
                |row| row.get(0),
            )
            .context("failed to check profile existence")?;
        if !exists {
            return Err(ProfileError::NotFound(name.to_string()));
        }

        tx.execute("UPDATE weight_profiles SET is_default = 0 WHERE is_default = 1", [])
            .context("failed to clear default profile")?;
        tx.execute(
            "UPDATE weight_profiles SET is_default = 1 WHERE name = ?1",
            params![name],
        )
        .context("failed to set default profile")?;
        tx.commit().context("failed to commit set_default")?;

        info!("Default weight profile is now '{}'", name);
        Ok(())
    }

    fn delete_profile(&self, name: &str) -> Result<(), ProfileError> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin delete transaction")?;

        let is_default: Option<bool> = tx
            .query_row(
                "SELECT is_default FROM weight_profiles WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up profile")?;
        match is_default {
            None => return Err(ProfileError::NotFound(name.to_string())),
            Some(true) => return Err(ProfileError::DefaultNotDeletable(name.to_string())),
            Some(false) => {}
        }

        tx.execute("DELETE FROM weight_profiles WHERE name = ?1", params![name])
            .context("failed to delete weight profile")?;
        tx.commit().context("failed to commit delete_profile")?;
        Ok(())
    }
}

// ------------------------------------------------------------------
// Saved selections
// ------------------------------------------------------------------

impl SelectionStore for Database {
    /// All rows are written in one transaction; a failure stores nothing.
    fn save_selections(&self, week: u32, selections: &[Selection]) -> Result<Vec<i64>> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin save transaction")?;
        let saved_at = Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(selections.len());
        for selection in selections {
            let payload = serde_json::to_string(selection).context("failed to serialize selection")?;
            let id: i64 = tx
                .query_row(
                    "INSERT INTO saved_selections (week, selection_index, payload, saved_at)
                     VALUES (?1, ?2, ?3, ?4)
                     RETURNING id",
                    params![week, selection.selection_index, payload, saved_at],
                    |row| row.get(0),
                )
                .context("failed to insert selection")?;
            ids.push(id);
        }

        tx.commit().context("failed to commit saved selections")?;
        Ok(ids)
    }

    fn load_selections(&self, week: u32) -> Result<Vec<SavedSelection>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, payload, saved_at FROM saved_selections
                 WHERE week = ?1 ORDER BY id",
            )
            .context("failed to prepare load_selections query")?;

        let rows = stmt
            .query_map(params![week], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("failed to query saved selections")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map saved selection rows")?;

        rows.into_iter()
            .map(|(id, payload, saved_at)| {
                let selection: Selection = serde_json::from_str(&payload)
                    .with_context(|| format!("failed to deserialize saved selection {id}"))?;
                let saved_at = DateTime::parse_from_rfc3339(&saved_at)
                    .with_context(|| format!("invalid saved_at for selection {id}"))?
                    .with_timezone(&Utc);
                Ok(SavedSelection {
                    id,
                    week,
                    saved_at,
                    selection,
                })
            })
            .collect()
    }
}
