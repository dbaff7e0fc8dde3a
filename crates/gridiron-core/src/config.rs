// Configuration loading and parsing (config/gridiron.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::optimizer::{OptimizerOptions, VariantLimits};
use crate::scoring::{ScoringError, WeightProfile};

/// File name of the single configuration file under `config/` and `defaults/`.
pub const CONFIG_FILE: &str = "gridiron.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub data_paths: DataPaths,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub optimizer: OptimizerOptions,
    pub default_profile: WeightProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    /// Directory holding `week{N}_{variant}.csv` slate files.
    pub slates: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringConfig {
    /// Accept a loaded slate with no players instead of reporting it.
    #[serde(default)]
    pub allow_empty_pool: bool,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/gridiron.toml` relative to
/// the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let mut config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    // The configured profile is the seed for the default flag.
    config.default_profile.is_default = true;

    validate(&config)?;

    Ok(config)
}

/// Create `config/gridiron.toml` from `defaults/gridiron.toml` unless a local
/// copy already exists. Returns the new file's path when a copy was made.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }

    let source = base_dir.join("defaults").join(CONFIG_FILE);
    if !source.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "neither config/{CONFIG_FILE} nor defaults/{CONFIG_FILE} found in {}; \
                 run from the project root",
                base_dir.display()
            ),
        });
    }

    let copy_failed = |e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {} to {}: {e}", source.display(), target.display()),
    };
    std::fs::create_dir_all(base_dir.join("config")).map_err(copy_failed)?;
    std::fs::copy(&source, &target).map_err(copy_failed)?;
    Ok(Some(target))
}

/// Load config relative to the current working directory, creating it from
/// defaults on first run.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    if let Some(created) = ensure_config_file(&cwd)? {
        info!("Created {} from defaults", created.display());
    }
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let text_fields: &[(&str, &str)] = &[
        ("server.host", &config.server.host),
        ("database.path", &config.database.path),
        ("data_paths.slates", &config.data_paths.slates),
    ];
    for (name, val) in text_fields {
        if val.trim().is_empty() {
            return Err(invalid(*name, "must not be empty"));
        }
    }

    let opt = &config.optimizer;
    if opt.max_lineups < 1 {
        return Err(invalid(
            "optimizer.max_lineups",
            format!("must be >= 1, got {}", opt.max_lineups),
        ));
    }
    if opt.solve_timeout_ms == 0 {
        return Err(invalid("optimizer.solve_timeout_ms", "must be > 0"));
    }
    if opt.request_timeout_ms == 0 {
        return Err(invalid("optimizer.request_timeout_ms", "must be > 0"));
    }
    if opt.node_limit == 0 {
        return Err(invalid("optimizer.node_limit", "must be > 0"));
    }
    if !opt.captain_multiplier.is_finite() || opt.captain_multiplier <= 0.0 {
        return Err(invalid(
            "optimizer.captain_multiplier",
            format!("must be a finite number > 0, got {}", opt.captain_multiplier),
        ));
    }
    validate_limits("optimizer.standard", &opt.standard)?;
    validate_limits("optimizer.captain", &opt.captain)?;

    config.default_profile.validate().map_err(|e| match e {
        ScoringError::InvalidProfile { field, message } => {
            invalid(format!("default_profile.{field}"), message)
        }
        other => invalid("default_profile", other.to_string()),
    })?;
    if config.default_profile.name.trim().is_empty() {
        return Err(invalid("default_profile.name", "must not be empty"));
    }

    Ok(())
}

fn validate_limits(section: &str, limits: &VariantLimits) -> Result<(), ConfigError> {
    let fields: &[(&str, i64)] = &[
        ("salary_cap", limits.salary_cap),
        ("max_players_per_team", limits.max_players_per_team),
        ("max_players_per_game", limits.max_players_per_game),
    ];
    for (name, val) in fields {
        if *val < 1 {
            return Err(invalid(
                format!("{section}.{name}"),
                format!("must be >= 1, got {val}"),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
