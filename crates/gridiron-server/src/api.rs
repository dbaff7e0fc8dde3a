// HTTP routes: scoring, lineup generation, saved selections, and weight
// profile management.
//
// Scoring and generation are CPU-bound and SQLite calls block, so every
// handler that touches them runs its work on the blocking pool.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

use gridiron_core::optimizer::{LineupOptimizer, OptimizerError, OptimizerOptions};
use gridiron_core::scoring::{ScoredPlayer, ScoringEngine, ScoringError, WeightProfile};
use gridiron_core::store::{ProfileError, SelectionStore, SignalStore, WeightProfileStore};

use crate::protocol::*;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub signals: Arc<dyn SignalStore>,
    pub engine: ScoringEngine,
    pub optimizer: LineupOptimizer,
    pub profiles: Arc<dyn WeightProfileStore>,
    pub selections: Arc<dyn SelectionStore>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        signals: Arc<dyn SignalStore>,
        allow_empty_pool: bool,
        options: OptimizerOptions,
        profiles: Arc<dyn WeightProfileStore>,
        selections: Arc<dyn SelectionStore>,
    ) -> Self {
        Self {
            engine: ScoringEngine::new(Arc::clone(&signals), allow_empty_pool),
            signals,
            optimizer: LineupOptimizer::new(options),
            profiles,
            selections,
        }
    }

    /// Inline configuration wins, then a named profile, then the default.
    fn resolve_profile(
        &self,
        inline: Option<InlineProfile>,
        name: Option<&str>,
    ) -> Result<WeightProfile, ApiError> {
        match (inline, name) {
            (Some(inline), _) => Ok(inline.into_profile()),
            (None, Some(name)) => Ok(self.profiles.get_profile(name)?),
            (None, None) => Ok(self.profiles.default_profile()?),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Conflict { code, .. } => code,
            ApiError::Internal(_) => "internal",
        }
    }

    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<ScoringError> for ApiError {
    fn from(e: ScoringError) -> Self {
        let message = e.to_string();
        match e {
            ScoringError::UnknownWeek { .. } => ApiError::NotFound {
                code: "unknown_week",
                message,
            },
            ScoringError::EmptyPool { .. } => ApiError::NotFound {
                code: "empty_pool",
                message,
            },
            ScoringError::InvalidProfile { .. } => ApiError::bad_request("invalid_profile", message),
        }
    }
}

impl From<OptimizerError> for ApiError {
    fn from(e: OptimizerError) -> Self {
        match e {
            OptimizerError::InvalidSettings { .. } => ApiError::bad_request("invalid_settings", e.to_string()),
            OptimizerError::Internal(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ProfileError> for ApiError {
    fn from(e: ProfileError) -> Self {
        let message = e.to_string();
        match e {
            ProfileError::NotFound(_) => ApiError::NotFound {
                code: "profile_not_found",
                message,
            },
            ProfileError::DefaultNotDeletable(_) | ProfileError::NoDefault => ApiError::Conflict {
                code: "default_profile",
                message,
            },
            ProfileError::Invalid(_) => ApiError::bad_request("invalid_profile", message),
            ProfileError::Storage(_) => ApiError::Internal(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request("invalid_request", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request("invalid_path", rejection.body_text())
    }
}

/// Run `work` on the blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {e}")))?
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/score", post(score))
        .route("/score/invalidate", post(invalidate))
        .route("/lineups", post(generate_lineups))
        .route("/lineups/{week}", get(saved_lineups))
        .route("/profiles", get(list_profiles).post(save_profile))
        .route("/profiles/{name}/default", post(set_default_profile))
        .route("/profiles/{name}", axum::routing::delete(delete_profile))
        .with_state(state)
}

/// Serve the API on an already-bound listener until the task is cancelled.
pub async fn serve(listener: TcpListener, state: SharedState) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("HTTP server listening on {local_addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let slates = state
        .signals
        .slates()
        .into_iter()
        .map(|(week, variant)| SlateSummary { week, variant })
        .collect();
    Json(HealthResponse {
        status: "ok",
        slates,
        cache: state.engine.cache_stats(),
    })
}

async fn score(
    State(state): State<SharedState>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let Json(req) = payload?;
    let response = run_blocking(move || {
        let profile = state.resolve_profile(req.profile, req.profile_name.as_deref())?;
        let run = state.engine.score(req.week, req.variant, &profile)?;
        Ok(ScoreResponse {
            week: req.week,
            variant: req.variant,
            fingerprint: run.fingerprint,
            players: run.players.as_ref().clone(),
            duration_ms: run.duration.as_millis() as u64,
            cached: run.cached,
        })
    })
    .await?;

    info!(
        "Scored week {} ({}): {} players, cached={}, {}ms",
        response.week,
        response.variant,
        response.players.len(),
        response.cached,
        response.duration_ms
    );
    Ok(Json(response))
}

async fn invalidate(State(state): State<SharedState>, body: Bytes) -> Result<Json<InvalidateResponse>, ApiError> {
    let req: InvalidateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        InvalidateRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request("invalid_request", e.to_string()))?
    };

    let (invalidated, entries_removed) = match req.week {
        Some(week) => (format!("week {week}"), state.engine.invalidate_week(week)),
        None => ("all".to_string(), state.engine.invalidate_all()),
    };
    info!("Invalidated score cache for {invalidated} ({entries_removed} entries)");
    Ok(Json(InvalidateResponse {
        invalidated,
        entries_removed,
    }))
}

async fn generate_lineups(
    State(state): State<SharedState>,
    payload: Result<Json<LineupRequest>, JsonRejection>,
) -> Result<Json<LineupResponse>, ApiError> {
    let Json(req) = payload?;
    let started = Instant::now();

    let response = run_blocking(move || {
        let LineupRequest {
            week,
            settings,
            players,
            profile_name,
            save,
        } = req;

        let pool: Arc<Vec<ScoredPlayer>> = match players {
            Some(players) => Arc::new(players),
            None => {
                let profile = state.resolve_profile(None, profile_name.as_deref())?;
                state.engine.score(week, settings.variant, &profile)?.players
            }
        };

        let generation = state.optimizer.generate(&pool, &settings)?;

        let saved_ids = if save && !generation.selections.is_empty() {
            state
                .selections
                .save_selections(week, &generation.selections)
                .map_err(|e| ApiError::Internal(format!("failed to save selections: {e:#}")))?
        } else {
            Vec::new()
        };

        Ok(LineupResponse {
            success: generation.success(),
            week,
            settings,
            requested: generation.requested,
            achieved: generation.achieved,
            position_counts: generation.position_counts,
            shortfalls: generation.shortfalls,
            strategy_used: generation.strategy_used,
            hint: generation.hint,
            selections: generation.selections,
            duration_ms: started.elapsed().as_millis() as u64,
            saved_ids,
        })
    })
    .await?;

    info!(
        "Lineups for week {}: {}/{} ranked ({} strategy), saved {}, {}ms",
        response.week,
        response.achieved,
        response.requested,
        response.settings.strategy,
        response.saved_ids.len(),
        response.duration_ms
    );
    Ok(Json(response))
}

async fn saved_lineups(
    State(state): State<SharedState>,
    week: Result<Path<u32>, PathRejection>,
) -> Result<Json<SavedSelectionsResponse>, ApiError> {
    let Path(week) = week?;
    let selections = run_blocking(move || {
        state
            .selections
            .load_selections(week)
            .map_err(|e| ApiError::Internal(format!("failed to load selections: {e:#}")))
    })
    .await?;
    Ok(Json(SavedSelectionsResponse { week, selections }))
}

async fn list_profiles(State(state): State<SharedState>) -> Result<Json<ProfilesResponse>, ApiError> {
    let profiles = run_blocking(move || Ok(state.profiles.list_profiles()?)).await?;
    Ok(Json(ProfilesResponse { profiles }))
}

async fn save_profile(
    State(state): State<SharedState>,
    payload: Result<Json<SaveProfileRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProfileResponse>), ApiError> {
    let Json(req) = payload?;
    let profile = run_blocking(move || {
        let profile = WeightProfile::new(req.name, req.weights, req.config);
        state.profiles.save_profile(&profile)?;
        if req.make_default {
            state.profiles.set_default(&profile.name)?;
        }
        Ok(state.profiles.get_profile(&profile.name)?)
    })
    .await?;

    info!("Saved weight profile '{}' (default={})", profile.name, profile.is_default);
    Ok((
        StatusCode::CREATED,
        Json(ProfileResponse {
            fingerprint: profile.fingerprint(),
            profile,
        }),
    ))
}

async fn set_default_profile(
    State(state): State<SharedState>,
    name: Result<Path<String>, PathRejection>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let Path(name) = name?;
    let profile = run_blocking(move || {
        state.profiles.set_default(&name)?;
        Ok(state.profiles.get_profile(&name)?)
    })
    .await?;
    Ok(Json(ProfileResponse {
        fingerprint: profile.fingerprint(),
        profile,
    }))
}

async fn delete_profile(
    State(state): State<SharedState>,
    name: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(name) = name?;
    run_blocking(move || Ok(state.profiles.delete_profile(&name)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}
