//! Handlers for `/projects` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/projects` | All projects, active or not |
//! | `POST`   | `/projects` | Body: [`NewProject`]; returns 201 |
//! | `GET`    | `/projects/:id` | 404 if not found |
//! | `DELETE` | `/projects/:id` | Cascades to the project's facts; 204 / 404 |
//! | `PUT`    | `/projects/:id/active` | Body: `{"is_active": false}` |
//! | `GET`    | `/projects/:id/stats` | Optional `?days=N` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use digest_core::{
  aggregate::{PeriodStats, period_stats},
  project::{NewProject, Project},
  store::MetricsStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

async fn require_project<S: MetricsStore>(
  store: &S,
  id: i64,
) -> Result<Project, ApiError> {
  store
    .get_project(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("project {id} not found")))
}

// ─── List / create / get ─────────────────────────────────────────────────────

/// `GET /projects`
pub async fn list<S>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<Project>>, ApiError>
where
  S: MetricsStore,
{
  let projects = state.store.list_projects().await.map_err(ApiError::store)?;
  Ok(Json(projects))
}

/// `POST /projects`, body: `{"name": "...", "vk_cabinet_id": "..."}`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewProject>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MetricsStore,
{
  if body.name.trim().is_empty() {
    return Err(ApiError::BadRequest("project name must not be empty".into()));
  }
  let project = state.store.add_project(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /projects/:id`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Project>, ApiError>
where
  S: MetricsStore,
{
  Ok(Json(require_project(&*state.store, id).await?))
}

// ─── Mutations ───────────────────────────────────────────────────────────────

/// `DELETE /projects/:id`
pub async fn delete_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError>
where
  S: MetricsStore,
{
  if state.store.delete_project(id).await.map_err(ApiError::store)? {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("project {id} not found")))
  }
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
  pub is_active: bool,
}

/// `PUT /projects/:id/active`, body: `{"is_active": true}`
pub async fn set_active<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(body): Json<ActiveBody>,
) -> Result<Json<Project>, ApiError>
where
  S: MetricsStore,
{
  let updated = state
    .store
    .set_project_active(id, body.is_active)
    .await
    .map_err(ApiError::store)?;
  if !updated {
    return Err(ApiError::NotFound(format!("project {id} not found")));
  }
  Ok(Json(require_project(&*state.store, id).await?))
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatsParams {
  /// Lookback window in days; defaults to the configured stats window.
  pub days: Option<u32>,
}

/// `GET /projects/:id/stats[?days=N]`
pub async fn stats<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Query(params): Query<StatsParams>,
) -> Result<Json<PeriodStats>, ApiError>
where
  S: MetricsStore,
{
  let project = require_project(&*state.store, id).await?;
  let days = params.days.unwrap_or(state.settings.stats_days);
  let stats = period_stats(&*state.store, &project.channels, days, None)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(stats))
}
