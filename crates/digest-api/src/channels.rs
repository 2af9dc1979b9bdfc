//! Handlers for `/channels` endpoints: routing and ingesting metrics by
//! channel identifier.
//!
//! `:channel` is one of `vk`, `yandex`, `mytracker` (or `mt`).
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/channels/:channel/:channel_id/project` | Active project claiming the id; 404 otherwise |
//! | `GET`  | `/channels/:channel/:channel_id/latest` | Most recent fact; 404 if none |
//! | `POST` | `/channels/:channel/facts` | Body: [`IngestBody`] |
//! | `GET`  | `/channels/:channel/snapshot` | Optional `?date=YYYY-MM-DD` (default today, UTC) |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, NaiveDate, Utc};
use digest_core::{
  fact::{Channel, Fact, FactRow},
  project::Project,
  store::{FactBatch, MetricsStore, ProjectFact},
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

// ─── Lookups ─────────────────────────────────────────────────────────────────

/// `GET /channels/:channel/:channel_id/project`
pub async fn find_project<S>(
  State(state): State<AppState<S>>,
  Path((channel, channel_id)): Path<(String, String)>,
) -> Result<Json<Project>, ApiError>
where
  S: MetricsStore,
{
  let channel: Channel = channel.parse()?;
  let project = state
    .store
    .find_project_by_channel(channel, &channel_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("no active project for {channel} id {channel_id}"))
    })?;
  Ok(Json(project))
}

/// `GET /channels/:channel/:channel_id/latest`
pub async fn latest<S>(
  State(state): State<AppState<S>>,
  Path((channel, channel_id)): Path<(String, String)>,
) -> Result<Json<Fact>, ApiError>
where
  S: MetricsStore,
{
  let channel: Channel = channel.parse()?;
  let fact = state
    .store
    .query_latest(channel, &channel_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("no {channel} facts for {channel_id}")))?;
  Ok(Json(fact))
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IngestBody {
  pub rows:             Vec<FactRow>,
  /// Timestamp for every row; defaults to now.
  #[serde(default)]
  pub fetched_at:       Option<DateTime<Utc>>,
  /// Replace the batch keys' facts for the batch date instead of appending.
  #[serde(default)]
  pub replace_for_date: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResult {
  pub inserted: usize,
  pub skipped:  usize,
}

/// `POST /channels/:channel/facts`
pub async fn ingest<S>(
  State(state): State<AppState<S>>,
  Path(channel): Path<String>,
  Json(body): Json<IngestBody>,
) -> Result<Json<IngestResult>, ApiError>
where
  S: MetricsStore,
{
  let channel: Channel = channel.parse()?;
  let submitted = body.rows.len();
  let batch = FactBatch {
    channel,
    rows: body.rows,
    fetched_at: body.fetched_at,
    replace_for_date: body.replace_for_date,
  };
  let inserted = state.store.record_many(batch).await.map_err(ApiError::store)?;
  Ok(Json(IngestResult { inserted, skipped: submitted - inserted }))
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SnapshotParams {
  pub date: Option<NaiveDate>,
}

/// `GET /channels/:channel/snapshot[?date=YYYY-MM-DD]`
pub async fn snapshot<S>(
  State(state): State<AppState<S>>,
  Path(channel): Path<String>,
  Query(params): Query<SnapshotParams>,
) -> Result<Json<Vec<ProjectFact>>, ApiError>
where
  S: MetricsStore,
{
  let channel: Channel = channel.parse()?;
  let date = params.date.unwrap_or_else(|| Utc::now().date_naive());
  let facts = state
    .store
    .facts_for_date(channel, date)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(facts))
}
