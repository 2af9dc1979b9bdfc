//! Handlers for the composed outputs.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/digest` | Optional `?days=N`, `?as_of=<RFC 3339>` |
//! | `GET`  | `/latest` | Latest raw value per channel for every active project |

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{DateTime, Utc};
use digest_core::{
  aggregate::{LatestValues, latest_snapshot},
  digest::{Digest, DigestOptions, compose},
  store::MetricsStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct DigestParams {
  pub days:  Option<u32>,
  pub as_of: Option<DateTime<Utc>>,
}

/// `GET /digest[?days=N][&as_of=...]`
pub async fn compose_digest<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<DigestParams>,
) -> Result<Json<Digest>, ApiError>
where
  S: MetricsStore,
{
  let options = DigestOptions {
    lookback_days:      params.days.unwrap_or(state.settings.digest_days),
    icon_path_template: state.settings.icon_path_template.clone(),
    as_of:              params.as_of,
  };
  let digest = compose(&*state.store, &options)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(digest))
}

/// `GET /latest`
pub async fn latest<S>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<LatestValues>>, ApiError>
where
  S: MetricsStore,
{
  let values = latest_snapshot(&*state.store).await.map_err(ApiError::store)?;
  Ok(Json(values))
}
