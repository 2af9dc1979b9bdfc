//! JSON REST API for the marketing digest.
//!
//! Exposes an axum [`Router`] backed by any [`digest_core::store::MetricsStore`]:
//! the project registry, metric ingestion, per-project stats and the composed
//! digest for a downstream renderer. Auth, TLS and scheduling are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", digest_api::api_router(store.clone(), ApiSettings::default()))
//! ```

pub mod channels;
pub mod digest;
pub mod error;
pub mod projects;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use digest_core::{
  aggregate::DEFAULT_STATS_DAYS,
  digest::{DEFAULT_DIGEST_DAYS, DEFAULT_ICON_PATH_TEMPLATE},
  store::MetricsStore,
};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Settings / state ────────────────────────────────────────────────────────

/// Defaults applied when a request does not override them.
#[derive(Debug, Clone)]
pub struct ApiSettings {
  pub icon_path_template: String,
  pub digest_days:        u32,
  pub stats_days:         u32,
}

impl Default for ApiSettings {
  fn default() -> Self {
    Self {
      icon_path_template: DEFAULT_ICON_PATH_TEMPLATE.to_owned(),
      digest_days:        DEFAULT_DIGEST_DAYS,
      stats_days:         DEFAULT_STATS_DAYS,
    }
  }
}

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub settings: Arc<ApiSettings>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), settings: Arc::clone(&self.settings) }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, settings: ApiSettings) -> Router<()>
where
  S: MetricsStore + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let state = AppState { store, settings: Arc::new(settings) };

  Router::new()
    // Projects
    .route("/projects", get(projects::list::<S>).post(projects::create::<S>))
    .route(
      "/projects/{id}",
      get(projects::get_one::<S>).delete(projects::delete_one::<S>),
    )
    .route("/projects/{id}/active", put(projects::set_active::<S>))
    .route("/projects/{id}/stats", get(projects::stats::<S>))
    // Channels
    .route(
      "/channels/{channel}/{channel_id}/project",
      get(channels::find_project::<S>),
    )
    .route("/channels/{channel}/{channel_id}/latest", get(channels::latest::<S>))
    .route("/channels/{channel}/facts", post(channels::ingest::<S>))
    .route("/channels/{channel}/snapshot", get(channels::snapshot::<S>))
    // Digest
    .route("/digest", get(digest::compose_digest::<S>))
    .route("/latest", get(digest::latest::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
