//! The `MetricsStore` trait and supporting input/output types.
//!
//! The trait is implemented by storage backends (e.g. `digest-store-sqlite`).
//! The aggregator, the digest composer and the HTTP layer depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  fact::{Channel, DailyAggregate, Fact, FactRow, NewFact},
  project::{NewProject, Project},
};

// ─── Batch type ──────────────────────────────────────────────────────────────

/// Parameters for [`MetricsStore::record_many`].
#[derive(Debug, Clone)]
pub struct FactBatch {
  pub channel:          Channel,
  pub rows:             Vec<FactRow>,
  /// Timestamp applied to every row; defaults to the time of insertion.
  pub fetched_at:       Option<DateTime<Utc>>,
  /// Delete the batch keys' rows for the batch date before inserting, so that
  /// re-ingesting a day replaces it instead of duplicating it.
  pub replace_for_date: bool,
}

impl FactBatch {
  pub fn new(channel: Channel, rows: Vec<FactRow>) -> Self {
    Self { channel, rows, fetched_at: None, replace_for_date: false }
  }
}

/// A fact joined back to the project that currently claims its channel key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFact {
  pub project_name: String,
  #[serde(flatten)]
  pub fact:         Fact,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a metrics store backend: the project registry plus the
/// three append-only fact tables.
///
/// Lookups that miss return `None` / `false` rather than an error; only
/// failures of the backend itself surface as `Err`.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait MetricsStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Projects ──────────────────────────────────────────────────────────

  /// Register a new, active project.
  fn add_project(
    &self,
    input: NewProject,
  ) -> impl Future<Output = Result<Project, Self::Error>> + Send + '_;

  /// All projects, active or not, ordered by id.
  fn list_projects(
    &self,
  ) -> impl Future<Output = Result<Vec<Project>, Self::Error>> + Send + '_;

  fn get_project(
    &self,
    project_id: i64,
  ) -> impl Future<Output = Result<Option<Project>, Self::Error>> + Send + '_;

  /// The active project whose `channel` identifier equals `channel_id`.
  ///
  /// Inactive projects are never returned. If several active projects share
  /// an identifier the one with the lowest id wins.
  fn find_project_by_channel<'a>(
    &'a self,
    channel: Channel,
    channel_id: &'a str,
  ) -> impl Future<Output = Result<Option<Project>, Self::Error>> + Send + 'a;

  /// Returns `false` if no project has this id.
  fn set_project_active(
    &self,
    project_id: i64,
    is_active: bool,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Remove a project and every fact recorded under its channel identifiers.
  /// Returns `false` if no project has this id.
  fn delete_project(
    &self,
    project_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Facts: append-only writes ─────────────────────────────────────────

  /// Record a single observation and return it as stored.
  fn record(
    &self,
    input: NewFact,
  ) -> impl Future<Output = Result<Fact, Self::Error>> + Send + '_;

  /// Record a batch atomically and return how many rows were inserted.
  ///
  /// Rows that fail [`FactRow::into_parts`] are skipped and not counted.
  fn record_many(
    &self,
    batch: FactBatch,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Remove every fact for one channel key. Returns the number of rows removed.
  fn delete_facts<'a>(
    &'a self,
    channel: Channel,
    channel_key: &'a str,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Facts with `fetched_at >= since`, reduced to one row per UTC calendar
  /// date (mean balance or summed counters) in ascending date order. Dates
  /// without facts produce no row.
  fn query_range<'a>(
    &'a self,
    channel: Channel,
    channel_key: &'a str,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DailyAggregate>, Self::Error>> + Send + 'a;

  /// The most recently fetched fact for a channel key.
  fn query_latest<'a>(
    &'a self,
    channel: Channel,
    channel_key: &'a str,
  ) -> impl Future<Output = Result<Option<Fact>, Self::Error>> + Send + 'a;

  /// Every fact of `channel` fetched on `date` (UTC) whose key is claimed by
  /// a project, with that project's name.
  fn facts_for_date(
    &self,
    channel: Channel,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<ProjectFact>, Self::Error>> + Send + '_;
}
