//! Period aggregation over a project's channels.
//!
//! [`period_stats`] asks the store for the per-day reduction of each configured
//! channel over a lookback window. [`latest_snapshot`] reports the single most
//! recent observation per channel for every active project.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  fact::{AcquisitionCounts, Channel, DailyAggregate},
  project::ChannelIds,
  store::MetricsStore,
};

/// Lookback used when a caller asks for project stats without a window.
pub const DEFAULT_STATS_DAYS: u32 = 7;

/// Per-channel daily aggregates for one project. A field is present only when
/// the corresponding channel identifier was supplied; it may still be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vk_balances:     Option<Vec<DailyAggregate>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub yandex_balances: Option<Vec<DailyAggregate>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mt_stats:        Option<Vec<DailyAggregate>>,
}

impl PeriodStats {
  pub fn get(&self, channel: Channel) -> Option<&[DailyAggregate]> {
    match channel {
      Channel::Vk => self.vk_balances.as_deref(),
      Channel::Yandex => self.yandex_balances.as_deref(),
      Channel::MyTracker => self.mt_stats.as_deref(),
    }
  }

  fn set(&mut self, channel: Channel, rows: Vec<DailyAggregate>) {
    let slot = match channel {
      Channel::Vk => &mut self.vk_balances,
      Channel::Yandex => &mut self.yandex_balances,
      Channel::MyTracker => &mut self.mt_stats,
    };
    *slot = Some(rows);
  }
}

/// `0000-01-01T00:00:00Z`, the earliest instant SQLite date functions accept.
const EARLIEST_WINDOW_START_SECS: i64 = -62_167_219_200;

/// Earliest start a lookback window is clamped to.
pub fn earliest_window_start() -> DateTime<Utc> {
  DateTime::from_timestamp(EARLIEST_WINDOW_START_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Start of a lookback window of `days` ending at `as_of` (default now).
///
/// Windows reaching further back than [`earliest_window_start`] are clamped
/// to it and cover all history.
pub fn window_start(days: u32, as_of: Option<DateTime<Utc>>) -> DateTime<Utc> {
  let floor = earliest_window_start();
  as_of
    .unwrap_or_else(Utc::now)
    .checked_sub_signed(Duration::days(i64::from(days)))
    .map_or(floor, |start| start.max(floor))
}

/// Daily aggregates for every channel in `channels` since `days` before
/// `as_of`. Each channel costs one store round trip.
pub async fn period_stats<S: MetricsStore>(
  store: &S,
  channels: &ChannelIds,
  days: u32,
  as_of: Option<DateTime<Utc>>,
) -> Result<PeriodStats, S::Error> {
  let since = window_start(days, as_of);
  let mut stats = PeriodStats::default();

  for (channel, channel_id) in channels.iter() {
    let rows = store.query_range(channel, channel_id, since).await?;
    tracing::debug!(%channel, channel_id, rows = rows.len(), "period aggregate");
    stats.set(channel, rows);
  }

  Ok(stats)
}

// ─── Latest snapshot ─────────────────────────────────────────────────────────

/// The most recent raw value of each configured channel of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestValues {
  pub project_name:   String,
  pub vk_balance:     Option<f64>,
  pub yandex_balance: Option<f64>,
  pub mytracker:      Option<AcquisitionCounts>,
}

/// Latest values for every active project, in registry order.
pub async fn latest_snapshot<S: MetricsStore>(
  store: &S,
) -> Result<Vec<LatestValues>, S::Error> {
  let projects = store.list_projects().await?;
  let mut out = Vec::new();

  for project in projects.into_iter().filter(|p| p.is_active) {
    let mut values = LatestValues {
      project_name:   project.name.clone(),
      vk_balance:     None,
      yandex_balance: None,
      mytracker:      None,
    };
    for (channel, channel_id) in project.channels.iter() {
      let Some(fact) = store.query_latest(channel, channel_id).await? else {
        continue;
      };
      match channel {
        Channel::Vk => values.vk_balance = fact.value.as_balance(),
        Channel::Yandex => values.yandex_balance = fact.value.as_balance(),
        Channel::MyTracker => values.mytracker = fact.value.as_counts(),
      }
    }
    out.push(values);
  }

  Ok(out)
}
