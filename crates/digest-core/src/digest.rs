//! Digest composition: current value and day-over-day change per project and
//! channel.
//!
//! For each active project the composer pulls a short [`period_stats`] window
//! and, for every channel that produced at least one daily aggregate, compares
//! the last day against the day before it. A channel with no configuration or
//! no data in the window is silently left out; composing never fails because
//! of missing history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  aggregate::{PeriodStats, period_stats},
  fact::{AggregateValue, Channel, DailyAggregate},
  format::{change_percent, format_amount, format_count, icon_path},
  project::Project,
  store::MetricsStore,
};

/// Lookback used for digests: today plus the day before.
pub const DEFAULT_DIGEST_DAYS: u32 = 2;
pub const DEFAULT_ICON_PATH_TEMPLATE: &str = "icons/{name}.png";

// ─── Output shape ────────────────────────────────────────────────────────────

/// Channel-specific part of a [`DigestRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum ChannelDetail {
  Vk {
    icon_path: String,
  },
  Yandex,
  #[serde(rename = "mytracker")]
  MyTracker {
    registrations:          String,
    first_logins:           String,
    reactivations:          String,
    /// Unformatted registration count of the current day.
    raw_registration_count: u64,
  },
}

/// One line of the digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestRecord {
  pub project_name:   String,
  /// The current day's value formatted for display.
  pub current_value:  String,
  /// Signed change against the previous day, rounded to two decimals.
  pub change_percent: f64,
  #[serde(flatten)]
  pub detail:         ChannelDetail,
}

/// The composed digest: one list per channel, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Digest {
  pub vk:     Vec<DigestRecord>,
  pub yandex: Vec<DigestRecord>,
  pub mt:     Vec<DigestRecord>,
}

impl Digest {
  pub fn is_empty(&self) -> bool {
    self.vk.is_empty() && self.yandex.is_empty() && self.mt.is_empty()
  }

  fn push(&mut self, channel: Channel, record: DigestRecord) {
    match channel {
      Channel::Vk => self.vk.push(record),
      Channel::Yandex => self.yandex.push(record),
      Channel::MyTracker => self.mt.push(record),
    }
  }
}

// ─── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DigestOptions {
  pub lookback_days:      u32,
  /// Path template for VK icons; `{name}` is replaced by the project slug.
  pub icon_path_template: String,
  /// End of the lookback window. Defaults to now.
  pub as_of:              Option<DateTime<Utc>>,
}

impl Default for DigestOptions {
  fn default() -> Self {
    Self {
      lookback_days:      DEFAULT_DIGEST_DAYS,
      icon_path_template: DEFAULT_ICON_PATH_TEMPLATE.to_owned(),
      as_of:              None,
    }
  }
}

// ─── Composition ─────────────────────────────────────────────────────────────

/// Compose the digest for every active project in `store`.
pub async fn compose<S: MetricsStore>(
  store: &S,
  options: &DigestOptions,
) -> Result<Digest, S::Error> {
  let projects = store.list_projects().await?;
  let mut digest = Digest::default();

  for project in projects.iter().filter(|p| p.is_active) {
    let stats = period_stats(
      store,
      &project.channels,
      options.lookback_days,
      options.as_of,
    )
    .await?;

    let records = project_records(project, &stats, &options.icon_path_template);
    tracing::debug!(
      project = %project.name,
      records = records.len(),
      "composed project digest"
    );
    for (channel, record) in records {
      digest.push(channel, record);
    }
  }

  Ok(digest)
}

/// Build the zero to three records a project contributes.
pub fn project_records(
  project: &Project,
  stats: &PeriodStats,
  icon_path_template: &str,
) -> Vec<(Channel, DigestRecord)> {
  Channel::ALL
    .into_iter()
    .filter_map(|channel| {
      let rows = stats.get(channel)?;
      let record = channel_record(channel, &project.name, rows, icon_path_template)?;
      Some((channel, record))
    })
    .collect()
}

/// The last row and the row before it; a single row is compared to itself.
fn comparison_points(
  rows: &[DailyAggregate],
) -> Option<(&DailyAggregate, &DailyAggregate)> {
  let current = rows.last()?;
  let previous = rows.len().checked_sub(2).map_or(current, |i| &rows[i]);
  Some((current, previous))
}

fn channel_record(
  channel: Channel,
  project_name: &str,
  rows: &[DailyAggregate],
  icon_path_template: &str,
) -> Option<DigestRecord> {
  let (current, previous) = comparison_points(rows)?;
  let change = change_percent(current.value.headline(), previous.value.headline());

  let (current_value, detail) = match (channel, current.value) {
    (Channel::MyTracker, AggregateValue::Acquisition(counts)) => (
      format_count(Some(counts.registrations)),
      ChannelDetail::MyTracker {
        registrations:          format_count(Some(counts.registrations)),
        first_logins:           format_count(Some(counts.first_logins)),
        reactivations:          format_count(Some(counts.reactivations)),
        raw_registration_count: counts.registrations,
      },
    ),
    (Channel::Vk, AggregateValue::Balance { avg_balance }) => (
      format_amount(avg_balance),
      ChannelDetail::Vk { icon_path: icon_path(icon_path_template, project_name) },
    ),
    (Channel::Yandex, AggregateValue::Balance { avg_balance }) => {
      (format_amount(avg_balance), ChannelDetail::Yandex)
    }
    // A backend returning the wrong aggregate shape for a channel yields no
    // record rather than a mislabeled one.
    _ => return None,
  };

  Some(DigestRecord {
    project_name: project_name.to_owned(),
    current_value,
    change_percent: change,
    detail,
  })
}
