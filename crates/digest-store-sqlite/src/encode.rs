//! Encoding and decoding helpers between domain types and the plain SQLite
//! column representations.
//!
//! Timestamps are stored as RFC 3339 UTC strings with second precision
//! (`2024-05-01T09:30:00Z`), which is also what the column defaults produce.
//! Rows written by external tools with `CURRENT_TIMESTAMP`
//! (`2024-05-01 09:30:00`) decode as UTC too.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use digest_core::{
  fact::{AcquisitionCounts, AggregateValue, Channel, DailyAggregate, Fact, FactValue},
  project::{ChannelIds, Project},
  store::ProjectFact,
};

use crate::{Error, Result};

// ─── Channel tables ──────────────────────────────────────────────────────────

/// Where a channel's facts live.
#[derive(Debug, Clone, Copy)]
pub struct ChannelTable {
  pub table:      &'static str,
  /// Column holding the channel identifier, in both the fact table and
  /// `projects`.
  pub key_column: &'static str,
}

pub fn channel_table(channel: Channel) -> ChannelTable {
  match channel {
    Channel::Vk => ChannelTable { table: "vk_balances", key_column: "vk_cabinet_id" },
    Channel::Yandex => ChannelTable {
      table:      "yandex_balances",
      key_column: "yandex_cabinet_id",
    },
    Channel::MyTracker => ChannelTable {
      table:      "mt_stats",
      key_column: "mytracker_project_id",
    },
  }
}

/// Value columns selected for a fact row, in a fixed order per channel.
pub fn value_columns(channel: Channel) -> &'static str {
  if channel.is_balance() {
    "balance, NULL, NULL, NULL"
  } else {
    "NULL, registrations, first_logins, reactivations"
  }
}

// ─── DateTime<Utc> / NaiveDate ───────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|naive| naive.and_utc())
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_date(date: NaiveDate) -> String { date.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Counters ────────────────────────────────────────────────────────────────

/// Counters above `i64::MAX` do not fit an SQLite `INTEGER` and are refused.
pub fn encode_count(n: u64) -> rusqlite::Result<i64> {
  i64::try_from(n).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

pub fn decode_count(n: Option<i64>) -> u64 {
  n.and_then(|v| u64::try_from(v).ok()).unwrap_or(0)
}

/// Decode a `TOTAL()` of counters, saturating at `u64::MAX`.
pub fn decode_total(n: Option<f64>) -> u64 {
  n.filter(|v| v.is_finite() && *v > 0.0).map_or(0, |v| v as u64)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns of a fact row; value columns not used by the channel are NULL.
pub struct RawFact {
  pub id:            i64,
  pub channel_key:   String,
  pub balance:       Option<f64>,
  pub registrations: Option<i64>,
  pub first_logins:  Option<i64>,
  pub reactivations: Option<i64>,
  pub fetched_at:    String,
}

impl RawFact {
  /// Read the columns produced by `SELECT id, <key>, <value_columns>, fetched_at`.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(offset)?,
      channel_key:   row.get(offset + 1)?,
      balance:       row.get(offset + 2)?,
      registrations: row.get(offset + 3)?,
      first_logins:  row.get(offset + 4)?,
      reactivations: row.get(offset + 5)?,
      fetched_at:    row.get(offset + 6)?,
    })
  }

  pub fn into_fact(self, channel: Channel) -> Result<Fact> {
    let value = match channel {
      Channel::Vk => FactValue::Vk(self.balance.unwrap_or(0.0)),
      Channel::Yandex => FactValue::Yandex(self.balance.unwrap_or(0.0)),
      Channel::MyTracker => FactValue::MyTracker(AcquisitionCounts {
        registrations: decode_count(self.registrations),
        first_logins:  decode_count(self.first_logins),
        reactivations: decode_count(self.reactivations),
      }),
    };
    Ok(Fact {
      fact_id: self.id,
      channel_key: self.channel_key,
      value,
      fetched_at: decode_dt(&self.fetched_at)?,
    })
  }
}

/// Raw columns of a `GROUP BY date(fetched_at)` aggregate row.
pub struct RawAggregate {
  pub date:          String,
  pub avg_balance:   Option<f64>,
  pub registrations: Option<f64>,
  pub first_logins:  Option<f64>,
  pub reactivations: Option<f64>,
}

impl RawAggregate {
  pub fn into_daily(self, channel: Channel) -> Result<DailyAggregate> {
    let value = if channel.is_balance() {
      AggregateValue::Balance { avg_balance: self.avg_balance }
    } else {
      AggregateValue::Acquisition(AcquisitionCounts {
        registrations: decode_total(self.registrations),
        first_logins:  decode_total(self.first_logins),
        reactivations: decode_total(self.reactivations),
      })
    };
    Ok(DailyAggregate { date: decode_date(&self.date)?, value })
  }
}

/// Projection used by every `projects` query.
pub const PROJECT_COLUMNS: &str =
  "id, name, vk_cabinet_id, yandex_cabinet_id, mytracker_project_id, is_active";

/// Raw columns of a `projects` row.
pub struct RawProject {
  pub id:                   i64,
  pub name:                 String,
  pub vk_cabinet_id:        Option<String>,
  pub yandex_cabinet_id:    Option<String>,
  pub mytracker_project_id: Option<String>,
  pub is_active:            bool,
}

impl RawProject {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                   row.get(0)?,
      name:                 row.get(1)?,
      vk_cabinet_id:        row.get(2)?,
      yandex_cabinet_id:    row.get(3)?,
      mytracker_project_id: row.get(4)?,
      is_active:            row.get(5)?,
    })
  }

  pub fn into_project(self) -> Project {
    Project {
      project_id: self.id,
      name:       self.name,
      channels:   ChannelIds {
        vk_cabinet_id:        self.vk_cabinet_id,
        yandex_cabinet_id:    self.yandex_cabinet_id,
        mytracker_project_id: self.mytracker_project_id,
      },
      is_active:  self.is_active,
    }
  }
}

/// A fact row prefixed with the name of the project that claims it.
pub struct RawProjectFact {
  pub project_name: String,
  pub fact:         RawFact,
}

impl RawProjectFact {
  pub fn into_project_fact(self, channel: Channel) -> Result<ProjectFact> {
    Ok(ProjectFact {
      project_name: self.project_name,
      fact:         self.fact.into_fact(channel)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_use_second_precision_utc() {
    let dt = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    assert_eq!(encode_dt(dt), "2024-05-01T09:30:00Z");
    assert_eq!(decode_dt("2024-05-01T09:30:00Z").unwrap(), dt);
  }

  #[test]
  fn sqlite_current_timestamp_format_decodes() {
    let dt = decode_dt("2024-05-01 09:30:00").unwrap();
    assert_eq!(dt, Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap());
    assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
  }

  #[test]
  fn negative_counters_clamp_to_zero() {
    assert_eq!(decode_count(Some(-3)), 0);
    assert_eq!(decode_count(None), 0);
    assert_eq!(decode_count(Some(7)), 7);
  }

  #[test]
  fn counters_beyond_integer_range_are_refused() {
    assert_eq!(encode_count(42).unwrap(), 42);
    assert_eq!(encode_count(i64::MAX as u64).unwrap(), i64::MAX);
    assert!(encode_count(u64::MAX).is_err());
  }

  #[test]
  fn counter_totals_saturate() {
    assert_eq!(decode_total(None), 0);
    assert_eq!(decode_total(Some(12.0)), 12);
    assert_eq!(decode_total(Some(-1.0)), 0);
    assert_eq!(decode_total(Some(1.0e30)), u64::MAX);
  }
}
