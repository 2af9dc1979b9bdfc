//! Fact types: the time-series rows collected per channel.
//!
//! A fact is a single observation of a channel metric (an ad-cabinet balance or
//! a day of MyTracker acquisition counts) taken at `fetched_at`. Facts are
//! append-only; they are keyed by the channel's own identifier rather than by
//! the project id, so a fact may outlive the project it was collected for.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Channel ─────────────────────────────────────────────────────────────────

/// The three metric sources a project can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
  /// VK ads cabinet balance.
  Vk,
  /// Yandex Direct cabinet balance.
  Yandex,
  /// MyTracker acquisition stats.
  #[serde(alias = "mt")]
  MyTracker,
}

impl Channel {
  pub const ALL: [Channel; 3] = [Channel::Vk, Channel::Yandex, Channel::MyTracker];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Vk => "vk",
      Self::Yandex => "yandex",
      Self::MyTracker => "mytracker",
    }
  }

  pub fn is_balance(self) -> bool { !matches!(self, Self::MyTracker) }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Channel {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_lowercase().as_str() {
      "vk" => Ok(Self::Vk),
      "yandex" => Ok(Self::Yandex),
      "mytracker" | "mt" => Ok(Self::MyTracker),
      _ => Err(Error::UnknownChannel(s.to_owned())),
    }
  }
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// Registration-funnel counters reported by MyTracker.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct AcquisitionCounts {
  #[serde(default)]
  pub registrations: u64,
  #[serde(default)]
  pub first_logins:  u64,
  #[serde(default)]
  pub reactivations: u64,
}

impl AcquisitionCounts {
  /// Largest counter value a store can persist (SQLite `INTEGER`).
  pub const MAX_STORED: u64 = i64::MAX as u64;

  /// Whether every counter fits in [`Self::MAX_STORED`].
  pub fn is_storable(&self) -> bool {
    [self.registrations, self.first_logins, self.reactivations]
      .iter()
      .all(|&n| n <= Self::MAX_STORED)
  }
}

/// The typed payload of a fact. The variant decides which table it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "data", rename_all = "lowercase")]
pub enum FactValue {
  Vk(f64),
  Yandex(f64),
  #[serde(rename = "mytracker")]
  MyTracker(AcquisitionCounts),
}

impl FactValue {
  /// Build a balance value for `channel`.
  pub fn balance(channel: Channel, amount: f64) -> Result<Self> {
    match channel {
      Channel::Vk => Ok(Self::Vk(amount)),
      Channel::Yandex => Ok(Self::Yandex(amount)),
      Channel::MyTracker => Err(Error::NotABalanceChannel(channel)),
    }
  }

  pub fn channel(&self) -> Channel {
    match self {
      Self::Vk(_) => Channel::Vk,
      Self::Yandex(_) => Channel::Yandex,
      Self::MyTracker(_) => Channel::MyTracker,
    }
  }

  /// The balance carried by a VK or Yandex fact.
  pub fn as_balance(&self) -> Option<f64> {
    match self {
      Self::Vk(b) | Self::Yandex(b) => Some(*b),
      Self::MyTracker(_) => None,
    }
  }

  pub fn as_counts(&self) -> Option<AcquisitionCounts> {
    match self {
      Self::MyTracker(c) => Some(*c),
      _ => None,
    }
  }
}

// ─── Fact ────────────────────────────────────────────────────────────────────

/// A stored observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
  /// Row id within the channel's table.
  pub fact_id:     i64,
  /// The external cabinet / project identifier the value belongs to.
  pub channel_key: String,
  pub value:       FactValue,
  pub fetched_at:  DateTime<Utc>,
}

/// Input to [`crate::store::MetricsStore::record`].
#[derive(Debug, Clone)]
pub struct NewFact {
  pub channel_key: String,
  pub value:       FactValue,
  /// Defaults to the time of insertion.
  pub fetched_at:  Option<DateTime<Utc>>,
}

impl NewFact {
  pub fn new(channel_key: impl Into<String>, value: FactValue) -> Self {
    Self { channel_key: channel_key.into(), value, fetched_at: None }
  }

  pub fn at(mut self, fetched_at: DateTime<Utc>) -> Self {
    self.fetched_at = Some(fetched_at);
    self
  }
}

// ─── Bulk rows ───────────────────────────────────────────────────────────────

/// One loosely-typed row of a bulk ingestion batch, as delivered by a
/// collector. Which fields matter depends on the target channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
  #[serde(default, alias = "id", alias = "cabinet_id")]
  pub channel_key:   Option<String>,
  #[serde(default)]
  pub balance:       Option<f64>,
  #[serde(default)]
  pub registrations: Option<u64>,
  #[serde(default)]
  pub first_logins:  Option<u64>,
  #[serde(default)]
  pub reactivations: Option<u64>,
}

impl FactRow {
  pub fn balance(channel_key: impl Into<String>, balance: f64) -> Self {
    Self {
      channel_key: Some(channel_key.into()),
      balance: Some(balance),
      ..Self::default()
    }
  }

  pub fn counts(channel_key: impl Into<String>, counts: AcquisitionCounts) -> Self {
    Self {
      channel_key: Some(channel_key.into()),
      registrations: Some(counts.registrations),
      first_logins: Some(counts.first_logins),
      reactivations: Some(counts.reactivations),
      ..Self::default()
    }
  }

  /// Validate the row for `channel`, returning the key and typed value.
  ///
  /// Rows without a key, balance rows without a balance, and counter rows
  /// with a counter above [`AcquisitionCounts::MAX_STORED`] yield `None`.
  /// Missing counters default to zero.
  pub fn into_parts(self, channel: Channel) -> Option<(String, FactValue)> {
    let key = self.channel_key.filter(|k| !k.trim().is_empty())?;
    let value = match channel {
      Channel::Vk => FactValue::Vk(self.balance?),
      Channel::Yandex => FactValue::Yandex(self.balance?),
      Channel::MyTracker => {
        let counts = AcquisitionCounts {
          registrations: self.registrations.unwrap_or(0),
          first_logins:  self.first_logins.unwrap_or(0),
          reactivations: self.reactivations.unwrap_or(0),
        };
        if !counts.is_storable() {
          return None;
        }
        FactValue::MyTracker(counts)
      }
    };
    Some((key, value))
  }
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

/// The reduced value of one calendar day of facts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregateValue {
  /// Mean of the day's balance observations.
  Balance { avg_balance: Option<f64> },
  /// Per-field sum of the day's counters.
  Acquisition(AcquisitionCounts),
}

impl AggregateValue {
  /// The number the digest compares day over day: the mean balance, or the
  /// registration count.
  pub fn headline(&self) -> Option<f64> {
    match self {
      Self::Balance { avg_balance } => *avg_balance,
      Self::Acquisition(c) => Some(c.registrations as f64),
    }
  }
}

/// One row of a period aggregate: a calendar date (UTC) and its reduction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
  pub date:  NaiveDate,
  #[serde(flatten)]
  pub value: AggregateValue,
}
