//! [`SqliteStore`]: the SQLite implementation of [`MetricsStore`].

use std::{collections::BTreeSet, path::Path};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension as _;

use digest_core::{
  fact::{Channel, DailyAggregate, Fact, FactValue, NewFact},
  project::{NewProject, Project},
  store::{FactBatch, MetricsStore, ProjectFact},
};

use crate::{
  Result,
  encode::{
    PROJECT_COLUMNS, RawAggregate, RawFact, RawProject, RawProjectFact,
    channel_table, decode_dt, encode_count, encode_date, encode_dt, value_columns,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A metrics store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run an external SQL script (e.g. a bootstrap or seed file) in one batch.
  pub async fn execute_script(&self, sql: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Insert one typed fact and return its row id.
fn insert_fact(
  conn: &rusqlite::Connection,
  channel_key: &str,
  value: &FactValue,
  fetched_at: &str,
) -> rusqlite::Result<i64> {
  let t = channel_table(value.channel());
  match value {
    FactValue::Vk(balance) | FactValue::Yandex(balance) => {
      conn.execute(
        &format!(
          "INSERT INTO {} ({}, balance, fetched_at) VALUES (?1, ?2, ?3)",
          t.table, t.key_column
        ),
        rusqlite::params![channel_key, balance, fetched_at],
      )?;
    }
    FactValue::MyTracker(counts) => {
      let registrations = encode_count(counts.registrations)?;
      let first_logins  = encode_count(counts.first_logins)?;
      let reactivations = encode_count(counts.reactivations)?;
      conn.execute(
        "INSERT INTO mt_stats (
           mytracker_project_id, registrations, first_logins, reactivations, fetched_at
         ) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
          channel_key,
          registrations,
          first_logins,
          reactivations,
          fetched_at,
        ],
      )?;
    }
  }
  Ok(conn.last_insert_rowid())
}

// ─── MetricsStore impl ───────────────────────────────────────────────────────

impl MetricsStore for SqliteStore {
  type Error = crate::Error;

  // ── Projects ──────────────────────────────────────────────────────────────

  async fn add_project(&self, input: NewProject) -> Result<Project> {
    let name     = input.name.clone();
    let channels = input.channels.clone();

    let project_id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO projects (name, vk_cabinet_id, yandex_cabinet_id, mytracker_project_id)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![
            name,
            channels.vk_cabinet_id,
            channels.yandex_cabinet_id,
            channels.mytracker_project_id,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    tracing::info!(project_id, name = %input.name, "registered project");

    Ok(Project {
      project_id,
      name: input.name,
      channels: input.channels,
      is_active: true,
    })
  }

  async fn list_projects(&self) -> Result<Vec<Project>> {
    let raws: Vec<RawProject> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id"))?;
        let rows = stmt
          .query_map([], RawProject::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawProject::into_project).collect())
  }

  async fn get_project(&self, project_id: i64) -> Result<Option<Project>> {
    let raw: Option<RawProject> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            rusqlite::params![project_id],
            RawProject::from_row,
          )
          .optional()?)
      })
      .await?;

    Ok(raw.map(RawProject::into_project))
  }

  async fn find_project_by_channel(
    &self,
    channel:    Channel,
    channel_id: &str,
  ) -> Result<Option<Project>> {
    let key_column = channel_table(channel).key_column;
    let id_str     = channel_id.to_owned();

    let raw: Option<RawProject> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {PROJECT_COLUMNS} FROM projects
               WHERE {key_column} = ?1 AND is_active = 1
               ORDER BY id LIMIT 1"
            ),
            rusqlite::params![id_str],
            RawProject::from_row,
          )
          .optional()?)
      })
      .await?;

    Ok(raw.map(RawProject::into_project))
  }

  async fn set_project_active(&self, project_id: i64, is_active: bool) -> Result<bool> {
    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE projects SET is_active = ?1 WHERE id = ?2",
          rusqlite::params![is_active, project_id],
        )?)
      })
      .await?;

    Ok(updated > 0)
  }

  async fn delete_project(&self, project_id: i64) -> Result<bool> {
    let removed: Option<usize> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let project = tx
          .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            rusqlite::params![project_id],
            RawProject::from_row,
          )
          .optional()?
          .map(RawProject::into_project);

        let Some(project) = project else {
          return Ok(None);
        };

        let mut facts_removed = 0;
        for (channel, channel_id) in project.channels.iter() {
          let t = channel_table(channel);
          facts_removed += tx.execute(
            &format!("DELETE FROM {} WHERE {} = ?1", t.table, t.key_column),
            rusqlite::params![channel_id],
          )?;
        }
        tx.execute("DELETE FROM projects WHERE id = ?1", rusqlite::params![project_id])?;
        tx.commit()?;

        Ok(Some(facts_removed))
      })
      .await?;

    match removed {
      Some(facts_removed) => {
        tracing::info!(project_id, facts_removed, "deleted project");
        Ok(true)
      }
      None => Ok(false),
    }
  }

  // ── Facts: append-only writes ─────────────────────────────────────────────

  async fn record(&self, input: NewFact) -> Result<Fact> {
    let at_str     = encode_dt(input.fetched_at.unwrap_or_else(Utc::now));
    let fetched_at = decode_dt(&at_str)?;
    let key        = input.channel_key.clone();
    let value      = input.value;

    let fact_id = self
      .conn
      .call(move |conn| Ok(insert_fact(conn, &key, &value, &at_str)?))
      .await?;

    tracing::debug!(channel = %value.channel(), fact_id, "recorded fact");

    Ok(Fact {
      fact_id,
      channel_key: input.channel_key,
      value,
      fetched_at,
    })
  }

  async fn record_many(&self, batch: FactBatch) -> Result<usize> {
    let FactBatch { channel, rows, fetched_at, replace_for_date } = batch;
    let submitted = rows.len();
    let valid: Vec<(String, FactValue)> = rows
      .into_iter()
      .filter_map(|row| row.into_parts(channel))
      .collect();

    if valid.is_empty() {
      tracing::info!(%channel, submitted, inserted = 0, "bulk insert had no valid rows");
      return Ok(0);
    }

    let fetched_at = fetched_at.unwrap_or_else(Utc::now);
    let at_str     = encode_dt(fetched_at);
    let date_str   = encode_date(fetched_at.date_naive());
    let t          = channel_table(channel);

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if replace_for_date {
          let keys: BTreeSet<&str> = valid.iter().map(|(k, _)| k.as_str()).collect();
          let mut stmt = tx.prepare(&format!(
            "DELETE FROM {} WHERE {} = ?1 AND date(fetched_at) = ?2",
            t.table, t.key_column
          ))?;
          for key in keys {
            stmt.execute(rusqlite::params![key, date_str])?;
          }
        }

        for (key, value) in &valid {
          insert_fact(&tx, key, value, &at_str)?;
        }
        tx.commit()?;

        Ok(valid.len())
      })
      .await?;

    tracing::info!(
      %channel,
      submitted,
      inserted,
      skipped = submitted - inserted,
      replace_for_date,
      "bulk insert"
    );
    Ok(inserted)
  }

  async fn delete_facts(&self, channel: Channel, channel_key: &str) -> Result<usize> {
    let t      = channel_table(channel);
    let id_str = channel_key.to_owned();

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          &format!("DELETE FROM {} WHERE {} = ?1", t.table, t.key_column),
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    Ok(removed)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn query_range(
    &self,
    channel:     Channel,
    channel_key: &str,
    since:       DateTime<Utc>,
  ) -> Result<Vec<DailyAggregate>> {
    let t         = channel_table(channel);
    let id_str    = channel_key.to_owned();
    let since_str = encode_dt(since);
    let reduce    = if channel.is_balance() {
      "AVG(balance), NULL, NULL, NULL"
    } else {
      "NULL, TOTAL(registrations), TOTAL(first_logins), TOTAL(reactivations)"
    };

    let raws: Vec<RawAggregate> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT date(fetched_at) AS day, {reduce}
           FROM {}
           WHERE {} = ?1 AND julianday(fetched_at) >= julianday(?2)
           GROUP BY day
           ORDER BY day",
          t.table, t.key_column
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, since_str], |row| {
            Ok(RawAggregate {
              date:          row.get(0)?,
              avg_balance:   row.get(1)?,
              registrations: row.get(2)?,
              first_logins:  row.get(3)?,
              reactivations: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_daily(channel)).collect()
  }

  async fn query_latest(
    &self,
    channel:     Channel,
    channel_key: &str,
  ) -> Result<Option<Fact>> {
    let t      = channel_table(channel);
    let id_str = channel_key.to_owned();

    let raw: Option<RawFact> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT id, {}, {}, fetched_at FROM {}
               WHERE {} = ?1
               ORDER BY julianday(fetched_at) DESC, id DESC
               LIMIT 1",
              t.key_column,
              value_columns(channel),
              t.table,
              t.key_column
            ),
            rusqlite::params![id_str],
            |row| RawFact::from_row(row, 0),
          )
          .optional()?)
      })
      .await?;

    raw.map(|r| r.into_fact(channel)).transpose()
  }

  async fn facts_for_date(
    &self,
    channel: Channel,
    date:    NaiveDate,
  ) -> Result<Vec<ProjectFact>> {
    let t        = channel_table(channel);
    let date_str = encode_date(date);

    let raws: Vec<RawProjectFact> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT p.name, f.id, f.{key}, {values}, f.fetched_at
           FROM {table} f
           JOIN projects p ON p.{key} = f.{key}
           WHERE date(f.fetched_at) = ?1
           ORDER BY p.id, julianday(f.fetched_at), f.id",
          key = t.key_column,
          values = value_columns(channel),
          table = t.table,
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![date_str], |row| {
            Ok(RawProjectFact {
              project_name: row.get(0)?,
              fact:         RawFact::from_row(row, 1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|r| r.into_project_fact(channel))
      .collect()
  }
}
