//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use digest_core::{
  aggregate::{latest_snapshot, period_stats},
  digest::{ChannelDetail, DigestOptions, compose},
  fact::{AcquisitionCounts, AggregateValue, Channel, FactRow, FactValue, NewFact},
  format::format_count,
  project::{ChannelIds, NewProject},
  store::{FactBatch, MetricsStore},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

fn date(day: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, day).unwrap() }

fn counts(registrations: u64, first_logins: u64, reactivations: u64) -> AcquisitionCounts {
  AcquisitionCounts { registrations, first_logins, reactivations }
}

async fn count_rows(s: &SqliteStore, table: &'static str) -> i64 {
  s.conn
    .call(move |conn| {
      Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get::<_, i64>(0))?)
    })
    .await
    .unwrap()
}

// ─── Projects ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_project() {
  let s = store().await;

  let project = s
    .add_project(NewProject::new("Acme").with_channel(Channel::Vk, "cab1"))
    .await
    .unwrap();
  assert!(project.is_active);

  let fetched = s.get_project(project.project_id).await.unwrap().unwrap();
  assert_eq!(fetched, project);
  assert_eq!(fetched.channels.vk_cabinet_id.as_deref(), Some("cab1"));
  assert_eq!(fetched.channels.yandex_cabinet_id, None);
}

#[tokio::test]
async fn get_project_missing_returns_none() {
  let s = store().await;
  assert!(s.get_project(404).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_project_name_is_a_store_failure() {
  let s = store().await;
  s.add_project(NewProject::new("Acme")).await.unwrap();
  let err = s.add_project(NewProject::new("Acme")).await.unwrap_err();
  assert!(matches!(err, crate::Error::Database(_)));
}

#[tokio::test]
async fn list_projects_in_id_order() {
  let s = store().await;
  s.add_project(NewProject::new("B")).await.unwrap();
  s.add_project(NewProject::new("A")).await.unwrap();

  let all = s.list_projects().await.unwrap();
  let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
  assert_eq!(names, ["B", "A"]);
}

#[tokio::test]
async fn find_by_channel_ignores_inactive_projects() {
  let s = store().await;
  let p = s
    .add_project(NewProject::new("Acme").with_channel(Channel::Yandex, "ya-7"))
    .await
    .unwrap();

  let found = s
    .find_project_by_channel(Channel::Yandex, "ya-7")
    .await
    .unwrap();
  assert_eq!(found.map(|f| f.project_id), Some(p.project_id));

  // Same id under a different channel does not match.
  assert!(s.find_project_by_channel(Channel::Vk, "ya-7").await.unwrap().is_none());

  assert!(s.set_project_active(p.project_id, false).await.unwrap());
  assert!(s.find_project_by_channel(Channel::Yandex, "ya-7").await.unwrap().is_none());

  // Facts remain directly queryable while the project is inactive.
  s.record(NewFact::new("ya-7", FactValue::Yandex(10.0))).await.unwrap();
  assert!(s.query_latest(Channel::Yandex, "ya-7").await.unwrap().is_some());
}

#[tokio::test]
async fn set_active_on_unknown_project_returns_false() {
  let s = store().await;
  assert!(!s.set_project_active(99, true).await.unwrap());
}

#[tokio::test]
async fn delete_project_cascades_to_facts() {
  let s = store().await;
  let p = s
    .add_project(NewProject {
      name:     "Acme".into(),
      channels: ChannelIds {
        vk_cabinet_id:        Some("cab1".into()),
        yandex_cabinet_id:    Some("ya1".into()),
        mytracker_project_id: Some("mt1".into()),
      },
    })
    .await
    .unwrap();

  s.record(NewFact::new("cab1", FactValue::Vk(100.0))).await.unwrap();
  s.record(NewFact::new("ya1", FactValue::Yandex(50.0))).await.unwrap();
  s.record(NewFact::new("mt1", FactValue::MyTracker(counts(1, 1, 1))))
    .await
    .unwrap();
  // An unrelated cabinet survives.
  s.record(NewFact::new("cab2", FactValue::Vk(7.0))).await.unwrap();

  assert!(s.delete_project(p.project_id).await.unwrap());
  assert!(s.get_project(p.project_id).await.unwrap().is_none());
  assert_eq!(count_rows(&s, "vk_balances").await, 1);
  assert_eq!(count_rows(&s, "yandex_balances").await, 0);
  assert_eq!(count_rows(&s, "mt_stats").await, 0);

  // Second delete reports not found rather than failing.
  assert!(!s.delete_project(p.project_id).await.unwrap());
}

// ─── Facts ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_defaults_fetched_at_to_now() {
  let s = store().await;
  let before = Utc::now() - chrono::Duration::seconds(1);

  let fact = s.record(NewFact::new("cab1", FactValue::Vk(12.5))).await.unwrap();
  assert!(fact.fetched_at >= before);

  let latest = s.query_latest(Channel::Vk, "cab1").await.unwrap().unwrap();
  assert_eq!(latest, fact);
}

#[tokio::test]
async fn query_latest_picks_most_recent_fetch() {
  let s = store().await;
  s.record(NewFact::new("mt1", FactValue::MyTracker(counts(5, 4, 0))).at(at(2, 9)))
    .await
    .unwrap();
  s.record(NewFact::new("mt1", FactValue::MyTracker(counts(3, 2, 1))).at(at(1, 9)))
    .await
    .unwrap();

  let latest = s.query_latest(Channel::MyTracker, "mt1").await.unwrap().unwrap();
  assert_eq!(latest.value, FactValue::MyTracker(counts(5, 4, 0)));
  assert_eq!(latest.fetched_at, at(2, 9));

  assert!(s.query_latest(Channel::MyTracker, "nope").await.unwrap().is_none());
}

#[tokio::test]
async fn record_many_skips_invalid_rows() {
  let s = store().await;
  let rows = vec![
    FactRow::balance("cab1", 100.0),
    FactRow { channel_key: None, balance: Some(1.0), ..FactRow::default() },
    FactRow { channel_key: Some("cab2".into()), ..FactRow::default() },
    FactRow::balance("cab2", 20.0),
  ];

  let inserted = s.record_many(FactBatch::new(Channel::Vk, rows)).await.unwrap();
  assert_eq!(inserted, 2);
  assert_eq!(count_rows(&s, "vk_balances").await, 2);
}

#[tokio::test]
async fn record_many_defaults_missing_counts_to_zero() {
  let s = store().await;
  let rows = vec![FactRow {
    channel_key: Some("mt1".into()),
    registrations: Some(4),
    ..FactRow::default()
  }];
  s.record_many(FactBatch::new(Channel::MyTracker, rows)).await.unwrap();

  let latest = s.query_latest(Channel::MyTracker, "mt1").await.unwrap().unwrap();
  assert_eq!(latest.value, FactValue::MyTracker(counts(4, 0, 0)));
}

#[tokio::test]
async fn replace_for_date_is_idempotent() {
  let s = store().await;
  let batch = || FactBatch {
    channel:          Channel::Yandex,
    rows:             vec![FactRow::balance("ya1", 10.0), FactRow::balance("ya2", 20.0)],
    fetched_at:       Some(at(3, 8)),
    replace_for_date: true,
  };
  // A fact for another day and one for an unrelated key are untouched.
  s.record(NewFact::new("ya1", FactValue::Yandex(5.0)).at(at(2, 8))).await.unwrap();
  s.record(NewFact::new("ya9", FactValue::Yandex(5.0)).at(at(3, 7))).await.unwrap();

  assert_eq!(s.record_many(batch()).await.unwrap(), 2);
  let once = count_rows(&s, "yandex_balances").await;
  assert_eq!(s.record_many(batch()).await.unwrap(), 2);
  assert_eq!(count_rows(&s, "yandex_balances").await, once);
  assert_eq!(once, 4);
}

#[tokio::test]
async fn plain_record_many_appends() {
  let s = store().await;
  let batch = || FactBatch {
    fetched_at: Some(at(3, 8)),
    ..FactBatch::new(Channel::Vk, vec![FactRow::balance("cab1", 1.0)])
  };
  s.record_many(batch()).await.unwrap();
  s.record_many(batch()).await.unwrap();
  assert_eq!(count_rows(&s, "vk_balances").await, 2);
}

#[tokio::test]
async fn delete_facts_by_key() {
  let s = store().await;
  s.record(NewFact::new("cab1", FactValue::Vk(1.0))).await.unwrap();
  s.record(NewFact::new("cab1", FactValue::Vk(2.0))).await.unwrap();
  s.record(NewFact::new("cab2", FactValue::Vk(3.0))).await.unwrap();

  assert_eq!(s.delete_facts(Channel::Vk, "cab1").await.unwrap(), 2);
  assert_eq!(s.delete_facts(Channel::Vk, "cab1").await.unwrap(), 0);
  assert_eq!(count_rows(&s, "vk_balances").await, 1);
}

#[tokio::test]
async fn facts_for_date_joins_project_names() {
  let s = store().await;
  s.add_project(NewProject::new("Acme").with_channel(Channel::Vk, "cab1"))
    .await
    .unwrap();
  s.record(NewFact::new("cab1", FactValue::Vk(100.0)).at(at(2, 9))).await.unwrap();
  s.record(NewFact::new("cab1", FactValue::Vk(90.0)).at(at(1, 9))).await.unwrap();
  // Orphaned facts are valid but never joined.
  s.record(NewFact::new("orphan", FactValue::Vk(1.0)).at(at(2, 9))).await.unwrap();

  let facts = s.facts_for_date(Channel::Vk, date(2)).await.unwrap();
  assert_eq!(facts.len(), 1);
  assert_eq!(facts[0].project_name, "Acme");
  assert_eq!(facts[0].fact.value, FactValue::Vk(100.0));
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn query_range_means_balances_per_day() {
  let s = store().await;
  for (amount, ts) in [(100.0, at(1, 9)), (200.0, at(1, 18)), (300.0, at(2, 9))] {
    s.record(NewFact::new("cab1", FactValue::Vk(amount)).at(ts)).await.unwrap();
  }

  let rows = s.query_range(Channel::Vk, "cab1", at(1, 0)).await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].date, date(1));
  assert_eq!(rows[0].value, AggregateValue::Balance { avg_balance: Some(150.0) });
  assert_eq!(rows[1].value, AggregateValue::Balance { avg_balance: Some(300.0) });
}

#[tokio::test]
async fn query_range_sums_counters_and_respects_window() {
  let s = store().await;
  let mt = |r, f, a, ts| NewFact::new("mt1", FactValue::MyTracker(counts(r, f, a))).at(ts);
  s.record(mt(99, 99, 99, at(1, 9))).await.unwrap();
  s.record(mt(4, 3, 1, at(3, 9))).await.unwrap();
  s.record(mt(6, 5, 0, at(3, 15))).await.unwrap();

  let rows = s.query_range(Channel::MyTracker, "mt1", at(2, 0)).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].date, date(3));
  assert_eq!(rows[0].value, AggregateValue::Acquisition(counts(10, 8, 1)));
}

#[tokio::test]
async fn query_range_is_sparse() {
  let s = store().await;
  s.record(NewFact::new("cab1", FactValue::Vk(1.0)).at(at(1, 9))).await.unwrap();
  s.record(NewFact::new("cab1", FactValue::Vk(2.0)).at(at(4, 9))).await.unwrap();

  let rows = s.query_range(Channel::Vk, "cab1", at(1, 0)).await.unwrap();
  let dates: Vec<_> = rows.iter().map(|r| r.date).collect();
  assert_eq!(dates, [date(1), date(4)]);
}

#[tokio::test]
async fn period_stats_only_reports_supplied_channels() {
  let s = store().await;
  s.record(NewFact::new("cab1", FactValue::Vk(5.0)).at(at(6, 9))).await.unwrap();

  let ids = ChannelIds {
    vk_cabinet_id:        Some("cab1".into()),
    yandex_cabinet_id:    None,
    mytracker_project_id: Some("mt-empty".into()),
  };
  let stats = period_stats(&s, &ids, 7, Some(at(7, 12))).await.unwrap();
  assert_eq!(stats.vk_balances.as_ref().map(Vec::len), Some(1));
  assert!(stats.yandex_balances.is_none());
  assert_eq!(stats.mt_stats, Some(Vec::new()));
}

#[tokio::test]
async fn latest_snapshot_covers_active_projects() {
  let s = store().await;
  s.add_project(
    NewProject::new("Acme")
      .with_channel(Channel::Vk, "cab1")
      .with_channel(Channel::MyTracker, "mt1"),
  )
  .await
  .unwrap();
  let hidden = s
    .add_project(NewProject::new("Hidden").with_channel(Channel::Vk, "cab2"))
    .await
    .unwrap();
  s.set_project_active(hidden.project_id, false).await.unwrap();

  s.record(NewFact::new("cab1", FactValue::Vk(1.0)).at(at(1, 9))).await.unwrap();
  s.record(NewFact::new("cab1", FactValue::Vk(2.0)).at(at(2, 9))).await.unwrap();
  s.record(NewFact::new("mt1", FactValue::MyTracker(counts(3, 2, 1)))).await.unwrap();

  let snapshot = latest_snapshot(&s).await.unwrap();
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot[0].project_name, "Acme");
  assert_eq!(snapshot[0].vk_balance, Some(2.0));
  assert_eq!(snapshot[0].yandex_balance, None);
  assert_eq!(snapshot[0].mytracker, Some(counts(3, 2, 1)));
}

// ─── Digest ──────────────────────────────────────────────────────────────────

fn options(as_of: DateTime<Utc>) -> DigestOptions {
  DigestOptions {
    icon_path_template: "icons/{name}.png".into(),
    as_of: Some(as_of),
    ..DigestOptions::default()
  }
}

#[tokio::test]
async fn digest_reports_vk_change_over_two_days() {
  let s = store().await;
  s.add_project(NewProject::new("Acme").with_channel(Channel::Vk, "cab1"))
    .await
    .unwrap();
  for (amount, ts) in [(100.0, at(1, 9)), (200.0, at(1, 10)), (300.0, at(2, 8))] {
    s.record(NewFact::new("cab1", FactValue::Vk(amount)).at(ts)).await.unwrap();
  }

  let digest = compose(&s, &options(at(2, 12))).await.unwrap();
  assert!(digest.yandex.is_empty());
  assert!(digest.mt.is_empty());
  assert_eq!(digest.vk.len(), 1);

  let record = &digest.vk[0];
  assert_eq!(record.project_name, "Acme");
  assert_eq!(record.current_value, "300,00");
  assert_eq!(record.change_percent, 100.0);
  assert_eq!(record.detail, ChannelDetail::Vk { icon_path: "icons/acme.png".into() });
}

#[tokio::test]
async fn digest_single_mytracker_day_has_zero_change() {
  let s = store().await;
  s.add_project(NewProject::new("Tracker Only").with_channel(Channel::MyTracker, "mt1"))
    .await
    .unwrap();
  s.record(NewFact::new("mt1", FactValue::MyTracker(counts(10, 8, 1))).at(at(2, 6)))
    .await
    .unwrap();

  let digest = compose(&s, &options(at(2, 12))).await.unwrap();
  assert!(digest.vk.is_empty());
  assert_eq!(digest.mt.len(), 1);

  let record = &digest.mt[0];
  assert_eq!(record.change_percent, 0.0);
  assert_eq!(
    record.detail,
    ChannelDetail::MyTracker {
      registrations:          "10".into(),
      first_logins:           "8".into(),
      reactivations:          "1".into(),
      raw_registration_count: 10,
    }
  );
}

#[tokio::test]
async fn digest_omits_inactive_projects_and_empty_windows() {
  let s = store().await;
  let inactive = s
    .add_project(NewProject::new("Paused").with_channel(Channel::Vk, "cab-p"))
    .await
    .unwrap();
  s.set_project_active(inactive.project_id, false).await.unwrap();
  s.record(NewFact::new("cab-p", FactValue::Vk(50.0)).at(at(2, 9))).await.unwrap();

  s.add_project(
    NewProject::new("Stale")
      .with_channel(Channel::Vk, "cab-s")
      .with_channel(Channel::Yandex, "ya-s"),
  )
  .await
  .unwrap();
  // Outside the two-day window.
  s.record(NewFact::new("cab-s", FactValue::Vk(70.0)).at(at(1, 9))).await.unwrap();
  s.record(NewFact::new("ya-s", FactValue::Yandex(80.0)).at(at(5, 9))).await.unwrap();

  let digest = compose(&s, &options(at(5, 12))).await.unwrap();
  assert!(digest.vk.is_empty());
  assert_eq!(digest.yandex.len(), 1);
  assert_eq!(digest.yandex[0].project_name, "Stale");
  assert_eq!(digest.yandex[0].current_value, "80,00");
  assert_eq!(digest.yandex[0].change_percent, 0.0);
}

#[tokio::test]
async fn digest_of_empty_store_is_empty() {
  let s = store().await;
  let digest = compose(&s, &DigestOptions::default()).await.unwrap();
  assert!(digest.is_empty());
}

// ─── Bootstrap ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn execute_script_applies_seed_data() {
  let s = store().await;
  s.execute_script(
    "CREATE TABLE IF NOT EXISTS projects (id INTEGER PRIMARY KEY);
     INSERT INTO projects (name, vk_cabinet_id) VALUES ('Seeded', 'cab9');"
      .to_owned(),
  )
  .await
  .unwrap();

  let found = s.find_project_by_channel(Channel::Vk, "cab9").await.unwrap();
  assert_eq!(found.map(|p| p.name), Some("Seeded".to_owned()));
}

#[tokio::test]
async fn execute_script_reports_sql_errors() {
  let s = store().await;
  assert!(s.execute_script("NOT VALID SQL".to_owned()).await.is_err());
}

// ─── Counter range and window bounds ─────────────────────────────────────────

#[tokio::test]
async fn record_refuses_counters_beyond_integer_range() {
  let s = store().await;
  let huge = FactValue::MyTracker(counts(u64::MAX, 0, 0));
  let err = s.record(NewFact::new("mt1", huge).at(at(1, 9))).await.unwrap_err();
  assert!(matches!(err, crate::Error::Database(_)));
  assert_eq!(count_rows(&s, "mt_stats").await, 0);
}

#[tokio::test]
async fn record_many_skips_counters_beyond_integer_range() {
  let s = store().await;
  let rows = vec![
    FactRow::counts("mt1", counts(u64::MAX, 1, 1)),
    FactRow::counts("mt1", counts(5, 1, 1)),
  ];
  let mut batch = FactBatch::new(Channel::MyTracker, rows);
  batch.fetched_at = Some(at(1, 9));

  assert_eq!(s.record_many(batch).await.unwrap(), 1);
  assert_eq!(count_rows(&s, "mt_stats").await, 1);
}

#[tokio::test]
async fn overflowing_daily_total_does_not_fail_other_projects() {
  let s = store().await;
  s.add_project(NewProject::new("Acme").with_channel(Channel::Vk, "cab1"))
    .await
    .unwrap();
  s.add_project(NewProject::new("Funnel").with_channel(Channel::MyTracker, "mt1"))
    .await
    .unwrap();

  s.record(NewFact::new("cab1", FactValue::Vk(50.0)).at(at(2, 8))).await.unwrap();
  let max = AcquisitionCounts::MAX_STORED;
  for hour in [9, 10] {
    s.record(NewFact::new("mt1", FactValue::MyTracker(counts(max, 1, 0))).at(at(2, hour)))
      .await
      .unwrap();
  }

  let digest = compose(&s, &options(at(2, 12))).await.unwrap();
  assert_eq!(digest.vk.len(), 1);
  assert_eq!(digest.vk[0].current_value, "50,00");
  assert_eq!(digest.mt.len(), 1);
  assert_eq!(
    digest.mt[0].detail,
    ChannelDetail::MyTracker {
      registrations:          format_count(Some(u64::MAX)),
      first_logins:           "2".into(),
      reactivations:          "0".into(),
      raw_registration_count: u64::MAX,
    }
  );
}

#[tokio::test]
async fn unbounded_lookback_covers_all_history() {
  let s = store().await;
  s.add_project(NewProject::new("Acme").with_channel(Channel::Vk, "cab1"))
    .await
    .unwrap();
  let old = Utc.with_ymd_and_hms(1999, 1, 1, 9, 0, 0).unwrap();
  s.record(NewFact::new("cab1", FactValue::Vk(100.0)).at(old)).await.unwrap();
  s.record(NewFact::new("cab1", FactValue::Vk(150.0)).at(at(2, 8))).await.unwrap();

  let opts = DigestOptions { lookback_days: u32::MAX, ..options(at(2, 12)) };
  let digest = compose(&s, &opts).await.unwrap();
  assert_eq!(digest.vk.len(), 1);
  assert_eq!(digest.vk[0].current_value, "150,00");
  assert_eq!(digest.vk[0].change_percent, 50.0);
}
