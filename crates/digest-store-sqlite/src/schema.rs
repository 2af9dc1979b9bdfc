//! SQL schema for the marketing digest SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
///
/// Fact tables reference projects by channel identifier value, not by a
/// foreign key: facts whose identifier is no longer claimed by any project
/// are kept and simply never joined.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS projects (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    name                 TEXT NOT NULL UNIQUE,
    vk_cabinet_id        TEXT,
    yandex_cabinet_id    TEXT,
    mytracker_project_id TEXT,
    is_active            INTEGER NOT NULL DEFAULT 1
);

-- Facts are append-only; rows are only ever deleted, never updated.
CREATE TABLE IF NOT EXISTS vk_balances (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    vk_cabinet_id TEXT NOT NULL,
    balance       REAL NOT NULL,
    fetched_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS yandex_balances (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    yandex_cabinet_id TEXT NOT NULL,
    balance           REAL NOT NULL,
    fetched_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS mt_stats (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    mytracker_project_id TEXT NOT NULL,
    registrations        INTEGER NOT NULL DEFAULT 0,
    first_logins         INTEGER NOT NULL DEFAULT 0,
    reactivations        INTEGER NOT NULL DEFAULT 0,
    fetched_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE INDEX IF NOT EXISTS vk_balances_key_idx     ON vk_balances(vk_cabinet_id, fetched_at);
CREATE INDEX IF NOT EXISTS yandex_balances_key_idx ON yandex_balances(yandex_cabinet_id, fetched_at);
CREATE INDEX IF NOT EXISTS mt_stats_key_idx        ON mt_stats(mytracker_project_id, fetched_at);

PRAGMA user_version = 1;
";
