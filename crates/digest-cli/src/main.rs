//! `marketing-digest` binary.
//!
//! Reads `marketing-digest.toml` (or the path given with `--config`), opens
//! the SQLite store, and either runs a one-shot command against it or serves
//! the JSON API over HTTP.

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use digest_core::{
  aggregate::{latest_snapshot, period_stats},
  digest::{DigestOptions, compose},
  fact::{AcquisitionCounts, Channel, FactRow, FactValue, NewFact},
  project::NewProject,
  store::{FactBatch, MetricsStore},
};
use digest_store_sqlite::SqliteStore;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::AppConfig;

#[derive(Parser)]
#[command(author, version, about = "Marketing metrics digest")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "marketing-digest.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Apply an external SQL schema or seed script to the store.
  Init {
    #[arg(long, value_name = "FILE")]
    schema: PathBuf,
  },
  /// Manage the project registry.
  #[command(subcommand)]
  Project(ProjectCommand),
  /// Record a single fact, timestamped now.
  #[command(subcommand)]
  Record(RecordCommand),
  /// Ingest a JSON array of rows for one channel.
  Import {
    channel:          Channel,
    file:             PathBuf,
    /// Replace the rows' facts for the batch date instead of appending.
    #[arg(long)]
    replace_for_date: bool,
    /// Timestamp applied to every row (RFC 3339); defaults to now.
    #[arg(long)]
    fetched_at:       Option<DateTime<Utc>>,
  },
  /// Daily aggregates for one project.
  Stats {
    project_id: i64,
    #[arg(long)]
    days:       Option<u32>,
  },
  /// Facts of one channel fetched on a date, with project names.
  Snapshot {
    channel: Channel,
    /// Defaults to today (UTC).
    #[arg(long)]
    date:    Option<NaiveDate>,
  },
  /// Latest raw values of every active project.
  Latest,
  /// Compose the digest and print it as JSON.
  Digest {
    #[arg(long)]
    days:  Option<u32>,
    /// Anchor the lookback window at this instant instead of now.
    #[arg(long)]
    as_of: Option<DateTime<Utc>>,
  },
  /// Serve the JSON API.
  Serve,
}

#[derive(Subcommand)]
enum ProjectCommand {
  Add {
    name:      String,
    #[arg(long)]
    vk:        Option<String>,
    #[arg(long)]
    yandex:    Option<String>,
    #[arg(long)]
    mytracker: Option<String>,
  },
  List,
  Activate { id: i64 },
  Deactivate { id: i64 },
  Delete { id: i64 },
  /// Find the active project claiming a channel identifier.
  Find { channel: Channel, channel_id: String },
}

#[derive(Subcommand)]
enum RecordCommand {
  Vk {
    cabinet_id: String,
    balance:    f64,
  },
  Yandex {
    cabinet_id: String,
    balance:    f64,
  },
  #[command(name = "mytracker", alias = "mt")]
  MyTracker {
    project_id:    String,
    #[arg(long, default_value_t = 0)]
    registrations: u64,
    #[arg(long, default_value_t = 0)]
    first_logins:  u64,
    #[arg(long, default_value_t = 0)]
    reactivations: u64,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = AppConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  match cli.command {
    Command::Init { schema } => {
      let sql = tokio::fs::read_to_string(&schema)
        .await
        .with_context(|| format!("failed to read schema file {schema:?}"))?;
      store.execute_script(sql).await.context("schema script failed")?;
      tracing::info!(path = ?schema, "applied schema script");
    }
    Command::Project(cmd) => run_project(&store, cmd).await?,
    Command::Record(cmd) => {
      let new = match cmd {
        RecordCommand::Vk { cabinet_id, balance } => {
          NewFact::new(cabinet_id, FactValue::balance(Channel::Vk, balance)?)
        }
        RecordCommand::Yandex { cabinet_id, balance } => {
          NewFact::new(cabinet_id, FactValue::balance(Channel::Yandex, balance)?)
        }
        RecordCommand::MyTracker {
          project_id,
          registrations,
          first_logins,
          reactivations,
        } => NewFact::new(
          project_id,
          FactValue::MyTracker(AcquisitionCounts {
            registrations,
            first_logins,
            reactivations,
          }),
        ),
      };
      print_json(&store.record(new).await?)?;
    }
    Command::Import { channel, file, replace_for_date, fetched_at } => {
      let raw = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("failed to read {file:?}"))?;
      let rows: Vec<FactRow> = serde_json::from_str(&raw)
        .with_context(|| format!("{file:?} is not a JSON array of rows"))?;
      let submitted = rows.len();
      let batch = FactBatch { fetched_at, replace_for_date, ..FactBatch::new(channel, rows) };
      let inserted = store.record_many(batch).await?;
      println!("inserted {inserted} of {submitted} rows into {channel}");
    }
    Command::Stats { project_id, days } => {
      let Some(project) = store.get_project(project_id).await? else {
        bail!("project {project_id} not found");
      };
      let days = days.unwrap_or(cfg.stats_days);
      print_json(&period_stats(&store, &project.channels, days, None).await?)?;
    }
    Command::Snapshot { channel, date } => {
      let date = date.unwrap_or_else(|| Utc::now().date_naive());
      print_json(&store.facts_for_date(channel, date).await?)?;
    }
    Command::Latest => print_json(&latest_snapshot(&store).await?)?,
    Command::Digest { days, as_of } => {
      let options = DigestOptions {
        lookback_days: days.unwrap_or(cfg.digest_days),
        icon_path_template: cfg.icon_path_template.clone(),
        as_of,
      };
      let digest = compose(&store, &options).await?;
      if digest.is_empty() {
        tracing::warn!("digest is empty; no active project has data in the window");
      }
      print_json(&digest)?;
    }
    Command::Serve => serve(store, &cfg).await?,
  }

  Ok(())
}

async fn run_project(store: &SqliteStore, cmd: ProjectCommand) -> anyhow::Result<()> {
  match cmd {
    ProjectCommand::Add { name, vk, yandex, mytracker } => {
      if name.trim().is_empty() {
        bail!("project name must not be empty");
      }
      let mut new = NewProject::new(name);
      new.channels.vk_cabinet_id = vk;
      new.channels.yandex_cabinet_id = yandex;
      new.channels.mytracker_project_id = mytracker;
      print_json(&store.add_project(new).await?)?;
    }
    ProjectCommand::List => print_json(&store.list_projects().await?)?,
    ProjectCommand::Activate { id } => set_active(store, id, true).await?,
    ProjectCommand::Deactivate { id } => set_active(store, id, false).await?,
    ProjectCommand::Delete { id } => {
      if !store.delete_project(id).await? {
        bail!("project {id} not found");
      }
      println!("deleted project {id}");
    }
    ProjectCommand::Find { channel, channel_id } => {
      match store.find_project_by_channel(channel, &channel_id).await? {
        Some(project) => print_json(&project)?,
        None => bail!("no active project for {channel} id {channel_id}"),
      }
    }
  }
  Ok(())
}

async fn set_active(store: &SqliteStore, id: i64, active: bool) -> anyhow::Result<()> {
  if !store.set_project_active(id, active).await? {
    bail!("project {id} not found");
  }
  let state = if active { "activated" } else { "deactivated" };
  println!("{state} project {id}");
  Ok(())
}

async fn serve(store: SqliteStore, cfg: &AppConfig) -> anyhow::Result<()> {
  let app = digest_api::api_router(Arc::new(store), cfg.api_settings());
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
