//! Runtime configuration, layered from an optional TOML file and `DIGEST_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use digest_api::ApiSettings;
use digest_core::{
  aggregate::DEFAULT_STATS_DAYS,
  digest::{DEFAULT_DIGEST_DAYS, DEFAULT_ICON_PATH_TEMPLATE},
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  pub store_path:         PathBuf,
  pub host:               String,
  pub port:               u16,
  pub icon_path_template: String,
  pub digest_days:        u32,
  pub stats_days:         u32,
}

impl AppConfig {
  /// Read `path` (if it exists) and the environment on top of the defaults.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .set_default("store_path", "marketing_digest.db")?
      .set_default("host", "127.0.0.1")?
      .set_default("port", 8080)?
      .set_default("icon_path_template", DEFAULT_ICON_PATH_TEMPLATE)?
      .set_default("digest_days", DEFAULT_DIGEST_DAYS)?
      .set_default("stats_days", DEFAULT_STATS_DAYS)?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("DIGEST"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: AppConfig = settings
      .try_deserialize()
      .context("failed to deserialise AppConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }

  pub fn api_settings(&self) -> ApiSettings {
    ApiSettings {
      icon_path_template: self.icon_path_template.clone(),
      digest_days:        self.digest_days,
      stats_days:         self.stats_days,
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
