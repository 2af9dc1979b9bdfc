//! Error types for `digest-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown channel: {0:?}")]
  UnknownChannel(String),

  #[error("{0} is not a balance channel")]
  NotABalanceChannel(crate::fact::Channel),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
