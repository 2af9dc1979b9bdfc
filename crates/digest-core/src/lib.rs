//! Core types and trait definitions for the marketing digest.
//!
//! This crate holds the domain model (projects, channel facts, daily
//! aggregates), the [`store::MetricsStore`] abstraction, and the pure logic
//! that turns stored time series into a [`digest::Digest`]. It has no HTTP or
//! database dependencies.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod aggregate;
pub mod digest;
pub mod error;
pub mod fact;
pub mod format;
pub mod project;
pub mod store;

pub use error::{Error, Result};
