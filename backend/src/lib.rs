//! Startup connectivity check for the Supabase Postgres database.
//!
//! [`probe::run_from_config`] builds a [`db::DbConnection`], performs a single
//! handshake, and yields a [`probe::ProbeOutcome`] that renders to exactly one
//! line of output.

pub mod config;
pub mod db;
pub mod probe;

pub use config::{ConfigError, DbConfig};
pub use db::{ConnectionError, DbConnection, Initialize};
pub use probe::ProbeOutcome;
