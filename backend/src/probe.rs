//! One-shot connectivity probe.

use std::io::{self, Write};

use tracing::{info, warn};

use crate::config::{ConfigError, DbConfig};
use crate::db::{DbConnection, Initialize};

pub const SUCCESS_MESSAGE: &str = "Supabase connection successful";
pub const FAILURE_PREFIX: &str = "Error connecting to Supabase: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Connected,
    /// Display form of whatever went wrong.
    Failed(String),
}

impl ProbeOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn message(&self) -> String {
        match self {
            Self::Connected => SUCCESS_MESSAGE.to_string(),
            Self::Failed(reason) => format!("{FAILURE_PREFIX}{reason}"),
        }
    }
}

/// Awaits a single `initialize` on the handle. No retries, no timeout beyond
/// whatever the handle enforces itself.
pub async fn probe<H: Initialize>(handle: &mut H) -> ProbeOutcome {
    match handle.initialize().await {
        Ok(()) => ProbeOutcome::Connected,
        Err(e) => ProbeOutcome::Failed(e.to_string()),
    }
}

/// Runs the probe against the real database. A config that failed to load is
/// reported the same way as a failed handshake.
pub async fn run_from_config(config: Result<DbConfig, ConfigError>) -> ProbeOutcome {
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Database config could not be loaded");
            return ProbeOutcome::Failed(e.to_string());
        }
    };

    info!(url = %config.redacted_url(), "Probing database");
    let mut connection = DbConnection::new(config);
    probe(&mut connection).await
}

pub fn report<W: Write>(outcome: &ProbeOutcome, mut out: W) -> io::Result<()> {
    writeln!(out, "{}", outcome.message())?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    struct Succeeds;

    impl Initialize for Succeeds {
        type Error = String;

        async fn initialize(&mut self) -> Result<(), String> {
            Ok(())
        }
    }

    struct Refused {
        calls: usize,
    }

    impl Initialize for Refused {
        type Error = String;

        async fn initialize(&mut self) -> Result<(), String> {
            self.calls += 1;
            Err("connection refused".to_string())
        }
    }

    #[test]
    fn immediate_success_prints_success_message() {
        let outcome = block_on(probe(&mut Succeeds));
        assert_eq!(outcome, ProbeOutcome::Connected);
        assert_eq!(outcome.message(), "Supabase connection successful");
    }

    #[test]
    fn failure_message_includes_error_text() {
        let mut handle = Refused { calls: 0 };
        let outcome = block_on(probe(&mut handle));
        assert!(!outcome.is_connected());
        assert_eq!(
            outcome.message(),
            "Error connecting to Supabase: connection refused"
        );
    }

    #[test]
    fn initialize_is_attempted_once() {
        let mut handle = Refused { calls: 0 };
        block_on(probe(&mut handle));
        assert_eq!(handle.calls, 1);
    }

    #[test]
    fn report_writes_exactly_one_line() {
        let mut buf = Vec::new();
        report(&ProbeOutcome::Failed("boom".into()), &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Error connecting to Supabase: boom\n"
        );
    }

    #[test]
    fn config_error_is_folded_into_failure() {
        let outcome = block_on(run_from_config(Err(ConfigError::MissingVar(
            crate::config::DATABASE_URL,
        ))));
        assert_eq!(
            outcome.message(),
            "Error connecting to Supabase: missing required environment variable DATABASE_URL"
        );
    }
}
