use supabase_probe::config::{self, DbConfig};
use supabase_probe::probe;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before the subscriber so RUST_LOG from .env applies.
    let dotenv = config::load_dotenv();

    // stdout carries only the result line.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // A .env that fails to parse is reported as the failure line.
    let config = match dotenv {
        Ok(path) => {
            if let Some(path) = path {
                tracing::debug!(path = %path.display(), "Loaded .env");
            }
            DbConfig::from_env()
        }
        Err(e) => Err(e),
    };

    let outcome = probe::run_from_config(config).await;
    probe::report(&outcome, std::io::stdout().lock())?;

    // Exit status is 0 for both outcomes.
    Ok(())
}
