use anyhow::Result;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global tracing subscriber. `RUST_LOG` wins over the
/// configured level when set.
pub fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
