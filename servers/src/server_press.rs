//! # Press Telemetry Relay Server
//!
//! The production entry point for the `presstream` project. This binary
//! launches the HTTP + WebSocket relay that ingests press-cycle events,
//! checks them against the configured ideal timings, retains a bounded
//! history, and fans every event out to all connected observers in real
//! time.
//!
//! ## Core Responsibilities:
//! - **Ingestion boundary:** accepts records over `POST /data` and over the
//!   WebSocket itself; schema validation happens here, before anything
//!   reaches the core pipeline.
//! - **Fan-out:** every connected WebSocket observer receives the current
//!   last state on connect, then every subsequent record in order.
//! - **Liveness:** a periodic monitor probes subscribers and evicts the
//!   unresponsive ones.
//! - **Introspection:** last state, bounded history, the ideal-spec table
//!   (readable and atomically replaceable) and Prometheus metrics.
//! - **Configuration:** layered defaults, JSON config file, environment
//!   variables and CLI flags.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use anyhow::Result;
use tokio::signal;

mod press_logic;
use press_logic::{config, downstream, logger, monitor, state};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    logger::setup_logging(config.log_level())?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = state::AppState::new(&config)?;

    let monitor_handle = tokio::spawn(monitor::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    let mut downstream_handle = tokio::spawn(downstream::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    // Wait for a shutdown signal, or for the server itself to fail (e.g. the
    // port is already taken).
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("failed to install signal handler");
                term_signal.recv().await;
                tracing::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {}
        result = &mut downstream_handle => {
            match result {
                Ok(Err(e)) => tracing::error!(error = %e, "downstream server failed"),
                Ok(Ok(())) => tracing::warn!("downstream server exited unexpectedly"),
                Err(e) => tracing::error!(error = %e, "downstream task panicked"),
            }
        }
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = monitor_handle.await;
    if !downstream_handle.is_finished() {
        let _ = downstream_handle.await;
    }

    tracing::info!("Shutdown complete.");
    Ok(())
}
