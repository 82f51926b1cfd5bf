use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;

use crate::press_logic::config::Config;
use crate::press_logic::state::AppState;

/// The liveness monitor: one sweep per heartbeat interval.
///
/// Each sweep evicts the subscribers that never answered the previous probe
/// and sends a fresh probe to the rest, so an unresponsive subscriber is gone
/// by the start of the second interval after falling silent.
pub async fn run(config: Config, app_state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let mut probe_interval = interval(Duration::from_secs(config.heartbeat_interval_secs()));
    // The first tick fires immediately; consume it so fresh connections get
    // a full probe-response window.
    probe_interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("liveness monitor received shutdown signal");
                break;
            }
            _ = probe_interval.tick() => {
                let evicted = app_state.dispatcher.sweep();
                if evicted > 0 {
                    tracing::info!(evicted, "evicted unresponsive subscribers");
                }
            }
        }
    }
}
