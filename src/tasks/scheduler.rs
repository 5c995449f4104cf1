use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::shutdown::wait_for_shutdown;
use crate::core::state::AppState;
use crate::core::time::now_utc;
use crate::services::status_rollover;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = vec![tokio::spawn(rollover_loop(state.clone(), shutdown_rx.clone()))];

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

/// One rollover sweep over every classroom. Returns how many explanations finished.
pub(crate) async fn rollover_pass(state: &AppState) -> usize {
    let offset = state.settings().school().utc_offset;
    let store = state.store().as_ref();
    match status_rollover::finish_elapsed_everywhere(store, offset, now_utc()).await {
        Ok(finished) => {
            if finished > 0 {
                tracing::info!(finished, "Status rollover pass finished explanations");
            }
            finished
        }
        Err(err) => {
            tracing::error!(error = %err, "Status rollover pass failed");
            0
        }
    }
}

async fn rollover_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let seconds = state.settings().school().rollover_interval_seconds.max(1);
    let mut tick = interval(Duration::from_secs(seconds));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_seconds = seconds, "Status rollover loop started");

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = tick.tick() => {
                rollover_pass(&state).await;
            }
        }
    }

    tracing::info!("Status rollover loop stopped");
}
