//! Background task that keeps the pool and load readings fresh

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::Router;

/// Poller lifecycle. `Stopped` is only reached through cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Starting,
    Jittering,
    Steady,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    /// Period of the steady-state loop
    pub interval: Duration,
    /// Upper bound (exclusive) of the one-time startup delay
    pub max_jitter: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            max_jitter: Duration::from_secs(60),
        }
    }
}

/// Handle to a running poller
pub struct PollerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<PollerState>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.clone()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the poller and wait for it to exit
    pub async fn stop(self) -> Result<(), tokio::task::JoinError> {
        self.cancel.cancel();
        self.task.await
    }
}

pub(super) fn spawn(router: Arc<Router>, settings: PollerSettings, cancel: CancellationToken) -> PollerHandle {
    let (tx, rx) = watch::channel(PollerState::Starting);
    let task = tokio::spawn(run(router, settings, cancel.clone(), tx));
    PollerHandle {
        cancel,
        state: rx,
        task,
    }
}

async fn run(router: Arc<Router>, settings: PollerSettings, cancel: CancellationToken, state: watch::Sender<PollerState>) {
    tracing::info!(
        "SDK router watching load on {} instances",
        router.registry().current().len()
    );
    router.poll_once(&cancel).await;

    // Stagger routers started together so they don't poll the SDKs at once
    state.send_replace(PollerState::Jittering);
    let delay = jitter(settings.max_jitter);
    tracing::debug!(delay_ms = delay.as_millis() as u64, "Delaying load polling");
    if sleep_or_cancel(delay, &cancel).await {
        state.send_replace(PollerState::Steady);
        steady_loop(&router, settings.interval, &cancel).await;
    }

    state.send_replace(PollerState::Stopped);
    tracing::info!("SDK router stopped watching load");
}

async fn steady_loop(router: &Router, interval: Duration, cancel: &CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        router.poll_once(cancel).await;
    }
}

/// Returns false if cancelled before `duration` elapsed
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::random_range(0..max_ms))
}
