use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A spawned task paired with the token that stops it. Stopping is idempotent and also happens on drop.
#[derive(Debug)]
pub struct BackgroundTask {
    name: &'static str,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundTask {
    /// Spawn `body` with a fresh cancellation token
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(body(token.clone()));
        Self { name, token, handle: Mutex::new(Some(handle)) }
    }

    /// Returns true only for the call that actually stopped the task
    pub fn stop(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        debug!("{} stopped", self.name);
        true
    }

    pub fn is_stopped(&self) -> bool { self.token.is_cancelled() }

    /// Stop and wait for the task to finish
    pub async fn join(&self) {
        self.stop();
        let handle = self.handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) { self.token.cancel(); }
}

/// Calls `tick` every `period`, starting one period from now. Ticks that fall behind are delayed
/// rather than bunched up. A zero period never ticks; the timer comes back already cancelled.
#[derive(Debug)]
pub struct PeriodicTimer(BackgroundTask);

impl PeriodicTimer {
    pub fn start<F>(name: &'static str, period: Duration, mut tick: F) -> Self
    where F: FnMut() + Send + 'static {
        if period.is_zero() {
            warn!("{name} not started: zero period");
            let task = BackgroundTask::spawn(name, |_| async {});
            task.stop();
            return PeriodicTimer(task);
        }
        PeriodicTimer(BackgroundTask::spawn(name, move |token| async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => tick(),
                }
            }
        }))
    }

    pub fn cancel(&self) -> bool { self.0.stop() }

    pub fn is_cancelled(&self) -> bool { self.0.is_stopped() }
}
