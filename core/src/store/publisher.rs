use cardfeed_signals::Subscription;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::LightCardStore;
use crate::action_debug;
use crate::config::FeedConfig;
use crate::timer::BackgroundTask;

const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Turns the store's change notifications into snapshots on `light_cards`.
///
/// A snapshot goes out once changes stop for `debounce`. While changes keep coming, a sample every
/// `sample_interval` publishes anyway if more than `burst_threshold` changes piled up and no
/// debounced snapshot went out during that interval.
pub(super) struct SnapshotPublisher {
    store: LightCardStore,
    debounce: Duration,
    sample_interval: Duration,
    burst_threshold: usize,
}

impl SnapshotPublisher {
    pub fn new(store: LightCardStore, config: &FeedConfig) -> Self {
        Self {
            store,
            debounce: config.snapshot_debounce(),
            sample_interval: config.snapshot_sample_interval(),
            burst_threshold: config.snapshot_burst_threshold(),
        }
    }

    pub fn spawn(self) -> BackgroundTask {
        // subscribed before spawning so no change slips through
        let changes = self.store.changes().subscribe();
        BackgroundTask::spawn("snapshot publisher", move |cancel| self.run(changes, cancel))
    }

    async fn run(self, mut changes: Subscription<()>, cancel: CancellationToken) {
        let mut deadline: Option<Instant> = None;
        let mut pending = 0usize;
        let mut last_published = Instant::now();
        let mut sample = interval(self.sample_interval.max(MIN_SAMPLE_INTERVAL));
        sample.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                change = changes.recv() => match change {
                    Some(()) => {
                        pending += 1;
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.publish("debounced", &mut pending);
                    last_published = Instant::now();
                }
                _ = sample.tick() => {
                    if pending > self.burst_threshold && last_published.elapsed() >= self.sample_interval {
                        self.publish("sampled", &mut pending);
                        last_published = Instant::now();
                    }
                }
            }
        }
    }

    fn publish(&self, how: &str, pending: &mut usize) {
        let snapshot = Arc::new(self.store.snapshot());
        action_debug!(self.store, "publish", "{how} snapshot of {} cards after {} changes", snapshot.len(), pending);
        *pending = 0;
        self.store.light_cards().set(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perimeter::StaticPerimeter;
    use cardfeed_proto::{CardOperation, LightCard, Severity};

    fn store() -> LightCardStore { LightCardStore::new(Arc::new(StaticPerimeter::allow_all(["ENTITY1"])), FeedConfig::default()) }

    fn published(store: &LightCardStore) -> usize { store.light_cards().get().map(|s| s.len()).unwrap_or_default() }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn publishes_after_quiet_period() {
        let store = store();
        store.start_publishing();
        tokio::task::yield_now().await;

        store.apply(CardOperation::add(LightCard::new("A", "1", 10, 0, Severity::Alarm)));
        tokio::time::sleep(Duration::from_millis(150)).await;
        store.apply(CardOperation::add(LightCard::new("B", "1", 10, 0, Severity::Alarm)));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(published(&store), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(published(&store), 2);
        store.stop_publishing();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn long_burst_is_sampled() {
        let store = store();
        store.start_publishing();
        tokio::task::yield_now().await;

        let mut seen_during_burst = 0;
        for round in 0..30 {
            for i in 0..5 {
                let id = format!("card-{round}-{i}");
                store.apply(CardOperation::add(LightCard::new(id.as_str(), "1", 10, 0, Severity::Action)));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            seen_during_burst = seen_during_burst.max(published(&store));
        }
        assert!(seen_during_burst > 0, "nothing published during a 3s burst");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(published(&store), 150);
        store.stop_publishing();
    }
}
