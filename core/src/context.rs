use cardfeed_proto::EpochMillis;
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::config::FeedConfig;
use crate::connection::ConnectionManager;
use crate::error::ConfigError;
use crate::feed::{FilteredFeed, TimeDomain};
use crate::perimeter::Perimeter;
use crate::selection::SelectedCard;
use crate::store::LightCardStore;
use crate::timer::BackgroundTask;
use crate::transport::SubscriptionServer;
use crate::{action_debug, action_info};

/// Application-scoped owner of the whole engine: one per logged-in session.
///
/// `start` wires the subscription into the store through a single consumer task, so operations are
/// applied strictly in arrival order.
pub struct CardFeed {
    connection: ConnectionManager,
    store: LightCardStore,
    feed: FilteredFeed,
    selection: SelectedCard,
    consumer: Mutex<Option<BackgroundTask>>,
}

impl std::fmt::Display for CardFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "CardFeed") }
}

impl CardFeed {
    pub fn new(server: Arc<dyn SubscriptionServer>, perimeter: Arc<dyn Perimeter>, config: FeedConfig) -> Result<Self, ConfigError> {
        Self::with_clock(server, perimeter, config, Arc::new(SystemClock))
    }

    /// Fails if `config` does not validate
    pub fn with_clock(
        server: Arc<dyn SubscriptionServer>,
        perimeter: Arc<dyn Perimeter>,
        config: FeedConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let now = clock.now_millis();
        let store = LightCardStore::new(perimeter.clone(), config.clone());
        let feed = FilteredFeed::new(store.clone(), perimeter, &config, now);
        let selection = SelectedCard::new(&store);
        let connection = ConnectionManager::new(server, clock, config);
        Ok(Self { connection, store, feed, selection, consumer: Mutex::new(None) })
    }

    /// Start consuming operations, publishing snapshots and recomputing the feed, then open the
    /// subscription. Calling it again reopens the subscription.
    pub fn start(&self) {
        {
            let mut consumer = self.consumer.lock().unwrap_or_else(|p| p.into_inner());
            if consumer.as_ref().map_or(true, |c| c.is_stopped()) {
                // subscribed before the stream opens so the first operation is not missed
                let mut operations = self.connection.events().subscribe();
                let store = self.store.clone();
                *consumer = Some(BackgroundTask::spawn("operation consumer", move |cancel| async move {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            operation = operations.recv() => match operation {
                                Some(operation) => {
                                    store.apply(operation);
                                }
                                None => break,
                            }
                        }
                    }
                }));
            }
        }
        self.store.start_publishing();
        self.feed.start();
        action_info!(self, "start");
        self.connection.init_stream();
    }

    /// Show `[start, end]` in the feed and make sure the server sends what that period needs
    pub fn set_business_domain(&self, start: EpochMillis, end: EpochMillis) {
        self.feed.set_business_domain(Some(TimeDomain::new(start, end)));
        self.connection.set_business_period(start, end);
    }

    /// Resync boundary (re-authentication, activity area change): forget every card and the
    /// loaded period, and clear the selection
    pub fn reset(&self) {
        action_info!(self, "reset");
        self.store.reset();
        self.connection.reset_loaded_period();
        self.selection.select(None);
        self.feed.recompute_now();
    }

    /// Close the subscription and stop every task. Idempotent.
    pub async fn shutdown(&self) {
        self.connection.close_stream();
        self.feed.stop();
        self.store.stop_publishing();
        let consumer = self.consumer.lock().unwrap_or_else(|p| p.into_inner()).take();
        match consumer {
            Some(consumer) => {
                consumer.join().await;
                action_info!(self, "shutdown");
            }
            None => action_debug!(self, "shutdown", "not running"),
        }
    }

    pub fn connection(&self) -> &ConnectionManager { &self.connection }

    pub fn store(&self) -> &LightCardStore { &self.store }

    pub fn feed(&self) -> &FilteredFeed { &self.feed }

    pub fn selection(&self) -> &SelectedCard { &self.selection }
}

impl Drop for CardFeed {
    fn drop(&mut self) { self.connection.close_stream(); }
}
