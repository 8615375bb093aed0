use tracing::Level;

use cardfeed_core::transport::memory::{MemoryServer, ServerRequest};
use cardfeed_core::{CardFeed, ConnectionState, FeedConfig, LightCardStore, ManualClock, StaticPerimeter};
use cardfeed_proto::SubscriptionRequest;
use cardfeed_signals::Subscription;
use std::sync::Arc;
use std::time::Duration;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() { tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init(); }

pub const USER_ENTITY: &str = "ENTITY1";

/// A [`CardFeed`] wired to an in-memory server and a manual clock
#[allow(unused)]
pub struct Harness {
    pub server: MemoryServer,
    pub clock: Arc<ManualClock>,
    pub feed: CardFeed,
    pub requests: Subscription<ServerRequest>,
}

#[allow(unused)]
impl Harness {
    pub fn new(now: i64) -> Self {
        let server = MemoryServer::new();
        let clock = Arc::new(ManualClock::new(now));
        let feed = CardFeed::with_clock(Arc::new(server.clone()), Arc::new(StaticPerimeter::allow_all([USER_ENTITY])), FeedConfig::default(), clock.clone())
            .expect("default config is valid");
        let requests = server.watch_requests();
        Self { server, clock, feed, requests }
    }

    /// Start the feed, accept the subscription and send the first INIT
    pub async fn start_synchronized(&mut self) {
        self.feed.start();
        self.next_request(|r| matches!(r, ServerRequest::Open).then_some(())).await;
        self.server.connect();
        self.server.send_init();
        self.wait_for_state(ConnectionState::Synchronized).await;
    }

    pub async fn wait_for_state(&self, state: ConnectionState) {
        let wait = self.feed.connection().connection_state().wait_for(|s| (*s == state).then_some(()));
        tokio::time::timeout(Duration::from_secs(5), wait).await.expect("connection state not reached");
    }

    pub async fn next_request<R>(&mut self, select: impl Fn(ServerRequest) -> Option<R>) -> R {
        let requests = &mut self.requests;
        let wait = async {
            loop {
                match requests.recv().await {
                    Some(request) => {
                        if let Some(found) = select(request) {
                            return found;
                        }
                    }
                    None => panic!("server request channel closed"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait).await.expect("request not seen")
    }

    pub async fn next_post(&mut self) -> SubscriptionRequest {
        self.next_request(|r| match r {
            ServerRequest::Post(post) => Some(post),
            _ => None,
        })
        .await
    }

    pub fn store(&self) -> &LightCardStore { self.feed.store() }
}

/// Let debounced publishers and projections run
#[allow(unused)]
pub async fn settle() { tokio::time::sleep(Duration::from_millis(500)).await }

#[allow(unused)]
pub fn store() -> LightCardStore { LightCardStore::new(Arc::new(StaticPerimeter::allow_all([USER_ENTITY])), FeedConfig::default()) }
