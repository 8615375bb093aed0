use async_trait::async_trait;
use cardfeed_proto::{CardOperation, StreamFrame, SubscriptionRequest};
use cardfeed_signals::{Broadcast, Subscription};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

use super::{SubscriptionServer, TransportEvent, TransportEvents};
use crate::error::TransportError;

/// Something the engine asked of a [`MemoryServer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerRequest {
    Open,
    Post(SubscriptionRequest),
    Heartbeat,
    Close,
}

/// In-process subscription server. The test (or embedding application) plays the server side:
/// it pushes frames into the open subscription and inspects what the engine requested.
#[derive(Clone, Default)]
pub struct MemoryServer {
    inner: Arc<Mutex<MemoryInner>>,
    requests: Broadcast<ServerRequest>,
}

#[derive(Default)]
struct MemoryInner {
    stream: Option<UnboundedSender<TransportEvent>>,
    generation: u64,
    log: Vec<ServerRequest>,
    fail_open: bool,
    fail_posts: bool,
}

impl MemoryServer {
    pub fn new() -> Self { Self::default() }

    fn with_inner<R>(&self, f: impl FnOnce(&mut MemoryInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut inner)
    }

    fn record(&self, request: ServerRequest) {
        self.with_inner(|inner| inner.log.push(request.clone()));
        self.requests.send(request);
    }

    /// Push an event into the open subscription. False when nothing is listening.
    pub fn push(&self, event: TransportEvent) -> bool {
        self.with_inner(|inner| match &inner.stream {
            Some(stream) => stream.send(event).is_ok(),
            None => false,
        })
    }

    pub fn connect(&self) -> bool { self.push(TransportEvent::Opened) }

    pub fn send_frame(&self, payload: impl Into<String>) -> bool { self.push(TransportEvent::Frame(payload.into())) }

    pub fn send_init(&self) -> bool { self.send_frame(StreamFrame::INIT) }

    pub fn send_heartbeat_frame(&self) -> bool { self.send_frame(StreamFrame::HEARTBEAT) }

    /// Serialize and push a business operation
    pub fn send_operation(&self, operation: &CardOperation) -> bool {
        match serde_json::to_string(operation) {
            Ok(json) => self.send_frame(json),
            Err(_) => false,
        }
    }

    /// Report a broken stream; the subscription stays usable, as after a transport-level reconnect
    pub fn break_stream(&self, message: impl Into<String>) -> bool { self.push(TransportEvent::Error(TransportError::Network(message.into()))) }

    /// End the subscription for good
    pub fn hang_up(&self) { self.with_inner(|inner| inner.stream = None) }

    pub fn is_open(&self) -> bool { self.with_inner(|inner| inner.stream.as_ref().is_some_and(|s| !s.is_closed())) }

    pub fn fail_open(&self, fail: bool) { self.with_inner(|inner| inner.fail_open = fail) }

    pub fn fail_posts(&self, fail: bool) { self.with_inner(|inner| inner.fail_posts = fail) }

    /// Everything requested so far, oldest first
    pub fn requests(&self) -> Vec<ServerRequest> { self.with_inner(|inner| inner.log.clone()) }

    pub fn posts(&self) -> Vec<SubscriptionRequest> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                ServerRequest::Post(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Requests made from now on
    pub fn watch_requests(&self) -> Subscription<ServerRequest> { self.requests.subscribe() }
}

#[async_trait]
impl SubscriptionServer for MemoryServer {
    async fn open(&self, cancel: CancellationToken) -> Result<TransportEvents, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let opened = self.with_inner(|inner| {
            if inner.fail_open {
                return None;
            }
            inner.stream = Some(tx);
            inner.generation += 1;
            Some(inner.generation)
        });
        self.record(ServerRequest::Open);
        let Some(generation) = opened else {
            return Err(TransportError::Http { status: 503, url: "memory://cardSubscription".into() });
        };

        // the engine cancelling the subscription drops our end of the stream
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Some(inner) = inner.upgrade() {
                let mut inner = inner.lock().unwrap_or_else(|p| p.into_inner());
                if inner.generation == generation {
                    inner.stream = None;
                }
            }
        });
        Ok(rx)
    }

    async fn post(&self, request: SubscriptionRequest) -> Result<(), TransportError> {
        self.record(ServerRequest::Post(request));
        if self.with_inner(|inner| inner.fail_posts) {
            return Err(TransportError::Http { status: 500, url: "memory://cardSubscription".into() });
        }
        Ok(())
    }

    async fn send_heartbeat(&self) -> Result<(), TransportError> {
        self.record(ServerRequest::Heartbeat);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record(ServerRequest::Close);
        self.hang_up();
        Ok(())
    }
}
