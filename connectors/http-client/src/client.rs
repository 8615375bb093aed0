use async_trait::async_trait;
use cardfeed_core::error::{LoadError, TransportError};
use cardfeed_core::selection::CardLoader;
use cardfeed_core::transport::{SubscriptionServer, TransportEvent, TransportEvents};
use cardfeed_core::{action_debug, action_info, action_warn, FeedConfig};
use cardfeed_proto::{Card, CardId, SubscriptionRequest};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderValue, ACCEPT};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::codec::EventStreamCodec;
use crate::urls::SubscriptionUrls;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("cannot build http client: {0}")]
    Http(#[from] reqwest::Error),
}

fn network(error: reqwest::Error) -> TransportError { TransportError::Network(error.to_string()) }

fn check(response: &reqwest::Response) -> Result<(), TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::Http { status: status.as_u16(), url: response.url().to_string() })
    }
}

/// [`SubscriptionServer`] backed by the card consultation HTTP API.
///
/// The push stream is a long-lived GET read line by line; when it breaks the client reports an
/// error and reconnects with exponential backoff until the subscription is cancelled.
#[derive(Clone)]
pub struct HttpSubscriptionServer {
    http: reqwest::Client,
    urls: SubscriptionUrls,
    client_id: String,
    bearer_token: Option<String>,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl std::fmt::Display for HttpSubscriptionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "HttpSubscriptionServer({})", self.client_id) }
}

impl HttpSubscriptionServer {
    /// New client with a fresh random client id
    pub fn new(config: &FeedConfig) -> Result<Self, ClientError> { Self::with_client_id(config, uuid::Uuid::new_v4().to_string()) }

    pub fn with_client_id(config: &FeedConfig, client_id: impl Into<String>) -> Result<Self, ClientError> {
        let client_id = client_id.into();
        let urls = SubscriptionUrls::new(config.server_url(), &client_id, config.client_version())?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            urls,
            client_id,
            bearer_token: None,
            initial_backoff: config.reconnect_initial_backoff(),
            max_backoff: config.reconnect_max_backoff(),
        })
    }

    /// Authenticate every request with `Authorization: Bearer <token>`
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn client_id(&self) -> &str { &self.client_id }

    pub fn urls(&self) -> &SubscriptionUrls { &self.urls }

    fn request(&self, method: reqwest::Method, url: &Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url.clone());
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, TransportError> {
        let response = builder.send().await.map_err(network)?;
        check(&response)?;
        Ok(response)
    }

    async fn run_event_stream(self, events: UnboundedSender<TransportEvent>, cancel: CancellationToken) {
        let mut backoff = self.initial_backoff;
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.read_event_stream(&events, &mut backoff) => result,
            };
            let error = match result {
                Ok(()) => TransportError::StreamClosed,
                Err(TransportError::Shutdown) => break,
                Err(e) => e,
            };

            action_warn!(self, "event stream", "{error}, retrying in {backoff:?}");
            if events.send(TransportEvent::Error(error)).is_err() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.max_backoff);
        }
        action_debug!(self, "event stream", "stopped");
    }

    /// Read one connection to completion. Resets `backoff` once the server accepts the stream.
    async fn read_event_stream(&self, events: &UnboundedSender<TransportEvent>, backoff: &mut Duration) -> Result<(), TransportError> {
        let builder = self.request(reqwest::Method::GET, &self.urls.event_stream).header(ACCEPT, HeaderValue::from_static("text/event-stream"));
        let response = self.send(builder).await?;
        *backoff = self.initial_backoff;
        action_info!(self, "event stream", "open");
        events.send(TransportEvent::Opened).map_err(|_| TransportError::Shutdown)?;

        let body = response.bytes_stream().map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut frames = FramedRead::new(StreamReader::new(body), EventStreamCodec::default());
        while let Some(frame) = frames.next().await {
            let payload = frame.map_err(|e| TransportError::Network(e.to_string()))?;
            events.send(TransportEvent::Frame(payload)).map_err(|_| TransportError::Shutdown)?;
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionServer for HttpSubscriptionServer {
    async fn open(&self, cancel: CancellationToken) -> Result<TransportEvents, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().run_event_stream(tx, cancel));
        Ok(rx)
    }

    async fn post(&self, request: SubscriptionRequest) -> Result<(), TransportError> {
        action_debug!(self, "post", "{request:?}");
        self.send(self.request(reqwest::Method::POST, &self.urls.subscription).json(&request)).await?;
        Ok(())
    }

    async fn send_heartbeat(&self) -> Result<(), TransportError> {
        self.send(self.request(reqwest::Method::GET, &self.urls.heartbeat)).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        action_info!(self, "close");
        self.send(self.request(reqwest::Method::DELETE, &self.urls.close)).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct CardEnvelope {
    card: Card,
}

#[async_trait]
impl CardLoader for HttpSubscriptionServer {
    async fn load_card(&self, id: &CardId) -> Result<Card, LoadError> {
        let url = self.urls.card(id).map_err(|e| LoadError::Other(e.into()))?;
        let response = self.request(reqwest::Method::GET, &url).send().await.map_err(network)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LoadError::NotFound(id.clone()));
        }
        check(&response)?;
        let envelope: CardEnvelope = response.json().await.map_err(network)?;
        Ok(envelope.card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    type Seen = Arc<Mutex<Vec<(String, String)>>>;

    async fn read_request(socket: &mut TcpStream) -> (String, String) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break buf.len();
            }
            buf.extend_from_slice(&chunk[..n]);
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let length = head
            .lines()
            .find_map(|l| {
                let (key, value) = l.split_once(':')?;
                key.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok()).flatten()
            })
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let line = head.lines().next().unwrap_or_default().to_string();
        (line, String::from_utf8_lossy(&buf[head_end..]).to_string())
    }

    /// Bare-bones HTTP/1.1 server recording each request line and body
    async fn serve(respond: fn(&str) -> (u16, String)) -> (String, Seen) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let (line, body) = read_request(&mut socket).await;
                    let (status, payload) = respond(&line);
                    log.lock().unwrap().push((line, body));
                    let head = format!("HTTP/1.1 {status} Status\r\ncontent-length: {}\r\nconnection: close\r\n\r\n", payload.len());
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(payload.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (format!("http://{addr}/"), seen)
    }

    fn server(url: &str) -> HttpSubscriptionServer {
        let config = FeedConfig::default().with_server_url(url).with_client_version("1.0").with_reconnect_backoff(Duration::from_millis(10), Duration::from_millis(20));
        HttpSubscriptionServer::with_client_id(&config, "test").unwrap()
    }

    #[tokio::test]
    async fn event_stream_yields_frames_and_reconnects() {
        let (url, seen) = serve(|_| (200, "data: INIT\n\n: ping\nHEARTBEAT\n".to_string())).await;
        let server = server(&url);
        let cancel = CancellationToken::new();
        let mut events = server.open(cancel.clone()).await.unwrap();

        assert_eq!(events.recv().await, Some(TransportEvent::Opened));
        assert_eq!(events.recv().await, Some(TransportEvent::Frame("INIT".to_string())));
        assert_eq!(events.recv().await, Some(TransportEvent::Frame("HEARTBEAT".to_string())));
        assert_eq!(events.recv().await, Some(TransportEvent::Error(TransportError::StreamClosed)));
        assert_eq!(events.recv().await, Some(TransportEvent::Opened));

        cancel.cancel();
        while events.recv().await.is_some() {}
        let seen = seen.lock().unwrap();
        assert!(seen[0].0.starts_with("GET /cards-consultation/cardSubscription?clientId=test&version=1.0&notification=true "));
    }

    #[tokio::test]
    async fn refused_stream_is_reported_with_its_status() {
        let (url, _seen) = serve(|_| (401, String::new())).await;
        let server = server(&url);
        let cancel = CancellationToken::new();
        let mut events = server.open(cancel.clone()).await.unwrap();
        match events.recv().await {
            Some(TransportEvent::Error(TransportError::Http { status, .. })) => assert_eq!(status, 401),
            other => panic!("unexpected event {other:?}"),
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn side_channel_requests() {
        let (url, seen) = serve(|line| if line.contains("Heartbeat") { (503, String::new()) } else { (200, String::new()) }).await;
        let server = server(&url).with_bearer_token("secret");

        server.post(SubscriptionRequest::BusinessPeriod { range_start: 1, range_end: 2 }).await.unwrap();
        assert!(matches!(server.send_heartbeat().await, Err(TransportError::Http { status: 503, .. })));
        server.close().await.unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen[0].0.starts_with("POST /cards-consultation/cardSubscription?clientId=test&version=1.0 "));
        assert_eq!(serde_json::from_str::<serde_json::Value>(&seen[0].1).unwrap(), serde_json::json!({ "rangeStart": 1, "rangeEnd": 2 }));
        assert!(seen[1].0.starts_with("GET /cards-consultation/cardSubscriptionHeartbeat?clientId=test "));
        assert!(seen[2].0.starts_with("DELETE /cards-consultation/cardSubscription?clientId=test "));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);
        assert!(matches!(server(&url).send_heartbeat().await, Err(TransportError::Network(_))));
    }

    #[tokio::test]
    async fn card_detail_is_loaded() {
        let (url, _seen) = serve(|line| {
            if line.starts_with("GET /cards-consultation/cards/A ") {
                let card = serde_json::json!({ "card": {
                    "id": "A", "uid": "1", "publishDate": 10, "startDate": 0, "severity": "ALARM", "data": { "line": "L1" }
                }});
                (200, card.to_string())
            } else {
                (404, String::new())
            }
        })
        .await;
        let server = server(&url);

        let card = server.load_card(&"A".into()).await.unwrap();
        assert_eq!(card.summary.uid.as_str(), "1");
        assert_eq!(card.data, serde_json::json!({ "line": "L1" }));
        assert!(matches!(server.load_card(&"B".into()).await, Err(LoadError::NotFound(_))));
    }
}
