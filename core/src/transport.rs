pub mod memory;

use async_trait::async_trait;
use cardfeed_proto::SubscriptionRequest;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// What the push transport reports while a subscription is open
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The event stream is (re-)established
    Opened,
    /// One complete text payload
    Frame(String),
    /// The stream broke. The transport may follow up with `Opened` if it manages to reconnect.
    Error(TransportError),
}

/// Stream of [`TransportEvent`]s. The channel closing means the transport gave up for good.
pub type TransportEvents = UnboundedReceiver<TransportEvent>;

/// The subscription server as seen by the [`crate::ConnectionManager`]
#[async_trait]
pub trait SubscriptionServer: Send + Sync + 'static {
    /// Open the push subscription. Events flow until `cancel` fires or the transport gives up.
    async fn open(&self, cancel: CancellationToken) -> Result<TransportEvents, TransportError>;

    /// Side-channel POST on the subscription (recovery replay or business period)
    async fn post(&self, request: SubscriptionRequest) -> Result<(), TransportError>;

    /// Keep-alive ping
    async fn send_heartbeat(&self) -> Result<(), TransportError>;

    /// Tell the server the subscription is no longer wanted
    async fn close(&self) -> Result<(), TransportError>;
}
