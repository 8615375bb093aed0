/*!
Real-time card synchronization engine.

A [`ConnectionManager`] keeps a push subscription to the card server alive and turns its frames into
[`cardfeed_proto::CardOperation`]s. A [`LightCardStore`] applies those operations idempotently and
multicasts the resulting deltas. A [`FilteredFeed`] derives the sorted list of cards the viewer
should see. [`CardFeed`] owns all three for the lifetime of a user session.

The server is reached through the [`SubscriptionServer`] trait; `cardfeed-http-client` implements it
over HTTP and [`transport::memory::MemoryServer`] in process.
*/

pub mod clock;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod feed;
pub mod perimeter;
pub mod selection;
pub mod store;
pub mod timer;
pub mod transport;
pub mod util;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::FeedConfig;
pub use connection::{ConnectionManager, ConnectionState, ControlChannels, Period, StreamStatus};
pub use context::CardFeed;
pub use error::{ConfigError, LoadError, TransportError};
pub use feed::{FilteredFeed, TimeDomain};
pub use perimeter::{Perimeter, StaticPerimeter};
pub use selection::{CardLoader, SelectedCard, StaticCardLoader};
pub use store::{ApplyOutcome, DeletedChildCard, LightCardStore, ReceivedAck};
pub use transport::{SubscriptionServer, TransportEvent, TransportEvents};

pub use cardfeed_proto as proto;
pub use cardfeed_signals as signals;
