//! HTTP transport for the cardfeed engine: the card consultation service's event stream,
//! its subscription side-channel and the card detail endpoint.

pub mod client;
pub mod codec;
pub mod urls;

pub use client::{ClientError, HttpSubscriptionServer};
pub use codec::{CodecError, EventStreamCodec};
pub use urls::SubscriptionUrls;
