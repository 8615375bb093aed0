use cardfeed_proto::CardId;
use thiserror::Error;

/// Failure talking to the subscription server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("server answered {status} for {url}")]
    Http { status: u16, url: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("event stream ended")]
    StreamClosed,
    #[error("transport is shut down")]
    Shutdown,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("{0} must be a whole number of seconds")]
    FractionalSeconds(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of the card detail loader
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("card {0} not found")]
    NotFound(CardId),
    #[error("no card is selected")]
    NothingSelected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
