pub mod card;
pub mod error;
pub mod frame;
pub mod id;
pub mod operation;
pub mod request;

pub use card::*;
pub use error::*;
pub use frame::*;
pub use id::*;
pub use operation::*;
pub use request::*;

/// Milliseconds since the unix epoch, as carried on the wire
pub type EpochMillis = i64;
