//! Connection fabric and request/response correlation: the transport layer
//! underneath the peer and distributed connection managers (§4.2-§4.4).

pub mod connection;
pub mod error;
pub mod key;
pub mod message_connection;
pub mod waiter;

pub use connection::{Connection, ConnectionOptions, ConnectionState, StateChanged};
pub use error::ConnError;
pub use key::ConnectionKey;
pub use message_connection::{Frame, MessageConnection, ReaderRole};
pub use waiter::{WaitError, WaitKey, Waiter};
