use soulseek_net::{ConnError, WaitError};
use soulseek_p2p::{DistributedError, PeerError};
use soulseek_proto::ProtoError;
use soulseek_transfer::TransferError;

use crate::state::{ClientState, ClientStateEvent};

/// Top-level error the façade returns (§7). Wraps every layer's error type
/// via `#[from]`/`#[source]`, the same layered-enum shape the teacher uses
/// at its own top level.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot {event:?} while in state {from:?}")]
    InvalidState { from: ClientState, event: ClientStateEvent },

    #[error("login rejected by server: {0}")]
    LoginRejected(String),

    #[error("client is not connected to the server")]
    ServerUnavailable,

    #[error("kicked from the server by a concurrent login; will not auto-reconnect")]
    KickedFromServer,

    #[error("listen bind failed: {0}")]
    ListenBind(#[source] std::io::Error),

    #[error("connection error: {0}")]
    Conn(#[from] ConnError),

    #[error("peer connection error: {0}")]
    Peer(#[from] PeerError),

    #[error("distributed connection error: {0}")]
    Distributed(#[from] DistributedError),

    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("request timed out")]
    TimedOut,

    #[error("request cancelled")]
    Cancelled,
}

impl From<WaitError> for ClientError {
    fn from(e: WaitError) -> Self {
        match e {
            WaitError::TimedOut => ClientError::TimedOut,
            WaitError::Cancelled(_) => ClientError::Cancelled,
        }
    }
}
