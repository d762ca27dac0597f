use soulseek_net::ConnError;
use soulseek_p2p::PeerError;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("illegal transfer state transition")]
    IllegalTransition,
    #[error("remote declined the transfer: {0}")]
    Rejected(String),
    #[error("local enqueue refused: {0}")]
    EnqueueRejected(String),
    #[error("transfer connection error: {0}")]
    Conn(#[from] ConnError),
    #[error("peer connection error: {0}")]
    Peer(#[from] PeerError),
    #[error("transfer cancelled")]
    Cancelled,
    #[error("transfer timed out")]
    TimedOut,
}
