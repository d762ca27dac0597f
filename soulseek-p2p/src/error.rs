use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("direct dial to {username} failed: {source}")]
    DirectDial {
        username: String,
        #[source]
        source: soulseek_net::ConnError,
    },

    #[error("indirect solicitation for {username} timed out")]
    IndirectTimedOut { username: String },

    #[error("both direct and indirect connection attempts to {username} failed")]
    BothAttemptsFailed { username: String },

    #[error("concurrent peer connection limit reached")]
    AtCapacity,

    #[error("the operation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Conn(#[from] soulseek_net::ConnError),

    #[error(transparent)]
    Proto(#[from] soulseek_proto::ProtoError),

    #[error("server link unavailable: {0}")]
    ServerUnavailable(String),
}

#[derive(Debug, Error)]
pub enum DistributedError {
    #[error("no parent candidates were reachable")]
    NoParentReachable,

    #[error("distributed child capacity reached")]
    AtCapacity,

    #[error(transparent)]
    Conn(#[from] soulseek_net::ConnError),

    #[error(transparent)]
    Proto(#[from] soulseek_proto::ProtoError),
}
