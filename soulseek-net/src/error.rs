use thiserror::Error;

/// Errors raised by the connection fabric (§7).
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("connect to {addr} timed out or failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("write of {size} bytes exceeds the connection's buffer limit of {limit}")]
    WriteTooLarge { size: usize, limit: usize },

    #[error("connection is not in the Connected state")]
    NotConnected,

    #[error("connection closed: {0}")]
    Closed(&'static str),

    #[error(transparent)]
    Proto(#[from] soulseek_proto::ProtoError),
}
