use std::net::IpAddr;

use async_trait::async_trait;

use soulseek_proto::ConnectionTypeTag;

use crate::error::PeerError;

/// The handful of server operations the peer and distributed managers need
/// to perform on their own initiative (resolving an address, soliciting an
/// indirect connection). Implemented by the façade, which owns the actual
/// server `MessageConnection`; this indirection is the dependency-injection
/// answer to the cyclic-ownership note (§9): the managers depend on an
/// interface, not on the façade type itself.
#[async_trait]
pub trait ServerLink: Send + Sync {
    async fn get_peer_address(&self, username: &str) -> Result<(IpAddr, u16), PeerError>;

    async fn request_indirect_connect(
        &self,
        token: i32,
        username: &str,
        connection_type: ConnectionTypeTag,
    ) -> Result<(), PeerError>;

    fn local_username(&self) -> String;

    /// Writes a pre-built frame directly to the server connection —
    /// used by the distributed manager, which builds its own outbound
    /// messages (§4.6) rather than going through a request/response pair.
    async fn send(&self, frame: Vec<u8>) -> Result<(), PeerError>;
}
