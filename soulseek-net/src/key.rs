use std::net::IpAddr;

use soulseek_proto::ConnectionTypeTag;

/// Identifies exactly one connection: the remote user, their endpoint, and
/// which of the three connection classes it is (§3 `ConnectionKey`).
/// Equality and hashing are over all four fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub username: String,
    pub address: IpAddr,
    pub port: u16,
    pub connection_type: ConnectionTypeTag,
}

impl ConnectionKey {
    pub fn new(
        username: impl Into<String>,
        address: IpAddr,
        port: u16,
        connection_type: ConnectionTypeTag,
    ) -> Self {
        Self {
            username: username.into(),
            address,
            port,
            connection_type,
        }
    }
}
