use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use soulseek_net::ConnectionOptions;
use soulseek_util::DiagnosticLevel;

/// Per-role connect/inactivity overrides (§6 `*ConnectionOptions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConnectionOptions {
    pub connect_timeout: Duration,
    pub inactivity_timeout: Option<Duration>,
    pub max_write_size: usize,
}

impl Default for RoleConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            inactivity_timeout: Some(Duration::from_secs(30)),
            max_write_size: 16 * 1024 * 1024,
        }
    }
}

impl From<&RoleConnectionOptions> for ConnectionOptions {
    fn from(o: &RoleConnectionOptions) -> Self {
        ConnectionOptions {
            connect_timeout: o.connect_timeout,
            inactivity_timeout: o.inactivity_timeout,
            max_write_size: o.max_write_size,
        }
    }
}

/// Every recognized configuration option from §6, as a `serde`-derivable
/// struct (the Non-goal excludes *persistent loading*, not the struct
/// itself — a host is free to deserialize one from its own config file).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_address: SocketAddr,
    pub connect_timeout: Duration,
    pub inactivity_timeout: Duration,
    pub message_timeout: Duration,
    pub concurrent_peer_connections: usize,
    pub concurrent_distributed_children_limit: usize,
    pub enable_distributed_network: bool,
    pub auto_acknowledge_private_messages: bool,
    /// `None` disables the inbound listener entirely; `Some(0)` binds an
    /// ephemeral port.
    pub listen_port: Option<u16>,
    pub minimum_diagnostic_level: DiagnosticLevel,
    pub server_connection_options: RoleConnectionOptions,
    pub peer_connection_options: RoleConnectionOptions,
    pub distributed_connection_options: RoleConnectionOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "0.0.0.0:0".parse().expect("literal address is always valid"),
            connect_timeout: Duration::from_secs(10),
            inactivity_timeout: Duration::from_secs(30),
            message_timeout: Duration::from_secs(30),
            concurrent_peer_connections: 64,
            concurrent_distributed_children_limit: 10,
            enable_distributed_network: true,
            auto_acknowledge_private_messages: false,
            listen_port: Some(0),
            minimum_diagnostic_level: DiagnosticLevel::Info,
            server_connection_options: RoleConnectionOptions {
                inactivity_timeout: None,
                ..RoleConnectionOptions::default()
            },
            peer_connection_options: RoleConnectionOptions::default(),
            distributed_connection_options: RoleConnectionOptions::default(),
        }
    }
}
