use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use soulseek_net::{Connection, ConnectionOptions};
use soulseek_proto::messages::init::InitMessage;
use soulseek_proto::ConnectionTypeTag;
use soulseek_util::DiagnosticSink;

use crate::distributed::DistributedConnectionManager;
use crate::peer::PeerConnectionManager;

/// The one inbound TCP listener (§4.9): reads the first frame of a freshly
/// accepted socket itself, since its code namespace (1-byte) differs from
/// the 4-byte codes every later frame on the same socket will use, then
/// hands the raw connection off based on what that first frame was.
pub struct Listener {
    peers: Arc<PeerConnectionManager>,
    distributed: Arc<DistributedConnectionManager>,
    diagnostics: DiagnosticSink,
    connection_options: ConnectionOptions,
}

impl Listener {
    pub fn new(
        peers: Arc<PeerConnectionManager>,
        distributed: Arc<DistributedConnectionManager>,
        diagnostics: DiagnosticSink,
        connection_options: ConnectionOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            peers,
            distributed,
            diagnostics,
            connection_options,
        })
    }

    /// Binds and spawns the accept loop, returning the port actually bound
    /// (useful when `addr`'s port is 0).
    pub async fn bind(self: &Arc<Self>, addr: SocketAddr) -> std::io::Result<u16> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();
        let this = self.clone();
        tokio::spawn(async move { this.accept_loop(listener).await });
        Ok(port)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let this = self.clone();
                    tokio::spawn(async move { this.handle_incoming(stream, peer_addr).await });
                }
                Err(e) => {
                    self.diagnostics.warning("listener", format!("accept failed: {e}"));
                    return;
                }
            }
        }
    }

    async fn handle_incoming(self: Arc<Self>, mut stream: TcpStream, peer_addr: SocketAddr) {
        let (code, payload) = match read_init_frame(&mut stream).await {
            Ok(v) => v,
            Err(e) => {
                self.diagnostics
                    .debug("listener", format!("dropped {peer_addr}: {e} while reading init frame"));
                return;
            }
        };
        let decoded = match InitMessage::decode(code, &payload) {
            Ok(m) => m,
            Err(e) => {
                self.diagnostics
                    .debug("listener", format!("dropped {peer_addr}: malformed init frame ({e})"));
                return;
            }
        };
        match decoded {
            InitMessage::PeerInit(init) => self.handle_peer_init(stream, peer_addr, init).await,
            InitMessage::PierceFirewall(pf) => {
                let conn = Connection::from_accepted(
                    stream,
                    self.connection_options.clone(),
                    self.diagnostics.clone(),
                    format!("inbound-pierce:{}", pf.token),
                );
                self.peers.handle_inbound_pierce_firewall(pf.token, conn);
            }
        }
    }

    async fn handle_peer_init(
        self: Arc<Self>,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        init: soulseek_proto::messages::init::PeerInit,
    ) {
        let username = init.username.to_string_lossy();
        let Some(tag) = ConnectionTypeTag::from_str(&init.connection_type.to_string_lossy()) else {
            self.diagnostics.debug(
                "listener",
                format!("unknown connection type from {username} ({peer_addr})"),
            );
            return;
        };
        match tag {
            ConnectionTypeTag::PeerMessage => {
                let conn = Connection::from_accepted(
                    stream,
                    self.connection_options.clone(),
                    self.diagnostics.clone(),
                    format!("inbound-peer:{username}"),
                );
                self.peers.handle_inbound_peer_message(&username, conn);
            }
            ConnectionTypeTag::Transfer => {
                // §4.5 step 4: a fourth field, the remote's own token,
                // immediately follows the handshake on a transfer socket.
                let remote_token = match read_i32_le(&mut stream).await {
                    Ok(t) => t,
                    Err(e) => {
                        self.diagnostics
                            .debug("listener", format!("dropped transfer handoff from {username}: {e}"));
                        return;
                    }
                };
                let conn = Connection::from_accepted(
                    stream,
                    self.connection_options.clone(),
                    self.diagnostics.clone(),
                    format!("inbound-transfer:{username}"),
                );
                self.peers.handle_inbound_direct_transfer(&username, remote_token, conn);
            }
            ConnectionTypeTag::Distributed => {
                let conn = Connection::from_accepted(
                    stream,
                    self.connection_options.clone(),
                    self.diagnostics.clone(),
                    format!("inbound-distributed:{username}"),
                );
                if let Err(e) = self.distributed.accept_child(&username, conn) {
                    self.diagnostics
                        .debug("listener", format!("rejected distributed child {username}: {e}"));
                }
            }
        }
    }
}

async fn read_init_frame(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    if body.is_empty() {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "empty init frame"));
    }
    let code = body[0];
    Ok((code, body[1..].to_vec()))
}

async fn read_i32_le(stream: &mut TcpStream) -> std::io::Result<i32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await?;
    Ok(i32::from_le_bytes(buf))
}
