use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock as SyncRwLock;
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};

use soulseek_net::{Connection, ConnectionOptions, Frame, MessageConnection, ReaderRole, WaitKey, Waiter};
use soulseek_proto::messages::init::PeerInit;
use soulseek_proto::ConnectionTypeTag;
use soulseek_util::{DiagnosticSink, TokenAllocator};

use crate::error::PeerError;
use crate::server_link::ServerLink;

/// A decoded frame off a peer connection, handed to whatever owns dispatch
/// (§4.7); the manager's job ends at establishing the connection and
/// starting the reader.
#[async_trait]
pub trait PeerFrameHandler: Send + Sync {
    async fn handle_frame(&self, username: &str, frame: Frame);
    async fn on_disconnected(&self, username: &str);
}

#[derive(Debug, Clone)]
pub struct PeerManagerOptions {
    pub connect_timeout: Duration,
    pub inactivity_timeout: Option<Duration>,
    pub indirect_timeout: Duration,
    pub concurrent_peer_connections: usize,
    pub max_write_size: usize,
}

impl Default for PeerManagerOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            inactivity_timeout: Some(Duration::from_secs(30)),
            indirect_timeout: Duration::from_secs(10),
            concurrent_peer_connections: 64,
            max_write_size: 16 * 1024 * 1024,
        }
    }
}

impl PeerManagerOptions {
    fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout: self.connect_timeout,
            inactivity_timeout: self.inactivity_timeout,
            max_write_size: self.max_write_size,
        }
    }
}

struct PeerRecord {
    gate: AsyncMutex<()>,
    connection: SyncRwLock<Option<Connection>>,
    permit: SyncRwLock<Option<OwnedSemaphorePermit>>,
}

impl PeerRecord {
    fn empty() -> Self {
        Self {
            gate: AsyncMutex::new(()),
            connection: SyncRwLock::new(None),
            permit: SyncRwLock::new(None),
        }
    }
}

/// Owns per-peer message connections and races direct/indirect attempts for
/// both message ("P") and transfer ("F") connections (§4.5).
pub struct PeerConnectionManager {
    records: SyncRwLock<HashMap<String, Arc<PeerRecord>>>,
    semaphore: Arc<Semaphore>,
    solicited: Arc<Waiter<Connection>>,
    direct_transfer: Arc<Waiter<Connection>>,
    server: Arc<dyn ServerLink>,
    tokens: Arc<TokenAllocator>,
    diagnostics: DiagnosticSink,
    handler: Arc<dyn PeerFrameHandler>,
    options: PeerManagerOptions,
}

impl PeerConnectionManager {
    pub fn new(
        server: Arc<dyn ServerLink>,
        tokens: Arc<TokenAllocator>,
        diagnostics: DiagnosticSink,
        handler: Arc<dyn PeerFrameHandler>,
        options: PeerManagerOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            records: SyncRwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(options.concurrent_peer_connections)),
            solicited: Waiter::new(),
            direct_transfer: Waiter::new(),
            server,
            tokens,
            diagnostics,
            handler,
            options,
        })
    }

    pub fn connection_count(&self) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| r.connection.read().as_ref().map(|c| c.is_connected()).unwrap_or(false))
            .count()
    }

    fn record_for(&self, username: &str) -> Arc<PeerRecord> {
        if let Some(record) = self.records.read().get(username) {
            return record.clone();
        }
        self.records
            .write()
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(PeerRecord::empty()))
            .clone()
    }

    /// Step 1-5 of §4.5: reuse an existing Connected connection, or race
    /// direct and indirect attempts and install the winner.
    pub async fn get_message_connection(
        self: &Arc<Self>,
        username: &str,
    ) -> Result<Connection, PeerError> {
        let record = self.record_for(username);
        let _gate = record.gate.lock().await;

        if let Some(existing) = record.connection.read().clone() {
            if existing.is_connected() {
                return Ok(existing);
            }
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PeerError::AtCapacity)?;

        let token = self.tokens.next();
        let conn = self
            .race_connect(username, ConnectionTypeTag::PeerMessage, token)
            .await?;

        self.spawn_dispatch(username.to_string(), conn.clone());
        *record.connection.write() = Some(conn.clone());
        *record.permit.write() = Some(permit);
        Ok(conn)
    }

    /// §4.5's transfer-connection race: type `"F"`, with the remote token
    /// appended to the handshake. Not capped by the message-connection
    /// semaphore and not stored in the username map — multiple transfers
    /// to the same user may be in flight concurrently.
    pub async fn open_transfer_connection(
        self: &Arc<Self>,
        username: &str,
        token: i32,
    ) -> Result<Connection, PeerError> {
        self.race_connect(username, ConnectionTypeTag::Transfer, token).await
    }

    async fn race_connect(
        self: &Arc<Self>,
        username: &str,
        connection_type: ConnectionTypeTag,
        token: i32,
    ) -> Result<Connection, PeerError> {
        let key = solicited_key(token);
        let direct = self.dial_direct(username, connection_type, token);
        let indirect = self.solicit_indirect(username, connection_type, token);
        tokio::pin!(direct);
        tokio::pin!(indirect);

        // Dropping the losing future cancels it: a not-yet-connected direct
        // dial's socket is torn down by the runtime, and an abandoned
        // indirect wait is cleaned up explicitly below so a late
        // PierceFirewall doesn't leak a connection nobody owns.
        let winner = futures::future::select(direct, indirect).await;
        match winner {
            futures::future::Either::Left((Ok(conn), _indirect)) => {
                self.solicited.cancel(&key, "direct connection already won");
                Ok(conn)
            }
            futures::future::Either::Right((Ok(conn), _direct)) => Ok(conn),
            futures::future::Either::Left((Err(_), indirect)) => indirect.await,
            futures::future::Either::Right((Err(_), direct)) => direct.await,
        }
        .map_err(|_| PeerError::BothAttemptsFailed {
            username: username.to_string(),
        })
    }

    async fn dial_direct(
        &self,
        username: &str,
        connection_type: ConnectionTypeTag,
        token: i32,
    ) -> Result<Connection, ()> {
        let (ip, port) = self.server.get_peer_address(username).await.map_err(|_| ())?;
        let addr = SocketAddr::new(ip, port);
        let conn = Connection::connect(
            addr,
            self.options.connection_options(),
            self.diagnostics.clone(),
            format!("peer:{username}:{}", connection_type.as_str()),
        )
        .await
        .map_err(|_| ())?;

        let handshake = PeerInit {
            username: self.server.local_username().into(),
            connection_type: connection_type.as_str().into(),
            token,
        }
        .encode();
        conn.write(&handshake).await.map_err(|_| ())?;

        if connection_type == ConnectionTypeTag::Transfer {
            // §4.5 step 4: the remote's own token immediately follows the
            // handshake on a transfer socket, as its own 4-byte LE write.
            conn.write(&token.to_le_bytes()).await.map_err(|_| ())?;
        }
        Ok(conn)
    }

    async fn solicit_indirect(
        &self,
        username: &str,
        connection_type: ConnectionTypeTag,
        token: i32,
    ) -> Result<Connection, ()> {
        let key = solicited_key(token);
        // Registering the wait before sending ConnectToPeer avoids a race
        // where an extremely prompt PierceFirewall arrives before we start
        // listening for it.
        let wait = self.solicited.wait(key.clone(), self.options.indirect_timeout);
        self.server
            .request_indirect_connect(token, username, connection_type)
            .await
            .map_err(|_| ())?;
        wait.await.map_err(|_| ())
    }

    /// Listener handoff (§4.9) for an inbound `PeerInit` of type `"P"`: the
    /// new connection replaces whatever was previously stored (§3
    /// invariant).
    pub fn handle_inbound_peer_message(self: &Arc<Self>, username: &str, conn: Connection) {
        let record = self.record_for(username);
        // Best-effort: an inbound connection counts against the same cap as
        // an outbound one, but we never reject an already-open handshake
        // over it — a saturated semaphore just means this record doesn't
        // hold a permit, and the next `get_message_connection` lookup pays
        // for one when it reuses this connection.
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            *record.permit.write() = Some(permit);
        }
        if let Some(old) = record.connection.write().replace(conn.clone()) {
            let old = old.clone();
            tokio::spawn(async move { old.disconnect("replaced by new inbound connection").await });
        }
        self.spawn_dispatch(username.to_string(), conn);
    }

    /// Listener handoff for an inbound `PeerInit` of type `"F"`: the
    /// listener has already read the trailing remote token (§4.5 step 4).
    pub fn handle_inbound_direct_transfer(&self, username: &str, remote_token: i32, conn: Connection) {
        let key = direct_transfer_key(username, remote_token);
        let spare = conn.clone();
        if !self.direct_transfer.complete(&key, conn) {
            self.diagnostics.debug(
                "peer_manager",
                format!("unsolicited direct transfer connection from {username} (token {remote_token})"),
            );
            tokio::spawn(async move { spare.disconnect("no matching transfer wait").await });
        }
    }

    /// Listener handoff for an inbound `PierceFirewall{token}` (§4.9): the
    /// type (`"P"` or `"F"`) was fixed when the token was solicited, so the
    /// lookup needs only the token.
    pub fn handle_inbound_pierce_firewall(&self, token: i32, conn: Connection) {
        let key = solicited_key(token);
        let spare = conn.clone();
        if !self.solicited.complete(&key, conn) {
            self.diagnostics.debug(
                "peer_manager",
                format!("pierce firewall for unknown token {token}"),
            );
            tokio::spawn(async move { spare.disconnect("no matching solicitation").await });
        }
    }

    /// A caller awaiting a remote-initiated direct transfer connection
    /// (§4.8's `IndirectTransfer` wait) registers here.
    pub async fn await_direct_transfer(
        self: &Arc<Self>,
        username: &str,
        remote_token: i32,
        timeout: Duration,
    ) -> Result<Connection, PeerError> {
        self.direct_transfer
            .wait(direct_transfer_key(username, remote_token), timeout)
            .await
            .map_err(|_| PeerError::IndirectTimedOut {
                username: username.to_string(),
            })
    }

    fn spawn_dispatch(self: &Arc<Self>, username: String, conn: Connection) {
        let this = self.clone();
        tokio::spawn(async move {
            let Some(mut mc) = MessageConnection::spawn(conn, ReaderRole::Peer, this.diagnostics.clone()).await else {
                return;
            };
            while let Some(frame) = mc.recv().await {
                this.handler.handle_frame(&username, frame).await;
            }
            this.records.write().remove(&username);
            this.handler.on_disconnected(&username).await;
        });
    }
}

fn solicited_key(token: i32) -> WaitKey {
    WaitKey::new("peer_solicited", token.to_string())
}

fn direct_transfer_key(username: &str, remote_token: i32) -> WaitKey {
    WaitKey::new("peer_direct_transfer", format!("{username}|{remote_token}"))
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use soulseek_net::ConnectionState;
    use soulseek_util::DiagnosticLevel;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    struct StubHandler;

    #[async_trait]
    impl PeerFrameHandler for StubHandler {
        async fn handle_frame(&self, _username: &str, _frame: Frame) {}
        async fn on_disconnected(&self, _username: &str) {}
    }

    struct StubServerLink {
        peer_addr: SocketAddr,
    }

    #[async_trait]
    impl ServerLink for StubServerLink {
        async fn get_peer_address(&self, _username: &str) -> Result<(std::net::IpAddr, u16), PeerError> {
            Ok((self.peer_addr.ip(), self.peer_addr.port()))
        }

        // Never completes: forces every race in this module to resolve via
        // the direct branch, exactly as a remote that never relays a
        // PierceFirewall would.
        async fn request_indirect_connect(
            &self,
            _token: i32,
            _username: &str,
            _connection_type: ConnectionTypeTag,
        ) -> Result<(), PeerError> {
            Ok(())
        }

        fn local_username(&self) -> String {
            "me".to_string()
        }

        async fn send(&self, _frame: Vec<u8>) -> Result<(), PeerError> {
            Ok(())
        }
    }

    fn diagnostics() -> DiagnosticSink {
        DiagnosticSink::new(DiagnosticLevel::Debug)
    }

    fn manager(peer_addr: SocketAddr, options: PeerManagerOptions) -> Arc<PeerConnectionManager> {
        let server: Arc<dyn ServerLink> = Arc::new(StubServerLink { peer_addr });
        PeerConnectionManager::new(server, Arc::new(TokenAllocator::default()), diagnostics(), Arc::new(StubHandler), options)
    }

    fn fast_options() -> PeerManagerOptions {
        PeerManagerOptions {
            indirect_timeout: Duration::from_millis(50),
            ..PeerManagerOptions::default()
        }
    }

    /// Drains one `PeerInit` handshake off an accepted stream so the dialer's
    /// write doesn't block on a full socket buffer.
    async fn accept_one_handshake(listener: TcpListener) {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut len_buf = [0u8; 4];
            if stream.read_exact(&mut len_buf).await.is_err() {
                return;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut rest = vec![0u8; len];
            let _ = stream.read_exact(&mut rest).await;
        }
    }

    async fn socket_pair() -> (Connection, Connection) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let diagnostics = diagnostics();
        let client_fut = Connection::connect(addr, ConnectionOptions::default(), diagnostics.clone(), "client");
        let (server_stream, _) = listener.accept().await.unwrap();
        let client = client_fut.await.unwrap();
        let server = Connection::from_accepted(server_stream, ConnectionOptions::default(), diagnostics, "server");
        (client, server)
    }

    #[tokio::test]
    async fn direct_dial_succeeds_and_is_reused() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(accept_one_handshake(listener));

        let peers = manager(addr, fast_options());

        let conn = peers.get_message_connection("alice").await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(peers.connection_count(), 1);

        // Second call must reuse the stored connection rather than dialing
        // again — nothing is listening for a second accept.
        let again = peers.get_message_connection("alice").await.unwrap();
        assert!(again.is_connected());
        assert_eq!(peers.connection_count(), 1);
    }

    #[tokio::test]
    async fn capacity_limit_blocks_further_dials() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut stream = stream;
                    let mut len_buf = [0u8; 4];
                    if stream.read_exact(&mut len_buf).await.is_err() {
                        return;
                    }
                    let len = u32::from_le_bytes(len_buf) as usize;
                    let mut rest = vec![0u8; len];
                    let _ = stream.read_exact(&mut rest).await;
                });
            }
        });

        let peers = manager(
            addr,
            PeerManagerOptions {
                concurrent_peer_connections: 1,
                ..fast_options()
            },
        );

        let first = peers.get_message_connection("alice").await.unwrap();
        assert!(first.is_connected());

        let blocked = tokio::time::timeout(Duration::from_millis(200), peers.get_message_connection("bob")).await;
        assert!(blocked.is_err(), "a saturated cap must block rather than fail fast");
    }

    #[tokio::test]
    async fn inbound_handoff_replaces_existing_connection() {
        let peers = manager("127.0.0.1:1".parse().unwrap(), fast_options());

        let (original_here, _original_remote) = socket_pair().await;
        peers.handle_inbound_peer_message("alice", original_here.clone());
        assert!(original_here.is_connected());

        let (replacement_here, _replacement_remote) = socket_pair().await;
        peers.handle_inbound_peer_message("alice", replacement_here.clone());

        // The old connection's teardown is spawned, not synchronous.
        for _ in 0..20 {
            if original_here.state() == ConnectionState::Disconnected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(original_here.state(), ConnectionState::Disconnected);
        assert!(replacement_here.is_connected());
    }

    #[tokio::test]
    async fn pierce_firewall_with_no_matching_wait_closes_the_connection() {
        let peers = manager("127.0.0.1:1".parse().unwrap(), fast_options());
        let (here, _remote) = socket_pair().await;
        peers.handle_inbound_pierce_firewall(999, here.clone());

        for _ in 0..20 {
            if here.state() == ConnectionState::Disconnected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(here.state(), ConnectionState::Disconnected);
    }
}
