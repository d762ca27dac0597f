use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock as SyncRwLock;
use tokio::sync::Mutex as AsyncMutex;

use soulseek_net::{Connection, ConnectionOptions, Frame, MessageConnection, ReaderRole};
use soulseek_proto::messages::distributed::{BranchLevel, BranchRoot, DistributedMessage};
use soulseek_proto::messages::init::PeerInit;
use soulseek_proto::messages::server::{
    AcceptChildrenRequest, BranchLevelRequest, BranchRootRequest, ChildDepthRequest, HaveNoParentsRequest,
    ParentCandidate, ParentsIPRequest,
};
use soulseek_proto::ConnectionTypeTag;
use soulseek_util::DiagnosticSink;

use crate::error::DistributedError;
use crate::server_link::ServerLink;

#[async_trait]
pub trait DistributedFrameHandler: Send + Sync {
    /// A search request that reached us from the parent (or, per the §9
    /// open question, a repackaged `ServerSearchRequest`) — already
    /// forwarded to every child by the time this fires.
    async fn handle_search(&self, originating_username: &str, token: i32, query: &str);
}

#[derive(Debug, Clone)]
pub struct DistributedManagerOptions {
    pub connect_timeout: Duration,
    pub concurrent_distributed_children_limit: usize,
    pub enabled: bool,
}

impl Default for DistributedManagerOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            concurrent_distributed_children_limit: 10,
            enabled: true,
        }
    }
}

struct Topology {
    parent: Option<(String, Connection)>,
    branch_level: u32,
    branch_root: Option<String>,
    children: HashMap<String, Connection>,
    child_depths: HashMap<String, u32>,
}

impl Topology {
    fn new() -> Self {
        Self {
            parent: None,
            branch_level: 0,
            branch_root: None,
            children: HashMap::new(),
            child_depths: HashMap::new(),
        }
    }

    fn child_depth(&self) -> u32 {
        self.child_depths.values().copied().max().map(|d| d + 1).unwrap_or(0)
    }

    fn accept_children(&self, limit: usize) -> bool {
        self.children.len() < limit
    }
}

/// Maintains exactly one parent connection and a bounded set of children in
/// the distributed search overlay, and keeps the server and children
/// informed of topology changes (§4.6).
pub struct DistributedConnectionManager {
    topology: SyncRwLock<Topology>,
    adopt_gate: AsyncMutex<()>,
    server: Arc<dyn ServerLink>,
    diagnostics: DiagnosticSink,
    handler: Arc<dyn DistributedFrameHandler>,
    options: DistributedManagerOptions,
}

impl DistributedConnectionManager {
    pub fn new(
        server: Arc<dyn ServerLink>,
        diagnostics: DiagnosticSink,
        handler: Arc<dyn DistributedFrameHandler>,
        options: DistributedManagerOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            topology: SyncRwLock::new(Topology::new()),
            adopt_gate: AsyncMutex::new(()),
            server,
            diagnostics,
            handler,
            options,
        })
    }

    pub fn has_parent(&self) -> bool {
        self.topology.read().parent.is_some()
    }

    pub fn child_count(&self) -> usize {
        self.topology.read().children.len()
    }

    pub fn branch_level(&self) -> u32 {
        self.topology.read().branch_level
    }

    pub fn branch_root(&self) -> Option<String> {
        self.topology.read().branch_root.clone()
    }

    /// §4.6: on a `NetInfo` candidate list, dial all candidates
    /// concurrently and adopt whichever handshakes first.
    pub async fn adopt_parent_from_candidates(self: &Arc<Self>, candidates: Vec<ParentCandidate>) {
        if !self.options.enabled || candidates.is_empty() {
            return;
        }
        let _gate = self.adopt_gate.lock().await;
        if self.has_parent() {
            return;
        }

        let mut futs: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = Result<(String, Connection), DistributedError>> + Send + '_>>> =
            candidates.into_iter().map(|c| Box::pin(self.dial_candidate(c)) as _).collect();
        let mut winner = None;
        while !futs.is_empty() {
            let (result, _index, remaining) = futures::future::select_all(futs).await;
            futs = remaining;
            if let Ok((username, conn)) = result {
                winner = Some((username, conn));
                break;
            }
        }
        // Every other in-flight dial is dropped here, tearing down its
        // socket (§4.6 "the losers are disposed").
        drop(futs);

        let Some((username, conn)) = winner else {
            self.diagnostics
                .warning("distributed_manager", "no parent candidate was reachable");
            return;
        };

        self.topology.write().parent = Some((username.clone(), conn.clone()));
        self.push_server_state().await;
        self.spawn_parent_dispatch(username, conn);
    }

    async fn dial_candidate(&self, candidate: ParentCandidate) -> Result<(String, Connection), DistributedError> {
        let addr = SocketAddr::new(std::net::IpAddr::V4(candidate.ip), candidate.port as u16);
        let conn = Connection::connect(
            addr,
            ConnectionOptions {
                connect_timeout: self.options.connect_timeout,
                ..Default::default()
            },
            self.diagnostics.clone(),
            format!("distributed:parent:{}", candidate.username),
        )
        .await?;
        let handshake = PeerInit {
            username: self.server.local_username().into(),
            connection_type: ConnectionTypeTag::Distributed.as_str().into(),
            token: 0,
        }
        .encode();
        conn.write(&handshake).await?;
        Ok((candidate.username.to_string(), conn))
    }

    fn spawn_parent_dispatch(self: &Arc<Self>, username: String, conn: Connection) {
        let this = self.clone();
        tokio::spawn(async move {
            let Some(mut mc) = MessageConnection::spawn(conn, ReaderRole::Peer, this.diagnostics.clone()).await else {
                return;
            };
            while let Some(frame) = mc.recv().await {
                this.handle_parent_frame(&frame).await;
            }
            this.on_parent_lost().await;
        });
    }

    async fn handle_parent_frame(self: &Arc<Self>, frame: &Frame) {
        let decoded = match DistributedMessage::decode(frame.code, &frame.payload) {
            Ok(m) => m,
            Err(e) => {
                self.diagnostics
                    .debug("distributed_manager", format!("malformed parent frame: {e}"));
                return;
            }
        };
        match decoded {
            DistributedMessage::BranchLevel(level) => {
                self.topology.write().branch_level = level.level;
                self.propagate().await;
            }
            DistributedMessage::BranchRoot(root) => {
                self.topology.write().branch_root = Some(root.root.to_string());
                self.propagate().await;
            }
            DistributedMessage::SearchRequest(req) => {
                let bytes = req.clone().into_frame();
                self.broadcast(&bytes).await;
                self.handler
                    .handle_search(&req.originating_username.to_string_lossy(), req.token, &req.query.to_string_lossy())
                    .await;
            }
            DistributedMessage::ServerSearchRequest(wrapped) => {
                self.diagnostics
                    .debug("distributed_manager", "rebroadcasting a ServerSearchRequest as SearchRequest");
                let req = wrapped.inner;
                let bytes = req.clone().into_frame();
                self.broadcast(&bytes).await;
                self.handler
                    .handle_search(&req.originating_username.to_string_lossy(), req.token, &req.query.to_string_lossy())
                    .await;
            }
            DistributedMessage::Ping(_) | DistributedMessage::ChildDepth(_) | DistributedMessage::Unrecognized { .. } => {}
        }
    }

    async fn on_parent_lost(self: &Arc<Self>) {
        self.topology.write().parent = None;
        self.topology.write().branch_level = 0;
        self.topology.write().branch_root = None;
        // §8: "On parent disconnect, the manager sends HaveNoParents(true)
        // before any further distributed write."
        self.push_server_state().await;
        self.propagate().await;
    }

    /// §4.9 handoff for an inbound distributed ("D") handshake.
    pub fn accept_child(self: &Arc<Self>, username: &str, conn: Connection) -> Result<(), DistributedError> {
        let mut topology = self.topology.write();
        if !topology.accept_children(self.options.concurrent_distributed_children_limit) {
            drop(topology);
            let conn = conn.clone();
            tokio::spawn(async move { conn.disconnect("distributed child capacity reached").await });
            return Err(DistributedError::AtCapacity);
        }
        topology.children.insert(username.to_string(), conn.clone());
        drop(topology);
        self.spawn_child_dispatch(username.to_string(), conn);
        let this = self.clone();
        tokio::spawn(async move { this.push_server_state().await });
        Ok(())
    }

    fn spawn_child_dispatch(self: &Arc<Self>, username: String, conn: Connection) {
        let this = self.clone();
        tokio::spawn(async move {
            let Some(mut mc) = MessageConnection::spawn(conn, ReaderRole::Peer, this.diagnostics.clone()).await else {
                return;
            };
            while let Some(frame) = mc.recv().await {
                if let Ok(DistributedMessage::ChildDepth(depth)) = DistributedMessage::decode(frame.code, &frame.payload) {
                    this.topology.write().child_depths.insert(username.clone(), depth.depth);
                    this.push_server_state().await;
                }
            }
            let mut topology = this.topology.write();
            topology.children.remove(&username);
            topology.child_depths.remove(&username);
            drop(topology);
            this.push_server_state().await;
        });
    }

    /// Writes to each child; a failing child is disposed but does not block
    /// the others (§4.6 `broadcast(bytes)`).
    pub async fn broadcast(&self, bytes: &[u8]) {
        let children: Vec<Connection> = self.topology.read().children.values().cloned().collect();
        for child in children {
            if let Err(e) = child.write(bytes).await {
                self.diagnostics
                    .debug("distributed_manager", format!("broadcast write failed: {e}"));
            }
        }
    }

    async fn propagate(&self) {
        let (level, root) = {
            let topology = self.topology.read();
            (topology.branch_level, topology.branch_root.clone())
        };
        let mut frames = Vec::new();
        frames.push(BranchLevel { level }.encode());
        if let Some(root) = root {
            frames.push(BranchRoot { root: root.into() }.encode());
        }
        for frame in frames {
            self.broadcast(&frame).await;
        }
    }

    async fn push_server_state(&self) {
        let (has_parent, level, root, depth, accept) = {
            let topology = self.topology.read();
            (
                topology.parent.is_some(),
                topology.branch_level,
                topology.branch_root.clone(),
                topology.child_depth(),
                topology.accept_children(self.options.concurrent_distributed_children_limit),
            )
        };
        let _ = self.server.send(HaveNoParentsRequest { value: !has_parent }.encode()).await;
        let ip = Ipv4Addr::UNSPECIFIED;
        let _ = self.server.send(ParentsIPRequest { ip }.encode()).await;
        let _ = self.server.send(BranchLevelRequest { level }.encode()).await;
        if let Some(root) = root {
            let _ = self.server.send(BranchRootRequest { root: root.into() }.encode()).await;
        }
        let _ = self.server.send(ChildDepthRequest { depth }.encode()).await;
        let _ = self.server.send(AcceptChildrenRequest { accept }.encode()).await;
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr as StdIpv4};

    use soulseek_proto::messages::distributed::ChildDepth;
    use soulseek_util::DiagnosticLevel;
    use tokio::net::TcpListener;

    use super::*;
    use crate::error::PeerError;

    struct StubServerLink {
        local: String,
        sent: tokio::sync::Mutex<Vec<Vec<u8>>>,
    }

    impl StubServerLink {
        fn new(local: &str) -> Arc<Self> {
            Arc::new(Self {
                local: local.to_string(),
                sent: tokio::sync::Mutex::new(Vec::new()),
            })
        }

        async fn sent_frames(&self) -> Vec<Vec<u8>> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl ServerLink for StubServerLink {
        async fn get_peer_address(&self, _username: &str) -> Result<(IpAddr, u16), PeerError> {
            Err(PeerError::ServerUnavailable("not used by the distributed manager".into()))
        }

        async fn request_indirect_connect(
            &self,
            _token: i32,
            _username: &str,
            _connection_type: ConnectionTypeTag,
        ) -> Result<(), PeerError> {
            Ok(())
        }

        fn local_username(&self) -> String {
            self.local.clone()
        }

        async fn send(&self, frame: Vec<u8>) -> Result<(), PeerError> {
            self.sent.lock().await.push(frame);
            Ok(())
        }
    }

    fn diagnostics() -> DiagnosticSink {
        DiagnosticSink::new(DiagnosticLevel::Debug)
    }

    async fn socket_pair() -> (Connection, Connection) {
        let listener = TcpListener::bind((StdIpv4::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let diagnostics = diagnostics();
        let client_fut = Connection::connect(addr, ConnectionOptions::default(), diagnostics.clone(), "client");
        let (server_stream, _) = listener.accept().await.unwrap();
        let client = client_fut.await.unwrap();
        let server = Connection::from_accepted(server_stream, ConnectionOptions::default(), diagnostics, "server");
        (client, server)
    }

    struct NullHandler;

    #[async_trait]
    impl DistributedFrameHandler for NullHandler {
        async fn handle_search(&self, _originating_username: &str, _token: i32, _query: &str) {}
    }

    #[tokio::test]
    async fn adopts_the_first_reachable_parent_candidate() {
        let listener = TcpListener::bind((StdIpv4::LOCALHOST, 0)).await.unwrap();
        let good_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                use tokio::io::AsyncReadExt;
                let mut len_buf = [0u8; 4];
                let _ = stream.read_exact(&mut len_buf).await;
                let len = u32::from_le_bytes(len_buf) as usize;
                let mut rest = vec![0u8; len];
                let _ = stream.read_exact(&mut rest).await;
            }
        });

        // Bound then immediately dropped: the port is free but nothing
        // answers, so a connect attempt there is refused.
        let dead_listener = TcpListener::bind((StdIpv4::LOCALHOST, 0)).await.unwrap();
        let bad_addr = dead_listener.local_addr().unwrap();
        drop(dead_listener);

        let server = StubServerLink::new("me");
        let handler: Arc<dyn DistributedFrameHandler> = Arc::new(NullHandler);
        let manager = DistributedConnectionManager::new(
            server.clone(),
            diagnostics(),
            handler,
            DistributedManagerOptions {
                connect_timeout: Duration::from_millis(500),
                ..DistributedManagerOptions::default()
            },
        );

        let candidates = vec![
            ParentCandidate {
                username: "good".into(),
                ip: good_addr.ip().to_string().parse().unwrap(),
                port: good_addr.port() as u32,
            },
            ParentCandidate {
                username: "bad".into(),
                ip: bad_addr.ip().to_string().parse().unwrap(),
                port: bad_addr.port() as u32,
            },
        ];
        manager.adopt_parent_from_candidates(candidates).await;

        assert!(manager.has_parent());

        let sent = server.sent_frames().await;
        assert!(!sent.is_empty());
        assert_eq!(sent[0], HaveNoParentsRequest { value: false }.encode());
    }

    #[tokio::test]
    async fn child_capacity_is_enforced() {
        let server = StubServerLink::new("me");
        let handler: Arc<dyn DistributedFrameHandler> = Arc::new(NullHandler);
        let manager = DistributedConnectionManager::new(
            server,
            diagnostics(),
            handler,
            DistributedManagerOptions {
                concurrent_distributed_children_limit: 1,
                ..DistributedManagerOptions::default()
            },
        );

        let (first_here, _first_remote) = socket_pair().await;
        manager.accept_child("child1", first_here).unwrap();
        assert_eq!(manager.child_count(), 1);

        let (second_here, _second_remote) = socket_pair().await;
        let err = manager.accept_child("child2", second_here.clone()).unwrap_err();
        assert!(matches!(err, DistributedError::AtCapacity));
        assert_eq!(manager.child_count(), 1);

        for _ in 0..20 {
            if second_here.state() == soulseek_net::ConnectionState::Disconnected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(second_here.state(), soulseek_net::ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn child_depth_reports_propagate_to_the_server() {
        let server = StubServerLink::new("me");
        let handler: Arc<dyn DistributedFrameHandler> = Arc::new(NullHandler);
        let manager = DistributedConnectionManager::new(server.clone(), diagnostics(), handler, DistributedManagerOptions::default());

        let (here, remote) = socket_pair().await;
        manager.accept_child("child1", here).unwrap();
        remote.write(&ChildDepth { depth: 3 }.encode()).await.unwrap();

        let expected = ChildDepthRequest { depth: 4 }.encode();
        for _ in 0..50 {
            if server.sent_frames().await.iter().any(|f| f == &expected) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(server.sent_frames().await.iter().any(|f| f == &expected));
    }
}
