use std::net::IpAddr;
use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use parking_lot::RwLock as SyncRwLock;
use tokio::sync::{broadcast, Mutex as AsyncMutex};

use soulseek_net::{Connection, ConnectionOptions, Frame, MessageConnection, ReaderRole, WaitKey};
use soulseek_p2p::{
    DistributedConnectionManager, DistributedManagerOptions, DistributedSearchForwarder, Listener, P2pEvent,
    PeerConnectionManager, PeerError, PeerFrameHandler, PeerManagerOptions, PeerMessageHandlers, Resolvers,
    ServerFrameHandler, ServerLink, Waiters,
};
use soulseek_proto::messages::peer::InfoRequest;
use soulseek_proto::messages::server::{
    AcknowledgePrivateMessageRequest, AddUserRequest, AddUserResponse, ConnectToPeerRequest, FileSearchRequest,
    GetPeerAddressRequest, GetStatusRequest, LoginRequest, LoginResponse, SetListenPortRequest, SetOnlineStatusRequest,
    SharedFoldersAndFilesRequest,
};
use soulseek_proto::types::{Directory, UserInfo, UserStatus};
use soulseek_proto::ConnectionTypeTag;
use soulseek_transfer::{
    run_download, run_upload, TransferError, TransferGovernor, TransferHandle, TransferOptions, TransferRegistry,
    TransferSink, TransferSource,
};
use soulseek_util::{DiagnosticEvent, DiagnosticSink, TokenAllocator};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::state::{ClientState, ClientStateEvent};
use crate::transfers::ClientTransferHandler;

/// A file size beyond what the wire's `i64` length field can mean (§9 open
/// question: "reject at the façade boundary" rather than truncating or
/// letting a later path silently misbehave).
const MAX_FILE_SIZE: i64 = i32::MAX as i64;

/// The server `Connection` plus the one piece of server-derived state the
/// peer/distributed managers need back: our own username, unknown until
/// `login()` succeeds (§4.10, §9 "Global mutable state").
struct ServerConnectionState {
    conn: SyncRwLock<Option<Connection>>,
    username: SyncRwLock<Option<String>>,
}

impl ServerConnectionState {
    fn empty() -> Self {
        Self {
            conn: SyncRwLock::new(None),
            username: SyncRwLock::new(None),
        }
    }
}

/// The façade's implementation of the peer/distributed managers' narrow
/// server interface (§9 "Cyclic ownership"): they depend on this trait
/// object, never on [`SoulseekClient`] itself.
struct ClientServerLink {
    state: Arc<ServerConnectionState>,
    waiters: Arc<Waiters>,
    message_timeout: std::time::Duration,
}

impl ClientServerLink {
    fn connection(&self) -> Result<Connection, PeerError> {
        self.state
            .conn
            .read()
            .clone()
            .ok_or_else(|| PeerError::ServerUnavailable("not connected to the server".into()))
    }
}

#[async_trait]
impl ServerLink for ClientServerLink {
    async fn get_peer_address(&self, username: &str) -> Result<(IpAddr, u16), PeerError> {
        let conn = self.connection()?;
        conn.write(&GetPeerAddressRequest { username: username.into() }.encode())
            .await
            .map_err(PeerError::from)?;
        self.waiters
            .get_peer_address
            .wait(WaitKey::new("get_peer_address", username), self.message_timeout)
            .await
            .map_err(|_| PeerError::ServerUnavailable("get_peer_address timed out".into()))
    }

    async fn request_indirect_connect(
        &self,
        token: i32,
        username: &str,
        connection_type: ConnectionTypeTag,
    ) -> Result<(), PeerError> {
        let conn = self.connection()?;
        conn.write(
            &ConnectToPeerRequest {
                token,
                username: username.into(),
                connection_type: connection_type.as_str().into(),
            }
            .encode(),
        )
        .await
        .map_err(PeerError::from)
    }

    fn local_username(&self) -> String {
        self.state.username.read().clone().unwrap_or_default()
    }

    async fn send(&self, frame: Vec<u8>) -> Result<(), PeerError> {
        self.connection()?.write(&frame).await.map_err(PeerError::from)
    }
}

/// Breaks the cycle between `PeerConnectionManager` (needs a handler at
/// construction) and `PeerMessageHandlers` (needs the manager at
/// construction, per §9): the manager is handed this slot instead, and the
/// real handler is dropped in once it exists, one statement later.
struct PeerHandlerSlot {
    inner: OnceLock<Arc<PeerMessageHandlers>>,
}

impl PeerHandlerSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self { inner: OnceLock::new() })
    }

    fn set(&self, handler: Arc<PeerMessageHandlers>) {
        let _ = self.inner.set(handler);
    }
}

#[async_trait]
impl PeerFrameHandler for PeerHandlerSlot {
    async fn handle_frame(&self, username: &str, frame: Frame) {
        if let Some(handler) = self.inner.get() {
            handler.handle_frame(username, frame).await;
        }
    }

    async fn on_disconnected(&self, username: &str) {
        if let Some(handler) = self.inner.get() {
            handler.on_disconnected(username).await;
        }
    }
}

/// Everything that only comes into existence once a username is known
/// (§9): built inside `login()`, torn down on disconnect. Cheap to `Clone`
/// since every field is itself an `Arc`.
#[derive(Clone)]
struct Runtime {
    peers: Arc<PeerConnectionManager>,
    distributed: Arc<DistributedConnectionManager>,
    transfer_registry: Arc<TransferRegistry>,
    server_handler: Arc<ServerFrameHandler>,
    listener: Option<Arc<Listener>>,
}

/// The embeddable Soulseek client (§4.10): owns the server connection and
/// lazily-built peer/distributed/transfer runtime, and is the single entry
/// point a host program talks to.
pub struct SoulseekClient {
    config: ClientConfig,
    resolvers: Resolvers,
    diagnostics: DiagnosticSink,
    server_state: Arc<ServerConnectionState>,
    server_link: Arc<dyn ServerLink>,
    waiters: Arc<Waiters>,
    tokens: Arc<TokenAllocator>,
    events: broadcast::Sender<ClientEvent>,
    p2p_events: broadcast::Sender<P2pEvent>,
    state: SyncRwLock<ClientState>,
    server_mc: AsyncMutex<Option<MessageConnection>>,
    runtime: SyncRwLock<Option<Runtime>>,
}

impl SoulseekClient {
    pub fn new(config: ClientConfig, resolvers: Resolvers) -> Arc<Self> {
        let diagnostics = DiagnosticSink::new(config.minimum_diagnostic_level);
        let waiters = Arc::new(Waiters::new());
        let server_state = Arc::new(ServerConnectionState::empty());
        let server_link: Arc<dyn ServerLink> = Arc::new(ClientServerLink {
            state: server_state.clone(),
            waiters: waiters.clone(),
            message_timeout: config.message_timeout,
        });
        let (events, _) = broadcast::channel(256);
        let (p2p_events, _) = broadcast::channel(256);

        let client = Arc::new(Self {
            config,
            resolvers,
            diagnostics,
            server_state,
            server_link,
            waiters,
            tokens: Arc::new(TokenAllocator::default()),
            events,
            p2p_events,
            state: SyncRwLock::new(ClientState::default()),
            server_mc: AsyncMutex::new(None),
            runtime: SyncRwLock::new(None),
        });
        client.spawn_event_forwarder();
        client
    }

    /// The host-facing event stream (§4.10): state transitions, private
    /// messages, search/browse results, upload offers, and everything else
    /// not tied to an in-flight request/response pair.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// The operator-facing trace stream, deliberately separate from
    /// `subscribe()` (§0).
    pub fn diagnostics(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.diagnostics.subscribe()
    }

    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    fn spawn_event_forwarder(self: &Arc<Self>) {
        let mut rx = self.p2p_events.subscribe();
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                let _ = events.send(ClientEvent::from(event));
            }
        });
    }

    fn transition(&self, event: ClientStateEvent) -> Result<ClientState, ClientError> {
        let mut guard = self.state.write();
        let from = *guard;
        let next = guard.advance(event).ok_or(ClientError::InvalidState { from, event })?;
        *guard = next;
        drop(guard);
        let _ = self.events.send(ClientEvent::StateChanged(next));
        Ok(next)
    }

    fn runtime(&self) -> Result<Runtime, ClientError> {
        self.runtime.read().clone().ok_or(ClientError::ServerUnavailable)
    }

    /// Dials the server and advances to `Connected` (§4.10 step 1). Does not
    /// log in — `login()` is a separate call, since the username it needs
    /// is only known once the caller supplies credentials.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        self.transition(ClientStateEvent::Connect)?;
        let options: ConnectionOptions = (&self.config.server_connection_options).into();
        let conn = Connection::connect(
            self.config.server_address,
            options,
            self.diagnostics.clone(),
            "server",
        )
        .await
        .map_err(|e| {
            let _ = self.transition(ClientStateEvent::Disconnect);
            e
        })?;
        *self.server_state.conn.write() = Some(conn.clone());
        let mc = MessageConnection::spawn(conn, ReaderRole::Server, self.diagnostics.clone())
            .await
            .ok_or(ClientError::ServerUnavailable)?;
        *self.server_mc.lock().await = Some(mc);
        self.transition(ClientStateEvent::Connected)?;
        Ok(())
    }

    /// Sends `LoginRequest`, reads the `LoginResponse` directly off the
    /// server connection (§8 scenario 1), and — only once the username is
    /// confirmed — builds the peer/distributed/transfer runtime and starts
    /// the server dispatch loop.
    pub async fn login(self: &Arc<Self>, username: &str, password: &str) -> Result<(), ClientError> {
        let digest = format!("{:x}", md5::compute(format!("{username}{password}")));
        let request = LoginRequest {
            username: username.into(),
            password: password.into(),
            version: 181,
            md5_digest: digest.into(),
            minor_version: 1,
        };

        let mut guard = self.server_mc.lock().await;
        let mc = guard.as_mut().ok_or(ClientError::ServerUnavailable)?;
        mc.send(&request.encode()).await?;
        let frame = mc.recv().await.ok_or(ClientError::ServerUnavailable)?;
        let response = LoginResponse::decode(&frame.payload)?;
        if !response.success {
            return Err(ClientError::LoginRejected(response.message.to_string_lossy()));
        }
        drop(guard);

        *self.server_state.username.write() = Some(username.to_string());
        let runtime = self.build_runtime();
        *self.runtime.write() = Some(runtime.clone());
        self.transition(ClientStateEvent::LoggedIn)?;

        if let Some(listener) = &runtime.listener {
            let bound = listener
                .bind(std::net::SocketAddr::new(
                    std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
                    self.config.listen_port.unwrap_or(0),
                ))
                .await
                .map_err(ClientError::ListenBind)?;
            self.server_link
                .send(SetListenPortRequest { port: bound as u32 }.encode())
                .await?;
        }
        self.server_link
            .send(SharedFoldersAndFilesRequest { folders: 0, files: 0 }.encode())
            .await?;
        self.server_link
            .send(SetOnlineStatusRequest { status: UserStatus::Online }.encode())
            .await?;

        self.spawn_server_dispatch();
        Ok(())
    }

    /// Wires up the managers in construction order that respects every
    /// dependency except the one genuine cycle (§9), which goes through
    /// [`PeerHandlerSlot`].
    fn build_runtime(self: &Arc<Self>) -> Runtime {
        let local_username = self.server_link.local_username();
        let peer_handler_slot = PeerHandlerSlot::new();
        let transfer_registry = TransferRegistry::new();

        let peers = PeerConnectionManager::new(
            self.server_link.clone(),
            self.tokens.clone(),
            self.diagnostics.clone(),
            peer_handler_slot.clone(),
            PeerManagerOptions {
                connect_timeout: self.config.peer_connection_options.connect_timeout,
                inactivity_timeout: self.config.peer_connection_options.inactivity_timeout,
                indirect_timeout: self.config.message_timeout,
                concurrent_peer_connections: self.config.concurrent_peer_connections,
                max_write_size: self.config.peer_connection_options.max_write_size,
            },
        );

        let transfer_handler = ClientTransferHandler::new(
            peers.clone(),
            transfer_registry.clone(),
            self.resolvers.clone(),
            self.p2p_events_as_client_events(),
            self.diagnostics.clone(),
        );
        let peer_handlers = PeerMessageHandlers::new(
            peers.clone(),
            self.waiters.clone(),
            self.resolvers.clone(),
            local_username.clone(),
            self.diagnostics.clone(),
            self.p2p_events.clone(),
            transfer_handler,
        );
        peer_handler_slot.set(peer_handlers);

        let distributed_forwarder = DistributedSearchForwarder::new(peers.clone(), self.resolvers.clone(), local_username);
        let distributed = DistributedConnectionManager::new(
            self.server_link.clone(),
            self.diagnostics.clone(),
            distributed_forwarder,
            DistributedManagerOptions {
                connect_timeout: self.config.distributed_connection_options.connect_timeout,
                concurrent_distributed_children_limit: self.config.concurrent_distributed_children_limit,
                enabled: self.config.enable_distributed_network,
            },
        );

        let server_handler = Arc::new(ServerFrameHandler::new(
            self.server_link.clone(),
            peers.clone(),
            distributed.clone(),
            self.waiters.clone(),
            self.p2p_events.clone(),
            self.diagnostics.clone(),
            self.config.auto_acknowledge_private_messages,
            (&self.config.peer_connection_options).into(),
        ));

        let listener = self.config.listen_port.map(|_| {
            Listener::new(
                peers.clone(),
                distributed.clone(),
                self.diagnostics.clone(),
                (&self.config.peer_connection_options).into(),
            )
        });

        Runtime {
            peers,
            distributed,
            transfer_registry,
            server_handler,
            listener,
        }
    }

    /// `ClientTransferHandler` reports `UploadRequested` through the same
    /// `ClientEvent` channel as everything else; this just gives it a
    /// pre-wired sender without exposing the field directly.
    fn p2p_events_as_client_events(&self) -> broadcast::Sender<ClientEvent> {
        self.events.clone()
    }

    fn spawn_server_dispatch(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let frame = {
                    let mut guard = this.server_mc.lock().await;
                    let Some(mc) = guard.as_mut() else { break };
                    mc.recv().await
                };
                let Some(frame) = frame else { break };
                let Some(runtime) = this.runtime.read().clone() else { break };
                runtime.server_handler.handle_frame(&frame).await;
            }
            this.handle_server_disconnected().await;
        });
    }

    async fn handle_server_disconnected(self: &Arc<Self>) {
        self.waiters.get_peer_address.cancel_all("server disconnected");
        self.waiters.add_user.cancel_all("server disconnected");
        self.waiters.get_status.cancel_all("server disconnected");
        self.waiters.user_info.cancel_all("server disconnected");
        self.waiters.browse.cancel_all("server disconnected");
        self.waiters.folder_contents.cancel_all("server disconnected");
        self.waiters.transfer_response.cancel_all("server disconnected");
        self.waiters.place_in_queue.cancel_all("server disconnected");
        *self.runtime.write() = None;
        *self.server_mc.lock().await = None;
        *self.server_state.conn.write() = None;
        *self.server_state.username.write() = None;
        let _ = self.transition(ClientStateEvent::Disconnect);
        let _ = self.events.send(ClientEvent::Disconnected {
            reason: "server connection closed".into(),
        });
    }

    /// Tears the connection down from the host side (§4.10). Legal from any
    /// state (`advance`'s `Disconnect` arm is total).
    pub async fn disconnect(self: &Arc<Self>, reason: Option<&str>) -> Result<(), ClientError> {
        let reason = reason.unwrap_or("disconnected by host").to_string();
        if let Some(conn) = self.server_state.conn.read().clone() {
            conn.disconnect(&reason).await;
        }
        self.handle_server_disconnected().await;
        Ok(())
    }

    /// Issues a `FileSearchRequest`, returning the token results will be
    /// correlated by on [`P2pEvent::SearchResponseReceived`] (§4.10, §8
    /// scenario 2).
    pub async fn search(&self, query: &str, token: Option<i32>) -> Result<i32, ClientError> {
        let token = token.unwrap_or_else(|| self.tokens.next());
        self.server_link
            .send(FileSearchRequest { token, query: query.into() }.encode())
            .await?;
        Ok(token)
    }

    /// Opens (or reuses) a peer message connection to `username` and waits
    /// for their `BrowseResponse` (§4.7, §4.10).
    pub async fn browse(&self, username: &str) -> Result<Vec<Directory>, ClientError> {
        let runtime = self.runtime()?;
        let conn = runtime.peers.get_message_connection(username).await?;
        conn.write(&soulseek_proto::messages::peer::BrowseRequest.encode()).await?;
        let dirs = self
            .waiters
            .browse
            .wait(WaitKey::new("browse", username), self.config.message_timeout)
            .await?;
        Ok(dirs)
    }

    pub async fn get_user_info(&self, username: &str) -> Result<UserInfo, ClientError> {
        let runtime = self.runtime()?;
        let conn = runtime.peers.get_message_connection(username).await?;
        conn.write(&InfoRequest.encode()).await?;
        let info = self
            .waiters
            .user_info
            .wait(WaitKey::new("user_info", username), self.config.message_timeout)
            .await?;
        Ok(info)
    }

    /// Expands a subfolder of a previous [`SoulseekClient::browse`] result
    /// (§4.7's `FolderContentsRequest`/`Response` pair).
    pub async fn get_folder_contents(&self, username: &str, token: i32, directory: &str) -> Result<Directory, ClientError> {
        let runtime = self.runtime()?;
        let conn = runtime.peers.get_message_connection(username).await?;
        conn.write(
            &soulseek_proto::messages::peer::FolderContentsRequest {
                token,
                directory: directory.into(),
            }
            .encode(),
        )
        .await?;
        let key = WaitKey::new("folder_contents", format!("{username}|{token}"));
        let dir = self.waiters.folder_contents.wait(key, self.config.message_timeout).await?;
        Ok(dir)
    }

    pub async fn get_place_in_queue(&self, username: &str, filename: &str) -> Result<u32, ClientError> {
        let runtime = self.runtime()?;
        let conn = runtime.peers.get_message_connection(username).await?;
        conn.write(
            &soulseek_proto::messages::peer::PlaceInQueueRequest { filename: filename.into() }.encode(),
        )
        .await?;
        let key = WaitKey::new("place_in_queue", format!("{username}|{filename}"));
        let place = self.waiters.place_in_queue.wait(key, self.config.message_timeout).await?;
        Ok(place)
    }

    pub async fn add_user(&self, username: &str) -> Result<AddUserResponse, ClientError> {
        self.server_link.send(AddUserRequest { username: username.into() }.encode()).await?;
        let response = self
            .waiters
            .add_user
            .wait(WaitKey::new("add_user", username), self.config.message_timeout)
            .await?;
        Ok(response)
    }

    pub async fn get_status(&self, username: &str) -> Result<(UserStatus, bool), ClientError> {
        self.server_link.send(GetStatusRequest { username: username.into() }.encode()).await?;
        let status = self
            .waiters
            .get_status
            .wait(WaitKey::new("get_status", username), self.config.message_timeout)
            .await?;
        Ok(status)
    }

    pub async fn acknowledge_private_message(&self, id: i32) -> Result<(), ClientError> {
        self.server_link.send(AcknowledgePrivateMessageRequest { id }.encode()).await?;
        Ok(())
    }

    /// Requests a file from `username` (§4.8). Returns immediately with a
    /// handle; the transfer itself runs in the background and reports
    /// progress through [`TransferHandle::subscribe`].
    pub fn download(
        self: &Arc<Self>,
        username: impl Into<String>,
        filename: impl Into<String>,
        token: Option<i32>,
        sink: Box<dyn TransferSink>,
        governor: Option<Arc<dyn TransferGovernor>>,
        options: Option<TransferOptions>,
    ) -> Result<Arc<TransferHandle>, ClientError> {
        let runtime = self.runtime()?;
        let handle = TransferHandle::new();
        let username = username.into();
        let filename = filename.into();
        let options = options.unwrap_or_default();

        let peers = runtime.peers.clone();
        let transfer_responses = self.waiters.transfer_response.clone();
        let registry = runtime.transfer_registry.clone();
        let tokens = self.tokens.clone();
        let task_handle = handle.clone();
        let diagnostics = self.diagnostics.clone();
        let task_username = username.clone();
        let task_filename = filename.clone();
        tokio::spawn(async move {
            if let Err(e) = run_download(
                peers,
                transfer_responses,
                registry,
                tokens,
                task_handle,
                task_username.clone(),
                task_filename.clone(),
                token,
                sink,
                governor,
                options,
            )
            .await
            {
                diagnostics.debug(
                    "client",
                    format!("download of {task_filename} from {task_username} failed: {e}"),
                );
            }
        });
        Ok(handle)
    }

    /// Pushes a file to `username` after the host already allowed it via
    /// [`ClientEvent::UploadRequested`]'s token (§4.8). `size` is re-checked
    /// here rather than trusted from the original resolver decision, since
    /// this is the façade boundary the §9 open question names.
    pub fn upload(
        self: &Arc<Self>,
        username: impl Into<String>,
        filename: impl Into<String>,
        size: i64,
        token: i32,
        source: Box<dyn TransferSource>,
        governor: Option<Arc<dyn TransferGovernor>>,
        options: Option<TransferOptions>,
    ) -> Result<Arc<TransferHandle>, ClientError> {
        if size > MAX_FILE_SIZE {
            return Err(ClientError::Transfer(TransferError::EnqueueRejected(format!(
                "file size {size} exceeds the 2^31-1 byte limit"
            ))));
        }
        let runtime = self.runtime()?;
        let handle = TransferHandle::new();
        let username = username.into();
        let filename = filename.into();
        let options = options.unwrap_or_default();

        let peers = runtime.peers.clone();
        let task_handle = handle.clone();
        let diagnostics = self.diagnostics.clone();
        let task_username = username.clone();
        let task_filename = filename.clone();
        tokio::spawn(async move {
            if let Err(e) = run_upload(peers, task_handle, task_username.clone(), token, source, governor, options).await {
                diagnostics.debug(
                    "client",
                    format!("upload of {task_filename} to {task_username} failed: {e}"),
                );
            }
        });
        Ok(handle)
    }
}
