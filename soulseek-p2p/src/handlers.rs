use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use soulseek_net::{Connection, ConnectionOptions, Frame, WaitKey, Waiter};
use soulseek_proto::messages::init::PierceFirewall;
use soulseek_proto::messages::peer::{
    BrowseResponse, FolderContentsResponse, InfoResponse, PeerMessage, PeerSearchResponse, PlaceInQueueResponse,
    TransferRequest, TransferResponse,
};
use soulseek_proto::messages::server::{AcknowledgePrivateMessageRequest, ConnectToPeerNotify, ServerMessage};
use soulseek_proto::types::{Directory, UserInfo, UserStatus};
use soulseek_proto::ConnectionTypeTag;
use soulseek_util::DiagnosticSink;

use crate::distributed::{DistributedConnectionManager, DistributedFrameHandler};
use crate::peer::{PeerConnectionManager, PeerFrameHandler};
use crate::resolvers::{RemoteEndpoint, Resolvers};
use crate::server_link::ServerLink;

/// What a `TransferResponse` resolved to, decoupled from the wire shape so
/// `Waiter<T>` stores a plain value rather than re-parsing a frame (§4.8).
#[derive(Debug, Clone)]
pub enum TransferResponseOutcome {
    Allowed { size: i64 },
    Rejected { reason: String },
}

impl From<TransferResponse> for TransferResponseOutcome {
    fn from(r: TransferResponse) -> Self {
        if r.allowed {
            TransferResponseOutcome::Allowed { size: r.size.unwrap_or(0) }
        } else {
            TransferResponseOutcome::Rejected {
                reason: r.reason.map(|a| a.to_string_lossy()).unwrap_or_default(),
            }
        }
    }
}

/// One `Arc<Waiter<T>>` per distinct request/response shape (§9: "a tagged
/// result per waiter key namespace"). Shared between the façade (which
/// registers waits) and the handlers below (which complete them).
pub struct Waiters {
    pub get_peer_address: Arc<Waiter<(IpAddr, u16)>>,
    pub add_user: Arc<Waiter<soulseek_proto::messages::server::AddUserResponse>>,
    pub get_status: Arc<Waiter<(UserStatus, bool)>>,
    pub user_info: Arc<Waiter<UserInfo>>,
    pub browse: Arc<Waiter<Vec<Directory>>>,
    pub folder_contents: Arc<Waiter<Directory>>,
    pub transfer_response: Arc<Waiter<TransferResponseOutcome>>,
    pub place_in_queue: Arc<Waiter<u32>>,
}

impl Waiters {
    pub fn new() -> Self {
        Self {
            get_peer_address: Waiter::new(),
            add_user: Waiter::new(),
            get_status: Waiter::new(),
            user_info: Waiter::new(),
            browse: Waiter::new(),
            folder_contents: Waiter::new(),
            transfer_response: Waiter::new(),
            place_in_queue: Waiter::new(),
        }
    }
}

impl Default for Waiters {
    fn default() -> Self {
        Self::new()
    }
}

/// Asynchronous events the server/peer/distributed handlers surface to the
/// façade (§4.10): anything that isn't a direct reply to an in-flight
/// request.
#[derive(Debug, Clone)]
pub enum P2pEvent {
    PrivateMessageReceived {
        id: i32,
        timestamp: i64,
        username: String,
        message: String,
        is_admin: bool,
    },
    RoomListReceived(Vec<(String, u32)>),
    PrivilegedUsersReceived(Vec<String>),
    KickedFromServer,
    SearchResponseReceived(PeerSearchResponse),
    QueueFailed { username: String, filename: String, reason: String },
    UploadFailed { username: String, filename: String },
    /// `GetStatusResponse` does double duty on the wire: it answers our own
    /// `GetStatusRequest` (via the waiter) and also arrives unprompted
    /// whenever the server pushes a status change for a user we've
    /// `AddUser`-subscribed to. Every occurrence is surfaced here too so a
    /// host doesn't have to poll `getUserInfo`/`GetStatus` to notice changes.
    UserStatusChanged {
        username: String,
        status: UserStatus,
        privileged: bool,
    },
}

async fn answer_search(
    peers: &Arc<PeerConnectionManager>,
    resolvers: &Resolvers,
    local_username: &str,
    originating_username: &str,
    token: i32,
    query: &str,
) {
    let Some(resolver) = &resolvers.search_response else {
        return;
    };
    let Some(mut response) = resolver.resolve(token, query).await else {
        return;
    };
    response.username = local_username.into();
    let Ok(conn) = peers.get_message_connection(originating_username).await else {
        return;
    };
    let _ = conn.write(&response.encode()).await;
}

/// Implements the Peer namespace side of §4.7: completes waits for
/// response-bearing codes, and answers request codes via the injected
/// resolvers.
pub struct PeerMessageHandlers {
    peers: Arc<PeerConnectionManager>,
    waiters: Arc<Waiters>,
    resolvers: Resolvers,
    local_username: String,
    diagnostics: DiagnosticSink,
    events: broadcast::Sender<P2pEvent>,
    transfers: Arc<dyn InboundTransferHandler>,
}

#[async_trait]
pub trait InboundTransferHandler: Send + Sync {
    async fn handle_transfer_request(&self, username: &str, request: TransferRequest);
}

impl PeerMessageHandlers {
    pub fn new(
        peers: Arc<PeerConnectionManager>,
        waiters: Arc<Waiters>,
        resolvers: Resolvers,
        local_username: String,
        diagnostics: DiagnosticSink,
        events: broadcast::Sender<P2pEvent>,
        transfers: Arc<dyn InboundTransferHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            peers,
            waiters,
            resolvers,
            local_username,
            diagnostics,
            events,
            transfers,
        })
    }

    async fn answer_browse(&self, username: &str) {
        let Some(resolver) = &self.resolvers.browse else { return };
        let endpoint = RemoteEndpoint {
            username: username.to_string(),
            address: IpAddr::from([0, 0, 0, 0]),
            port: 0,
        };
        let directories = resolver.resolve(&endpoint).await;
        let Ok(conn) = self.peers.get_message_connection(username).await else { return };
        let _ = conn.write(&BrowseResponse { directories }.encode()).await;
    }

    async fn answer_info(&self, username: &str) {
        let Some(resolver) = &self.resolvers.user_info else { return };
        let endpoint = RemoteEndpoint {
            username: username.to_string(),
            address: IpAddr::from([0, 0, 0, 0]),
            port: 0,
        };
        let info = resolver.resolve(&endpoint).await;
        let Ok(conn) = self.peers.get_message_connection(username).await else { return };
        let _ = conn.write(&InfoResponse { info }.encode()).await;
    }

    async fn answer_folder_contents(&self, username: &str, token: i32, directory: String) {
        let Some(resolver) = &self.resolvers.directory_contents else { return };
        let endpoint = RemoteEndpoint {
            username: username.to_string(),
            address: IpAddr::from([0, 0, 0, 0]),
            port: 0,
        };
        let Some(dir) = resolver.resolve(&endpoint, token, &directory).await else { return };
        let Ok(conn) = self.peers.get_message_connection(username).await else { return };
        let _ = conn
            .write(&FolderContentsResponse { token, directory: dir }.encode())
            .await;
    }
}

#[async_trait]
impl PeerFrameHandler for PeerMessageHandlers {
    async fn handle_frame(&self, username: &str, frame: Frame) {
        let decoded = match PeerMessage::decode(frame.code, &frame.payload) {
            Ok(m) => m,
            Err(e) => {
                self.diagnostics
                    .debug("peer_handler", format!("malformed frame from {username}: {e}"));
                return;
            }
        };
        match decoded {
            PeerMessage::BrowseRequest(_) => self.answer_browse(username).await,
            PeerMessage::BrowseResponse(r) => {
                self.waiters.browse.complete(&WaitKey::new("browse", username), r.directories);
            }
            PeerMessage::InfoRequest(_) => self.answer_info(username).await,
            PeerMessage::InfoResponse(r) => {
                self.waiters.user_info.complete(&WaitKey::new("user_info", username), r.info);
            }
            PeerMessage::SearchRequest(r) => {
                answer_search(&self.peers, &self.resolvers, &self.local_username, username, r.token, &r.query.to_string_lossy()).await;
            }
            PeerMessage::SearchResponse(r) => {
                let _ = self.events.send(P2pEvent::SearchResponseReceived(r));
            }
            PeerMessage::TransferRequest(r) => {
                self.transfers.handle_transfer_request(username, r).await;
            }
            PeerMessage::TransferResponse(r) => {
                let key = WaitKey::new("transfer_response", r.token.to_string());
                self.waiters.transfer_response.complete(&key, r.into());
            }
            PeerMessage::PlaceInQueueRequest(r) => {
                // No resolver is specified for this in §4.7; the place is
                // derived from our own upload queue, owned by the transfer
                // layer rather than this handler.
                self.diagnostics.debug(
                    "peer_handler",
                    format!("place-in-queue request from {username} for {}", r.filename),
                );
            }
            PeerMessage::PlaceInQueueResponse(r) => {
                let key = WaitKey::new("place_in_queue", format!("{username}|{}", r.filename));
                self.waiters.place_in_queue.complete(&key, r.place);
            }
            PeerMessage::QueueFailed(r) => {
                let _ = self.events.send(P2pEvent::QueueFailed {
                    username: username.to_string(),
                    filename: r.filename.to_string_lossy(),
                    reason: r.reason.to_string_lossy(),
                });
            }
            PeerMessage::UploadFailed(r) => {
                let _ = self.events.send(P2pEvent::UploadFailed {
                    username: username.to_string(),
                    filename: r.filename.to_string_lossy(),
                });
            }
            PeerMessage::FolderContentsRequest(r) => {
                self.answer_folder_contents(username, r.token, r.directory.to_string_lossy()).await;
            }
            PeerMessage::FolderContentsResponse(r) => {
                let key = WaitKey::new("folder_contents", format!("{username}|{}", r.token));
                self.waiters.folder_contents.complete(&key, r.directory);
            }
            PeerMessage::Unrecognized { code } => {
                self.diagnostics
                    .debug("peer_handler", format!("unrecognized peer code {code} from {username}"));
            }
        }
    }

    async fn on_disconnected(&self, _username: &str) {}
}

/// Implements the Distributed-namespace half of §4.7: the forwarded search
/// is additionally answered locally via the resolver (§4.6 "regardless, it
/// is also handed to the local resolver").
pub struct DistributedSearchForwarder {
    peers: Arc<PeerConnectionManager>,
    resolvers: Resolvers,
    local_username: String,
}

impl DistributedSearchForwarder {
    pub fn new(peers: Arc<PeerConnectionManager>, resolvers: Resolvers, local_username: String) -> Arc<Self> {
        Arc::new(Self {
            peers,
            resolvers,
            local_username,
        })
    }
}

#[async_trait]
impl DistributedFrameHandler for DistributedSearchForwarder {
    async fn handle_search(&self, originating_username: &str, token: i32, query: &str) {
        answer_search(&self.peers, &self.resolvers, &self.local_username, originating_username, token, query).await;
    }
}

/// Dispatches decoded `ServerMessage`s: completes request/response waits,
/// handles the `ConnectToPeerNotify` indirect-dial-back flow (§4.5), and
/// surfaces everything else as a [`P2pEvent`].
pub struct ServerFrameHandler {
    server: Arc<dyn ServerLink>,
    peers: Arc<PeerConnectionManager>,
    distributed: Arc<DistributedConnectionManager>,
    waiters: Arc<Waiters>,
    events: broadcast::Sender<P2pEvent>,
    diagnostics: DiagnosticSink,
    auto_acknowledge_private_messages: bool,
    connect_options: ConnectionOptions,
}

impl ServerFrameHandler {
    pub fn new(
        server: Arc<dyn ServerLink>,
        peers: Arc<PeerConnectionManager>,
        distributed: Arc<DistributedConnectionManager>,
        waiters: Arc<Waiters>,
        events: broadcast::Sender<P2pEvent>,
        diagnostics: DiagnosticSink,
        auto_acknowledge_private_messages: bool,
        connect_options: ConnectionOptions,
    ) -> Self {
        Self {
            server,
            peers,
            distributed,
            waiters,
            events,
            diagnostics,
            auto_acknowledge_private_messages,
            connect_options,
        }
    }

    pub async fn handle_frame(&self, frame: &Frame) {
        let decoded = match ServerMessage::decode(frame.code, &frame.payload) {
            Ok(m) => m,
            Err(e) => {
                self.diagnostics.debug("server_handler", format!("malformed server frame: {e}"));
                return;
            }
        };
        match decoded {
            ServerMessage::LoginResponse(_) => {
                // Handled synchronously by the façade's `login()` call,
                // which reads the very next frame off the server
                // connection directly rather than going through a wait.
            }
            ServerMessage::GetPeerAddressResponse(r) => {
                let key = WaitKey::new("get_peer_address", r.username.to_string_lossy());
                self.waiters
                    .get_peer_address
                    .complete(&key, (IpAddr::V4(r.ip), r.port as u16));
            }
            ServerMessage::AddUserResponse(r) => {
                let key = WaitKey::new("add_user", r.username.to_string_lossy());
                self.waiters.add_user.complete(&key, r);
            }
            ServerMessage::GetStatusResponse(r) => {
                let key = WaitKey::new("get_status", r.username.to_string_lossy());
                self.waiters.get_status.complete(&key, (r.status, r.privileged));
                let _ = self.events.send(P2pEvent::UserStatusChanged {
                    username: r.username.to_string_lossy(),
                    status: r.status,
                    privileged: r.privileged,
                });
            }
            ServerMessage::ConnectToPeerNotify(notify) => self.handle_connect_to_peer_notify(notify).await,
            ServerMessage::PrivateMessageNotify(pm) => {
                if self.auto_acknowledge_private_messages {
                    let _ = self.server.send(AcknowledgePrivateMessageRequest { id: pm.id }.encode()).await;
                }
                let _ = self.events.send(P2pEvent::PrivateMessageReceived {
                    id: pm.id,
                    timestamp: pm.timestamp,
                    username: pm.username.to_string_lossy(),
                    message: pm.message.to_string_lossy(),
                    is_admin: pm.is_admin,
                });
            }
            ServerMessage::RoomListResponse(r) => {
                let rooms = r.rooms.into_iter().map(|(name, count)| (name.to_string_lossy(), count)).collect();
                let _ = self.events.send(P2pEvent::RoomListReceived(rooms));
            }
            ServerMessage::PrivilegedUsersResponse(r) => {
                let names = r.usernames.into_iter().map(|u| u.to_string_lossy()).collect();
                let _ = self.events.send(P2pEvent::PrivilegedUsersReceived(names));
            }
            ServerMessage::NetInfoResponse(r) => {
                self.distributed.adopt_parent_from_candidates(r.candidates).await;
            }
            ServerMessage::Relogged(_) => {
                let _ = self.events.send(P2pEvent::KickedFromServer);
            }
            ServerMessage::ParentMinSpeed(_) | ServerMessage::ParentSpeedRatio(_) | ServerMessage::WishlistInterval(_) => {
                // Informational only; nothing in the core currently reacts.
            }
            ServerMessage::Unrecognized { code } => {
                self.diagnostics.debug("server_handler", format!("unrecognized server code {code}"));
            }
        }
    }

    /// §4.5: the server is relaying someone else's `ConnectToPeer`; we dial
    /// them back directly and announce ourselves with `PierceFirewall`.
    async fn handle_connect_to_peer_notify(&self, notify: ConnectToPeerNotify) {
        let addr = std::net::SocketAddr::new(IpAddr::V4(notify.ip), notify.port as u16);
        let username = notify.username.to_string_lossy();
        let conn = match Connection::connect(
            addr,
            self.connect_options.clone(),
            self.diagnostics.clone(),
            format!("solicited:{username}"),
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                self.diagnostics
                    .debug("server_handler", format!("dial-back to {username} failed: {e}"));
                return;
            }
        };
        if conn.write(&PierceFirewall { token: notify.token }.encode()).await.is_err() {
            return;
        }
        match ConnectionTypeTag::from_str(&notify.connection_type.to_string_lossy()) {
            Some(ConnectionTypeTag::PeerMessage) => self.peers.handle_inbound_peer_message(&username, conn),
            Some(ConnectionTypeTag::Transfer) => {
                // The remote token follows the handshake on the wire, but
                // here *we* are the dialing side telling *them* who we are
                // via PierceFirewall — there is no separate remote-token
                // frame to read, since the token in `notify` already
                // identifies this handoff uniquely to the waiting transfer.
                self.peers.handle_inbound_direct_transfer(&username, notify.token, conn);
            }
            Some(ConnectionTypeTag::Distributed) => {
                let _ = self.distributed.accept_child(&username, conn);
            }
            None => {
                self.diagnostics.debug(
                    "server_handler",
                    format!("ConnectToPeerNotify with unknown connection type for {username}"),
                );
            }
        }
    }
}
