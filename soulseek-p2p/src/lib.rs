//! Peer and distributed connection managers, message dispatch, and resolver
//! callbacks (§4.5, §4.6, §4.7, §4.9).

pub mod distributed;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod peer;
pub mod resolvers;
pub mod server_link;

pub use distributed::{DistributedConnectionManager, DistributedFrameHandler, DistributedManagerOptions};
pub use error::{DistributedError, PeerError};
pub use handlers::{
    DistributedSearchForwarder, InboundTransferHandler, P2pEvent, PeerMessageHandlers, ServerFrameHandler,
    TransferResponseOutcome, Waiters,
};
pub use listener::Listener;
pub use peer::{PeerConnectionManager, PeerFrameHandler, PeerManagerOptions};
pub use resolvers::{
    BrowseResolver, DirectoryContentsResolver, EnqueueDecision, EnqueueDownloadAction, RemoteEndpoint, Resolvers,
    SearchResponseResolver, UserInfoResolver,
};
pub use server_link::ServerLink;
