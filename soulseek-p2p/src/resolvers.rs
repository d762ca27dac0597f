use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use soulseek_proto::messages::peer::PeerSearchResponse;
use soulseek_proto::types::{Directory, UserInfo};

/// The remote endpoint a resolver callback is answering on behalf of
/// (§4.7: `(user, endpoint)` appears in four of the five callback
/// signatures).
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    pub username: String,
    pub address: IpAddr,
    pub port: u16,
}

/// Host-supplied answer to an incoming upload-enqueue request (§4.7,
/// §7 `EnqueueRejected`). `Accepted` carries the file's exact size since
/// `TransferResponse::allowed` must report it in the same reply — the
/// protocol gives the uploader no later chance to correct it.
#[derive(Debug, Clone)]
pub enum EnqueueDecision {
    Accepted { size: i64 },
    Rejected { reason: String },
}

#[async_trait]
pub trait UserInfoResolver: Send + Sync {
    async fn resolve(&self, endpoint: &RemoteEndpoint) -> UserInfo;
}

#[async_trait]
pub trait BrowseResolver: Send + Sync {
    async fn resolve(&self, endpoint: &RemoteEndpoint) -> Vec<Directory>;
}

#[async_trait]
pub trait DirectoryContentsResolver: Send + Sync {
    async fn resolve(&self, endpoint: &RemoteEndpoint, token: i32, directory: &str) -> Option<Directory>;
}

#[async_trait]
pub trait SearchResponseResolver: Send + Sync {
    async fn resolve(&self, token: i32, query: &str) -> Option<PeerSearchResponse>;
}

#[async_trait]
pub trait EnqueueDownloadAction: Send + Sync {
    async fn enqueue(&self, endpoint: &RemoteEndpoint, filename: &str) -> EnqueueDecision;
}

/// Dependency-injected bundle of the four resolver callbacks and the
/// enqueue action (§4.7, §9 "Global mutable state"). Any slot left unset
/// is handled per §4.7: "the handler silently drops the request except
/// where the protocol demands a reply".
#[derive(Clone, Default)]
pub struct Resolvers {
    pub user_info: Option<Arc<dyn UserInfoResolver>>,
    pub browse: Option<Arc<dyn BrowseResolver>>,
    pub directory_contents: Option<Arc<dyn DirectoryContentsResolver>>,
    pub search_response: Option<Arc<dyn SearchResponseResolver>>,
    pub enqueue_download: Option<Arc<dyn EnqueueDownloadAction>>,
}
