//! A minimal host for `soulseek-client`: logs in, prints every event and
//! diagnostic line, and politely declines every browse/info/download request
//! it receives instead of silently dropping them.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use log::{debug, info, warn};

use soulseek_client::{
    BrowseResolver, ClientConfig, ClientEvent, DirectoryContentsResolver, EnqueueDecision, EnqueueDownloadAction,
    RemoteEndpoint, Resolvers, SearchResponseResolver, SoulseekClient, UserInfoResolver,
};
use soulseek_proto::messages::peer::PeerSearchResponse;
use soulseek_proto::types::{Directory, UserInfo};

#[derive(Parser, Debug)]
#[command(about = "Connects to a Soulseek server, logs in, and echoes every event to the terminal")]
struct Args {
    /// Hostname or IP, with port — resolved via DNS before connecting.
    #[arg(long, default_value = "server.slsknet.org:2242")]
    server: String,
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    /// Issues one search right after login and exits once the results arrive.
    #[arg(long)]
    search: Option<String>,
}

/// Reports no shared folders (§4.7) — this is a read-only demo host.
struct EmptyBrowse;

#[async_trait]
impl BrowseResolver for EmptyBrowse {
    async fn resolve(&self, _endpoint: &RemoteEndpoint) -> Vec<Directory> {
        Vec::new()
    }
}

#[async_trait]
impl UserInfoResolver for EmptyBrowse {
    async fn resolve(&self, _endpoint: &RemoteEndpoint) -> UserInfo {
        UserInfo {
            description: "echo-client demo host, shares nothing".into(),
            picture: None,
            total_uploads: 0,
            queue_size: 0,
            free_upload_slots: true,
        }
    }
}

#[async_trait]
impl DirectoryContentsResolver for EmptyBrowse {
    async fn resolve(&self, _endpoint: &RemoteEndpoint, _token: i32, _directory: &str) -> Option<Directory> {
        None
    }
}

/// Never answers a distributed search (§4.7 Non-goals: no indexing).
struct NoSearchResults;

#[async_trait]
impl SearchResponseResolver for NoSearchResults {
    async fn resolve(&self, _token: i32, _query: &str) -> Option<PeerSearchResponse> {
        None
    }
}

/// Rejects every inbound download request outright rather than leaving the
/// remote's `TransferRequest` unanswered.
struct RejectAllUploads;

#[async_trait]
impl EnqueueDownloadAction for RejectAllUploads {
    async fn enqueue(&self, _endpoint: &RemoteEndpoint, _filename: &str) -> EnqueueDecision {
        EnqueueDecision::Rejected {
            reason: "echo-client shares no files".to_string(),
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let resolvers = Resolvers {
        user_info: Some(Arc::new(EmptyBrowse)),
        browse: Some(Arc::new(EmptyBrowse)),
        directory_contents: Some(Arc::new(EmptyBrowse)),
        search_response: Some(Arc::new(NoSearchResults)),
        enqueue_download: Some(Arc::new(RejectAllUploads)),
    };

    let server_address = match tokio::net::lookup_host(args.server.as_str()).await.ok().and_then(|mut a| a.next()) {
        Some(addr) => addr,
        None => {
            eprintln!("could not resolve {}", args.server);
            std::process::exit(1);
        }
    };
    let config = ClientConfig {
        server_address,
        ..ClientConfig::default()
    };

    let client = SoulseekClient::new(config, resolvers);

    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::StateChanged(state) => info!("state -> {state:?}"),
                ClientEvent::Disconnected { reason } => warn!("disconnected: {reason}"),
                ClientEvent::UploadRequested { username, filename, token, size } => {
                    info!("{username} requested {filename} (token {token}, {size} bytes) — already declined")
                }
                ClientEvent::P2p(p2p) => info!("p2p event: {p2p:?}"),
            }
        }
    });

    let mut diagnostics = client.diagnostics();
    tokio::spawn(async move {
        while let Ok(event) = diagnostics.recv().await {
            debug!("[{:?}] {}: {}", event.level, event.source, event.message);
        }
    });

    if let Err(e) = client.connect().await {
        eprintln!("connect failed: {e}");
        std::process::exit(1);
    }
    if let Err(e) = client.login(&args.username, &args.password).await {
        eprintln!("login failed: {e}");
        std::process::exit(1);
    }
    info!("logged in as {}", args.username);

    if let Some(query) = args.search {
        match client.search(&query, None).await {
            Ok(token) => info!("search {query:?} issued with token {token}"),
            Err(e) => warn!("search failed: {e}"),
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    let _ = client.disconnect(Some("shutting down")).await;
}
