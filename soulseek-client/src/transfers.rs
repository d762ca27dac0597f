use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use soulseek_p2p::handlers::InboundTransferHandler;
use soulseek_p2p::{EnqueueDecision, PeerConnectionManager, RemoteEndpoint, Resolvers};
use soulseek_proto::messages::peer::{TransferRequest, TransferResponse};
use soulseek_proto::types::TransferDirection;
use soulseek_transfer::{reply_transfer_request, TransferRegistry};
use soulseek_util::DiagnosticSink;

use crate::events::ClientEvent;

/// Bridges every inbound `TransferRequest` (§4.8) to the façade. A
/// `Download`-direction request is a remote asking to pull a file from us —
/// answered synchronously via the enqueue resolver. An `Upload`-direction
/// request is the remote resuming a transfer we previously left `Queued` —
/// just forwarded to the registry `run_download` is waiting on.
pub struct ClientTransferHandler {
    peers: Arc<PeerConnectionManager>,
    registry: Arc<TransferRegistry>,
    resolvers: Resolvers,
    events: broadcast::Sender<ClientEvent>,
    diagnostics: DiagnosticSink,
}

impl ClientTransferHandler {
    pub fn new(
        peers: Arc<PeerConnectionManager>,
        registry: Arc<TransferRegistry>,
        resolvers: Resolvers,
        events: broadcast::Sender<ClientEvent>,
        diagnostics: DiagnosticSink,
    ) -> Arc<Self> {
        Arc::new(Self {
            peers,
            registry,
            resolvers,
            events,
            diagnostics,
        })
    }

    async fn handle_download_request(&self, username: &str, request: TransferRequest) {
        let filename = request.filename.to_string_lossy();
        let endpoint = RemoteEndpoint {
            username: username.to_string(),
            address: IpAddr::from([0, 0, 0, 0]),
            port: 0,
        };
        // An unset resolver still owes the remote a reply — unlike the
        // read-only resolvers (§4.7), silence here just leaves the remote
        // waiting forever on a response that will never come.
        let decision = match &self.resolvers.enqueue_download {
            Some(resolver) => resolver.enqueue(&endpoint, &filename).await,
            None => EnqueueDecision::Rejected {
                reason: "no files shared".to_string(),
            },
        };
        let response = match &decision {
            EnqueueDecision::Accepted { size } => TransferResponse::allowed(request.token, *size),
            EnqueueDecision::Rejected { reason } => TransferResponse::rejected(request.token, reason.as_str()),
        };
        if let Err(e) = reply_transfer_request(&self.peers, username, response).await {
            self.diagnostics
                .debug("client_transfers", format!("failed to reply to {username}'s transfer request: {e}"));
            return;
        }
        if let EnqueueDecision::Accepted { size } = decision {
            let _ = self.events.send(ClientEvent::UploadRequested {
                username: username.to_string(),
                filename,
                token: request.token,
                size,
            });
        }
    }
}

#[async_trait]
impl InboundTransferHandler for ClientTransferHandler {
    async fn handle_transfer_request(&self, username: &str, request: TransferRequest) {
        match request.direction {
            TransferDirection::Download => self.handle_download_request(username, request).await,
            TransferDirection::Upload => {
                InboundTransferHandler::handle_transfer_request(&*self.registry, username, request).await;
            }
        }
    }
}
