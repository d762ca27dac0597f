use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock as SyncRwLock;
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;

use soulseek_net::{Connection, ConnError, WaitKey, Waiter};
use soulseek_p2p::handlers::InboundTransferHandler;
use soulseek_p2p::PeerConnectionManager;
use soulseek_proto::messages::peer::{TransferRequest, TransferResponse};
use soulseek_proto::types::TransferDirection;
use soulseek_util::{CancellationToken, TokenAllocator};

use crate::error::TransferError;
use crate::state::{TransferEvent, TransferState};

/// Awaited between read/write chunks (§4.8, §5); a rate limiter returns once
/// its quota allows `bytes` more to move.
#[async_trait]
pub trait TransferGovernor: Send + Sync {
    async fn acquire(&self, bytes: usize);
}

/// Host-supplied destination for a download. Symmetric with upload's
/// explicit `stream` parameter in §4.10 — a download needs the same kind of
/// hookup, just not named in the façade's method list.
#[async_trait]
pub trait TransferSink: Send {
    async fn write_chunk(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

/// Host-supplied source for an upload; an empty return signals end of
/// stream early (short read).
#[async_trait]
pub trait TransferSource: Send {
    async fn read_chunk(&mut self, max: usize) -> std::io::Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub message_timeout: Duration,
    pub indirect_timeout: Duration,
    pub chunk_size: usize,
    pub inactivity_timeout: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            message_timeout: Duration::from_secs(30),
            indirect_timeout: Duration::from_secs(30),
            chunk_size: 64 * 1024,
            inactivity_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TransferProgressEvent {
    StateChanged(TransferState),
    Progress { transferred: u64, total: Option<u64> },
}

/// Per-transfer state cell plus a progress/state event stream (§4.8, §4.10
/// "events for ... transfer progress/state").
pub struct TransferHandle {
    state: SyncRwLock<TransferState>,
    events: broadcast::Sender<TransferProgressEvent>,
    cancel: CancellationToken,
}

impl TransferHandle {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            state: SyncRwLock::new(TransferState::new()),
            events,
            cancel: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> TransferState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferProgressEvent> {
        self.events.subscribe()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn advance(&self, event: TransferEvent) -> Result<(), TransferError> {
        self.state.write().advance(event)?;
        let _ = self.events.send(TransferProgressEvent::StateChanged(self.state()));
        Ok(())
    }

    fn report_progress(&self, transferred: u64, total: Option<u64>) {
        let _ = self.events.send(TransferProgressEvent::Progress { transferred, total });
    }
}

/// Completes the "remote started an unsolicited upload" wait (§4.8: a
/// download that was `Queued` resumes when this arrives). Implements
/// `soulseek_p2p`'s handler trait so the peer dispatch loop can deliver
/// inbound `TransferRequest` frames here without depending on this crate.
pub struct TransferRegistry {
    queued_offers: Arc<Waiter<TransferRequest>>,
}

impl TransferRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queued_offers: Waiter::new(),
        })
    }
}

#[async_trait]
impl InboundTransferHandler for TransferRegistry {
    async fn handle_transfer_request(&self, username: &str, request: TransferRequest) {
        let key = queued_offer_key(username, &request.filename.to_string_lossy());
        self.queued_offers.complete(&key, request);
    }
}

fn queued_offer_key(username: &str, filename: &str) -> WaitKey {
    WaitKey::new("queued_upload_offer", format!("{username}|{filename}"))
}

/// §4.8 download contract, driven to completion. Files > 2^31-1 bytes are
/// rejected by the façade before this is ever called (§9 open question).
pub async fn run_download(
    peers: Arc<PeerConnectionManager>,
    transfer_responses: Arc<Waiter<soulseek_p2p::TransferResponseOutcome>>,
    registry: Arc<TransferRegistry>,
    tokens: Arc<TokenAllocator>,
    handle: Arc<TransferHandle>,
    username: String,
    filename: String,
    requested_token: Option<i32>,
    mut sink: Box<dyn TransferSink>,
    governor: Option<Arc<dyn TransferGovernor>>,
    options: TransferOptions,
) -> Result<(), TransferError> {
    handle.advance(TransferEvent::Requested)?;
    let token = requested_token.unwrap_or_else(|| tokens.next());

    let conn = peers.get_message_connection(&username).await?;
    conn.write(
        &TransferRequest {
            direction: TransferDirection::Download,
            token,
            filename: filename.clone().into(),
            size: 0,
        }
        .encode(),
    )
    .await?;

    let response_key = WaitKey::new("transfer_response", token.to_string());
    let outcome = tokio::select! {
        result = transfer_responses.wait(response_key, options.message_timeout) => {
            result.map_err(|_| TransferError::TimedOut)?
        }
        _ = handle.cancel.cancelled() => return Err(TransferError::Cancelled),
    };

    let (connect_token, size) = match outcome {
        soulseek_p2p::TransferResponseOutcome::Allowed { size } => {
            handle.advance(TransferEvent::Allowed)?;
            (token, size as u64)
        }
        soulseek_p2p::TransferResponseOutcome::Rejected { reason } => {
            handle.advance(TransferEvent::Queued)?;
            let _ = reason;
            let offer_key = queued_offer_key(&username, &filename);
            let offer = tokio::select! {
                result = registry.queued_offers.wait_indefinitely(offer_key) => {
                    result.map_err(|_| TransferError::Cancelled)?
                }
                _ = handle.cancel.cancelled() => return Err(TransferError::Cancelled),
            };
            handle.advance(TransferEvent::Allowed)?;
            (offer.token, offer.size as u64)
        }
    };

    let conn = peers
        .await_direct_transfer(&username, connect_token, options.indirect_timeout)
        .await?;
    handle.advance(TransferEvent::ConnectionEstablished)?;

    let result = stream_into_sink(&handle, &conn, size, &mut *sink, governor.as_deref(), &options).await;
    match &result {
        Ok(()) => handle.advance(TransferEvent::Succeeded)?,
        Err(TransferError::Cancelled) => handle.advance(TransferEvent::Cancelled)?,
        Err(TransferError::TimedOut) => handle.advance(TransferEvent::TimedOut)?,
        Err(_) => handle.advance(TransferEvent::Errored)?,
    }
    result
}

/// §4.8 upload contract: invoked once the façade's enqueue resolver has
/// already decided to allow the transfer and replied with
/// `TransferResponse::allowed`. We are the side with the data, so we dial
/// the transfer connection rather than wait for one.
pub async fn run_upload(
    peers: Arc<PeerConnectionManager>,
    handle: Arc<TransferHandle>,
    username: String,
    token: i32,
    mut source: Box<dyn TransferSource>,
    governor: Option<Arc<dyn TransferGovernor>>,
    options: TransferOptions,
) -> Result<(), TransferError> {
    handle.advance(TransferEvent::Allowed)?;
    let conn = peers.open_transfer_connection(&username, token).await?;
    handle.advance(TransferEvent::ConnectionEstablished)?;

    let result = stream_from_source(&handle, &conn, &mut *source, governor.as_deref(), &options).await;
    match &result {
        Ok(()) => handle.advance(TransferEvent::Succeeded)?,
        Err(TransferError::Cancelled) => handle.advance(TransferEvent::Cancelled)?,
        Err(TransferError::TimedOut) => handle.advance(TransferEvent::TimedOut)?,
        Err(_) => handle.advance(TransferEvent::Errored)?,
    }
    result
}

/// Replies to an inbound download request on the spot, for hosts that want
/// to allow or reject synchronously rather than queueing (§4.7 enqueue
/// action feeding straight into §4.8).
pub async fn reply_transfer_request(
    peers: &Arc<PeerConnectionManager>,
    username: &str,
    response: TransferResponse,
) -> Result<(), TransferError> {
    let conn = peers.get_message_connection(username).await?;
    conn.write(&response.encode()).await?;
    Ok(())
}

async fn stream_into_sink(
    handle: &TransferHandle,
    conn: &Connection,
    total: u64,
    sink: &mut dyn TransferSink,
    governor: Option<&dyn TransferGovernor>,
    options: &TransferOptions,
) -> Result<(), TransferError> {
    let Some(mut read_half) = conn.take_read_half().await else {
        return Err(TransferError::Conn(ConnError::NotConnected));
    };
    let mut transferred: u64 = 0;
    let mut buf = vec![0u8; options.chunk_size];
    handle.report_progress(0, Some(total));

    while transferred < total {
        if handle.cancel.is_cancelled() {
            conn.disconnect("transfer cancelled").await;
            return Err(TransferError::Cancelled);
        }
        let want = options.chunk_size.min((total - transferred) as usize);
        if let Some(g) = governor {
            g.acquire(want).await;
        }
        let n = tokio::time::timeout(options.inactivity_timeout, read_half.read(&mut buf[..want]))
            .await
            .map_err(|_| TransferError::TimedOut)?
            .map_err(ConnError::Read)?;
        if n == 0 {
            return Err(TransferError::Conn(ConnError::Closed("remote closed transfer connection early")));
        }
        sink.write_chunk(&buf[..n])
            .await
            .map_err(|e| TransferError::Conn(ConnError::Write(e)))?;
        transferred += n as u64;
        handle.report_progress(transferred, Some(total));
    }
    conn.disconnect("download complete").await;
    Ok(())
}

async fn stream_from_source(
    handle: &TransferHandle,
    conn: &Connection,
    source: &mut dyn TransferSource,
    governor: Option<&dyn TransferGovernor>,
    options: &TransferOptions,
) -> Result<(), TransferError> {
    let mut transferred: u64 = 0;
    handle.report_progress(0, None);
    loop {
        if handle.cancel.is_cancelled() {
            conn.disconnect("transfer cancelled").await;
            return Err(TransferError::Cancelled);
        }
        let chunk = tokio::time::timeout(options.inactivity_timeout, source.read_chunk(options.chunk_size))
            .await
            .map_err(|_| TransferError::TimedOut)?
            .map_err(ConnError::Read)?;
        if chunk.is_empty() {
            break;
        }
        if let Some(g) = governor {
            g.acquire(chunk.len()).await;
        }
        conn.write(&chunk).await?;
        transferred += chunk.len() as u64;
        handle.report_progress(transferred, None);
    }
    conn.disconnect("upload complete").await;
    Ok(())
}
