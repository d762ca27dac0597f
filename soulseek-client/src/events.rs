use soulseek_p2p::P2pEvent;

use crate::state::ClientState;

/// Everything the façade surfaces on its single event stream (§4.10).
/// Diagnostics are deliberately not folded in here — they're their own typed
/// channel via [`crate::SoulseekClient::diagnostics`], matching §0's split
/// between operator-facing trace output and host-facing protocol events.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    StateChanged(ClientState),
    /// Surfaced once, right before the connection is actually torn down.
    Disconnected { reason: String },
    /// We allowed an incoming download request (§4.7's enqueue action said
    /// yes); the host must now call [`crate::SoulseekClient::upload`] with
    /// this token and a [`soulseek_transfer::TransferSource`] to actually
    /// push the bytes.
    UploadRequested {
        username: String,
        filename: String,
        token: i32,
        size: i64,
    },
    P2p(P2pEvent),
}

impl From<P2pEvent> for ClientEvent {
    fn from(e: P2pEvent) -> Self {
        ClientEvent::P2p(e)
    }
}
