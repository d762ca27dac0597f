//! The embeddable Soulseek client façade (§4.10): wires the proto codec and
//! the net/p2p/transfer layers into a single `SoulseekClient` a host program
//! constructs, logs in with, and drives through `connect`/`login`/`search`/
//! `browse`/`download`/`upload`/`disconnect`.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod state;
pub mod transfers;

pub use client::SoulseekClient;
pub use config::{ClientConfig, RoleConnectionOptions};
pub use error::ClientError;
pub use events::ClientEvent;
pub use state::{ClientState, ClientStateEvent};
pub use transfers::ClientTransferHandler;

// Re-exported so a host can build resolvers and transfer sinks/sources
// without a direct dependency on the lower crates.
pub use soulseek_p2p::{
    BrowseResolver, DirectoryContentsResolver, EnqueueDecision, EnqueueDownloadAction, P2pEvent, RemoteEndpoint,
    Resolvers, SearchResponseResolver, UserInfoResolver,
};
pub use soulseek_transfer::{
    TransferDisposition, TransferEvent, TransferGovernor, TransferHandle, TransferOptions, TransferPhase,
    TransferProgressEvent, TransferSink, TransferSource, TransferState,
};
pub use soulseek_util::{DiagnosticEvent, DiagnosticLevel};
