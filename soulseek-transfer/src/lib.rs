//! Download/upload state machine and the raw chunked I/O that drives it over
//! a peer transfer connection (§4.8).

mod engine;
mod error;
mod state;

pub use engine::{
    reply_transfer_request, run_download, run_upload, TransferGovernor, TransferHandle, TransferOptions,
    TransferProgressEvent, TransferRegistry, TransferSink, TransferSource,
};
pub use error::TransferError;
pub use state::{TransferDisposition, TransferEvent, TransferPhase, TransferState};
