//! Binary message codec for the Soulseek server, peer and distributed wire
//! protocols: variable-length little-endian framing with optional
//! zlib-compressed payloads (§4.1, §6).

pub mod ascii;
pub mod codec;
pub mod codes;
pub mod error;
pub mod messages;
pub mod types;

pub use ascii::AsciiString;
pub use codes::{ConnectionTypeTag, DistributedCode, InitCode, PeerCode, ServerCode};
pub use error::ProtoError;
