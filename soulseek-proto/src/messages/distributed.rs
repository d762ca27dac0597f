use crate::ascii::AsciiString;
use crate::codec::{MessageBuilder, MessageReader};
use crate::codes::DistributedCode;
use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub token: i32,
}

impl Ping {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(DistributedCode::Ping as u32)
            .i32(self.token)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(Ping { token: r.read_i32()? })
    }
}

/// A search request traveling down the distributed tree (§4.6, GLOSSARY
/// "Branch").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedSearchRequest {
    pub originating_username: AsciiString,
    pub token: i32,
    pub query: AsciiString,
}

impl DistributedSearchRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(DistributedCode::SearchRequest as u32)
            .raw_string(&self.originating_username)
            .i32(self.token)
            .raw_string(&self.query)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(DistributedSearchRequest {
            originating_username: r.read_string()?,
            token: r.read_i32()?,
            query: r.read_string()?,
        })
    }

    /// Re-encode under the plain `SearchRequest` code — used when a
    /// `ServerSearchRequest` is rebroadcast (§9 open question).
    pub fn into_frame(self) -> Vec<u8> {
        self.encode()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchLevel {
    pub level: u32,
}

impl BranchLevel {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(DistributedCode::BranchLevel as u32)
            .u32(self.level)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(BranchLevel { level: r.read_u32()? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRoot {
    pub root: AsciiString,
}

impl BranchRoot {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(DistributedCode::BranchRoot as u32)
            .raw_string(&self.root)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(BranchRoot { root: r.read_string()? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildDepth {
    pub depth: u32,
}

impl ChildDepth {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(DistributedCode::ChildDepth as u32)
            .u32(self.depth)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(ChildDepth { depth: r.read_u32()? })
    }
}

/// §9 open question: a server-originated search that shares the wire shape
/// of `DistributedSearchRequest` under a distinct historical code. Treated
/// as an equivalent rebroadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSearchRequest {
    pub inner: DistributedSearchRequest,
}

impl ServerSearchRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        Ok(ServerSearchRequest {
            inner: DistributedSearchRequest::decode(payload)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributedMessage {
    Ping(Ping),
    SearchRequest(DistributedSearchRequest),
    BranchLevel(BranchLevel),
    BranchRoot(BranchRoot),
    ChildDepth(ChildDepth),
    ServerSearchRequest(ServerSearchRequest),
    Unrecognized { code: u32 },
}

impl DistributedMessage {
    pub fn decode(code: u32, payload: &[u8]) -> Result<Self, ProtoError> {
        let Some(known) = DistributedCode::from_u32(code) else {
            return Ok(DistributedMessage::Unrecognized { code });
        };
        Ok(match known {
            DistributedCode::Ping => DistributedMessage::Ping(Ping::decode(payload)?),
            DistributedCode::SearchRequest => {
                DistributedMessage::SearchRequest(DistributedSearchRequest::decode(payload)?)
            }
            DistributedCode::BranchLevel => DistributedMessage::BranchLevel(BranchLevel::decode(payload)?),
            DistributedCode::BranchRoot => DistributedMessage::BranchRoot(BranchRoot::decode(payload)?),
            DistributedCode::ChildDepth => DistributedMessage::ChildDepth(ChildDepth::decode(payload)?),
            DistributedCode::ServerSearchRequest => {
                DistributedMessage::ServerSearchRequest(ServerSearchRequest::decode(payload)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_round_trips() {
        let msg = DistributedSearchRequest {
            originating_username: "A".into(),
            token: 42,
            query: "abc".into(),
        };
        let wire = msg.encode();
        let decoded = DistributedSearchRequest::decode(&wire[8..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn branch_level_and_root_round_trip() {
        let level = BranchLevel { level: 3 };
        let wire = level.encode();
        assert_eq!(BranchLevel::decode(&wire[8..]).unwrap(), level);

        let root = BranchRoot { root: "R".into() };
        let wire = root.encode();
        assert_eq!(BranchRoot::decode(&wire[8..]).unwrap(), root);
    }
}
