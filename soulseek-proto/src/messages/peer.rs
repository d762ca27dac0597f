use crate::ascii::AsciiString;
use crate::codec::{self, MessageBuilder, MessageReader};
use crate::codes::PeerCode;
use crate::error::ProtoError;
use crate::types::{Directory, FileEntry, TransferDirection, UserInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowseRequest;

impl BrowseRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(PeerCode::BrowseRequest as u32).build()
    }
}

/// Browse responses are zlib-compressed on the wire (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseResponse {
    pub directories: Vec<Directory>,
}

impl BrowseResponse {
    pub fn encode(&self) -> Vec<u8> {
        let raw = Directory::encode_list(&self.directories, MessageBuilder::with_code_u8(0))
            .build();
        // drop the placeholder 4-byte length + 1-byte code the helper added;
        // we only wanted its field-writing behavior.
        let raw_fields = &raw[5..];
        let compressed = codec::deflate(raw_fields);
        MessageBuilder::with_code_u32(PeerCode::BrowseResponse as u32)
            .raw_bytes(&compressed)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let inflated = codec::inflate(payload)?;
        let mut r = MessageReader::new(&inflated);
        Ok(BrowseResponse {
            directories: Directory::decode_list(&mut r)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoRequest;

impl InfoRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(PeerCode::InfoRequest as u32).build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoResponse {
    pub info: UserInfo,
}

impl InfoResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut b = MessageBuilder::with_code_u32(PeerCode::InfoResponse as u32)
            .raw_string(&self.info.description)
            .bool(self.info.picture.is_some());
        if let Some(picture) = &self.info.picture {
            b = b.u32(picture.len() as u32).raw_bytes(picture);
        }
        b.u32(self.info.total_uploads)
            .u32(self.info.queue_size)
            .bool(self.info.free_upload_slots)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        let description = r.read_string()?;
        let has_picture = r.read_bool()?;
        let picture = if has_picture {
            let len = r.read_u32()? as usize;
            Some(r.read_raw(len)?.to_vec())
        } else {
            None
        };
        let total_uploads = r.read_u32()?;
        let queue_size = r.read_u32()?;
        let free_upload_slots = r.read_bool()?;
        Ok(InfoResponse {
            info: UserInfo {
                description,
                picture,
                total_uploads,
                queue_size,
                free_upload_slots,
            },
        })
    }
}

/// A distributed search request rebroadcast to a peer's `"P"` connection
/// (§4.6: forwarded verbatim to children, and delegated to the local
/// resolver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSearchRequest {
    pub token: i32,
    pub query: AsciiString,
}

impl PeerSearchRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(PeerCode::SearchRequest as u32)
            .i32(self.token)
            .raw_string(&self.query)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(PeerSearchRequest {
            token: r.read_i32()?,
            query: r.read_string()?,
        })
    }
}

/// §8 scenario 2: zlib-compressed search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSearchResponse {
    pub username: AsciiString,
    pub token: i32,
    pub files: Vec<FileEntry>,
    pub free_upload_slots: bool,
    pub upload_speed: u32,
    pub queue_length: u64,
}

impl PeerSearchResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut inner = MessageBuilder::with_code_u8(0)
            .raw_string(&self.username)
            .i32(self.token)
            .u32(self.files.len() as u32);
        for file in &self.files {
            inner = file.encode(inner);
        }
        let inner = inner
            .bool(self.free_upload_slots)
            .u32(self.upload_speed)
            .i64(self.queue_length as i64)
            .build();
        let raw_fields = &inner[5..];
        let compressed = codec::deflate(raw_fields);
        MessageBuilder::with_code_u32(PeerCode::SearchResponse as u32)
            .raw_bytes(&compressed)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let inflated = codec::inflate(payload)?;
        let mut r = MessageReader::new(&inflated);
        let username = r.read_string()?;
        let token = r.read_i32()?;
        let file_count = r.read_u32()? as usize;
        let mut files = Vec::with_capacity(file_count);
        for _ in 0..file_count {
            files.push(FileEntry::decode(&mut r)?);
        }
        let free_upload_slots = r.read_bool()?;
        let upload_speed = r.read_u32()?;
        let queue_length = r.read_i64()? as u64;
        Ok(PeerSearchResponse {
            username,
            token,
            files,
            free_upload_slots,
            upload_speed,
            queue_length,
        })
    }
}

/// §4.8: "Download begins by sending PeerTransferRequest(Download, token,
/// filename, 0)"; the remote may also send one unsolicited to start an
/// upload it decided to allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub direction: TransferDirection,
    pub token: i32,
    pub filename: AsciiString,
    pub size: i64,
}

impl TransferRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(PeerCode::TransferRequest as u32)
            .i32(self.direction.as_i32())
            .i32(self.token)
            .raw_string(&self.filename)
            .i64(self.size)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(TransferRequest {
            direction: TransferDirection::from_i32(r.read_i32()?),
            token: r.read_i32()?,
            filename: r.read_string()?,
            size: r.read_i64()?,
        })
    }
}

/// §4.8: the remote's reply; `size_or_reason` carries an allowed transfer's
/// size when `allowed`, or a rejection reason string when not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResponse {
    pub token: i32,
    pub allowed: bool,
    pub size: Option<i64>,
    pub reason: Option<AsciiString>,
}

impl TransferResponse {
    pub fn allowed(token: i32, size: i64) -> Self {
        Self {
            token,
            allowed: true,
            size: Some(size),
            reason: None,
        }
    }

    pub fn rejected(token: i32, reason: impl Into<AsciiString>) -> Self {
        Self {
            token,
            allowed: false,
            size: None,
            reason: Some(reason.into()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut b = MessageBuilder::with_code_u32(PeerCode::TransferResponse as u32)
            .i32(self.token)
            .bool(self.allowed);
        if self.allowed {
            b = b.i64(self.size.unwrap_or(0));
        } else {
            b = b.raw_string(self.reason.as_ref().unwrap_or(&AsciiString::from("Cancelled")));
        }
        b.build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        let token = r.read_i32()?;
        let allowed = r.read_bool()?;
        if allowed {
            Ok(TransferResponse {
                token,
                allowed,
                size: Some(r.read_i64()?),
                reason: None,
            })
        } else {
            Ok(TransferResponse {
                token,
                allowed,
                size: None,
                reason: Some(r.read_string()?),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceInQueueRequest {
    pub filename: AsciiString,
}

impl PlaceInQueueRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(PeerCode::PlaceInQueueRequest as u32)
            .raw_string(&self.filename)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(PlaceInQueueRequest {
            filename: r.read_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceInQueueResponse {
    pub filename: AsciiString,
    pub place: u32,
}

impl PlaceInQueueResponse {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(PeerCode::PlaceInQueueResponse as u32)
            .raw_string(&self.filename)
            .u32(self.place)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(PlaceInQueueResponse {
            filename: r.read_string()?,
            place: r.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFailed {
    pub filename: AsciiString,
    pub reason: AsciiString,
}

impl QueueFailed {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(PeerCode::QueueFailed as u32)
            .raw_string(&self.filename)
            .raw_string(&self.reason)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(QueueFailed {
            filename: r.read_string()?,
            reason: r.read_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailed {
    pub filename: AsciiString,
}

impl UploadFailed {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(PeerCode::UploadFailed as u32)
            .raw_string(&self.filename)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(UploadFailed {
            filename: r.read_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderContentsRequest {
    pub token: i32,
    pub directory: AsciiString,
}

impl FolderContentsRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(PeerCode::FolderContentsRequest as u32)
            .i32(self.token)
            .raw_string(&self.directory)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(FolderContentsRequest {
            token: r.read_i32()?,
            directory: r.read_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderContentsResponse {
    pub token: i32,
    pub directory: Directory,
}

impl FolderContentsResponse {
    pub fn encode(&self) -> Vec<u8> {
        self.directory
            .encode(MessageBuilder::with_code_u32(PeerCode::FolderContentsResponse as u32).i32(self.token))
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        let token = r.read_i32()?;
        let directory = Directory::decode(&mut r)?;
        Ok(FolderContentsResponse { token, directory })
    }
}

/// Dispatch wrapper for the Peer handler (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    BrowseRequest(BrowseRequest),
    BrowseResponse(BrowseResponse),
    InfoRequest(InfoRequest),
    InfoResponse(InfoResponse),
    SearchRequest(PeerSearchRequest),
    SearchResponse(PeerSearchResponse),
    TransferRequest(TransferRequest),
    TransferResponse(TransferResponse),
    PlaceInQueueRequest(PlaceInQueueRequest),
    PlaceInQueueResponse(PlaceInQueueResponse),
    QueueFailed(QueueFailed),
    UploadFailed(UploadFailed),
    FolderContentsRequest(FolderContentsRequest),
    FolderContentsResponse(FolderContentsResponse),
    Unrecognized { code: u32 },
}

impl PeerMessage {
    pub fn decode(code: u32, payload: &[u8]) -> Result<Self, ProtoError> {
        let Some(known) = PeerCode::from_u32(code) else {
            return Ok(PeerMessage::Unrecognized { code });
        };
        Ok(match known {
            PeerCode::BrowseRequest => PeerMessage::BrowseRequest(BrowseRequest),
            PeerCode::BrowseResponse => PeerMessage::BrowseResponse(BrowseResponse::decode(payload)?),
            PeerCode::InfoRequest => PeerMessage::InfoRequest(InfoRequest),
            PeerCode::InfoResponse => PeerMessage::InfoResponse(InfoResponse::decode(payload)?),
            PeerCode::SearchRequest => PeerMessage::SearchRequest(PeerSearchRequest::decode(payload)?),
            PeerCode::SearchResponse => PeerMessage::SearchResponse(PeerSearchResponse::decode(payload)?),
            PeerCode::TransferRequest => PeerMessage::TransferRequest(TransferRequest::decode(payload)?),
            PeerCode::TransferResponse => PeerMessage::TransferResponse(TransferResponse::decode(payload)?),
            PeerCode::PlaceInQueueRequest => {
                PeerMessage::PlaceInQueueRequest(PlaceInQueueRequest::decode(payload)?)
            }
            PeerCode::PlaceInQueueResponse => {
                PeerMessage::PlaceInQueueResponse(PlaceInQueueResponse::decode(payload)?)
            }
            PeerCode::QueueFailed => PeerMessage::QueueFailed(QueueFailed::decode(payload)?),
            PeerCode::UploadFailed => PeerMessage::UploadFailed(UploadFailed::decode(payload)?),
            PeerCode::FolderContentsRequest => {
                PeerMessage::FolderContentsRequest(FolderContentsRequest::decode(payload)?)
            }
            PeerCode::FolderContentsResponse => {
                PeerMessage::FolderContentsResponse(FolderContentsResponse::decode(payload)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_request_round_trips() {
        let msg = TransferRequest {
            direction: TransferDirection::Download,
            token: 7,
            filename: "abc.mp3".into(),
            size: 0,
        };
        let wire = msg.encode();
        let payload = &wire[8..];
        assert_eq!(TransferRequest::decode(payload).unwrap(), msg);
    }

    #[test]
    fn transfer_response_round_trips_allowed_and_rejected() {
        let allowed = TransferResponse::allowed(7, 1024);
        let wire = allowed.encode();
        assert_eq!(TransferResponse::decode(&wire[8..]).unwrap(), allowed);

        let rejected = TransferResponse::rejected(7, "Queued");
        let wire = rejected.encode();
        assert_eq!(TransferResponse::decode(&wire[8..]).unwrap(), rejected);
    }

    #[test]
    fn search_response_round_trips_compressed() {
        let msg = PeerSearchResponse {
            username: "B".into(),
            token: 42,
            files: vec![FileEntry {
                filename: "abc.mp3".into(),
                size: 1024,
                extension: "mp3".into(),
                attributes: vec![],
            }],
            free_upload_slots: true,
            upload_speed: 0,
            queue_length: 0,
        };
        let wire = msg.encode();
        let decoded = PeerSearchResponse::decode(&wire[8..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn browse_response_round_trips() {
        let msg = BrowseResponse {
            directories: vec![Directory {
                name: "/music".into(),
                files: vec![FileEntry {
                    filename: "abc.mp3".into(),
                    size: 1024,
                    extension: "mp3".into(),
                    attributes: vec![(1, 128)],
                }],
            }],
        };
        let wire = msg.encode();
        let decoded = BrowseResponse::decode(&wire[8..]).unwrap();
        assert_eq!(decoded, msg);
    }
}
