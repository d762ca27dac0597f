use std::net::Ipv4Addr;

use crate::ascii::AsciiString;
use crate::codec::{MessageBuilder, MessageReader};
use crate::codes::ServerCode;
use crate::error::ProtoError;
use crate::types::UserStatus;

/// The login request (§4.10): `string user, string password, i32
/// version=181, string md5(user+password), i32 minorVersion=1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: AsciiString,
    pub password: AsciiString,
    pub version: i32,
    pub md5_digest: AsciiString,
    pub minor_version: i32,
}

impl LoginRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::Login as u32)
            .raw_string(&self.username)
            .raw_string(&self.password)
            .i32(self.version)
            .raw_string(&self.md5_digest)
            .i32(self.minor_version)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub success: bool,
    pub message: AsciiString,
    pub ip: Option<Ipv4Addr>,
}

impl LoginResponse {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        let success = r.read_bool()?;
        let message = r.read_string()?;
        let ip = if success && r.remaining() >= 4 {
            Some(r.read_ip()?)
        } else {
            None
        };
        Ok(LoginResponse { success, message, ip })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetPeerAddressRequest {
    pub username: AsciiString,
}

impl GetPeerAddressRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::GetPeerAddress as u32)
            .raw_string(&self.username)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetPeerAddressResponse {
    pub username: AsciiString,
    pub ip: Ipv4Addr,
    pub port: u32,
}

impl GetPeerAddressResponse {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(GetPeerAddressResponse {
            username: r.read_string()?,
            ip: r.read_ip()?,
            port: r.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddUserRequest {
    pub username: AsciiString,
}

impl AddUserRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::AddUser as u32)
            .raw_string(&self.username)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddUserResponse {
    pub username: AsciiString,
    pub exists: bool,
    pub status: UserStatus,
    pub avg_speed: u32,
    pub upload_count: i64,
    pub file_count: u32,
    pub dir_count: u32,
}

impl AddUserResponse {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        let username = r.read_string()?;
        let exists = r.read_bool()?;
        if !exists {
            return Ok(AddUserResponse {
                username,
                exists: false,
                status: UserStatus::Offline,
                avg_speed: 0,
                upload_count: 0,
                file_count: 0,
                dir_count: 0,
            });
        }
        let status = UserStatus::from_i32(r.read_i32()?);
        let avg_speed = r.read_u32()?;
        let upload_count = r.read_i64()?;
        let file_count = r.read_u32()?;
        let dir_count = r.read_u32()?;
        Ok(AddUserResponse {
            username,
            exists,
            status,
            avg_speed,
            upload_count,
            file_count,
            dir_count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetStatusRequest {
    pub username: AsciiString,
}

impl GetStatusRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::GetStatus as u32)
            .raw_string(&self.username)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetStatusResponse {
    pub username: AsciiString,
    pub status: UserStatus,
    pub privileged: bool,
}

impl GetStatusResponse {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(GetStatusResponse {
            username: r.read_string()?,
            status: UserStatus::from_i32(r.read_i32()?),
            privileged: r.read_bool()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSearchRequest {
    pub token: i32,
    pub query: AsciiString,
}

impl FileSearchRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::FileSearch as u32)
            .i32(self.token)
            .raw_string(&self.query)
            .build()
    }
}

/// Outbound: ask the server to relay a connection request to `username`
/// (§4.5 indirect path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectToPeerRequest {
    pub token: i32,
    pub username: AsciiString,
    pub connection_type: AsciiString,
}

impl ConnectToPeerRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::ConnectToPeer as u32)
            .i32(self.token)
            .raw_string(&self.username)
            .raw_string(&self.connection_type)
            .build()
    }
}

/// Inbound: the server asking *us* to dial `username` back (we are the
/// solicited side of someone else's indirect connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectToPeerNotify {
    pub username: AsciiString,
    pub connection_type: AsciiString,
    pub ip: Ipv4Addr,
    pub port: u32,
    pub token: i32,
    pub privileged: bool,
}

impl ConnectToPeerNotify {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(ConnectToPeerNotify {
            username: r.read_string()?,
            connection_type: r.read_string()?,
            ip: r.read_ip()?,
            port: r.read_u32()?,
            token: r.read_i32()?,
            privileged: r.read_bool()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessageNotify {
    pub id: i32,
    pub timestamp: i64,
    pub username: AsciiString,
    pub message: AsciiString,
    pub is_admin: bool,
}

impl PrivateMessageNotify {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(PrivateMessageNotify {
            id: r.read_i32()?,
            timestamp: r.read_i64()?,
            username: r.read_string()?,
            message: r.read_string()?,
            is_admin: r.read_bool()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgePrivateMessageRequest {
    pub id: i32,
}

impl AcknowledgePrivateMessageRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::AcknowledgePrivateMessage as u32)
            .i32(self.id)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomListResponse {
    pub rooms: Vec<(AsciiString, u32)>,
}

impl RoomListResponse {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        let count = r.read_u32()? as usize;
        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            names.push(r.read_string()?);
        }
        let count2 = r.read_u32()? as usize;
        let mut counts = Vec::with_capacity(count2);
        for _ in 0..count2 {
            counts.push(r.read_u32()?);
        }
        let rooms = names.into_iter().zip(counts).collect();
        Ok(RoomListResponse { rooms })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedUsersResponse {
    pub usernames: Vec<AsciiString>,
}

impl PrivilegedUsersResponse {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        let count = r.read_u32()? as usize;
        let mut usernames = Vec::with_capacity(count);
        for _ in 0..count {
            usernames.push(r.read_string()?);
        }
        Ok(PrivilegedUsersResponse { usernames })
    }
}

/// A single candidate parent as carried in `NetInfo` (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentCandidate {
    pub username: AsciiString,
    pub ip: Ipv4Addr,
    pub port: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInfoResponse {
    pub candidates: Vec<ParentCandidate>,
}

impl NetInfoResponse {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        let count = r.read_u32()? as usize;
        let mut candidates = Vec::with_capacity(count);
        for _ in 0..count {
            let username = r.read_string()?;
            let ip = r.read_ip()?;
            let port = r.read_u32()?;
            candidates.push(ParentCandidate { username, ip, port });
        }
        Ok(NetInfoResponse { candidates })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelogNotify;

impl RelogNotify {
    pub fn decode(_payload: &[u8]) -> Result<Self, ProtoError> {
        Ok(RelogNotify)
    }
}

macro_rules! simple_outbound {
    ($name:ident, $code:expr, $field:ident : $ty:ty, $write:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub $field: $ty,
        }

        impl $name {
            pub fn encode(&self) -> Vec<u8> {
                MessageBuilder::with_code_u32($code as u32)
                    .$write(self.$field)
                    .build()
            }
        }
    };
}

simple_outbound!(HaveNoParentsRequest, ServerCode::HaveNoParents, value: bool, bool);
simple_outbound!(BranchLevelRequest, ServerCode::BranchLevel, level: u32, u32);
simple_outbound!(ChildDepthRequest, ServerCode::ChildDepth, depth: u32, u32);
simple_outbound!(AcceptChildrenRequest, ServerCode::AcceptChildren, accept: bool, bool);
simple_outbound!(SetListenPortRequest, ServerCode::SetListenPort, port: u32, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentsIPRequest {
    pub ip: Ipv4Addr,
}

impl ParentsIPRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::ParentsIP as u32)
            .ip(self.ip)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRootRequest {
    pub root: AsciiString,
}

impl BranchRootRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::BranchRoot as u32)
            .raw_string(&self.root)
            .build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedFoldersAndFilesRequest {
    pub folders: u32,
    pub files: u32,
}

impl SharedFoldersAndFilesRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::SharedFoldersAndFiles as u32)
            .u32(self.folders)
            .u32(self.files)
            .build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOnlineStatusRequest {
    pub status: UserStatus,
}

impl SetOnlineStatusRequest {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u32(ServerCode::SetOnlineStatus as u32)
            .i32(self.status.as_i32())
            .build()
    }
}

macro_rules! simple_inbound_u32 {
    ($name:ident, $field:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub $field: u32,
        }

        impl $name {
            pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
                let mut r = MessageReader::new(payload);
                Ok(Self {
                    $field: r.read_u32()?,
                })
            }
        }
    };
}

simple_inbound_u32!(ParentMinSpeedNotify, speed);
simple_inbound_u32!(ParentSpeedRatioNotify, ratio);
simple_inbound_u32!(WishlistIntervalNotify, seconds);

/// Dispatch wrapper over every *inbound* server message the handler (§4.7)
/// needs to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    LoginResponse(LoginResponse),
    GetPeerAddressResponse(GetPeerAddressResponse),
    AddUserResponse(AddUserResponse),
    GetStatusResponse(GetStatusResponse),
    ConnectToPeerNotify(ConnectToPeerNotify),
    PrivateMessageNotify(PrivateMessageNotify),
    RoomListResponse(RoomListResponse),
    PrivilegedUsersResponse(PrivilegedUsersResponse),
    NetInfoResponse(NetInfoResponse),
    Relogged(RelogNotify),
    ParentMinSpeed(ParentMinSpeedNotify),
    ParentSpeedRatio(ParentSpeedRatioNotify),
    WishlistInterval(WishlistIntervalNotify),
    Unrecognized { code: u32 },
}

impl ServerMessage {
    pub fn decode(code: u32, payload: &[u8]) -> Result<Self, ProtoError> {
        let Some(known) = ServerCode::from_u32(code) else {
            return Ok(ServerMessage::Unrecognized { code });
        };
        Ok(match known {
            ServerCode::Login => ServerMessage::LoginResponse(LoginResponse::decode(payload)?),
            ServerCode::GetPeerAddress => {
                ServerMessage::GetPeerAddressResponse(GetPeerAddressResponse::decode(payload)?)
            }
            ServerCode::AddUser => ServerMessage::AddUserResponse(AddUserResponse::decode(payload)?),
            ServerCode::GetStatus => ServerMessage::GetStatusResponse(GetStatusResponse::decode(payload)?),
            ServerCode::ConnectToPeer => {
                ServerMessage::ConnectToPeerNotify(ConnectToPeerNotify::decode(payload)?)
            }
            ServerCode::PrivateMessage => {
                ServerMessage::PrivateMessageNotify(PrivateMessageNotify::decode(payload)?)
            }
            ServerCode::RoomList => ServerMessage::RoomListResponse(RoomListResponse::decode(payload)?),
            ServerCode::PrivilegedUsers => {
                ServerMessage::PrivilegedUsersResponse(PrivilegedUsersResponse::decode(payload)?)
            }
            ServerCode::NetInfo => ServerMessage::NetInfoResponse(NetInfoResponse::decode(payload)?),
            ServerCode::Relogged => ServerMessage::Relogged(RelogNotify::decode(payload)?),
            ServerCode::ParentMinSpeed => {
                ServerMessage::ParentMinSpeed(ParentMinSpeedNotify::decode(payload)?)
            }
            ServerCode::ParentSpeedRatio => {
                ServerMessage::ParentSpeedRatio(ParentSpeedRatioNotify::decode(payload)?)
            }
            ServerCode::WishlistInterval => {
                ServerMessage::WishlistInterval(WishlistIntervalNotify::decode(payload)?)
            }
            _ => ServerMessage::Unrecognized { code },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_round_trips_through_response_shape() {
        let req = LoginRequest {
            username: "u".into(),
            password: "p".into(),
            version: 181,
            md5_digest: "deadbeef".into(),
            minor_version: 1,
        };
        let wire = req.encode();
        let len = u32::from_le_bytes(wire[0..4].try_into().unwrap()) as usize;
        assert_eq!(wire.len() - 4, len);
        let code = u32::from_le_bytes(wire[4..8].try_into().unwrap());
        assert_eq!(code, ServerCode::Login as u32);
    }

    #[test]
    fn login_response_decodes_success_with_ip() {
        let payload = MessageBuilder::with_code_u32(0)
            .bool(true)
            .string("hi")
            .ip(Ipv4Addr::new(203, 0, 113, 1))
            .build();
        // strip the length+code prefix added by with_code_u32(0) for this test helper
        let body = &payload[8..];
        let resp = LoginResponse::decode(body).unwrap();
        assert!(resp.success);
        assert_eq!(resp.message.to_string_lossy(), "hi");
        assert_eq!(resp.ip, Some(Ipv4Addr::new(203, 0, 113, 1)));
    }

    #[test]
    fn net_info_round_trips() {
        let payload = MessageBuilder::with_code_u32(0)
            .u32(1)
            .string("root-user")
            .ip(Ipv4Addr::new(10, 0, 0, 1))
            .u32(2234)
            .build();
        let body = &payload[8..];
        let decoded = NetInfoResponse::decode(body).unwrap();
        assert_eq!(decoded.candidates.len(), 1);
        assert_eq!(decoded.candidates[0].username.to_string_lossy(), "root-user");
    }
}
