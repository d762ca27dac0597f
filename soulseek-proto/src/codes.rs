//! Numeric code assignments for the three message namespaces plus the
//! 1-byte initialization namespace (§3 `MessageCode`, §6).
//!
//! The teacher's wire layer rewrites the first 4 bytes of every outgoing
//! frame to offset the code into a type-specific range and reverses this on
//! read (§9 "Message code normalization"). That indirection is dropped here:
//! every namespace gets its own absolute, explicit code table and its own
//! builder/decoder pair, which the design notes call out as removing "a
//! whole class of bugs".

/// Codes exchanged with the central server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ServerCode {
    Login = 1,
    SetListenPort = 2,
    GetPeerAddress = 3,
    AddUser = 5,
    GetStatus = 7,
    /// Sent by the server when this account has logged in elsewhere; the
    /// connection is about to be severed and must not be retried (§7
    /// `KickedFromServer`).
    Relogged = 41,
    ConnectToPeer = 18,
    PrivateMessage = 22,
    AcknowledgePrivateMessage = 23,
    FileSearch = 26,
    SetOnlineStatus = 28,
    SharedFoldersAndFiles = 35,
    RoomList = 64,
    PrivilegedUsers = 69,
    HaveNoParents = 71,
    ParentsIP = 73,
    ParentMinSpeed = 83,
    ParentSpeedRatio = 84,
    AcceptChildren = 100,
    NetInfo = 102,
    WishlistInterval = 104,
    BranchLevel = 126,
    BranchRoot = 127,
    ChildDepth = 129,
}

impl ServerCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        use ServerCode::*;
        Some(match code {
            1 => Login,
            2 => SetListenPort,
            3 => GetPeerAddress,
            5 => AddUser,
            7 => GetStatus,
            41 => Relogged,
            18 => ConnectToPeer,
            22 => PrivateMessage,
            23 => AcknowledgePrivateMessage,
            26 => FileSearch,
            28 => SetOnlineStatus,
            35 => SharedFoldersAndFiles,
            64 => RoomList,
            69 => PrivilegedUsers,
            71 => HaveNoParents,
            73 => ParentsIP,
            83 => ParentMinSpeed,
            84 => ParentSpeedRatio,
            100 => AcceptChildren,
            102 => NetInfo,
            104 => WishlistInterval,
            126 => BranchLevel,
            127 => BranchRoot,
            129 => ChildDepth,
            _ => return None,
        })
    }
}

/// Codes exchanged directly between two peers over a `"P"` (message) or
/// `"F"` (transfer) connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PeerCode {
    BrowseRequest = 4,
    BrowseResponse = 5,
    SearchRequest = 8,
    SearchResponse = 9,
    InfoRequest = 15,
    InfoResponse = 16,
    FolderContentsRequest = 36,
    FolderContentsResponse = 37,
    TransferRequest = 40,
    TransferResponse = 41,
    UploadFailed = 46,
    QueueFailed = 50,
    PlaceInQueueRequest = 51,
    PlaceInQueueResponse = 44,
}

impl PeerCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        use PeerCode::*;
        Some(match code {
            4 => BrowseRequest,
            5 => BrowseResponse,
            8 => SearchRequest,
            9 => SearchResponse,
            15 => InfoRequest,
            16 => InfoResponse,
            36 => FolderContentsRequest,
            37 => FolderContentsResponse,
            40 => TransferRequest,
            41 => TransferResponse,
            46 => UploadFailed,
            50 => QueueFailed,
            51 => PlaceInQueueRequest,
            44 => PlaceInQueueResponse,
            _ => return None,
        })
    }
}

/// Codes exchanged over the distributed search-tree fabric (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DistributedCode {
    Ping = 0,
    SearchRequest = 3,
    BranchLevel = 4,
    BranchRoot = 5,
    ChildDepth = 7,
    /// A server-originated search rebroadcast into the distributed fabric;
    /// the open question in §9 resolves this as equivalent in meaning to
    /// `SearchRequest`.
    ServerSearchRequest = 93,
}

impl DistributedCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        use DistributedCode::*;
        Some(match code {
            0 => Ping,
            3 => SearchRequest,
            4 => BranchLevel,
            5 => BranchRoot,
            7 => ChildDepth,
            93 => ServerSearchRequest,
            _ => return None,
        })
    }
}

/// The 1-byte codes exchanged on a freshly opened, not-yet-typed connection
/// before it is classified as a peer-message or transfer connection (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InitCode {
    PierceFirewall = 0,
    PeerInit = 1,
}

impl InitCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(InitCode::PierceFirewall),
            1 => Some(InitCode::PeerInit),
            _ => None,
        }
    }
}

/// The connection-type tag carried in `PeerInit`/`ConnectToPeer` messages
/// (§4.5: `"P"`, `"F"`, `"D"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionTypeTag {
    PeerMessage,
    Transfer,
    Distributed,
}

impl ConnectionTypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionTypeTag::PeerMessage => "P",
            ConnectionTypeTag::Transfer => "F",
            ConnectionTypeTag::Distributed => "D",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "P" => Some(ConnectionTypeTag::PeerMessage),
            "F" => Some(ConnectionTypeTag::Transfer),
            "D" => Some(ConnectionTypeTag::Distributed),
            _ => None,
        }
    }
}
