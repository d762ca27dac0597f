use crate::ascii::AsciiString;
use crate::codec::{MessageBuilder, MessageReader};
use crate::error::ProtoError;

/// A single shared file as carried in browse responses, folder-contents
/// responses and search results (§8 scenario 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub filename: AsciiString,
    pub size: i64,
    pub extension: AsciiString,
    pub attributes: Vec<(u32, u32)>,
}

impl FileEntry {
    pub fn encode(&self, b: MessageBuilder) -> MessageBuilder {
        let mut b = b
            .u8(1) // file-entry marker code, fixed for plain files
            .raw_string(&self.filename)
            .i64(self.size)
            .raw_string(&self.extension)
            .u32(self.attributes.len() as u32);
        for (kind, value) in &self.attributes {
            b = b.u32(*kind).u32(*value);
        }
        b
    }

    pub fn decode(r: &mut MessageReader) -> Result<Self, ProtoError> {
        let _marker = r.read_u8()?;
        let filename = r.read_string()?;
        let size = r.read_i64()?;
        let extension = r.read_string()?;
        let attr_count = r.read_u32()? as usize;
        let mut attributes = Vec::with_capacity(attr_count);
        for _ in 0..attr_count {
            let kind = r.read_u32()?;
            let value = r.read_u32()?;
            attributes.push((kind, value));
        }
        Ok(FileEntry {
            filename,
            size,
            extension,
            attributes,
        })
    }
}

/// One directory in a browse tree: a path and the files directly in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub name: AsciiString,
    pub files: Vec<FileEntry>,
}

impl Directory {
    pub fn encode(&self, b: MessageBuilder) -> MessageBuilder {
        let mut b = b.raw_string(&self.name).u32(self.files.len() as u32);
        for file in &self.files {
            b = file.encode(b);
        }
        b
    }

    pub fn decode(r: &mut MessageReader) -> Result<Self, ProtoError> {
        let name = r.read_string()?;
        let file_count = r.read_u32()? as usize;
        let mut files = Vec::with_capacity(file_count);
        for _ in 0..file_count {
            files.push(FileEntry::decode(r)?);
        }
        Ok(Directory { name, files })
    }

    pub fn encode_list(dirs: &[Directory], b: MessageBuilder) -> MessageBuilder {
        let mut b = b.u32(dirs.len() as u32);
        for dir in dirs {
            b = dir.encode(b);
        }
        b
    }

    pub fn decode_list(r: &mut MessageReader) -> Result<Vec<Directory>, ProtoError> {
        let count = r.read_u32()? as usize;
        let mut dirs = Vec::with_capacity(count);
        for _ in 0..count {
            dirs.push(Directory::decode(r)?);
        }
        Ok(dirs)
    }
}

/// Host-facing user info, the payload `userInfoResolver` (§4.7) returns and
/// `InfoResponse` carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub description: AsciiString,
    pub picture: Option<Vec<u8>>,
    pub total_uploads: u32,
    pub queue_size: u32,
    pub free_upload_slots: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Offline,
    Away,
    Online,
}

impl UserStatus {
    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => UserStatus::Away,
            2 => UserStatus::Online,
            _ => UserStatus::Offline,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            UserStatus::Offline => 0,
            UserStatus::Away => 1,
            UserStatus::Online => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Download,
    Upload,
}

impl TransferDirection {
    pub fn as_i32(self) -> i32 {
        match self {
            TransferDirection::Download => 0,
            TransferDirection::Upload => 1,
        }
    }

    pub fn from_i32(v: i32) -> Self {
        if v == 1 {
            TransferDirection::Upload
        } else {
            TransferDirection::Download
        }
    }
}

/// One result as surfaced by `searchResponseResolver` and carried in a
/// `SearchResponse` (§8 scenario 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResponse {
    pub username: AsciiString,
    pub token: i32,
    pub files: Vec<FileEntry>,
    pub free_upload_slots: bool,
    pub upload_speed: u32,
    pub queue_length: u64,
}
