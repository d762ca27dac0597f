use std::io::{Read, Write};
use std::net::Ipv4Addr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::ascii::AsciiString;
use crate::error::ProtoError;

/// Builds a single framed message. Primitives are appended into a growing
/// buffer; `build` prepends the 4-byte little-endian length (§4.1).
///
/// The length field covers the code plus payload, not itself, matching
/// §6's wire format: `u32 length | u32 code | payload[length-4]` (or a
/// 1-byte code for initialization frames).
pub struct MessageBuilder {
    body: Vec<u8>,
}

impl MessageBuilder {
    /// Start a frame whose code is a 4-byte little-endian value — the
    /// server/peer/distributed namespaces.
    pub fn with_code_u32(code: u32) -> Self {
        let mut body = Vec::with_capacity(64);
        body.write_u32::<LittleEndian>(code).expect("vec write");
        Self { body }
    }

    /// Start a frame whose code is a single byte — the initialization
    /// namespace (`PierceFirewall` / `PeerInit`).
    pub fn with_code_u8(code: u8) -> Self {
        Self { body: vec![code] }
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.body.push(v);
        self
    }

    pub fn bool(self, v: bool) -> Self {
        self.u8(if v { 1 } else { 0 })
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.body.write_u32::<LittleEndian>(v).expect("vec write");
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.body.write_i32::<LittleEndian>(v).expect("vec write");
        self
    }

    /// A "Long" per §3: signed 64-bit little-endian.
    pub fn i64(mut self, v: i64) -> Self {
        self.body.write_i64::<LittleEndian>(v).expect("vec write");
        self
    }

    pub fn string(self, s: impl Into<AsciiString>) -> Self {
        self.raw_string(&s.into())
    }

    pub fn raw_string(mut self, s: &AsciiString) -> Self {
        self.body
            .write_u32::<LittleEndian>(s.as_bytes().len() as u32)
            .expect("vec write");
        self.body.extend_from_slice(s.as_bytes());
        self
    }

    /// Appends a dotted-quad IP. §6: "4 bytes network-order in source; must
    /// be reversed on read" — we write it in the same reversed order so a
    /// peer (or our own reader) recovers the same address.
    pub fn ip(mut self, ip: Ipv4Addr) -> Self {
        let octets = ip.octets();
        self.body
            .extend_from_slice(&[octets[3], octets[2], octets[1], octets[0]]);
        self
    }

    pub fn raw_bytes(mut self, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(bytes);
        self
    }

    /// zlib-deflates the bytes produced by `inner` and appends the
    /// compressed blob directly (no extra length prefix — callers that need
    /// one call `.u32(len)` themselves, matching how a compressed payload is
    /// just another byte run on the wire).
    pub fn compressed(mut self, raw: &[u8]) -> Self {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw).expect("in-memory zlib write");
        let compressed = encoder.finish().expect("in-memory zlib finish");
        self.body.extend_from_slice(&compressed);
        self
    }

    /// Finish the frame: prepend the length, return the full wire bytes.
    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 4);
        out.write_u32::<LittleEndian>(self.body.len() as u32)
            .expect("vec write");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Reads primitives out of a message payload, tracking a cursor position as
/// described in §4.1.
pub struct MessageReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        if self.remaining() < n {
            return Err(ProtoError::ReadError {
                position: self.pos,
                want: n,
                have: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtoError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtoError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtoError> {
        let mut slice = self.take(4)?;
        slice.read_u32::<LittleEndian>().map_err(|_| ProtoError::ReadError {
            position: self.pos - 4,
            want: 4,
            have: self.remaining(),
        })
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtoError> {
        let mut slice = self.take(4)?;
        slice.read_i32::<LittleEndian>().map_err(|_| ProtoError::ReadError {
            position: self.pos - 4,
            want: 4,
            have: self.remaining(),
        })
    }

    /// A "Long" per §3: signed 64-bit little-endian.
    pub fn read_i64(&mut self) -> Result<i64, ProtoError> {
        let mut slice = self.take(8)?;
        slice.read_i64::<LittleEndian>().map_err(|_| ProtoError::ReadError {
            position: self.pos - 8,
            want: 8,
            have: self.remaining(),
        })
    }

    pub fn read_string(&mut self) -> Result<AsciiString, ProtoError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        Ok(AsciiString(bytes.to_vec()))
    }

    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        self.take(n)
    }

    /// Consumes every remaining byte (used to hand the rest of a message off
    /// for zlib inflation).
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    /// §6: "IP address: 4 bytes network-order in source; must be reversed on
    /// read to produce dotted quad."
    pub fn read_ip(&mut self) -> Result<Ipv4Addr, ProtoError> {
        let bytes = self.take(4)?;
        Ok(Ipv4Addr::new(bytes[3], bytes[2], bytes[1], bytes[0]))
    }

    /// Verifies the frame's numeric code matches what this decoder expects;
    /// the mismatch carries both sides for diagnostics (§4.1).
    pub fn expect_code(got: u32, expected: u32) -> Result<(), ProtoError> {
        if got != expected {
            return Err(ProtoError::CodeMismatchError { expected, got });
        }
        Ok(())
    }
}

/// Inflates a zlib-compressed payload, per §6 ("the recipient inflates
/// before parsing"). The message code itself is never part of the
/// compressed region — only the payload.
pub fn inflate(compressed: &[u8]) -> Result<Vec<u8>, ProtoError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ProtoError::Inflate(e.to_string()))?;
    Ok(out)
}

pub fn deflate(raw: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw).expect("in-memory zlib write");
    encoder.finish().expect("in-memory zlib finish")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_primitives() {
        let frame = MessageBuilder::with_code_u32(42)
            .i32(-7)
            .u32(9000)
            .i64(-123456789012)
            .bool(true)
            .string("abc.mp3")
            .ip(Ipv4Addr::new(203, 0, 113, 1))
            .build();

        // length prefix
        let len = u32::from_le_bytes(frame[0..4].try_into().unwrap());
        assert_eq!(len as usize, frame.len() - 4);

        let mut reader = MessageReader::new(&frame[4..]);
        let code = reader.read_u32().unwrap();
        assert_eq!(code, 42);
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert_eq!(reader.read_u32().unwrap(), 9000);
        assert_eq!(reader.read_i64().unwrap(), -123456789012);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_string().unwrap().to_string_lossy(), "abc.mp3");
        assert_eq!(reader.read_ip().unwrap(), Ipv4Addr::new(203, 0, 113, 1));
    }

    #[test]
    fn read_past_end_fails() {
        let mut reader = MessageReader::new(&[1, 2]);
        reader.read_u8().unwrap();
        reader.read_u8().unwrap();
        let err = reader.read_u8().unwrap_err();
        match err {
            ProtoError::ReadError { position, want, have } => {
                assert_eq!(position, 2);
                assert_eq!(want, 1);
                assert_eq!(have, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn code_mismatch_is_reported() {
        let err = MessageReader::expect_code(5, 26).unwrap_err();
        match err {
            ProtoError::CodeMismatchError { expected, got } => {
                assert_eq!(expected, 26);
                assert_eq!(got, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zlib_round_trips() {
        let raw = b"hello soulseek".repeat(20);
        let compressed = deflate(&raw);
        let inflated = inflate(&compressed).unwrap();
        assert_eq!(inflated, raw);
    }
}
