use std::fmt;

/// A length-prefixed string on the wire (§6: "String: u32 length | ASCII
/// bytes"). Bytes are preserved exactly as received — non-ASCII bytes are
/// never transcoded, only ever inspected lossily on demand via
/// `to_string_lossy`.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct AsciiString(pub Vec<u8>);

impl AsciiString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for AsciiString {
    fn from(s: &str) -> Self {
        AsciiString(s.as_bytes().to_vec())
    }
}

impl From<String> for AsciiString {
    fn from(s: String) -> Self {
        AsciiString(s.into_bytes())
    }
}

impl From<Vec<u8>> for AsciiString {
    fn from(v: Vec<u8>) -> Self {
        AsciiString(v)
    }
}

impl fmt::Display for AsciiString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

impl fmt::Debug for AsciiString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AsciiString({:?})", self.to_string_lossy())
    }
}
