use thiserror::Error;

/// Errors raised while building or parsing a framed message (§4.1).
#[derive(Debug, Error)]
pub enum ProtoError {
    /// A read would run past the end of the payload.
    #[error("read past end of message at position {position}: wanted {want} bytes, have {have}")]
    ReadError {
        position: usize,
        want: usize,
        have: usize,
    },

    /// The code read from the frame didn't match the code the handler
    /// expected for that message.
    #[error("message code mismatch: expected {expected}, got {got}")]
    CodeMismatchError { expected: u32, got: u32 },

    /// No decoder recognizes this numeric code in the given namespace.
    #[error("unknown {namespace} message code {code}")]
    UnknownCode { namespace: &'static str, code: u32 },

    #[error("zlib inflate failed: {0}")]
    Inflate(String),

    #[error("zlib deflate failed: {0}")]
    Deflate(String),
}
