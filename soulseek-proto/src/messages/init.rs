use crate::ascii::AsciiString;
use crate::codec::{MessageBuilder, MessageReader};
use crate::codes::InitCode;
use crate::error::ProtoError;

/// The first frame sent on a freshly dialed (not yet typed) connection,
/// naming the dialing user, the desired connection type tag, and a
/// correlation token (§4.5, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInit {
    pub username: AsciiString,
    pub connection_type: AsciiString,
    pub token: i32,
}

impl PeerInit {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u8(InitCode::PeerInit as u8)
            .raw_string(&self.username)
            .raw_string(&self.connection_type)
            .i32(self.token)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        let username = r.read_string()?;
        let connection_type = r.read_string()?;
        let token = r.read_i32()?;
        Ok(PeerInit {
            username,
            connection_type,
            token,
        })
    }
}

/// The first frame sent on a connection that was solicited indirectly via
/// the server's `ConnectToPeer` relay (§4.5, GLOSSARY "Pierce firewall").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PierceFirewall {
    pub token: i32,
}

impl PierceFirewall {
    pub fn encode(&self) -> Vec<u8> {
        MessageBuilder::with_code_u8(InitCode::PierceFirewall as u8)
            .i32(self.token)
            .build()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let mut r = MessageReader::new(payload);
        Ok(PierceFirewall {
            token: r.read_i32()?,
        })
    }
}

/// The decoded first frame of an inbound, not-yet-classified connection
/// (§4.9: the listener must distinguish these on the first frame).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitMessage {
    PeerInit(PeerInit),
    PierceFirewall(PierceFirewall),
}

impl InitMessage {
    pub fn decode(code: u8, payload: &[u8]) -> Result<Self, ProtoError> {
        match InitCode::from_u8(code) {
            Some(InitCode::PeerInit) => Ok(InitMessage::PeerInit(PeerInit::decode(payload)?)),
            Some(InitCode::PierceFirewall) => {
                Ok(InitMessage::PierceFirewall(PierceFirewall::decode(payload)?))
            }
            None => Err(ProtoError::UnknownCode {
                namespace: "initialization",
                code: code as u32,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_init_round_trips() {
        let msg = PeerInit {
            username: "alice".into(),
            connection_type: "P".into(),
            token: 7,
        };
        let wire = msg.encode();
        let len = u32::from_le_bytes(wire[0..4].try_into().unwrap()) as usize;
        let code = wire[4];
        let payload = &wire[5..4 + len];
        assert_eq!(code, InitCode::PeerInit as u8);
        let decoded = PeerInit::decode(payload).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn pierce_firewall_round_trips() {
        let msg = PierceFirewall { token: 99 };
        let wire = msg.encode();
        let payload = &wire[5..];
        assert_eq!(PierceFirewall::decode(payload).unwrap(), msg);
    }
}
