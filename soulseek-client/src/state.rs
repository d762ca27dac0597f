/// §4.10: "a bitset over {Disconnected, Connecting, Connected, LoggedIn}";
/// modeled here the same way as the transfer engine's state machine — a
/// plain enum with a transition-validating `advance`, since the legal graph
/// is small and closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    LoggedIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientStateEvent {
    Connect,
    Connected,
    LoggedIn,
    Disconnect,
}

impl Default for ClientState {
    fn default() -> Self {
        ClientState::Disconnected
    }
}

impl ClientState {
    /// Returns the resulting state, or `None` if the transition is illegal.
    /// `Disconnect` is legal from every state, including `Disconnected`
    /// itself (idempotent).
    pub fn advance(self, event: ClientStateEvent) -> Option<ClientState> {
        use ClientState::*;
        use ClientStateEvent::*;
        Some(match (self, event) {
            (Disconnected, Connect) => Connecting,
            (Connecting, Connected) => Connected,
            (Connected, LoggedIn) => LoggedIn,
            (_, Disconnect) => Disconnected,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_logged_in() {
        let mut s = ClientState::default();
        s = s.advance(ClientStateEvent::Connect).unwrap();
        s = s.advance(ClientStateEvent::Connected).unwrap();
        s = s.advance(ClientStateEvent::LoggedIn).unwrap();
        assert_eq!(s, ClientState::LoggedIn);
    }

    #[test]
    fn login_before_connected_is_illegal() {
        let s = ClientState::Connecting;
        assert_eq!(s.advance(ClientStateEvent::LoggedIn), None);
    }

    #[test]
    fn disconnect_is_legal_from_every_state() {
        for s in [ClientState::Disconnected, ClientState::Connecting, ClientState::Connected, ClientState::LoggedIn] {
            assert_eq!(s.advance(ClientStateEvent::Disconnect), Some(ClientState::Disconnected));
        }
    }
}
