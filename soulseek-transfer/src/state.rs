use crate::error::TransferError;

/// The non-terminal phases of §4.8's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    None,
    Requested,
    Queued,
    Initializing,
    InProgress,
}

/// The terminal dispositions; `Completed` per §4.8 is this flag OR-ed with
/// whichever of these the transfer ended in, modeled here as the disposition
/// itself being the terminal state rather than a separate flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDisposition {
    Succeeded,
    Errored,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Active(TransferPhase),
    Completed(TransferDisposition),
}

/// Drives `TransferState::advance`; `Errored` carries no payload here since
/// the reason is reported separately by the caller, not stored in the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    Requested,
    Queued,
    Allowed,
    ConnectionEstablished,
    Progress,
    Succeeded,
    Errored,
    TimedOut,
    Cancelled,
}

impl Default for TransferState {
    fn default() -> Self {
        TransferState::Active(TransferPhase::None)
    }
}

impl TransferState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed(_))
    }

    pub fn phase(&self) -> Option<TransferPhase> {
        match self {
            TransferState::Active(p) => Some(*p),
            TransferState::Completed(_) => None,
        }
    }

    /// Validates and applies one transition (§8: "no transition from
    /// `Completed|*` back to any non-terminal state").
    pub fn advance(&mut self, event: TransferEvent) -> Result<(), TransferError> {
        use TransferEvent::*;
        use TransferPhase::*;

        let TransferState::Active(phase) = *self else {
            return Err(TransferError::IllegalTransition);
        };

        let next = match (phase, event) {
            (None, Requested) => TransferState::Active(Requested),
            (Requested, Allowed) => TransferState::Active(Initializing),
            (Requested, Queued) => TransferState::Active(TransferPhase::Queued),
            // An unsolicited upload offer moves a queued download straight
            // to initializing — the remote, not us, decided to start.
            (TransferPhase::Queued, Allowed) => TransferState::Active(Initializing),
            (Initializing, ConnectionEstablished) => TransferState::Active(InProgress),
            (InProgress, Progress) => TransferState::Active(InProgress),
            (_, Succeeded) => TransferState::Completed(TransferDisposition::Succeeded),
            (_, Errored) => TransferState::Completed(TransferDisposition::Errored),
            (_, TimedOut) => TransferState::Completed(TransferDisposition::TimedOut),
            (_, Cancelled) => TransferState::Completed(TransferDisposition::Cancelled),
            _ => return Err(TransferError::IllegalTransition),
        };
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_happy_path_reaches_completed_succeeded() {
        let mut s = TransferState::new();
        s.advance(TransferEvent::Requested).unwrap();
        s.advance(TransferEvent::Allowed).unwrap();
        s.advance(TransferEvent::ConnectionEstablished).unwrap();
        s.advance(TransferEvent::Progress).unwrap();
        s.advance(TransferEvent::Succeeded).unwrap();
        assert_eq!(s, TransferState::Completed(TransferDisposition::Succeeded));
    }

    #[test]
    fn queued_then_remote_initiated_upload() {
        let mut s = TransferState::new();
        s.advance(TransferEvent::Requested).unwrap();
        s.advance(TransferEvent::Queued).unwrap();
        s.advance(TransferEvent::Allowed).unwrap();
        assert_eq!(s, TransferState::Active(TransferPhase::Initializing));
    }

    #[test]
    fn completed_state_rejects_any_further_event() {
        let mut s = TransferState::Completed(TransferDisposition::Succeeded);
        assert!(matches!(s.advance(TransferEvent::Progress), Err(TransferError::IllegalTransition)));
    }

    #[test]
    fn cancel_from_any_active_phase_is_legal() {
        let mut s = TransferState::Active(TransferPhase::InProgress);
        s.advance(TransferEvent::Cancelled).unwrap();
        assert_eq!(s, TransferState::Completed(TransferDisposition::Cancelled));
    }
}
