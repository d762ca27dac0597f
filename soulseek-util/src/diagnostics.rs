use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Ordering matches the teacher's `log` level convention: the higher the
/// variant, the more severe / less chatty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warning,
}

/// A single diagnostic surfaced to the host program. Distinct from `log`
/// records: this is a typed event stream a host can subscribe to, not an
/// operator-facing trace line.
#[derive(Debug, Clone)]
pub struct DiagnosticEvent {
    pub level: DiagnosticLevel,
    pub source: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl DiagnosticEvent {
    pub fn new(level: DiagnosticLevel, source: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            source,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Fan-out sink for diagnostic events, filtered by `minimumDiagnosticLevel`
/// (§6). Cheaply `Clone`-able; every component holds one.
#[derive(Clone)]
pub struct DiagnosticSink {
    tx: Arc<broadcast::Sender<DiagnosticEvent>>,
    minimum: DiagnosticLevel,
}

impl DiagnosticSink {
    pub fn new(minimum: DiagnosticLevel) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            tx: Arc::new(tx),
            minimum,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, level: DiagnosticLevel, source: &'static str, message: impl Into<String>) {
        if level < self.minimum {
            return;
        }
        let event = DiagnosticEvent::new(level, source, message);
        match level {
            DiagnosticLevel::Debug => log::debug!(target: "soulseek", "[{}] {}", source, event.message),
            DiagnosticLevel::Info => log::info!(target: "soulseek", "[{}] {}", source, event.message),
            DiagnosticLevel::Warning => log::warn!(target: "soulseek", "[{}] {}", source, event.message),
        }
        // No receivers is the common case when a host hasn't subscribed; a
        // dropped-event error there is not a problem worth surfacing.
        let _ = self.tx.send(event);
    }

    pub fn debug(&self, source: &'static str, message: impl Into<String>) {
        self.emit(DiagnosticLevel::Debug, source, message)
    }

    pub fn info(&self, source: &'static str, message: impl Into<String>) {
        self.emit(DiagnosticLevel::Info, source, message)
    }

    pub fn warning(&self, source: &'static str, message: impl Into<String>) {
        self.emit(DiagnosticLevel::Warning, source, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filters_below_minimum() {
        let sink = DiagnosticSink::new(DiagnosticLevel::Info);
        let mut rx = sink.subscribe();
        sink.debug("test", "should be filtered");
        sink.info("test", "should pass");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.message, "should pass");
    }
}
