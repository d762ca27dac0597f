use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock as SyncRwLock;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::time::{interval, timeout};

use soulseek_util::DiagnosticSink;

use crate::error::ConnError;

/// §3 `Connection state`: transitions are monotonic per instance; once
/// `Disconnected`, the holder must discard it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Pending,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

#[derive(Debug, Clone, Copy)]
pub struct StateChanged {
    pub previous: ConnectionState,
    pub current: ConnectionState,
}

/// §6 configuration: `*ConnectionOptions` per-role connect/inactivity
/// overrides.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    /// `None` disables the timer — used for the server connection, which
    /// is expected to idle (§4.3), and for upload transfer connections
    /// before the remote starts sending (§4.8, §5).
    pub inactivity_timeout: Option<Duration>,
    pub max_write_size: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            inactivity_timeout: Some(Duration::from_secs(30)),
            max_write_size: 16 * 1024 * 1024,
        }
    }
}

const WATCHDOG_TICK: Duration = Duration::from_millis(250);

struct Shared {
    state: SyncRwLock<ConnectionState>,
    write_half: AsyncMutex<Option<OwnedWriteHalf>>,
    read_half: AsyncMutex<Option<OwnedReadHalf>>,
    events: broadcast::Sender<StateChanged>,
    last_activity: SyncRwLock<Instant>,
    options: ConnectionOptions,
    diagnostics: DiagnosticSink,
    label: String,
}

/// One TCP endpoint with connect-timeout, inactivity-timeout, watchdog,
/// buffered read/write, and a monotonic state machine (§4.2).
#[derive(Clone)]
pub struct Connection(Arc<Shared>);

impl Connection {
    pub async fn connect(
        addr: SocketAddr,
        options: ConnectionOptions,
        diagnostics: DiagnosticSink,
        label: impl Into<String>,
    ) -> Result<Self, ConnError> {
        let connect_timeout = options.connect_timeout;
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnError::Connect {
                addr: addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            })?
            .map_err(|source| ConnError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self::from_stream(stream, options, diagnostics, label))
    }

    /// Wrap an already-accepted socket — the listener's handoff (§4.9).
    pub fn from_accepted(
        stream: TcpStream,
        options: ConnectionOptions,
        diagnostics: DiagnosticSink,
        label: impl Into<String>,
    ) -> Self {
        Self::from_stream(stream, options, diagnostics, label)
    }

    fn from_stream(
        stream: TcpStream,
        options: ConnectionOptions,
        diagnostics: DiagnosticSink,
        label: impl Into<String>,
    ) -> Self {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let (events, _) = broadcast::channel(32);
        let shared = Arc::new(Shared {
            state: SyncRwLock::new(ConnectionState::Connecting),
            write_half: AsyncMutex::new(Some(write_half)),
            read_half: AsyncMutex::new(Some(read_half)),
            events,
            last_activity: SyncRwLock::new(Instant::now()),
            options,
            diagnostics,
            label: label.into(),
        });
        let conn = Connection(shared);
        conn.transition(ConnectionState::Connected);
        conn.spawn_watchdog();
        if let Some(inactivity_timeout) = conn.0.options.inactivity_timeout {
            conn.spawn_inactivity_timer(inactivity_timeout);
        }
        conn
    }

    pub fn state(&self) -> ConnectionState {
        *self.0.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.0.events.subscribe()
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// Resets the inactivity timer; called on every successful read (§4.2).
    pub fn note_activity(&self) {
        *self.0.last_activity.write() = Instant::now();
    }

    /// Takes exclusive ownership of the read half for a continuous reader
    /// task (§4.3). Returns `None` if already taken or the connection has
    /// disconnected.
    pub async fn take_read_half(&self) -> Option<OwnedReadHalf> {
        self.0.read_half.lock().await.take()
    }

    pub async fn write(&self, bytes: &[u8]) -> Result<(), ConnError> {
        if bytes.len() > self.0.options.max_write_size {
            return Err(ConnError::WriteTooLarge {
                size: bytes.len(),
                limit: self.0.options.max_write_size,
            });
        }
        if !self.is_connected() {
            return Err(ConnError::NotConnected);
        }
        let mut guard = self.0.write_half.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(ConnError::Closed("write half already closed"));
        };
        if let Err(e) = writer.write_all(bytes).await {
            drop(guard);
            self.disconnect("write error").await;
            return Err(ConnError::Write(e));
        }
        Ok(())
    }

    /// Concatenates a batch and writes it in a single call, so coalesced
    /// items never interleave with another writer on this connection
    /// (§4.3, §5).
    pub async fn write_many(&self, messages: &[Vec<u8>]) -> Result<(), ConnError> {
        let total: usize = messages.iter().map(|m| m.len()).sum();
        let mut buf = Vec::with_capacity(total);
        for m in messages {
            buf.extend_from_slice(m);
        }
        self.write(&buf).await
    }

    pub async fn disconnect(&self, reason: &str) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        self.transition(ConnectionState::Disconnecting);
        {
            let mut guard = self.0.write_half.lock().await;
            if let Some(writer) = guard.as_mut() {
                let _ = writer.shutdown().await;
            }
            *guard = None;
        }
        *self.0.read_half.lock().await = None;
        self.0
            .diagnostics
            .debug("connection", format!("{} disconnected: {}", self.0.label, reason));
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&self, new: ConnectionState) {
        let previous = {
            let mut state = self.0.state.write();
            if *state == ConnectionState::Disconnected {
                return;
            }
            let previous = *state;
            *state = new;
            previous
        };
        let _ = self.0.events.send(StateChanged { previous, current: new });
    }

    fn spawn_watchdog(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut tick = interval(WATCHDOG_TICK);
            loop {
                tick.tick().await;
                if this.state() == ConnectionState::Disconnected {
                    break;
                }
                let alive = {
                    let guard = this.0.write_half.lock().await;
                    matches!(guard.as_ref(), Some(w) if w.peer_addr().is_ok())
                };
                if !alive && this.state() == ConnectionState::Connected {
                    this.disconnect("watchdog: socket no longer connected").await;
                    break;
                }
            }
        });
    }

    fn spawn_inactivity_timer(&self, inactivity_timeout: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut tick = interval(WATCHDOG_TICK);
            loop {
                tick.tick().await;
                if this.state() == ConnectionState::Disconnected {
                    break;
                }
                let elapsed = (*this.0.last_activity.read()).elapsed();
                if elapsed >= inactivity_timeout {
                    this.disconnect("inactivity").await;
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soulseek_util::DiagnosticSink;
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let diagnostics = DiagnosticSink::new(soulseek_util::DiagnosticLevel::Debug);
        let client_fut = Connection::connect(addr, ConnectionOptions::default(), diagnostics.clone(), "client");
        let (server_stream, _) = listener.accept().await.unwrap();
        let client = client_fut.await.unwrap();
        let server = Connection::from_accepted(server_stream, ConnectionOptions::default(), diagnostics, "server");
        (client, server)
    }

    #[tokio::test]
    async fn connect_reaches_connected_state() {
        let (client, _server) = pair().await;
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn write_too_large_is_rejected() {
        let (client, _server) = pair().await;
        let big = vec![0u8; 32 * 1024 * 1024];
        let err = client.write(&big).await.unwrap_err();
        assert!(matches!(err, ConnError::WriteTooLarge { .. }));
    }

    #[tokio::test]
    async fn disconnect_is_terminal() {
        let (client, _server) = pair().await;
        client.disconnect("test").await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        client.disconnect("test again").await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
