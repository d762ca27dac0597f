use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;

use soulseek_util::DiagnosticSink;

use crate::connection::{Connection, ConnectionState};
use crate::error::ConnError;

/// A fully-framed inbound message: the message code plus whatever remains
/// of the payload, with the length prefix already consumed (§4.1).
#[derive(Debug, Clone)]
pub struct Frame {
    pub code: u32,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderRole {
    /// A read error just ends the reader task; the caller is expected to
    /// reconnect and spawn a fresh one rather than tear down the whole
    /// client (§4.3).
    Server,
    /// A read error disconnects the underlying connection outright.
    Peer,
}

/// Wraps a [`Connection`] with a background task that continuously reads
/// length-prefixed frames off the socket and republishes them on a channel
/// (§4.3).
pub struct MessageConnection {
    conn: Connection,
    inbound: mpsc::Receiver<Frame>,
}

impl MessageConnection {
    /// Takes the connection's read half and spawns the reader task. Returns
    /// `None` if the read half was already taken by an earlier call.
    pub async fn spawn(conn: Connection, role: ReaderRole, diagnostics: DiagnosticSink) -> Option<Self> {
        let read_half = conn.take_read_half().await?;
        let (tx, rx) = mpsc::channel(256);
        spawn_reader(conn.clone(), read_half, role, tx, diagnostics);
        Some(Self { conn, inbound: rx })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbound.recv().await
    }

    pub async fn send(&self, frame_bytes: &[u8]) -> Result<(), ConnError> {
        self.conn.write(frame_bytes).await
    }

    pub async fn send_many(&self, frames: &[Vec<u8>]) -> Result<(), ConnError> {
        self.conn.write_many(frames).await
    }
}

fn spawn_reader(
    conn: Connection,
    mut read_half: OwnedReadHalf,
    role: ReaderRole,
    tx: mpsc::Sender<Frame>,
    diagnostics: DiagnosticSink,
) {
    tokio::spawn(async move {
        loop {
            match read_frame(&mut read_half).await {
                Ok(Some(frame)) => {
                    conn.note_activity();
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    diagnostics.debug("message_connection", format!("{} read EOF", conn.label()));
                    conn.disconnect("peer closed connection").await;
                    break;
                }
                Err(e) => {
                    diagnostics.debug(
                        "message_connection",
                        format!("{} read error: {e}", conn.label()),
                    );
                    if role == ReaderRole::Peer {
                        conn.disconnect("read error").await;
                    }
                    break;
                }
            }
            if conn.state() == ConnectionState::Disconnected {
                break;
            }
        }
    });
}

/// Reads one `{length: u32}{code: u32}{payload}` frame per §4.1. `length`
/// covers the trailing code and payload but not itself.
async fn read_frame(read_half: &mut OwnedReadHalf) -> Result<Option<Frame>, ConnError> {
    let mut len_buf = [0u8; 4];
    match read_half.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ConnError::Read(e)),
    }
    let length = u32::from_le_bytes(len_buf) as usize;
    if length < 4 {
        return Err(ConnError::Read(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame length shorter than a message code",
        )));
    }
    let mut body = vec![0u8; length];
    read_half
        .read_exact(&mut body)
        .await
        .map_err(ConnError::Read)?;
    let code = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    let payload = body.split_off(4);
    Ok(Some(Frame { code, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionOptions;
    use soulseek_util::{DiagnosticLevel, DiagnosticSink};
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let diagnostics = DiagnosticSink::new(DiagnosticLevel::Debug);
        let client_fut = Connection::connect(addr, ConnectionOptions::default(), diagnostics.clone(), "client");
        let (server_stream, _) = listener.accept().await.unwrap();
        let client = client_fut.await.unwrap();
        let server = Connection::from_accepted(server_stream, ConnectionOptions::default(), diagnostics, "server");
        (client, server)
    }

    #[tokio::test]
    async fn round_trips_one_frame() {
        let (client, server) = pair().await;
        let diagnostics = DiagnosticSink::new(DiagnosticLevel::Debug);
        let mut client_mc = MessageConnection::spawn(client, ReaderRole::Peer, diagnostics.clone())
            .await
            .unwrap();
        let mut server_mc = MessageConnection::spawn(server, ReaderRole::Peer, diagnostics)
            .await
            .unwrap();

        let code = 7u32;
        let body = b"hi".to_vec();
        let length = (4 + body.len()) as u32;
        let mut frame = Vec::new();
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&code.to_le_bytes());
        frame.extend_from_slice(&body);

        client_mc.send(&frame).await.unwrap();
        let received = server_mc.recv().await.unwrap();
        assert_eq!(received.code, 7);
        assert_eq!(received.payload, b"hi");
    }

    #[tokio::test]
    async fn peer_role_disconnects_on_close() {
        let (client, server) = pair().await;
        let diagnostics = DiagnosticSink::new(DiagnosticLevel::Debug);
        let server_conn = server.clone();
        let mut server_mc = MessageConnection::spawn(server, ReaderRole::Peer, diagnostics)
            .await
            .unwrap();
        drop(client);
        assert!(server_mc.recv().await.is_none());
        assert_eq!(server_conn.state(), crate::connection::ConnectionState::Disconnected);
    }
}
