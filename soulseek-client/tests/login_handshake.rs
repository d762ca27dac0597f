//! End-to-end coverage of the connect/login handshake (§8 scenario 1)
//! against an in-process stub TCP server — no real Soulseek server
//! involved.

use std::net::Ipv4Addr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use soulseek_client::{ClientConfig, ClientError, ClientState, Resolvers, SoulseekClient};
use soulseek_proto::codec::MessageBuilder;
use soulseek_proto::ServerCode;

async fn read_one_frame(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();
    body
}

/// Drains whatever the client writes next so its sends don't fail, until
/// the socket closes (the client disconnecting, or the test ending).
async fn drain_until_closed(mut stream: tokio::net::TcpStream) {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

fn config_without_listener(server_address: std::net::SocketAddr) -> ClientConfig {
    ClientConfig {
        server_address,
        // Keeps the test from also exercising the inbound listener bind.
        listen_port: None,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn login_succeeds_and_reaches_logged_in_state() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _login_request = read_one_frame(&mut stream).await;

        let reply = MessageBuilder::with_code_u32(ServerCode::Login as u32)
            .bool(true)
            .string("Welcome")
            .ip(Ipv4Addr::new(127, 0, 0, 1))
            .build();
        stream.write_all(&reply).await.unwrap();
        drain_until_closed(stream).await;
    });

    let client = SoulseekClient::new(config_without_listener(addr), Resolvers::default());
    client.connect().await.unwrap();
    client.login("alice", "secret").await.unwrap();
    assert_eq!(client.state(), ClientState::LoggedIn);

    client.disconnect(Some("test finished")).await.unwrap();
    let _ = server.await;
}

#[tokio::test]
async fn login_rejected_does_not_advance_past_connected() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _login_request = read_one_frame(&mut stream).await;

        let reply = MessageBuilder::with_code_u32(ServerCode::Login as u32)
            .bool(false)
            .string("INVALIDUSERNAME")
            .build();
        stream.write_all(&reply).await.unwrap();
        drain_until_closed(stream).await;
    });

    let client = SoulseekClient::new(config_without_listener(addr), Resolvers::default());
    client.connect().await.unwrap();
    let err = client.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, ClientError::LoginRejected(_)));
    assert_eq!(client.state(), ClientState::Connected);

    client.disconnect(None).await.unwrap();
    let _ = server.await;
}

#[tokio::test]
async fn operations_after_disconnect_fail_cleanly() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _login_request = read_one_frame(&mut stream).await;

        let reply = MessageBuilder::with_code_u32(ServerCode::Login as u32)
            .bool(true)
            .string("Welcome")
            .ip(Ipv4Addr::new(127, 0, 0, 1))
            .build();
        stream.write_all(&reply).await.unwrap();
        drain_until_closed(stream).await;
    });

    let client = SoulseekClient::new(config_without_listener(addr), Resolvers::default());
    client.connect().await.unwrap();
    client.login("alice", "secret").await.unwrap();

    client.disconnect(Some("bye")).await.unwrap();
    assert_eq!(client.state(), ClientState::Disconnected);

    let err = client.search("some query", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Peer(_)));

    let _ = server.await;
}
