//! TCP client/server end-to-end tests over loopback

use std::time::Duration;

use oscine_core::{Message, Packet, Value};
use oscine_transport::{
    ConnectionEvent, ConnectionState, Framing, TcpClient, TcpServer, TransportError,
};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn expect<T>(future: impl std::future::Future<Output = Option<T>>) -> T {
    timeout(WAIT, future)
        .await
        .expect("timed out waiting for event")
        .expect("stream ended unexpectedly")
}

#[tokio::test]
async fn test_client_server_exchange() {
    let (server, mut server_packets, mut server_events) =
        TcpServer::bind(0, Framing::LengthPrefixed).await.unwrap();
    let port = server.local_addr().port();

    let (client, mut client_packets, mut client_states) =
        TcpClient::new("127.0.0.1", port, Framing::LengthPrefixed);
    client.connect();

    assert_eq!(expect(client_states.recv()).await, ConnectionState::Connecting);
    assert_eq!(expect(client_states.recv()).await, ConnectionState::Connected);

    let id = match expect(server_events.recv()).await {
        ConnectionEvent::Connected(id) => id,
        other => panic!("expected connected event, got {other:?}"),
    };

    // client -> server
    let ping: Packet = Message::new("/ping").arg(1i32).into();
    client.send(&ping).await.unwrap();
    let (from, received) = expect(server_packets.recv()).await;
    assert_eq!(from, id);
    assert_eq!(received, ping);

    // server -> client
    let pong: Packet = Message::new("/pong").arg("ok").into();
    server.send(&pong, id).await.unwrap();
    assert_eq!(expect(client_packets.recv()).await, pong);

    server.stop().await;
}

#[tokio::test]
async fn test_slip_framing_exchange() {
    let (server, mut server_packets, _events) = TcpServer::bind(0, Framing::Slip).await.unwrap();
    let port = server.local_addr().port();

    let (client, _packets, mut states) = TcpClient::new("127.0.0.1", port, Framing::Slip);
    client.connect();
    assert_eq!(expect(states.recv()).await, ConnectionState::Connecting);
    assert_eq!(expect(states.recv()).await, ConnectionState::Connected);

    // a blob full of END/ESC bytes exercises the escaping
    let msg: Packet = Message::new("/slip")
        .arg(vec![0xC0u8, 0xDB, 0xC0, 0x01, 0xDC, 0xDD])
        .into();
    client.send(&msg).await.unwrap();

    let (_, received) = expect(server_packets.recv()).await;
    assert_eq!(received, msg);

    server.stop().await;
}

#[tokio::test]
async fn test_send_requires_connected() {
    let (client, _packets, _states) = TcpClient::new("127.0.0.1", 9, Framing::LengthPrefixed);
    let err = client.send(&Message::new("/x").into()).await.unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));
}

#[tokio::test]
async fn test_connect_failure_reaches_failed_state() {
    // bind then drop a listener so the port is closed
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (client, _packets, mut states) = TcpClient::new("127.0.0.1", port, Framing::LengthPrefixed);
    client.connect();

    assert_eq!(expect(states.recv()).await, ConnectionState::Connecting);
    match expect(states.recv()).await {
        ConnectionState::Failed(_) => {}
        other => panic!("expected failed state, got {other:?}"),
    }
    assert_eq!(timeout(WAIT, states.recv()).await.unwrap(), None);
}

#[tokio::test]
async fn test_bind_conflict_is_surfaced() {
    let (server, _packets, _events) = TcpServer::bind(0, Framing::LengthPrefixed).await.unwrap();
    let port = server.local_addr().port();

    let err = TcpServer::bind(port, Framing::LengthPrefixed)
        .await
        .err()
        .expect("second bind must fail");
    assert!(matches!(err, TransportError::BindFailed(_)));

    server.stop().await;
}

#[tokio::test]
async fn test_server_disconnect_fires_event_once() {
    let (server, _packets, mut events) = TcpServer::bind(0, Framing::LengthPrefixed).await.unwrap();
    let port = server.local_addr().port();

    let (client, mut client_packets, mut states) =
        TcpClient::new("127.0.0.1", port, Framing::LengthPrefixed);
    client.connect();
    assert_eq!(expect(states.recv()).await, ConnectionState::Connecting);
    assert_eq!(expect(states.recv()).await, ConnectionState::Connected);

    let id = match expect(events.recv()).await {
        ConnectionEvent::Connected(id) => id,
        other => panic!("expected connected, got {other:?}"),
    };

    server.disconnect(id).await;
    assert_eq!(
        expect(events.recv()).await,
        ConnectionEvent::Disconnected(id)
    );

    // the client observes the close: packet stream ends after Disconnected
    loop {
        match timeout(WAIT, states.recv()).await.unwrap() {
            Some(ConnectionState::Disconnected) => break,
            Some(_) => continue,
            None => panic!("state stream ended without Disconnected"),
        }
    }
    assert_eq!(timeout(WAIT, client_packets.recv()).await.unwrap(), None);

    // stopping afterwards must not produce a second disconnected event
    server.stop().await;
    assert_eq!(timeout(WAIT, events.recv()).await.unwrap(), None);
    assert_eq!(server.connection_count(), 0);
}

#[tokio::test]
async fn test_client_disconnect_detected_by_server() {
    let (server, _packets, mut events) = TcpServer::bind(0, Framing::LengthPrefixed).await.unwrap();
    let port = server.local_addr().port();

    let (client, _client_packets, mut states) =
        TcpClient::new("127.0.0.1", port, Framing::LengthPrefixed);
    client.connect();
    assert_eq!(expect(states.recv()).await, ConnectionState::Connecting);
    assert_eq!(expect(states.recv()).await, ConnectionState::Connected);

    let id = match expect(events.recv()).await {
        ConnectionEvent::Connected(id) => id,
        other => panic!("expected connected, got {other:?}"),
    };

    client.disconnect();
    assert_eq!(
        expect(events.recv()).await,
        ConnectionEvent::Disconnected(id)
    );

    // the stale id is rejected
    let err = server
        .send(&Message::new("/x").into(), id)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));

    server.stop().await;
}

#[tokio::test]
async fn test_broadcast_reaches_every_client() {
    let (server, _packets, mut events) = TcpServer::bind(0, Framing::LengthPrefixed).await.unwrap();
    let port = server.local_addr().port();

    let mut clients = Vec::new();
    for _ in 0..3 {
        let (client, packets, mut states) =
            TcpClient::new("127.0.0.1", port, Framing::LengthPrefixed);
        client.connect();
        assert_eq!(expect(states.recv()).await, ConnectionState::Connecting);
        assert_eq!(expect(states.recv()).await, ConnectionState::Connected);
        expect(events.recv()).await;
        clients.push((client, packets));
    }

    let cue: Packet = Message::new("/cue/5/fire").into();
    let delivered = server.broadcast(&cue).await.unwrap();
    assert_eq!(delivered, 3);

    for (_, packets) in &mut clients {
        assert_eq!(expect(packets.recv()).await, cue);
    }

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_frame_dropped_connection_survives() {
    let (server, mut packets, mut events) =
        TcpServer::bind(0, Framing::LengthPrefixed).await.unwrap();
    let port = server.local_addr().port();

    let mut raw = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    expect(events.recv()).await;

    // a frame whose payload is not OSC, then a valid message
    let garbage = oscine_transport::frame(Framing::LengthPrefixed, b"not osc at all");
    let valid_packet: Packet = Message::new("/ok").arg(Value::Int32(7)).into();
    let valid = oscine_transport::frame(
        Framing::LengthPrefixed,
        &oscine_core::encode(&valid_packet).unwrap(),
    );
    raw.write_all(&garbage).await.unwrap();
    raw.write_all(&valid).await.unwrap();

    // only the valid packet surfaces, on the same still-open connection
    let (_, received) = expect(packets.recv()).await;
    assert_eq!(received, valid_packet);
    assert_eq!(server.connection_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (server, mut packets, _events) = TcpServer::bind(0, Framing::LengthPrefixed).await.unwrap();
    server.stop().await;
    server.stop().await;
    assert_eq!(timeout(WAIT, packets.recv()).await.unwrap(), None);
}
