//! Relay fan-out over real WebSocket connections.

use gyro_relay::{RelayConfig, RelayServer};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use tungstenite::{Message, WebSocket};

fn start_relay(static_dir: Option<std::path::PathBuf>) -> RelayServer {
    RelayServer::bind(RelayConfig {
        bind: "127.0.0.1".into(),
        port: 0,
        static_dir,
        ..Default::default()
    })
    .unwrap()
}

fn connect(addr: SocketAddr, path: &str) -> tungstenite::Result<WebSocket<TcpStream>> {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let url = format!("ws://{}{}", addr, path);
    tungstenite::client(url.as_str(), stream)
        .map(|(ws, _)| ws)
        .map_err(|e| match e {
            tungstenite::HandshakeError::Failure(err) => err,
            tungstenite::HandshakeError::Interrupted(_) => tungstenite::Error::ConnectionClosed,
        })
}

fn wait_for_peers(server: &RelayServer, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while server.broadcaster().peer_count() != count {
        assert!(Instant::now() < deadline, "expected {} peers", count);
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn next_data(ws: &mut WebSocket<TcpStream>) -> Message {
    loop {
        let msg = ws.read().unwrap();
        if msg.is_text() || msg.is_binary() {
            return msg;
        }
    }
}

#[test]
fn test_message_reaches_every_peer() {
    let server = start_relay(None);
    let addr = server.local_addr();

    let mut a = connect(addr, "/ws").unwrap();
    let mut b = connect(addr, "/ws").unwrap();
    let mut c = connect(addr, "/ws").unwrap();
    wait_for_peers(&server, 3);

    let payload = r#"{"type":"orientation","q":[0.1,0.2,0.3,0.9],"t":1700000000000}"#;
    a.send(Message::Text(payload.into())).unwrap();

    for peer in [&mut b, &mut c, &mut a] {
        assert_eq!(next_data(peer), Message::Text(payload.into()));
    }

    let bytes = vec![1u8, 2, 3, 250];
    b.send(Message::Binary(bytes.clone())).unwrap();
    assert_eq!(next_data(&mut c), Message::Binary(bytes));

    server.shutdown();
}

#[test]
fn test_severed_peer_does_not_affect_others() {
    let server = start_relay(None);
    let addr = server.local_addr();

    let a = connect(addr, "/ws").unwrap();
    let mut b = connect(addr, "/ws").unwrap();
    let mut c = connect(addr, "/ws").unwrap();
    wait_for_peers(&server, 3);

    a.get_ref().shutdown(Shutdown::Both).unwrap();
    drop(a);

    for i in 0..5 {
        let payload = format!(r#"{{"type":"orientation","q":[0,0,0,1],"t":{}}}"#, i);
        b.send(Message::Text(payload.clone())).unwrap();
        assert_eq!(next_data(&mut c), Message::Text(payload.clone()));
        assert_eq!(next_data(&mut b), Message::Text(payload));
    }

    wait_for_peers(&server, 2);
    assert_eq!(server.broadcaster().stats().total_accepted, 3);
    server.shutdown();
}

#[test]
fn test_upgrade_on_other_path_is_rejected() {
    let server = start_relay(None);
    let err = connect(server.local_addr(), "/other").unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 404),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(server.broadcaster().peer_count(), 0);
}

#[test]
fn test_serves_controller_page() {
    let dir = std::env::temp_dir().join(format!("gyro-relay-static-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("controller.html"), "<html>Orientation: [0, 0, 0, 1]</html>").unwrap();

    let server = start_relay(Some(dir.clone()));
    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream
        .write_all(b"GET /controller.html HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("Content-Type: text/html"));
    assert!(response.ends_with("<html>Orientation: [0, 0, 0, 1]</html>"));

    server.shutdown();
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_shutdown_closes_peers() {
    let server = start_relay(None);
    let mut a = connect(server.local_addr(), "/ws").unwrap();
    wait_for_peers(&server, 1);

    server.shutdown();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match a.read() {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => assert!(Instant::now() < deadline),
        }
    }
}
