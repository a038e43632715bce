//! WebSocket consumer against a live relay.

use glam::Quat;
use gyro_relay::{
    ConnectionState, ConsumerConfig, OrientationConsumer, OrientationSample, RelayConfig, RelayServer,
    TransportConfig,
};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};
use tungstenite::{Message, WebSocket};

fn relay_on(port: u16) -> RelayServer {
    RelayServer::bind(RelayConfig {
        bind: "127.0.0.1".into(),
        port,
        ..Default::default()
    })
    .unwrap()
}

fn consumer_for(port: u16) -> OrientationConsumer {
    let config = ConsumerConfig {
        transport: TransportConfig::websocket("127.0.0.1", port, "/ws"),
        retry_delay_ms: 50,
        verbose: true,
        ..Default::default()
    };
    OrientationConsumer::from_config(&config).unwrap()
}

fn publisher(addr: SocketAddr) -> WebSocket<TcpStream> {
    let stream = TcpStream::connect(addr).unwrap();
    let url = format!("ws://{}/ws", addr);
    tungstenite::client(url.as_str(), stream).unwrap().0
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_consumer_receives_relayed_samples() {
    let server = relay_on(0);
    let port = server.local_addr().port();

    let mut consumer = consumer_for(port);
    consumer.start().unwrap();
    wait_until("consumer to join", || server.broadcaster().peer_count() == 1);
    wait_until("connected state", || {
        consumer.connection_state() == ConnectionState::Connected
    });

    let mut phone = publisher(server.local_addr());
    wait_until("publisher to join", || server.broadcaster().peer_count() == 2);

    phone.send(Message::Text(r#"{"type":"ping"}"#.into())).unwrap();
    phone
        .send(Message::Text(r#"{"type":"orientation","q":[1,2,3]}"#.into()))
        .unwrap();
    phone
        .send(Message::Text(r#"{"type":"orientation","q":[0,0,0,1],"t":1000}"#.into()))
        .unwrap();

    wait_until("first sample", || consumer.latest_sample().is_some());
    let latest = consumer.latest_sample().unwrap();
    assert_eq!(latest.sample.to_xyzw(), [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(latest.sample.timestamp_millis, 1000);
    assert_eq!(latest.sequence, 1);
    assert_eq!(consumer.connection_state(), ConnectionState::ReceivingData);

    let target = Quat::from_rotation_y(1.0);
    let msg = OrientationSample::from_xyzw(target.to_array(), 2000).unwrap();
    phone.send(Message::Text(msg.to_message_json())).unwrap();
    wait_until("second sample", || {
        consumer.latest_sample().map(|s| s.sample.timestamp_millis) == Some(2000)
    });

    for _ in 0..600 {
        consumer.tick(1.0 / 60.0);
    }
    assert!(consumer.rotation().dot(target).abs() > 0.999_999);

    consumer.stop();
    assert_eq!(consumer.connection_state(), ConnectionState::Disconnected);
    wait_until("consumer to leave", || server.broadcaster().peer_count() == 1);
    server.shutdown();
}

#[test]
fn test_consumer_connects_once_relay_appears() {
    // Reserve a free port, then release it so nothing is listening yet.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut consumer = consumer_for(port);
    consumer.start().unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert!(consumer.is_running());
    assert_ne!(consumer.connection_state(), ConnectionState::Connected);

    let server = relay_on(port);
    wait_until("consumer to connect", || server.broadcaster().peer_count() == 1);

    let mut phone = publisher(server.local_addr());
    wait_until("publisher to join", || server.broadcaster().peer_count() == 2);
    phone
        .send(Message::Text(r#"{"type":"orientation","q":[0,0,1,0],"t":7}"#.into()))
        .unwrap();
    wait_until("sample", || consumer.latest_sample().is_some());

    // Drop the relay; the consumer notices and keeps retrying.
    drop(phone);
    server.shutdown();
    wait_until("disconnect", || {
        consumer.connection_state() != ConnectionState::ReceivingData
    });
    assert!(consumer.is_running());

    let server = relay_on(port);
    wait_until("reconnect", || server.broadcaster().peer_count() == 1);
    let mut phone = publisher(server.local_addr());
    wait_until("publisher to rejoin", || server.broadcaster().peer_count() == 2);
    phone
        .send(Message::Text(r#"{"type":"orientation","q":[0,1,0,0],"t":8}"#.into()))
        .unwrap();
    wait_until("sample after reconnect", || {
        consumer.latest_sample().map(|s| s.sample.timestamp_millis) == Some(8)
    });

    consumer.stop();
    server.shutdown();
}

#[test]
fn test_stop_abandons_stalled_handshake() {
    // Connections queue in the backlog; nobody ever answers the upgrade.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut consumer = consumer_for(port);
    consumer.start().unwrap();
    wait_until("connecting", || {
        consumer.connection_state() == ConnectionState::Connecting
    });
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    consumer.stop();
    let took = started.elapsed();
    assert!(took < Duration::from_millis(500), "stop took {:?}", took);
    assert_eq!(consumer.connection_state(), ConnectionState::Disconnected);
    drop(listener);
}
