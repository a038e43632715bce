use crate::cancel::CancelToken;
use crate::error::GyroError;
use crate::message;
use crate::transport::{diagnostic_level, TransportAdapter};
use crate::types::OrientationSample;
use crate::Result;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tungstenite::handshake::HandshakeError;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::{Message, WebSocket};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Upper bound on waiting for the server's close reply.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Push transport: one outbound WebSocket connection to the relay.
pub struct WebSocketAdapter {
    host: String,
    port: u16,
    path: String,
    url: String,
    verbose: bool,
    socket: Option<WebSocket<TcpStream>>,
}

impl WebSocketAdapter {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        let host = host.into();
        let path = path.into();
        let url = format!("ws://{}:{}{}", host, port, path);
        Self {
            host,
            port,
            path,
            url,
            verbose: false,
            socket: None,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn handle_message(&self, msg: Message) -> Result<Option<OrientationSample>> {
        let decoded = match msg {
            Message::Text(text) => message::decode_text(&text),
            Message::Binary(bytes) => message::decode_bytes(&bytes),
            Message::Close(frame) => {
                log::info!("Relay closed the connection ({:?})", frame);
                return Err(GyroError::ConnectionClosed);
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Ok(None),
        };

        match decoded {
            Ok(sample) => Ok(Some(sample)),
            Err(e) => {
                log::log!(diagnostic_level(self.verbose), "Ignoring relay message: {}", e);
                Ok(None)
            }
        }
    }
}

impl TransportAdapter for WebSocketAdapter {
    fn name(&self) -> &str {
        "websocket"
    }

    fn connect(&mut self, cancel: &CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(GyroError::Cancelled);
        }
        self.close();

        let (host, port, url) = (self.host.clone(), self.port, self.url.clone());
        let socket = cancel.run("gyro-ws-connect", move || open_socket(&host, port, &url))??;

        log::info!("Connected to {}", self.url);
        self.socket = Some(socket);
        Ok(())
    }

    fn next_sample(&mut self, timeout: Duration) -> Result<Option<OrientationSample>> {
        let socket = self.socket.as_mut().ok_or(GyroError::ConnectionClosed)?;
        socket
            .get_ref()
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        let result = match socket.read() {
            Ok(msg) => self.handle_message(msg),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Err(GyroError::ConnectionClosed)
            }
            Err(e) => Err(GyroError::WebSocket(e)),
        };

        if result.is_err() {
            if let Some(mut socket) = self.socket.take() {
                // Sends the close reply queued when the relay closed first.
                let _ = socket.flush();
            }
        }
        result
    }

    fn close(&mut self) {
        let Some(mut socket) = self.socket.take() else {
            return;
        };

        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "Bye".into(),
        };
        if socket.close(Some(frame)).is_err() {
            return;
        }

        socket
            .get_ref()
            .set_read_timeout(Some(Duration::from_millis(50)))
            .ok();
        let deadline = Instant::now() + CLOSE_TIMEOUT;
        while Instant::now() < deadline {
            match socket.read() {
                Ok(_) => continue,
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    continue
                }
                Err(_) => break,
            }
        }
        log::debug!("Closed connection to {}", self.url);
    }
}

/// Resolve, connect and run the client handshake. Blocking.
fn open_socket(host: &str, port: u16, url: &str) -> Result<WebSocket<TcpStream>> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| GyroError::InvalidUrl(format!("{}: {}", url, e)))?;

    let mut last_err = None;
    let mut stream = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => last_err = Some(e),
        }
    }
    let stream = match (stream, last_err) {
        (Some(stream), _) => stream,
        (None, Some(e)) => return Err(GyroError::Io(e)),
        (None, None) => return Err(GyroError::InvalidUrl(format!("{}: no addresses", url))),
    };

    stream.set_nodelay(true).ok();
    stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;
    stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;

    let (socket, _response) = tungstenite::client(url, stream).map_err(|e| match e {
        HandshakeError::Failure(err) => GyroError::WebSocket(err),
        HandshakeError::Interrupted(_) => GyroError::Io(io::Error::from(io::ErrorKind::TimedOut)),
    })?;
    Ok(socket)
}

impl Drop for WebSocketAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_format() {
        let adapter = WebSocketAdapter::new("192.168.0.18", 8080, "/ws");
        assert_eq!(adapter.url(), "ws://192.168.0.18:8080/ws");
        assert!(!adapter.is_connected());
    }

    #[test]
    fn test_next_sample_without_connection_fails() {
        let mut adapter = WebSocketAdapter::new("127.0.0.1", 1, "/ws");
        assert!(matches!(
            adapter.next_sample(Duration::from_millis(1)),
            Err(GyroError::ConnectionClosed)
        ));
        adapter.close();
    }

    #[test]
    fn test_messages_that_are_not_samples_are_ignored() {
        let adapter = WebSocketAdapter::new("127.0.0.1", 1, "/ws");
        let ping = Message::Text(r#"{"type":"ping"}"#.into());
        assert!(adapter.handle_message(ping).unwrap().is_none());

        let short = Message::Text(r#"{"type":"orientation","q":[1,2,3]}"#.into());
        assert!(adapter.handle_message(short).unwrap().is_none());

        let good = Message::Text(r#"{"type":"orientation","q":[0,0,0,1],"t":1000}"#.into());
        let sample = adapter.handle_message(good).unwrap().unwrap();
        assert_eq!(sample.to_xyzw(), [0.0, 0.0, 0.0, 1.0]);

        assert!(matches!(
            adapter.handle_message(Message::Close(None)),
            Err(GyroError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_close_from_relay_completes_handshake() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            ws.close(None).unwrap();
            loop {
                match ws.read() {
                    Ok(Message::Close(_)) | Err(tungstenite::Error::ConnectionClosed) => return true,
                    Ok(_) => continue,
                    Err(_) => return false,
                }
            }
        });

        let mut adapter = WebSocketAdapter::new("127.0.0.1", port, "/ws");
        adapter.connect(&CancelToken::new()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            assert!(Instant::now() < deadline);
            match adapter.next_sample(Duration::from_millis(50)) {
                Err(GyroError::ConnectionClosed) => break,
                Err(e) => panic!("unexpected error {}", e),
                Ok(_) => {}
            }
        }
        assert!(!adapter.is_connected());
        assert!(server.join().unwrap(), "relay never saw the close reply");
    }

    #[test]
    fn test_cancel_abandons_stalled_handshake() {
        // Accepted by the kernel backlog but never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let mut adapter = WebSocketAdapter::new("127.0.0.1", port, "/ws");
        let start = Instant::now();
        assert!(matches!(adapter.connect(&cancel), Err(GyroError::Cancelled)));
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert!(!adapter.is_connected());
        drop(listener);
    }
}
