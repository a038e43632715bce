//! Relay server: one listener for both the phone page (plain HTTP) and
//! WebSocket peers on the configured path.
//!
//! Each connection gets its own thread. A peer thread alternates between a
//! short blocking read and writing whatever the [`Broadcaster`] queued for
//! it, so no peer ever blocks delivery to another.

use crate::cancel::CancelToken;
use crate::config::RelayConfig;
use crate::error::GyroError;
use crate::relay::Broadcaster;
use crate::static_files;
use crate::Result;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::{Message, WebSocket};

/// Sleep between accept attempts when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Read slice of a peer thread; bounds outbound latency and shutdown time.
const PEER_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// A peer that cannot take a frame within this time is dropped.
const PEER_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
const HTTP_READ_TIMEOUT: Duration = Duration::from_secs(5);
const HTTP_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

struct ServerContext {
    config: RelayConfig,
    broadcaster: Arc<Broadcaster>,
    cancel: CancelToken,
}

/// A running relay. Dropping it shuts the listener and every peer down.
pub struct RelayServer {
    local_addr: SocketAddr,
    ctx: Arc<ServerContext>,
    accept_thread: Option<JoinHandle<()>>,
}

impl RelayServer {
    /// Bind the listener and start accepting in the background.
    pub fn bind(config: RelayConfig) -> Result<RelayServer> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        if let Some(dir) = &config.static_dir {
            log::info!("[HTTP] Serving static files from: {}", dir.display());
        }

        let ctx = Arc::new(ServerContext {
            config,
            broadcaster: Arc::new(Broadcaster::new()),
            cancel: CancelToken::new(),
        });

        let accept_ctx = ctx.clone();
        let accept_thread = std::thread::Builder::new()
            .name("gyro-relay-accept".into())
            .spawn(move || accept_loop(listener, accept_ctx))
            .map_err(|e| GyroError::Thread(format!("Failed to spawn accept thread: {}", e)))?;

        log::info!(
            "Relay listening on {} (WebSocket path {})",
            local_addr,
            ctx.config.ws_path
        );

        Ok(RelayServer {
            local_addr,
            ctx,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.ctx.broadcaster
    }

    /// Block until the server stops.
    pub fn wait(mut self) {
        if let Some(thread) = self.accept_thread.take() {
            let _ = thread.join();
        }
    }

    /// Stop accepting, close every peer and join all threads.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.ctx.cancel.cancel();
        if let Some(thread) = self.accept_thread.take() {
            if thread.join().is_err() {
                log::error!("Relay accept thread panicked");
            }
            log::info!("Relay on {} stopped", self.local_addr);
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, ctx: Arc<ServerContext>) {
    let mut connections: Vec<JoinHandle<()>> = Vec::new();

    while !ctx.cancel.is_cancelled() {
        match listener.accept() {
            Ok((stream, addr)) => {
                let conn_ctx = ctx.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("gyro-peer-{}", addr))
                    .spawn(move || handle_connection(stream, addr, &conn_ctx));
                match spawned {
                    Ok(handle) => connections.push(handle),
                    Err(e) => log::warn!("[TCP] Failed to spawn handler for {}: {}", addr, e),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if ctx.cancel.wait(ACCEPT_POLL_INTERVAL) {
                    break;
                }
            }
            Err(e) => {
                log::warn!("[TCP] accept error: {}", e);
                if ctx.cancel.wait(ACCEPT_POLL_INTERVAL) {
                    break;
                }
            }
        }
        connections.retain(|h| !h.is_finished());
    }

    for handle in connections {
        let _ = handle.join();
    }
}

/// Route a connection to the WebSocket or the static HTTP handler.
fn handle_connection(stream: TcpStream, addr: SocketAddr, ctx: &ServerContext) {
    // Accepted sockets inherit non-blocking mode on some platforms.
    if stream.set_nonblocking(false).is_err() {
        return;
    }
    stream.set_read_timeout(Some(HTTP_READ_TIMEOUT)).ok();
    stream.set_write_timeout(Some(HTTP_WRITE_TIMEOUT)).ok();
    stream.set_nodelay(true).ok();

    let mut peek_buf = [0u8; 4096];
    let n = match stream.peek(&mut peek_buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&peek_buf[..n]);

    if static_files::is_websocket_upgrade(&request) {
        handle_websocket(stream, addr, ctx);
    } else {
        static_files::serve(stream, &request, ctx.config.static_dir.as_deref());
    }
}

fn handle_websocket(stream: TcpStream, addr: SocketAddr, ctx: &ServerContext) {
    let ws_path = ctx.config.ws_path.as_str();
    let check_path = |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
        if req.uri().path() == ws_path {
            Ok(resp)
        } else {
            let mut not_found = ErrorResponse::new(Some("Not found".into()));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Err(not_found)
        }
    };

    let mut ws = match tungstenite::accept_hdr(stream, check_path) {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("[WS] handshake error from {}: {}", addr, e);
            return;
        }
    };

    if ws.get_ref().set_read_timeout(Some(PEER_POLL_INTERVAL)).is_err()
        || ws.get_ref().set_write_timeout(Some(PEER_WRITE_TIMEOUT)).is_err()
    {
        return;
    }

    let peer = ctx.broadcaster.accept_connection(addr);
    let result = pump_peer(&mut ws, &peer, ctx);
    ctx.broadcaster.on_disconnect(peer.id());

    if let Err(e) = result {
        log::debug!("[WS] {} ended: {}", addr, e);
    }
}

/// Read from the peer and flush its outbox until either side goes away.
fn pump_peer(
    ws: &mut WebSocket<TcpStream>,
    peer: &crate::relay::PeerHandle,
    ctx: &ServerContext,
) -> std::result::Result<(), tungstenite::Error> {
    loop {
        if ctx.cancel.is_cancelled() {
            let _ = ws.close(None);
            let _ = ws.flush();
            return Ok(());
        }

        match ws.read() {
            Ok(msg @ (Message::Text(_) | Message::Binary(_))) => {
                ctx.broadcaster.on_message(peer.id(), msg);
            }
            Ok(Message::Close(_)) => {
                // Sends the queued close reply.
                let _ = ws.flush();
                return Ok(());
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return Ok(())
            }
            Err(e) => return Err(e),
        }

        while let Some(msg) = peer.try_recv() {
            ws.send(msg)?;
        }
    }
}
