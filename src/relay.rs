use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tungstenite::Message;

/// Messages queued per peer before new ones are dropped for that peer.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

pub type PeerId = u64;

/// One registered connection, held by the thread that owns its socket.
///
/// Broadcasts for this peer are queued here and written out by that thread.
/// Dropping the handle makes the next broadcast remove the peer.
pub struct PeerHandle {
    id: PeerId,
    endpoint: SocketAddr,
    outbox: Receiver<Message>,
}

impl PeerHandle {
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Next queued outbound message, without blocking.
    pub fn try_recv(&self) -> Option<Message> {
        match self.outbox.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Message> {
        self.outbox.recv_timeout(timeout).ok()
    }
}

struct PeerEntry {
    endpoint: SocketAddr,
    outbox: Sender<Message>,
}

/// Counters for operational visibility.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub connected: usize,
    pub total_accepted: u64,
    pub messages_relayed: u64,
    pub dropped_peers: u64,
}

/// Byte-transparent fan-out of every inbound message to every open peer,
/// the sender included.
///
/// Payloads are never inspected, so the relay carries any future message
/// type unchanged. Delivery is best effort: a peer that has gone away is
/// removed without affecting delivery to the others.
pub struct Broadcaster {
    peers: Mutex<HashMap<PeerId, PeerEntry>>,
    next_id: AtomicU64,
    outbox_capacity: usize,
    total_accepted: AtomicU64,
    messages_relayed: AtomicU64,
    dropped_peers: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_outbox_capacity(DEFAULT_OUTBOX_CAPACITY)
    }

    pub fn with_outbox_capacity(outbox_capacity: usize) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            outbox_capacity: outbox_capacity.max(1),
            total_accepted: AtomicU64::new(0),
            messages_relayed: AtomicU64::new(0),
            dropped_peers: AtomicU64::new(0),
        }
    }

    /// Register a new peer in the broadcast set.
    pub fn accept_connection(&self, endpoint: SocketAddr) -> PeerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = crossbeam_channel::bounded(self.outbox_capacity);

        let count = {
            let mut peers = self.peers.lock();
            peers.insert(
                id,
                PeerEntry {
                    endpoint,
                    outbox: sender,
                },
            );
            peers.len()
        };
        self.total_accepted.fetch_add(1, Ordering::Relaxed);
        log::info!("Client connected: {} ({} total)", endpoint, count);

        PeerHandle {
            id,
            endpoint,
            outbox: receiver,
        }
    }

    /// Queue `payload` for every open peer. Returns how many peers got it.
    ///
    /// Peers whose handle is gone are removed. A peer whose outbox is full
    /// misses this message but stays registered.
    pub fn on_message(&self, from: PeerId, payload: Message) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();

        let mut peers = self.peers.lock();
        for (id, peer) in peers.iter() {
            match peer.outbox.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::trace!("Outbox full for {}, dropping message", peer.endpoint);
                }
                Err(TrySendError::Disconnected(_)) => gone.push(*id),
            }
        }
        for id in &gone {
            if let Some(peer) = peers.remove(id) {
                log::info!(
                    "Dropping client {} after failed send ({} total)",
                    peer.endpoint,
                    peers.len()
                );
            }
        }
        drop(peers);

        self.dropped_peers
            .fetch_add(gone.len() as u64, Ordering::Relaxed);
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
        log::trace!("Relayed message from peer {} to {} peer(s)", from, delivered);
        delivered
    }

    /// Remove a peer. Returns `false` if it was already gone.
    pub fn on_disconnect(&self, id: PeerId) -> bool {
        let mut peers = self.peers.lock();
        match peers.remove(&id) {
            Some(peer) => {
                log::info!("Client disconnected: {} ({} total)", peer.endpoint, peers.len());
                true
            }
            None => false,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn endpoints(&self) -> Vec<SocketAddr> {
        self.peers.lock().values().map(|p| p.endpoint).collect()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connected: self.peer_count(),
            total_accepted: self.total_accepted.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            dropped_peers: self.dropped_peers.load(Ordering::Relaxed),
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
