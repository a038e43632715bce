use crate::types::{ConnectionState, OrientationSample};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Maximum number of characters kept from the last polled response body.
pub const RESPONSE_PREVIEW_CHARS: usize = 200;

/// A sample tagged with its arrival order on this consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stamped {
    pub sample: OrientationSample,
    /// Starts at 1 and increases by one per published sample.
    pub sequence: u64,
}

/// Single-slot handoff between the network loop (sole writer) and the
/// render tick (reader).
///
/// Latest value wins: publishing replaces the previous sample, nothing is
/// queued. The mutex only ever guards a copy of a small `Copy` struct.
#[derive(Debug, Default)]
pub struct SharedOrientation {
    latest: Mutex<Option<Stamped>>,
    sequence: AtomicU64,
    state: AtomicU8,
    response_preview: Mutex<String>,
}

impl SharedOrientation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest sample. Returns its sequence number.
    pub fn publish(&self, sample: OrientationSample) -> u64 {
        let mut slot = self.latest.lock();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        *slot = Some(Stamped { sample, sequence });
        sequence
    }

    pub fn latest(&self) -> Option<Stamped> {
        *self.latest.lock()
    }

    /// The latest sample, only if it is newer than `seen`.
    pub fn newer_than(&self, seen: u64) -> Option<Stamped> {
        self.latest().filter(|s| s.sequence > seen)
    }

    /// Number of samples published so far.
    pub fn samples_received(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub fn set_state(&self, state: ConnectionState) {
        let previous = self.state.swap(state as u8, Ordering::AcqRel);
        if previous != state as u8 {
            log::debug!(
                "Connection state: {} -> {}",
                ConnectionState::from_u8(previous),
                state
            );
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_response_preview(&self, body: &str) {
        let preview: String = body.chars().take(RESPONSE_PREVIEW_CHARS).collect();
        let mut slot = self.response_preview.lock();
        *slot = if body.chars().count() > RESPONSE_PREVIEW_CHARS {
            format!("{}...", preview)
        } else {
            preview
        };
    }

    /// Start of the most recent polled response body, for status displays.
    pub fn response_preview(&self) -> String {
        self.response_preview.lock().clone()
    }
}
