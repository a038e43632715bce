use glam::Quat;
use serde::{Deserialize, Serialize};

/// Squared-length floor below which a quaternion is treated as "no rotation data".
const MIN_LENGTH_SQUARED: f32 = 1e-12;

/// One orientation measurement from the phone.
///
/// Immutable once constructed. Components are kept as received; the
/// constructor only refuses input that cannot be normalised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    /// Rotation in the publisher's right-handed frame.
    pub quaternion: Quat,
    /// Producer-side capture time in milliseconds. Not synchronised with the consumer clock.
    pub timestamp_millis: i64,
}

impl OrientationSample {
    /// Build a sample from raw `[x, y, z, w]` components.
    ///
    /// Returns `None` for non-finite or zero-length input.
    pub fn from_xyzw(q: [f32; 4], timestamp_millis: i64) -> Option<Self> {
        if q.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let quaternion = Quat::from_array(q);
        let len_sq = quaternion.length_squared();
        if !len_sq.is_finite() || len_sq < MIN_LENGTH_SQUARED {
            return None;
        }
        Some(Self {
            quaternion,
            timestamp_millis,
        })
    }

    /// Unit-length rotation for this sample.
    pub fn rotation(&self) -> Quat {
        self.quaternion.normalize()
    }

    /// Components as `[x, y, z, w]`.
    pub fn to_xyzw(&self) -> [f32; 4] {
        self.quaternion.to_array()
    }
}

/// Consumer-side connection lifecycle.
///
/// Written only by the network loop; the render side reads it.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    /// Connected and at least one sample has arrived on this connection.
    ReceivingData = 3,
}

impl ConnectionState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::ReceivingData,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ReceivingData => "receiving",
        };
        f.write_str(name)
    }
}

/// What the text scraper does when only some quaternion fields parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialParse {
    /// Any unparsable field rejects the whole sample.
    #[default]
    Strict,
    /// Unparsable fields keep the previous sample's component.
    Lenient,
}
