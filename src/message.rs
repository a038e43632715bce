//! JSON wire format shared by the phone page, the relay and the consumers.
//!
//! ```json
//! {"type":"orientation","q":[x,y,z,w],"t":1700000000000}
//! ```

use crate::error::DecodeError;
use crate::types::OrientationSample;
use serde::{Deserialize, Serialize};

/// Value of the `type` field for orientation messages.
pub const ORIENTATION_TYPE: &str = "orientation";

#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    q: Option<Vec<f64>>,
    #[serde(default)]
    t: Option<serde_json::Number>,
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    q: [f32; 4],
    t: i64,
}

/// Decode a text frame into a sample.
///
/// Only `type == "orientation"` with exactly four numeric `q` entries is
/// accepted. A missing `t` decodes as 0; a fractional one is truncated.
pub fn decode_text(text: &str) -> Result<OrientationSample, DecodeError> {
    let msg: InboundMessage =
        serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;

    let kind = msg.kind.unwrap_or_default();
    if kind != ORIENTATION_TYPE {
        return Err(DecodeError::UnexpectedType(kind));
    }

    let q = msg.q.unwrap_or_default();
    if q.len() != 4 {
        return Err(DecodeError::ComponentCount(q.len()));
    }

    let xyzw = [q[0] as f32, q[1] as f32, q[2] as f32, q[3] as f32];
    let t = msg.t.map_or(0, |n| {
        n.as_i64()
            .unwrap_or_else(|| n.as_f64().map_or(0, |f| f as i64))
    });
    OrientationSample::from_xyzw(xyzw, t).ok_or(DecodeError::Degenerate)
}

/// Decode a raw frame payload, checking UTF-8 first.
pub fn decode_bytes(payload: &[u8]) -> Result<OrientationSample, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;
    decode_text(text)
}

/// Encode a sample as the wire message the phone page sends.
pub fn encode(sample: &OrientationSample) -> String {
    let msg = OutboundMessage {
        kind: ORIENTATION_TYPE,
        q: sample.to_xyzw(),
        t: sample.timestamp_millis,
    };
    // A struct of plain numbers and a static str always serializes.
    serde_json::to_string(&msg).unwrap_or_default()
}

impl OrientationSample {
    /// Render this sample as an orientation wire message.
    pub fn to_message_json(&self) -> String {
        encode(self)
    }
}
