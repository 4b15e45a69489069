//! JSON payloads carried by each datagram.
//!
//! `Legacy` is a bare array of `{"x","y","z"}` objects and is what existing
//! receivers parse. `Tagged` wraps the same array with the tracking mode and a
//! per-sender sequence number so a single port can tell hand data from pose
//! data; receivers have to be updated before turning it on.

use serde::{Deserialize, Serialize};

use crate::{
    error::WireError,
    types::{Landmark, TrackingMode},
};

/// Largest payload that fits a single IPv4 UDP datagram.
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Legacy,
    Tagged,
}

#[derive(Serialize)]
struct TaggedMessage<'a> {
    kind: TrackingMode,
    seq: u64,
    landmarks: &'a [Landmark],
}

pub fn encode_landmarks(landmarks: &[Landmark]) -> Result<Vec<u8>, WireError> {
    let sanitized = sanitize(landmarks);
    check_size(serde_json::to_vec(&sanitized)?)
}

pub fn encode_tagged(
    mode: TrackingMode,
    seq: u64,
    landmarks: &[Landmark],
) -> Result<Vec<u8>, WireError> {
    let sanitized = sanitize(landmarks);
    let message = TaggedMessage {
        kind: mode,
        seq,
        landmarks: &sanitized,
    };
    check_size(serde_json::to_vec(&message)?)
}

impl WireFormat {
    pub fn encode(
        &self,
        mode: TrackingMode,
        seq: u64,
        landmarks: &[Landmark],
    ) -> Result<Vec<u8>, WireError> {
        match self {
            WireFormat::Legacy => encode_landmarks(landmarks),
            WireFormat::Tagged => encode_tagged(mode, seq, landmarks),
        }
    }
}

// JSON has no NaN or infinity; the receiver treats bad points as the origin.
fn sanitize(landmarks: &[Landmark]) -> Vec<Landmark> {
    let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
    landmarks
        .iter()
        .map(|lm| Landmark::new(finite(lm.x), finite(lm.y), finite(lm.z)))
        .collect()
}

fn check_size(payload: Vec<u8>) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_DATAGRAM_PAYLOAD {
        return Err(WireError::Oversize {
            size: payload.len(),
            limit: MAX_DATAGRAM_PAYLOAD,
        });
    }
    Ok(payload)
}
