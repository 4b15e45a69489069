use std::{fmt, time::Instant};

use serde::{Deserialize, Serialize};

use crate::pipeline::skeleton::{HAND_CONNECTIONS, POSE_CONNECTIONS};

pub const HAND_LANDMARKS: usize = 21;
pub const POSE_LANDMARKS: usize = 33;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// A frame is usable when it has a non-zero size and a buffer of exactly
    /// `width * height * 4` bytes.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len()
                == (self.width as usize)
                    .saturating_mul(self.height as usize)
                    .saturating_mul(4)
    }
}

/// A single keypoint. Coordinates are in whatever space the producer
/// documents: detectors emit normalized image coordinates, the transform
/// emits receiver space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Landmark {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Debug)]
pub struct Detection {
    pub landmarks: Vec<Landmark>,
    pub confidence: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    Hand,
    Pose,
}

impl TrackingMode {
    pub fn landmark_count(&self) -> usize {
        match self {
            TrackingMode::Hand => HAND_LANDMARKS,
            TrackingMode::Pose => POSE_LANDMARKS,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrackingMode::Hand => "hand",
            TrackingMode::Pose => "pose",
        }
    }

    pub fn window_title(&self) -> &'static str {
        match self {
            TrackingMode::Hand => "Hand Tracking - press q to quit",
            TrackingMode::Pose => "Pose Tracking - press q to quit",
        }
    }

    pub fn connections(&self) -> &'static [(usize, usize)] {
        match self {
            TrackingMode::Hand => HAND_CONNECTIONS,
            TrackingMode::Pose => POSE_CONNECTIONS,
        }
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hand" | "hands" => Ok(TrackingMode::Hand),
            "pose" | "body" => Ok(TrackingMode::Pose),
            other => Err(format!("unknown tracking mode `{other}`, expected hand or pose")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmark_counts_match_models() {
        assert_eq!(TrackingMode::Hand.landmark_count(), 21);
        assert_eq!(TrackingMode::Pose.landmark_count(), 33);
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Hand".parse::<TrackingMode>(), Ok(TrackingMode::Hand));
        assert_eq!("POSE".parse::<TrackingMode>(), Ok(TrackingMode::Pose));
        assert!("face".parse::<TrackingMode>().is_err());
    }

    #[test]
    fn frame_shape_check() {
        assert!(Frame::new(vec![0; 2 * 3 * 4], 2, 3).is_well_formed());
        assert!(!Frame::new(vec![0; 5], 2, 3).is_well_formed());
        assert!(!Frame::new(Vec::new(), 0, 0).is_well_formed());
    }
}
