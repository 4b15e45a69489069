use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    LandmarkDetector,
    common::{self, LetterboxInfo, POSE_INPUT_SIZE},
};
use crate::types::{Detection, Frame, Landmark, POSE_LANDMARKS};

// x, y, z, visibility, presence
const POSE_STRIDE: usize = 5;

/// The 33-point MediaPipe pose landmarker, run on the letterboxed full frame.
pub struct PoseDetector {
    session: Session,
    min_confidence: f32,
}

impl PoseDetector {
    pub fn new(model_path: &Path, min_confidence: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load pose model from {}", model_path.display()))?;

        Ok(Self {
            session,
            min_confidence,
        })
    }
}

impl LandmarkDetector for PoseDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<Detection>> {
        let (input, letterbox) = common::prepare_frame_with_size(frame, POSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run pose session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "pose model returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let presence = outputs[1]
            .try_extract_array::<f32>()?
            .iter()
            .next()
            .copied()
            .map(presence_probability)
            .unwrap_or(0.0);
        if presence < self.min_confidence {
            log::trace!("pose presence {presence:.2} below {}", self.min_confidence);
            return Ok(None);
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        // The model emits auxiliary points after the 33 body landmarks.
        let raw = common::decode_landmarks(&flattened, POSE_LANDMARKS, POSE_STRIDE)?;

        Ok(Some(Detection {
            landmarks: letterbox_to_normalized(&raw, &letterbox),
            confidence: presence,
        }))
    }
}

/// The presence output already goes through a sigmoid inside the graph; it is
/// only clamped here.
fn presence_probability(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn letterbox_to_normalized(raw: &[[f32; 3]], letterbox: &LetterboxInfo) -> Vec<Landmark> {
    let points: Vec<(f32, f32, f32)> = raw
        .iter()
        .map(|&[x, y, z]| {
            let (fx, fy) = letterbox.unproject(x, y);
            (fx, fy, z / letterbox.scale)
        })
        .collect();
    common::normalize_points(&points, letterbox.orig_w, letterbox.orig_h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn letterboxed_points_map_back_to_frame() {
        // 640x480 into 256: scale 0.4, 32 px of padding above and below.
        let letterbox = LetterboxInfo {
            scale: 0.4,
            pad_x: 0.0,
            pad_y: 32.0,
            orig_w: 640,
            orig_h: 480,
        };
        let out = letterbox_to_normalized(&[[128.0, 128.0, 25.6], [0.0, 32.0, 0.0]], &letterbox);
        assert_relative_eq!(out[0].x, 0.5, epsilon = 1e-5);
        assert_relative_eq!(out[0].y, 0.5, epsilon = 1e-5);
        assert_relative_eq!(out[0].z, 0.1, epsilon = 1e-5);
        assert_relative_eq!(out[1].x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(out[1].y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn presence_gate_is_monotonic() {
        let raw = [-3.0, -0.5, 0.0, 0.3, 0.49, 0.5, 0.9, 1.0, 1.01, 1.5, 7.0];
        let mapped: Vec<f32> = raw.iter().map(|&v| presence_probability(v)).collect();
        assert!(mapped.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(presence_probability(0.3), 0.3);
        assert_eq!(presence_probability(0.9), 0.9);
        assert_eq!(presence_probability(1.5), 1.0);
        assert_eq!(presence_probability(-0.5), 0.0);
        assert_eq!(presence_probability(f32::NAN), 0.0);
    }
}
