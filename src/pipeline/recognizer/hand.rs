use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    LandmarkDetector,
    common::{self, CropTransform, HANDPOSE_INPUT_SIZE},
    palm::{PalmDetector, PalmDetectorConfig, crop_from_palm, pick_primary_region},
};
use crate::types::{Detection, Frame, HAND_LANDMARKS, Landmark};

const HAND_STRIDE: usize = 3;

/// Palm detection followed by the 21-point handpose model on a rotated crop
/// around the strongest palm.
pub struct HandDetector {
    handpose: Session,
    palm_detector: PalmDetector,
    min_confidence: f32,
}

impl HandDetector {
    pub fn new(
        handpose_model_path: &Path,
        palm_detector_model_path: &Path,
        min_confidence: f32,
    ) -> Result<Self> {
        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(handpose_model_path)
            .with_context(|| {
                format!(
                    "failed to load handpose model from {}",
                    handpose_model_path.display()
                )
            })?;

        let palm_detector =
            PalmDetector::new(palm_detector_model_path, PalmDetectorConfig::default())?;

        Ok(Self {
            handpose,
            palm_detector,
            min_confidence,
        })
    }
}

impl LandmarkDetector for HandDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<Detection>> {
        let palm_regions = self.palm_detector.detect(frame)?;
        let Some(selected) = pick_primary_region(&palm_regions) else {
            return Ok(None);
        };
        let (center, side, angle) = crop_from_palm(selected);

        let (input, transform) =
            common::prepare_rotated_crop(frame, center, side, angle, HANDPOSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run handpose session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "handpose model returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let raw = common::decode_landmarks(&flattened, HAND_LANDMARKS, HAND_STRIDE)?;

        let confidence = outputs[1]
            .try_extract_array::<f32>()?
            .iter()
            .next()
            .copied()
            .unwrap_or(0.0);
        if confidence < self.min_confidence {
            log::trace!("hand confidence {confidence:.2} below {}", self.min_confidence);
            return Ok(None);
        }

        Ok(Some(Detection {
            landmarks: crop_to_normalized(&raw, &transform, frame.width, frame.height),
            confidence,
        }))
    }
}

/// Maps crop-space handpose output back onto the frame and normalizes it.
fn crop_to_normalized(
    raw: &[[f32; 3]],
    transform: &CropTransform,
    width: u32,
    height: u32,
) -> Vec<Landmark> {
    let pixel_scale = transform.pixel_scale();
    let points: Vec<(f32, f32, f32)> = raw
        .iter()
        .map(|&[x, y, z]| {
            let (fx, fy) = transform.project(x, y);
            (fx, fy, z * pixel_scale)
        })
        .collect();
    common::normalize_points(&points, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn crop_centre_lands_on_palm_centre() {
        let transform = CropTransform {
            center: (320.0, 240.0),
            side: 448.0,
            angle: 0.0,
            output_size: HANDPOSE_INPUT_SIZE,
        };
        let out = crop_to_normalized(&[[112.0, 112.0, -10.0]], &transform, 640, 480);
        assert_relative_eq!(out[0].x, 0.5);
        assert_relative_eq!(out[0].y, 0.5);
        // 10 crop px at 2 frame px each, over a 640 px wide frame
        assert_relative_eq!(out[0].z, -20.0 / 640.0);
    }

    #[test]
    fn rotated_crop_keeps_points_in_frame_space() {
        let transform = CropTransform {
            center: (100.0, 100.0),
            side: 224.0,
            angle: std::f32::consts::PI,
            output_size: HANDPOSE_INPUT_SIZE,
        };
        // Half a turn sends the crop's top-left corner to the bottom-right.
        let out = crop_to_normalized(&[[0.0, 0.0, 0.0]], &transform, 400, 400);
        assert_relative_eq!(out[0].x, 212.0 / 400.0, epsilon = 1e-4);
        assert_relative_eq!(out[0].y, 212.0 / 400.0, epsilon = 1e-4);
    }
}
