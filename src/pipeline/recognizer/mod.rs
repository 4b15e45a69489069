pub mod common;
pub mod hand;
pub mod palm;
pub mod pose;

use std::path::Path;

use anyhow::Result;

use crate::{
    config::Config,
    error::RelayError,
    model_download::{ModelDownloadEvent, ModelKind, ensure_model_ready},
    types::{Detection, Frame, TrackingMode},
};

pub use hand::HandDetector;
pub use pose::PoseDetector;

/// Turns a frame into at most one set of normalized landmarks.
///
/// `Ok(None)` means nothing was found in the frame. Landmarks are in
/// normalized image coordinates: x and y in [0, 1] across the frame, z on
/// the same scale as x.
pub trait LandmarkDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<Detection>>;
}

impl<T: LandmarkDetector + ?Sized> LandmarkDetector for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Option<Detection>> {
        (**self).detect(frame)
    }
}

/// Downloads any missing models for `mode` and loads its detector.
pub fn build_detector(
    mode: TrackingMode,
    config: &Config,
) -> Result<Box<dyn LandmarkDetector>, RelayError> {
    match mode {
        TrackingMode::Hand => {
            let hand = &config.hand;
            prepare_model(ModelKind::PalmDetector, &hand.palm_model)?;
            prepare_model(ModelKind::HandposeEstimator, &hand.landmark_model)?;
            let detector = HandDetector::new(
                &hand.landmark_model,
                &hand.palm_model,
                hand.min_detection_confidence,
            )
            .map_err(RelayError::Detector)?;
            log::info!(
                "hand detector ready using {} and palm detector {}",
                hand.landmark_model.display(),
                hand.palm_model.display()
            );
            Ok(Box::new(detector))
        }
        TrackingMode::Pose => {
            let pose = &config.pose;
            prepare_model(ModelKind::PoseLandmarker, &pose.landmark_model)?;
            let detector = PoseDetector::new(&pose.landmark_model, pose.min_detection_confidence)
                .map_err(RelayError::Detector)?;
            log::info!(
                "pose detector ready using {}",
                pose.landmark_model.display()
            );
            Ok(Box::new(detector))
        }
    }
}

fn prepare_model(kind: ModelKind, path: &Path) -> Result<(), RelayError> {
    ensure_model_ready(kind, path, |event| {
        if let ModelDownloadEvent::AlreadyPresent { model } = event {
            log::debug!("{} model found at {}", model.label(), path.display());
        }
    })
    .map_err(RelayError::Detector)
}
