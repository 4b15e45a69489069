#[cfg(feature = "camera-nokhwa")]
pub mod camera;
#[cfg(feature = "preview")]
pub mod preview;
pub mod recognizer;
pub mod replay;
pub mod rgba_converter;
pub mod skeleton;

use crate::types::{Detection, Frame, TrackingMode};

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, CameraSource, available_cameras};
#[cfg(feature = "preview")]
pub use preview::WindowPreview;
pub use recognizer::{LandmarkDetector, build_detector};
pub use replay::ReplaySource;

/// Anything that yields frames for the relay loop.
///
/// `Ok(None)` means the source is finished for good; `Err` is a failed read
/// that may succeed on a later attempt.
pub trait FrameSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        (**self).next_frame()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewEvent {
    Continue,
    Quit,
    Closed,
}

pub trait Preview {
    fn present(
        &mut self,
        frame: &Frame,
        detection: Option<&Detection>,
        mode: TrackingMode,
    ) -> PreviewEvent;
}

impl<T: Preview + ?Sized> Preview for Box<T> {
    fn present(
        &mut self,
        frame: &Frame,
        detection: Option<&Detection>,
        mode: TrackingMode,
    ) -> PreviewEvent {
        (**self).present(frame, detection, mode)
    }
}

/// No window; the loop only stops on its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessPreview;

impl Preview for HeadlessPreview {
    fn present(&mut self, _: &Frame, _: Option<&Detection>, _: TrackingMode) -> PreviewEvent {
        PreviewEvent::Continue
    }
}
