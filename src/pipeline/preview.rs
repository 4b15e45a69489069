use minifb::{Key, KeyRepeat, Window, WindowOptions};

use super::{Preview, PreviewEvent, skeleton};
use crate::{
    error::RelayError,
    types::{Detection, Frame, TrackingMode},
};

/// Debug window showing the mirrored frame with the detected skeleton.
/// The window is created lazily on the first frame so it matches the camera
/// resolution.
pub struct WindowPreview {
    title: &'static str,
    window: Option<Window>,
    size: (usize, usize),
    argb: Vec<u32>,
    disabled: bool,
}

impl WindowPreview {
    pub fn new(mode: TrackingMode) -> Self {
        Self {
            title: mode.window_title(),
            window: None,
            size: (0, 0),
            argb: Vec::new(),
            disabled: false,
        }
    }

    fn ensure_window(&mut self, width: usize, height: usize) -> Result<&mut Window, RelayError> {
        if self.window.is_none() || self.size != (width, height) {
            let window = Window::new(self.title, width, height, WindowOptions::default())
                .map_err(|err| RelayError::Preview(err.to_string()))?;
            self.window = Some(window);
            self.size = (width, height);
        }
        self.window
            .as_mut()
            .ok_or_else(|| RelayError::Preview("window not available".to_string()))
    }
}

impl Preview for WindowPreview {
    fn present(
        &mut self,
        frame: &Frame,
        detection: Option<&Detection>,
        mode: TrackingMode,
    ) -> PreviewEvent {
        if self.disabled {
            return PreviewEvent::Continue;
        }
        let (width, height) = (frame.width as usize, frame.height as usize);

        let mut rgba = frame.rgba.clone();
        if let Some(detection) = detection {
            let points = skeleton::to_pixels(&detection.landmarks, frame.width, frame.height);
            skeleton::draw_skeleton(&mut rgba, frame.width, frame.height, &points, mode.connections());
        }
        rgba_to_argb(&rgba, &mut self.argb);

        let argb = std::mem::take(&mut self.argb);
        let event = match self.ensure_window(width, height) {
            Ok(window) => {
                if !window.is_open() {
                    PreviewEvent::Closed
                } else if let Err(err) = window.update_with_buffer(&argb, width, height) {
                    log::warn!("preview update failed: {err}");
                    PreviewEvent::Continue
                } else if window.is_key_pressed(Key::Q, KeyRepeat::No) {
                    PreviewEvent::Quit
                } else {
                    PreviewEvent::Continue
                }
            }
            Err(err) => {
                log::warn!("{err}, continuing without preview");
                self.disabled = true;
                PreviewEvent::Continue
            }
        };
        self.argb = argb;
        event
    }
}

/// Packs RGBA bytes into the `0RGB` words minifb expects.
pub fn rgba_to_argb(rgba: &[u8], out: &mut Vec<u32>) {
    out.clear();
    out.extend(rgba.chunks_exact(4).map(|px| {
        ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_pixels_as_0rgb() {
        let mut out = Vec::new();
        rgba_to_argb(&[255, 0, 0, 255, 0, 0, 255, 7], &mut out);
        assert_eq!(out, vec![0x00FF_0000, 0x0000_00FF]);
    }

    #[test]
    fn reuses_the_output_buffer() {
        let mut out = vec![1, 2, 3, 4, 5];
        rgba_to_argb(&[1, 2, 3, 4], &mut out);
        assert_eq!(out, vec![0x0001_0203]);
    }
}
