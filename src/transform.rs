//! Mapping from normalized image coordinates into the receiver's space.

use serde::{Deserialize, Serialize};

use crate::types::Landmark;

pub const DEFAULT_SCALE: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CoordinateConvention {
    /// Recentre on the image midpoint, correct for aspect ratio using the
    /// longer side, flip y up and z forward, then multiply by `scale`.
    Centered { scale: f32 },
    /// Normalized model output, untouched.
    Raw,
}

impl Default for CoordinateConvention {
    fn default() -> Self {
        CoordinateConvention::Centered {
            scale: DEFAULT_SCALE,
        }
    }
}

impl CoordinateConvention {
    pub fn apply(&self, landmark: Landmark, width: u32, height: u32) -> Landmark {
        match *self {
            CoordinateConvention::Centered { scale } => {
                let longest = width.max(height).max(1) as f32;
                let aspect_x = width as f32 / longest;
                let aspect_y = height as f32 / longest;
                Landmark {
                    x: (landmark.x - 0.5) * scale * aspect_x,
                    y: -(landmark.y - 0.5) * scale * aspect_y,
                    z: -landmark.z * scale,
                }
            }
            CoordinateConvention::Raw => landmark,
        }
    }

    pub fn apply_all(&self, landmarks: &[Landmark], width: u32, height: u32) -> Vec<Landmark> {
        landmarks
            .iter()
            .map(|lm| self.apply(*lm, width, height))
            .collect()
    }

    pub fn label(&self) -> &'static str {
        match self {
            CoordinateConvention::Centered { .. } => "centered",
            CoordinateConvention::Raw => "raw",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const CENTERED: CoordinateConvention = CoordinateConvention::Centered { scale: 2.0 };

    #[test]
    fn frame_centre_maps_to_origin() {
        for (w, h) in [(640, 480), (480, 640), (1920, 1080), (1, 1), (300, 300)] {
            let out = CENTERED.apply(Landmark::new(0.5, 0.5, 0.0), w, h);
            assert_relative_eq!(out.x, 0.0);
            assert_relative_eq!(out.y, 0.0);
            assert_relative_eq!(out.z, 0.0);
        }
    }

    #[test]
    fn square_frame_has_unit_aspect() {
        let out = CENTERED.apply(Landmark::new(0.9, 0.1, 0.0), 512, 512);
        assert_relative_eq!(out.x, (0.9 - 0.5) * 2.0, epsilon = 1e-6);
        assert_relative_eq!(out.y, -(0.1 - 0.5) * 2.0, epsilon = 1e-6);
    }

    #[test]
    fn depth_is_always_inverted_and_scaled() {
        let convention = CoordinateConvention::Centered { scale: 3.5 };
        for z in [-0.4_f32, -0.01, 0.0, 0.2, 1.0] {
            let out = convention.apply(Landmark::new(0.3, 0.7, z), 640, 480);
            assert_relative_eq!(out.z, -z * 3.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn landscape_frame_shrinks_vertical_axis() {
        let out = CENTERED.apply(Landmark::new(0.75, 0.25, -0.1), 640, 480);
        assert_relative_eq!(out.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(out.y, 0.375, epsilon = 1e-6);
        assert_relative_eq!(out.z, 0.2, epsilon = 1e-6);
    }

    #[test]
    fn portrait_frame_shrinks_horizontal_axis() {
        let out = CENTERED.apply(Landmark::new(1.0, 0.0, 0.0), 480, 640);
        assert_relative_eq!(out.x, 0.75, epsilon = 1e-6);
        assert_relative_eq!(out.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn raw_is_identity() {
        let lm = Landmark::new(0.12, 0.98, -0.33);
        assert_eq!(CoordinateConvention::Raw.apply(lm, 640, 480), lm);
    }

    #[test]
    fn apply_all_preserves_order() {
        let input: Vec<Landmark> = (0..33)
            .map(|i| Landmark::new(i as f32 / 33.0, 0.5, 0.0))
            .collect();
        let out = CENTERED.apply_all(&input, 100, 100);
        assert_eq!(out.len(), input.len());
        for (i, lm) in out.iter().enumerate() {
            assert_relative_eq!(lm.x, (input[i].x - 0.5) * 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn convention_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            convention: CoordinateConvention,
        }
        let parsed: Wrapper =
            toml::from_str("convention = { kind = \"centered\", scale = 1.5 }").unwrap();
        assert_eq!(
            parsed.convention,
            CoordinateConvention::Centered { scale: 1.5 }
        );
        let parsed: Wrapper = toml::from_str("convention = { kind = \"raw\" }").unwrap();
        assert_eq!(parsed.convention, CoordinateConvention::Raw);
    }
}
