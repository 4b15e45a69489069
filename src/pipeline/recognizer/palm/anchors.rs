//! SSD anchor centres for the 192×192 MediaPipe palm detector.

use super::super::common::PALM_INPUT_SIZE;

pub const NUM_ANCHORS: usize = 2016;

const STRIDES: [u32; 4] = [8, 16, 16, 16];
const ANCHOR_OFFSET: f32 = 0.5;
// One aspect ratio plus the interpolated scale, per layer.
const ANCHORS_PER_LAYER: usize = 2;

/// Anchor centres as normalized `[cx, cy]`, in the order the model emits its
/// boxes. Consecutive layers sharing a stride are merged into one grid.
pub fn generate_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    let mut layer = 0;
    while layer < STRIDES.len() {
        let stride = STRIDES[layer];
        let mut per_cell = 0;
        while layer < STRIDES.len() && STRIDES[layer] == stride {
            per_cell += ANCHORS_PER_LAYER;
            layer += 1;
        }

        let grid = PALM_INPUT_SIZE.div_ceil(stride);
        for y in 0..grid {
            for x in 0..grid {
                let cx = (x as f32 + ANCHOR_OFFSET) / grid as f32;
                let cy = (y as f32 + ANCHOR_OFFSET) / grid as f32;
                for _ in 0..per_cell {
                    anchors.push([cx, cy]);
                }
            }
        }
    }
    anchors
}
