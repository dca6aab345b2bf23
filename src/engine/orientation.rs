//! Orientation normalizer: bakes the source's display transform into pixels
//!
//! Frames reach the encoder already display-oriented, so the output carries
//! no rotation metadata and renders the same in every player.

use tracing::debug;

use crate::domain::model::{
    AffineTransform, EncodingPlan, Orientation, Resolution, SourceAnalysis,
};

/// How the video reader must shape every decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeConfiguration {
    /// Orientation baked into each frame after scaling
    pub orientation: Orientation,
    /// Size the decoded buffer is scaled to, still in natural orientation
    pub scaled_natural: Resolution,
    /// Display-oriented frame size handed to the encoder
    pub render: Resolution,
}

impl DecodeConfiguration {
    pub fn is_passthrough_geometry(&self, natural: Resolution) -> bool {
        self.orientation.is_identity() && self.scaled_natural == natural
    }
}

pub struct OrientationNormalizer;

impl OrientationNormalizer {
    /// `|natural transformed by transform|`
    pub fn render_resolution(natural: Resolution, transform: &AffineTransform) -> Resolution {
        transform.apply_to_size(natural)
    }

    /// Decode settings producing frames at the plan's writer resolution
    pub fn configure(analysis: &SourceAnalysis, plan: &EncodingPlan) -> DecodeConfiguration {
        let (orientation, _) = analysis.orientation_transform.orientation();
        let render = plan.writer_resolution;
        let scaled_natural = if orientation.swaps_axes() {
            render.transposed()
        } else {
            render
        };
        debug!(
            "Decode configuration: scale {} -> {}, bake {:?} -> {}",
            analysis.natural_resolution, scaled_natural, orientation, render
        );
        DecodeConfiguration {
            orientation,
            scaled_natural,
            render,
        }
    }
}

/// Size of a `width` x `height` plane after `orientation` is applied
pub fn oriented_size(orientation: Orientation, width: usize, height: usize) -> (usize, usize) {
    if orientation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    }
}

/// Where source pixel `(x, y)` lands in the oriented plane
#[inline]
fn destination(orientation: Orientation, x: usize, y: usize, w: usize, h: usize) -> (usize, usize) {
    match orientation {
        Orientation::Up => (x, y),
        Orientation::Right => (h - 1 - y, x),
        Orientation::Down => (w - 1 - x, h - 1 - y),
        Orientation::Left => (y, w - 1 - x),
        Orientation::UpMirrored => (w - 1 - x, y),
        Orientation::RightMirrored => (y, x),
        Orientation::DownMirrored => (x, h - 1 - y),
        Orientation::LeftMirrored => (h - 1 - y, w - 1 - x),
    }
}

/// Copy one 8-bit plane into `dst`, applying `orientation`.
///
/// `width` and `height` describe the source plane; `dst` must hold the
/// oriented plane at `dst_stride` bytes per row.
pub fn reorient_plane(
    src: &[u8],
    src_stride: usize,
    width: usize,
    height: usize,
    dst: &mut [u8],
    dst_stride: usize,
    orientation: Orientation,
) {
    if orientation.is_identity() {
        for y in 0..height {
            let from = &src[y * src_stride..y * src_stride + width];
            dst[y * dst_stride..y * dst_stride + width].copy_from_slice(from);
        }
        return;
    }

    for y in 0..height {
        let row = &src[y * src_stride..y * src_stride + width];
        for (x, &value) in row.iter().enumerate() {
            let (dx, dy) = destination(orientation, x, y, width, height);
            dst[dy * dst_stride + dx] = value;
        }
    }
}
