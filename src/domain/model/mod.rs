// Domain models - Core types and data structures

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SizefitError, SizefitResult};


/// Pixel dimensions of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Create a new resolution, rejecting zero dimensions
    pub fn new(width: u32, height: u32) -> SizefitResult<Self> {
        if width == 0 || height == 0 {
            return Err(SizefitError::InvalidRequest(format!(
                "Resolution dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    pub fn longest_edge(&self) -> u32 {
        self.width.max(self.height)
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    pub fn is_even(&self) -> bool {
        self.width % 2 == 0 && self.height % 2 == 0
    }

    /// Width and height exchanged
    pub fn transposed(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Round both dimensions down to the nearest even value, never below 2
    pub fn even_floor(&self) -> Self {
        Self {
            width: even_floor(self.width as f64),
            height: even_floor(self.height as f64),
        }
    }

    /// Scale so the longest edge becomes `edge`, keeping the aspect ratio.
    /// Each dimension is rounded down to even.
    pub fn fit_long_edge(&self, edge: u32) -> Self {
        let long = self.longest_edge() as u64;
        let scale = |dim: u32| ((dim as u64 * edge as u64) / long) as f64;
        Self {
            width: even_floor(scale(self.width)),
            height: even_floor(scale(self.height)),
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn even_floor(value: f64) -> u32 {
    let floored = value.max(0.0).floor() as u32;
    (floored - floored % 2).max(2)
}

/// Axis-aligned orientation a transform reduces to (EXIF-style, eight cases)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// As stored
    Up,
    /// Rotated 90 degrees clockwise
    Right,
    /// Rotated 180 degrees
    Down,
    /// Rotated 90 degrees counter-clockwise
    Left,
    UpMirrored,
    RightMirrored,
    DownMirrored,
    LeftMirrored,
}

impl Orientation {
    /// Whether this orientation exchanges width and height
    pub fn swaps_axes(&self) -> bool {
        matches!(
            self,
            Orientation::Right
                | Orientation::Left
                | Orientation::RightMirrored
                | Orientation::LeftMirrored
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Orientation::Up
    }

    /// Linear part `(a, b, c, d)` of the natural-to-display mapping
    /// `x' = a*x + b*y`, `y' = c*x + d*y` in y-down image coordinates
    pub fn linear(&self) -> (f64, f64, f64, f64) {
        match self {
            Orientation::Up => (1.0, 0.0, 0.0, 1.0),
            Orientation::Right => (0.0, -1.0, 1.0, 0.0),
            Orientation::Down => (-1.0, 0.0, 0.0, -1.0),
            Orientation::Left => (0.0, 1.0, -1.0, 0.0),
            Orientation::UpMirrored => (-1.0, 0.0, 0.0, 1.0),
            Orientation::RightMirrored => (0.0, 1.0, 1.0, 0.0),
            Orientation::DownMirrored => (1.0, 0.0, 0.0, -1.0),
            Orientation::LeftMirrored => (0.0, -1.0, -1.0, 0.0),
        }
    }
}

/// 2D affine transform mapping natural buffer coordinates to display coordinates.
///
/// `x' = a*x + b*y + tx`, `y' = c*x + d*y + ty`, with y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Transform for an axis-aligned orientation of a `natural`-sized buffer,
    /// translated so the display rectangle starts at the origin
    pub fn for_orientation(orientation: Orientation, natural: Resolution) -> Self {
        let (a, b, c, d) = orientation.linear();
        let mut transform = Self {
            a,
            b,
            c,
            d,
            tx: 0.0,
            ty: 0.0,
        };
        let (min_x, min_y, _, _) = transform.bounds(natural);
        transform.tx = -min_x;
        transform.ty = -min_y;
        transform
    }

    /// Clockwise rotation in degrees (a `rotate` metadata tag), snapped to quarter turns
    pub fn from_rotation_degrees(degrees: f64, natural: Resolution) -> Self {
        let quarter_turns = ((degrees / 90.0).round() as i64).rem_euclid(4);
        let orientation = match quarter_turns {
            1 => Orientation::Right,
            2 => Orientation::Down,
            3 => Orientation::Left,
            _ => Orientation::Up,
        };
        Self::for_orientation(orientation, natural)
    }

    /// Build from a libav display matrix: nine 32-bit values, the first two
    /// columns in 16.16 fixed point. libav maps `(p, q)` to
    /// `(m0*p + m3*q, m1*p + m4*q)`.
    pub fn from_display_matrix(matrix: &[i32; 9], natural: Resolution) -> Self {
        const FIXED_ONE: f64 = 65536.0;
        let mut transform = Self {
            a: matrix[0] as f64 / FIXED_ONE,
            b: matrix[3] as f64 / FIXED_ONE,
            c: matrix[1] as f64 / FIXED_ONE,
            d: matrix[4] as f64 / FIXED_ONE,
            tx: 0.0,
            ty: 0.0,
        };
        let (min_x, min_y, _, _) = transform.bounds(natural);
        transform.tx = -min_x;
        transform.ty = -min_y;
        transform
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.tx,
            self.c * x + self.d * y + self.ty,
        )
    }

    fn bounds(&self, size: Resolution) -> (f64, f64, f64, f64) {
        let w = size.width as f64;
        let h = size.height as f64;
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(w, 0.0),
            self.apply(0.0, h),
            self.apply(w, h),
        ];
        corners.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }

    /// Size of the bounding box of `size` after the transform
    pub fn apply_to_size(&self, size: Resolution) -> Resolution {
        let (min_x, min_y, max_x, max_y) = self.bounds(size);
        Resolution {
            width: ((max_x - min_x).abs().round() as u32).max(1),
            height: ((max_y - min_y).abs().round() as u32).max(1),
        }
    }

    /// The axis-aligned orientation this transform is closest to.
    ///
    /// Returns the orientation and whether snapping was needed (the linear
    /// part was not an exact quarter turn).
    pub fn orientation(&self) -> (Orientation, bool) {
        let mirrored = self.determinant() < 0.0;
        // Mirrored transforms are a rotation applied after a horizontal flip,
        // so the rotation's first column is the negated first column
        let (col_x, col_y) = if mirrored {
            (-self.a, -self.c)
        } else {
            (self.a, self.c)
        };
        let angle = col_y.atan2(col_x).to_degrees();
        let quarter_turns = ((angle / 90.0).round() as i64).rem_euclid(4);
        let orientation = match (quarter_turns, mirrored) {
            (0, false) => Orientation::Up,
            (1, false) => Orientation::Right,
            (2, false) => Orientation::Down,
            (3, false) => Orientation::Left,
            (0, true) => Orientation::UpMirrored,
            (1, true) => Orientation::LeftMirrored,
            (2, true) => Orientation::DownMirrored,
            _ => Orientation::RightMirrored,
        };

        const EPS: f64 = 1e-3;
        let (a, b, c, d) = orientation.linear();
        let exact = (self.a - a).abs() < EPS
            && (self.b - b).abs() < EPS
            && (self.c - c).abs() < EPS
            && (self.d - d).abs() < EPS;

        (orientation, !exact)
    }
}

/// Output video codec chosen by the budget solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "h264"),
            VideoCodec::Hevc => write!(f, "hevc"),
        }
    }
}

/// Codec reported in a result; passthrough copies are not re-encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCodec {
    Passthrough,
    H264,
    Hevc,
}

impl From<VideoCodec> for OutputCodec {
    fn from(codec: VideoCodec) -> Self {
        match codec {
            VideoCodec::H264 => OutputCodec::H264,
            VideoCodec::Hevc => OutputCodec::Hevc,
        }
    }
}

impl fmt::Display for OutputCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputCodec::Passthrough => write!(f, "passthrough"),
            OutputCodec::H264 => write!(f, "h264"),
            OutputCodec::Hevc => write!(f, "hevc"),
        }
    }
}

/// Sub-range of the source to keep, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    /// Create a trim range, requiring `0 <= start < end`
    pub fn new(start: f64, end: f64) -> SizefitResult<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(SizefitError::InvalidRequest(
                "Trim bounds must be finite".to_string(),
            ));
        }
        if start < 0.0 {
            return Err(SizefitError::InvalidRequest(
                "Trim start cannot be negative".to_string(),
            ));
        }
        if start >= end {
            return Err(SizefitError::InvalidRequest(format!(
                "Trim start ({:.3}s) must be before end ({:.3}s)",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Restrict the range to a source of `duration` seconds.
    ///
    /// A range starting at or after the end of the source selects nothing
    /// and is rejected.
    pub fn clamp_to(&self, duration: f64) -> SizefitResult<Self> {
        if duration > 0.0 && self.start >= duration {
            return Err(SizefitError::InvalidRequest(format!(
                "Trim start ({:.3}s) is beyond the end of the source ({:.3}s)",
                self.start, duration
            )));
        }
        let end = if duration > 0.0 {
            self.end.min(duration)
        } else {
            self.end
        };
        Ok(Self {
            start: self.start,
            end,
        })
    }
}

/// Read-only analysis of a source, produced once per compression call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAnalysis {
    pub duration_seconds: f64,
    pub file_size_bytes: u64,
    /// Size after the orientation transform, as a viewer sees it
    pub display_resolution: Resolution,
    /// Raw decoded buffer size
    pub natural_resolution: Resolution,
    pub orientation_transform: AffineTransform,
    pub frame_rate: f64,
    pub estimated_bitrate_bps: f64,
    pub has_audio_track: bool,
}

impl SourceAnalysis {
    /// Build an analysis; the display resolution is always derived from the
    /// natural resolution through the transform
    pub fn new(
        duration_seconds: f64,
        file_size_bytes: u64,
        natural_resolution: Resolution,
        orientation_transform: AffineTransform,
        frame_rate: f64,
        estimated_bitrate_bps: f64,
        has_audio_track: bool,
    ) -> SizefitResult<Self> {
        if natural_resolution.width == 0 || natural_resolution.height == 0 {
            return Err(SizefitError::InvalidRequest(
                "Video dimensions cannot be zero".to_string(),
            ));
        }
        let display_resolution = orientation_transform.apply_to_size(natural_resolution);
        Ok(Self {
            duration_seconds,
            file_size_bytes,
            display_resolution,
            natural_resolution,
            orientation_transform,
            frame_rate,
            estimated_bitrate_bps,
            has_audio_track,
        })
    }

    /// Seconds selected by an optional trim
    pub fn selected_duration(&self, trim: Option<&TrimRange>) -> f64 {
        match trim {
            Some(range) => range.duration(),
            None => self.duration_seconds,
        }
    }
}

/// Encoding parameters derived from an analysis and a byte budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingPlan {
    pub target_bitrate_bps: u64,
    /// Candidate-tier resolution, aspect preserving, never upscaled
    pub display_resolution: Resolution,
    /// Buffer size handed to the encoder; always even
    pub writer_resolution: Resolution,
    pub frame_rate: u32,
    pub codec: VideoCodec,
    pub key_frame_interval_frames: u32,
    /// Bitrate of the re-encoded audio lane, absent for silent sources
    pub audio_bitrate_bps: Option<u64>,
    /// Seconds of source the plan was solved for
    pub duration_seconds: f64,
}

/// Input of one `compress()` call
#[derive(Debug, Clone)]
pub struct CompressRequest {
    pub source: PathBuf,
    pub target_bytes: u64,
    pub preserve_resolution: bool,
    pub trim: Option<TrimRange>,
    /// Destination; a fresh file in the temp directory when absent
    pub output: Option<PathBuf>,
}

impl CompressRequest {
    pub fn new(source: impl Into<PathBuf>, target_bytes: u64) -> Self {
        Self {
            source: source.into(),
            target_bytes,
            preserve_resolution: false,
            trim: None,
            output: None,
        }
    }

    pub fn with_trim(mut self, trim: TrimRange) -> Self {
        self.trim = Some(trim);
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn preserving_resolution(mut self) -> Self {
        self.preserve_resolution = true;
        self
    }

    /// Target size given in megabytes (1 MB = 1024 * 1024 bytes)
    pub fn megabytes_to_bytes(megabytes: f64) -> u64 {
        (megabytes * 1024.0 * 1024.0).round().max(0.0) as u64
    }
}

/// Terminal description of a finished compression, owned by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionResult {
    pub output_path: PathBuf,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub compression_ratio: f64,
    pub source_duration_seconds: f64,
    pub wall_clock_seconds: f64,
    pub codec: OutputCodec,
    pub resolution: Resolution,
    pub bitrate_bps: u64,
    pub frame_rate: Option<u32>,
    pub trimmed: bool,
    pub completed_at: DateTime<Utc>,
}

impl CompressionResult {
    /// `original / compressed`, 1.0 for empty outputs
    pub fn ratio(original: u64, compressed: u64) -> f64 {
        if compressed == 0 {
            1.0
        } else {
            original as f64 / compressed as f64
        }
    }
}
