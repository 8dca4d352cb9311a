// SPDX-License-Identifier: GPL-3.0-only

//! Types shared by the capture backends and their consumers

use std::sync::Arc;
use std::time::Instant;

use futures::channel::mpsc;

/// Identity reported by a V4L2 capability query
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    /// Human-readable card name
    pub card: String,
    /// Kernel driver behind the node
    pub driver: String,
    /// Device node, e.g. /dev/video0
    pub path: String,
}

/// Clockwise sensor mounting angle
///
/// Camera sensors may be physically mounted at an angle relative to the
/// device. The hint travels with the device descriptor and is applied while
/// converting frames to the canonical raster, so the core only ever sees
/// upright images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorRotation {
    /// Mounted upright
    #[default]
    None = 0,
    /// Quarter turn clockwise
    Rotate90 = 90,
    /// Mounted upside down
    Rotate180 = 180,
    /// Quarter turn counter-clockwise
    Rotate270 = 270,
}

impl SensorRotation {
    /// Normalise an arbitrary degree value into one of the four mounts.
    pub fn from_degrees_int(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => SensorRotation::Rotate90,
            180 => SensorRotation::Rotate180,
            270 => SensorRotation::Rotate270,
            _ => SensorRotation::None,
        }
    }

    /// Parse a degree string as found in PipeWire node properties.
    pub fn from_degrees(degrees: &str) -> Self {
        degrees
            .trim()
            .parse::<i32>()
            .map(Self::from_degrees_int)
            .unwrap_or(SensorRotation::None)
    }

    /// Mounting angle in degrees
    pub fn degrees(&self) -> u32 {
        *self as u32
    }

    /// True when undoing the mount trades width for height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, SensorRotation::Rotate90 | SensorRotation::Rotate270)
    }
}

impl std::fmt::Display for SensorRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// A capture device as presented to listings and the pipelines
#[derive(Debug, Clone)]
pub struct CameraDevice {
    /// Human-readable name shown in listings
    pub name: String,
    /// Capture target: a PipeWire serial/node handle or a /dev/video path
    pub path: String,
    /// PipeWire node ID, kept for format enumeration
    pub node_id: Option<String>,
    /// V4L2 device information when known
    pub device_info: Option<DeviceInfo>,
    /// Sensor rotation hint
    pub rotation: SensorRotation,
}

/// Frame rate held as an exact fraction
///
/// Keeping the fraction avoids rounding NTSC rates (59.94 is 60000/1001).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Build a rate, mapping a zero denominator to 1.
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: denom.max(1),
        }
    }

    /// Whole frames per second
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// The rate as a float, for comparisons
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// The rate truncated to whole frames per second
    pub fn as_int(&self) -> u32 {
        self.num / self.denom
    }

    /// The caps fraction form, `num/denom`
    pub fn as_gst_fraction(&self) -> String {
        format!("{}/{}", self.num, self.denom)
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // NTSC rates print with two decimals
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// One advertised capture mode: size, optional rate, FourCC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: Option<Framerate>,
    /// FourCC spelling as reported by the device, e.g. "MJPG"
    pub pixel_format: String,
}

impl std::fmt::Display for CameraFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(fps) = &self.framerate {
            write!(f, "{}x{} @ {}fps", self.width, self.height, fps)
        } else {
            write!(f, "{}x{}", self.width, self.height)
        }
    }
}

/// Raw pixel layouts the backends can deliver
///
/// The GStreamer path converts to RGBA in-pipeline, so frames from it are
/// always [`PixelFormat::RGBA`]. The direct V4L2 path delivers whatever the
/// device negotiated; the `convert` module turns each of these into the
/// canonical raster on the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Canonical 32-bit layout, four bytes per pixel
    RGBA,
    /// Packed 24-bit RGB without an alpha byte
    RGB24,
    /// Packed 4:2:2, two pixels sharing chroma (Y0 U Y1 V), the common
    /// webcam raw layout
    YUYV,
    /// Packed 4:2:2 with chroma leading (U Y0 V Y1)
    UYVY,
    /// One luma byte per pixel (mono and IR sensors)
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel as a float; the subsampled layouts average to 2
    pub fn bytes_per_pixel(&self) -> f32 {
        match self {
            Self::RGBA => 4.0,
            Self::RGB24 => 3.0,
            Self::YUYV | Self::UYVY => 2.0,
            Self::Gray8 => 1.0,
        }
    }

    /// The matching GStreamer video/x-raw format name
    pub fn to_gst_format_string(&self) -> &'static str {
        match self {
            Self::RGBA => "RGBA",
            Self::RGB24 => "RGB",
            Self::YUYV => "YUY2",
            Self::UYVY => "UYVY",
            Self::Gray8 => "GRAY8",
        }
    }

    /// Parse a GStreamer format name, tolerating close aliases.
    pub fn from_gst_format(format: &str) -> Option<Self> {
        match format {
            "RGBA" => Some(Self::RGBA),
            "RGB" | "BGR" => Some(Self::RGB24),
            "YUYV" | "YUY2" => Some(Self::YUYV),
            "UYVY" => Some(Self::UYVY),
            "GRAY8" | "GREY" | "Y8" => Some(Self::Gray8),
            _ => None,
        }
    }

    /// Parse a V4L2 FourCC spelling; compressed and unknown codes give None.
    pub fn from_fourcc(fourcc: &str) -> Option<Self> {
        match fourcc {
            "YUYV" => Some(Self::YUYV),
            "UYVY" => Some(Self::UYVY),
            "RGB3" => Some(Self::RGB24),
            "GREY" => Some(Self::Gray8),
            "AB24" | "RGBA" => Some(Self::RGBA),
            _ => None,
        }
    }
}

/// One frame handed out by a backend
///
/// Pixel data is always owned (`Arc<[u8]>`), so a frame latched as a still
/// stays valid after the pipeline that produced it is torn down.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Pixel data in `format`, rows padded to `stride` bytes
    pub data: Arc<[u8]>,
    /// Layout of `data`
    pub format: PixelFormat,
    /// Row stride in bytes, padding included
    pub stride: u32,
    /// Capture instant, for latency diagnostics
    pub captured_at: Instant,
}

/// Receiving end of a preview stream
pub type FrameReceiver = mpsc::Receiver<CameraFrame>;

/// Sending end of a preview stream
pub type FrameSender = mpsc::Sender<CameraFrame>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framerate_display() {
        assert_eq!(Framerate::from_int(30).to_string(), "30");
        assert_eq!(Framerate::new(60000, 1001).to_string(), "59.94");
    }

    #[test]
    fn test_framerate_zero_denominator_is_normalised() {
        let fps = Framerate::new(30, 0);
        assert_eq!(fps.denom, 1);
        assert_eq!(fps.as_int(), 30);
    }

    #[test]
    fn test_rotation_parsing() {
        assert_eq!(SensorRotation::from_degrees("90"), SensorRotation::Rotate90);
        assert_eq!(SensorRotation::from_degrees(""), SensorRotation::None);
        assert_eq!(
            SensorRotation::from_degrees_int(-90),
            SensorRotation::Rotate270
        );
        assert!(SensorRotation::Rotate90.swaps_dimensions());
        assert!(!SensorRotation::Rotate180.swaps_dimensions());
    }

    #[test]
    fn test_pixel_format_fourcc_roundtrip() {
        assert_eq!(PixelFormat::from_fourcc("YUYV"), Some(PixelFormat::YUYV));
        assert_eq!(PixelFormat::from_fourcc("RGB3"), Some(PixelFormat::RGB24));
        assert_eq!(PixelFormat::from_fourcc("MJPG"), None);
        assert_eq!(PixelFormat::YUYV.to_gst_format_string(), "YUY2");
    }
}
