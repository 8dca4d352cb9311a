// SPDX-License-Identifier: GPL-3.0-only

//! CPU pixel-format conversion to the canonical RGBA raster
//!
//! The GStreamer path negotiates RGBA in-pipeline, so frames from it only
//! need stride repacking. The direct V4L2 path delivers packed YUV, RGB or
//! grayscale data that is converted here. Sensor rotation is applied last,
//! so the compositing core always sees upright, tightly packed frames.

use std::sync::Arc;

use crate::backends::camera::types::{CameraFrame, PixelFormat, SensorRotation};
use crate::stereo::frame::{BYTES_PER_PIXEL, Frame};

/// Convert a backend frame to an upright, tightly packed RGBA [`Frame`].
///
/// Fails only on malformed buffers (shorter than the stride and dimensions
/// imply); callers skip such frames and keep streaming.
pub fn to_rgba_frame(frame: &CameraFrame, rotation: SensorRotation) -> Result<Frame, String> {
    let width = frame.width;
    let height = frame.height;

    check_buffer_len(frame)?;

    let rgba = match frame.format {
        PixelFormat::RGBA => repack_rgba(&frame.data, width, height, frame.stride),
        PixelFormat::RGB24 => rgb24_to_rgba(&frame.data, width, height, frame.stride),
        PixelFormat::YUYV => yuyv_to_rgba(&frame.data, width, height, frame.stride),
        PixelFormat::UYVY => uyvy_to_rgba(&frame.data, width, height, frame.stride),
        PixelFormat::Gray8 => gray8_to_rgba(&frame.data, width, height, frame.stride),
    };

    let (rgba, width, height) = rotate_rgba(rgba, width, height, rotation);
    Ok(Frame::new(width, height, Arc::from(rgba)))
}

fn check_buffer_len(frame: &CameraFrame) -> Result<(), String> {
    let min_row = (frame.width as f32 * frame.format.bytes_per_pixel()) as usize;
    let stride = (frame.stride as usize).max(min_row);
    // The final row may be unpadded
    let required = stride * (frame.height as usize).saturating_sub(1) + min_row;
    if frame.data.len() < required {
        return Err(format!(
            "buffer too short: {} bytes for {}x{} {:?} (need {})",
            frame.data.len(),
            frame.width,
            frame.height,
            frame.format,
            required
        ));
    }
    Ok(())
}

/// Drop row padding from an RGBA buffer
pub fn repack_rgba(data: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    let row_bytes = width as usize * BYTES_PER_PIXEL;
    let stride = (stride as usize).max(row_bytes);

    if stride == row_bytes && data.len() == row_bytes * height as usize {
        return data.to_vec();
    }

    let mut out = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        out.extend_from_slice(&data[start..start + row_bytes]);
    }
    out
}

/// Convert RGB24 to RGBA by adding alpha=255
pub fn rgb24_to_rgba(data: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    let row_bytes = width as usize * 3;
    let stride = (stride as usize).max(row_bytes);
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);

    for y in 0..height as usize {
        let row = &data[y * stride..y * stride + row_bytes];
        for chunk in row.chunks_exact(3) {
            rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
        }
    }
    rgba
}

/// Convert Gray8 to RGBA by expanding each byte to an opaque gray pixel
pub fn gray8_to_rgba(data: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    let row_bytes = width as usize;
    let stride = (stride as usize).max(row_bytes);
    let mut rgba = Vec::with_capacity(row_bytes * height as usize * 4);

    for y in 0..height as usize {
        let row = &data[y * stride..y * stride + row_bytes];
        for &gray in row {
            rgba.extend_from_slice(&[gray, gray, gray, 255]);
        }
    }
    rgba
}

/// YUYV (packed 4:2:2) to RGBA, BT.601 coefficients
///
/// Byte order Y0 U Y1 V; every 4-byte group carries two pixels.
pub fn yuyv_to_rgba(data: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    packed_422_to_rgba(data, width, height, stride, |chunk| {
        (chunk[0], chunk[2], chunk[1], chunk[3])
    })
}

/// UYVY (chroma-first 4:2:2) to RGBA
///
/// Byte order U Y0 V Y1; every 4-byte group carries two pixels.
pub fn uyvy_to_rgba(data: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    packed_422_to_rgba(data, width, height, stride, |chunk| {
        (chunk[1], chunk[3], chunk[0], chunk[2])
    })
}

/// Shared 4:2:2 loop; `order` extracts (y0, y1, u, v) from a 4-byte group
fn packed_422_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    order: impl Fn(&[u8]) -> (u8, u8, u8, u8),
) -> Vec<u8> {
    let row_bytes = width as usize * 2;
    let stride = (stride as usize).max(row_bytes);
    let width = width as usize;
    let mut rgba = Vec::with_capacity(width * height as usize * 4);

    for y in 0..height as usize {
        let row = &data[y * stride..y * stride + row_bytes];
        let mut emitted = 0usize;
        for chunk in row.chunks_exact(4) {
            let (y0, y1, u, v) = order(chunk);
            let u = u as f32 - 128.0;
            let v = v as f32 - 128.0;

            // BT.601 luma/chroma to RGB
            for luma in [y0, y1] {
                if emitted >= width {
                    break;
                }
                let luma = luma as f32;
                let r = (luma + 1.402 * v).clamp(0.0, 255.0) as u8;
                let g = (luma - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
                let b = (luma + 1.772 * u).clamp(0.0, 255.0) as u8;
                rgba.extend_from_slice(&[r, g, b, 255]);
                emitted += 1;
            }
        }
        // Odd trailing pixel on malformed widths renders black
        while emitted < width {
            rgba.extend_from_slice(&[0, 0, 0, 255]);
            emitted += 1;
        }
    }
    rgba
}

/// Rotate a tightly packed RGBA buffer clockwise.
///
/// Returns the rotated buffer with its (possibly swapped) dimensions.
pub fn rotate_rgba(
    data: Vec<u8>,
    width: u32,
    height: u32,
    rotation: SensorRotation,
) -> (Vec<u8>, u32, u32) {
    if rotation == SensorRotation::None {
        return (data, width, height);
    }

    let w = width as usize;
    let h = height as usize;
    let (dst_w, dst_h) = if rotation.swaps_dimensions() {
        (h, w)
    } else {
        (w, h)
    };

    let mut out = vec![0u8; data.len()];
    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match rotation {
                SensorRotation::Rotate90 => (h - 1 - y, x),
                SensorRotation::Rotate180 => (w - 1 - x, h - 1 - y),
                SensorRotation::Rotate270 => (y, w - 1 - x),
                SensorRotation::None => (x, y),
            };
            let src = (y * w + x) * BYTES_PER_PIXEL;
            let dst = (dy * dst_w + dx) * BYTES_PER_PIXEL;
            out[dst..dst + BYTES_PER_PIXEL].copy_from_slice(&data[src..src + BYTES_PER_PIXEL]);
        }
    }

    (out, dst_w as u32, dst_h as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn camera_frame(
        width: u32,
        height: u32,
        data: Vec<u8>,
        format: PixelFormat,
        stride: u32,
    ) -> CameraFrame {
        CameraFrame {
            width,
            height,
            data: Arc::from(data),
            format,
            stride,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn test_yuyv_white_converts_to_white() {
        // White: full luma, neutral chroma
        let yuyv = vec![255u8, 128, 255, 128];
        let rgba = yuyv_to_rgba(&yuyv, 2, 1, 4);

        assert_eq!(rgba.len(), 8);
        assert!(rgba[0] > 250); // R
        assert!(rgba[1] > 250); // G
        assert!(rgba[2] > 250); // B
        assert_eq!(rgba[3], 255); // A
    }

    #[test]
    fn test_uyvy_black_converts_to_black() {
        let uyvy = vec![128u8, 0, 128, 0];
        let rgba = uyvy_to_rgba(&uyvy, 2, 1, 4);

        assert_eq!(rgba.len(), 8);
        assert!(rgba[0] < 5);
        assert!(rgba[1] < 5);
        assert!(rgba[2] < 5);
        assert_eq!(rgba[7], 255);
    }

    #[test]
    fn test_rgb24_adds_opaque_alpha() {
        let rgb = vec![255u8, 128, 64, 0, 0, 0];
        let rgba = rgb24_to_rgba(&rgb, 2, 1, 6);

        assert_eq!(rgba, vec![255, 128, 64, 255, 0, 0, 0, 255]);
    }

    #[test]
    fn test_gray8_expands_to_gray_pixels() {
        let gray = vec![0u8, 128, 255];
        let rgba = gray8_to_rgba(&gray, 3, 1, 3);

        assert_eq!(rgba[0..4], [0, 0, 0, 255]);
        assert_eq!(rgba[4..8], [128, 128, 128, 255]);
        assert_eq!(rgba[8..12], [255, 255, 255, 255]);
    }

    #[test]
    fn test_repack_drops_row_padding() {
        // 1x2 RGBA with 4 bytes of padding per row
        let padded = vec![
            1u8, 2, 3, 4, 99, 99, 99, 99, //
            5, 6, 7, 8, 99, 99, 99, 99,
        ];
        let tight = repack_rgba(&padded, 1, 2, 8);

        assert_eq!(tight, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_rotate_90_clockwise() {
        // 2x1 image [A, B] becomes 1x2 with A on top
        let data = vec![10u8, 0, 0, 255, 20, 0, 0, 255];
        let (out, w, h) = rotate_rgba(data, 2, 1, SensorRotation::Rotate90);

        assert_eq!((w, h), (1, 2));
        assert_eq!(out[0], 10);
        assert_eq!(out[4], 20);
    }

    #[test]
    fn test_rotate_180_reverses_pixels() {
        let data = vec![10u8, 0, 0, 255, 20, 0, 0, 255];
        let (out, w, h) = rotate_rgba(data, 2, 1, SensorRotation::Rotate180);

        assert_eq!((w, h), (2, 1));
        assert_eq!(out[0], 20);
        assert_eq!(out[4], 10);
    }

    #[test]
    fn test_to_rgba_frame_repacks_and_rotates() {
        // 2x1 RGBA padded to stride 12, rotated 270: expect 1x2, B on top
        let data = vec![10u8, 0, 0, 255, 20, 0, 0, 255, 99, 99, 99, 99];
        let frame = camera_frame(2, 1, data, PixelFormat::RGBA, 12);

        let out = to_rgba_frame(&frame, SensorRotation::Rotate270).unwrap();

        assert_eq!((out.width(), out.height()), (1, 2));
        assert_eq!(out.pixel(0, 0)[0], 20);
        assert_eq!(out.pixel(0, 1)[0], 10);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let frame = camera_frame(4, 4, vec![0u8; 10], PixelFormat::RGBA, 16);
        assert!(to_rgba_frame(&frame, SensorRotation::None).is_err());
    }
}
