// SPDX-License-Identifier: GPL-3.0-only

//! Canonical RGBA raster shared by the compositing core

use std::sync::Arc;

/// Bytes per pixel in the canonical RGBA layout
pub const BYTES_PER_PIXEL: usize = 4;

/// Rectangular bounds of a frame, anchored at the origin
///
/// Frames from different moments of the session may legally differ in size
/// (a still captured before a format switch versus the current live stream).
/// The compositor works on the intersection of the participating extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Largest extent contained in both, anchored at the origin
    pub fn intersect(&self, other: Extent) -> Extent {
        Extent {
            width: self.width.min(other.width),
            height: self.height.min(other.height),
        }
    }

    /// True when the extent contains no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Buffer length in bytes for a tightly packed RGBA raster of this extent
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Immutable RGBA frame, tightly packed at 4 bytes per pixel
///
/// Cloning is cheap (reference-counted payload); pixel data is never mutated
/// in place. Capture slots, live frames and composites all use this type, so
/// a latched still stays valid after the camera pipeline that produced it is
/// torn down.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl Frame {
    /// Wrap a tightly packed RGBA buffer.
    ///
    /// `data.len()` must equal `width * height * 4`.
    pub fn new(width: u32, height: u32, data: Arc<[u8]>) -> Self {
        debug_assert_eq!(
            data.len(),
            Extent::new(width, height).byte_len(),
            "frame buffer does not match {}x{} RGBA", width, height
        );
        Self {
            width,
            height,
            data,
        }
    }

    /// The zero-extent frame produced when sources do not overlap
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Arc::from([]),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.extent().is_empty()
    }

    /// Full pixel buffer (row-major RGBA)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the pixel buffer
    pub fn data_arc(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// One row of pixels as raw bytes
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Single pixel as `[r, g, b, a]`
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_intersection_takes_minimum_per_axis() {
        let a = Extent::new(100, 100);
        let b = Extent::new(80, 120);
        assert_eq!(a.intersect(b), Extent::new(80, 100));
        assert_eq!(b.intersect(a), Extent::new(80, 100));
    }

    #[test]
    fn test_extent_intersection_with_empty_is_empty() {
        let a = Extent::new(640, 480);
        let empty = Extent::new(0, 0);
        assert!(a.intersect(empty).is_empty());
        assert!(empty.intersect(a).is_empty());
    }

    #[test]
    fn test_frame_row_and_pixel_access() {
        // 2x2 frame: red, green / blue, white
        let data: Vec<u8> = vec![
            255, 0, 0, 255, 0, 255, 0, 255, //
            0, 0, 255, 255, 255, 255, 255, 255,
        ];
        let frame = Frame::new(2, 2, Arc::from(data));
        assert_eq!(frame.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(1, 0), [0, 255, 0, 255]);
        assert_eq!(frame.pixel(0, 1), [0, 0, 255, 255]);
        assert_eq!(frame.row(1).len(), 2 * BYTES_PER_PIXEL);
    }

    #[test]
    fn test_empty_frame_has_no_pixels() {
        let frame = Frame::empty();
        assert!(frame.is_empty());
        assert_eq!(frame.data().len(), 0);
    }
}
