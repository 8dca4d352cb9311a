// SPDX-License-Identifier: GPL-3.0-only

//! Per-pixel channel splicing for anaglyph output
//!
//! The anaglyph effect is a pure per-pixel transform: the red channel comes
//! from one source image, green and blue from the other, and the viewer's
//! red/cyan glasses route each eye to its source. No blending, no lookup
//! tables, no neighborhood access.

use std::sync::Arc;

use crate::stereo::frame::{BYTES_PER_PIXEL, Extent, Frame};

/// Combine the red channel of one source with the green and blue channels of
/// the other over their shared extent.
///
/// Each output pixel is `(red.r, gb.g, gb.b, 255)`. The output extent is the
/// intersection of the source extents; sources are read on their own row
/// strides and never scaled or padded. Non-overlapping sources produce an
/// empty frame, not an error.
pub fn combine_channels(red: &Frame, green_blue: &Frame) -> Frame {
    let extent = red.extent().intersect(green_blue.extent());
    if extent.is_empty() {
        return Frame::empty();
    }

    let mut out = vec![0u8; extent.byte_len()];
    let row_bytes = extent.width as usize * BYTES_PER_PIXEL;

    for y in 0..extent.height {
        let red_row: &[[u8; 4]] = bytemuck::cast_slice(red.row(y));
        let gb_row: &[[u8; 4]] = bytemuck::cast_slice(green_blue.row(y));

        let start = y as usize * row_bytes;
        let out_row: &mut [[u8; 4]] = bytemuck::cast_slice_mut(&mut out[start..start + row_bytes]);

        for (x, pixel) in out_row.iter_mut().enumerate() {
            *pixel = [red_row[x][0], gb_row[x][1], gb_row[x][2], 255];
        }
    }

    Frame::new(extent.width, extent.height, Arc::from(out))
}

/// Output extent for a pair of sources without running the kernel
pub fn output_extent(a: &Frame, b: &Frame) -> Extent {
    a.extent().intersect(b.extent())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Frame {
        let mut data = Vec::with_capacity((width * height) as usize * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Frame::new(width, height, Arc::from(data))
    }

    #[test]
    fn test_red_channel_from_first_source_only() {
        // Red source is pure red, green/blue source is pure cyan
        let red_src = solid(4, 4, [200, 10, 20, 255]);
        let gb_src = solid(4, 4, [30, 180, 90, 255]);

        let out = combine_channels(&red_src, &gb_src);

        assert_eq!(out.pixel(0, 0), [200, 180, 90, 255]);
        assert_eq!(out.pixel(3, 3), [200, 180, 90, 255]);
    }

    #[test]
    fn test_alpha_is_always_opaque() {
        // Sources with transparent alpha still produce opaque output
        let a = solid(2, 2, [50, 60, 70, 0]);
        let b = solid(2, 2, [80, 90, 100, 10]);

        let out = combine_channels(&a, &b);

        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(out.pixel(x, y)[3], 255);
            }
        }
    }

    #[test]
    fn test_output_extent_is_intersection() {
        let a = solid(100, 100, [255, 0, 0, 255]);
        let b = solid(80, 120, [0, 255, 255, 255]);

        let out = combine_channels(&a, &b);

        assert_eq!(out.width(), 80);
        assert_eq!(out.height(), 100);
        assert_eq!(out.data().len(), 80 * 100 * 4);
    }

    #[test]
    fn test_wider_source_rows_are_read_on_their_own_stride() {
        // 3x1 gradient against a 2x1 source: output must read the gradient's
        // own row stride, not the truncated one
        let grad = Frame::new(
            3,
            2,
            Arc::from(vec![
                10u8, 0, 0, 255, 20, 0, 0, 255, 30, 0, 0, 255, //
                40, 0, 0, 255, 50, 0, 0, 255, 60, 0, 0, 255,
            ]),
        );
        let gb = solid(2, 2, [0, 100, 200, 255]);

        let out = combine_channels(&grad, &gb);

        assert_eq!(out.extent(), Extent::new(2, 2));
        assert_eq!(out.pixel(0, 0), [10, 100, 200, 255]);
        assert_eq!(out.pixel(1, 0), [20, 100, 200, 255]);
        assert_eq!(out.pixel(0, 1), [40, 100, 200, 255]);
        assert_eq!(out.pixel(1, 1), [50, 100, 200, 255]);
    }

    #[test]
    fn test_degenerate_sources_yield_empty_output() {
        let a = solid(4, 4, [1, 2, 3, 255]);
        let empty = Frame::empty();

        assert!(combine_channels(&a, &empty).is_empty());
        assert!(combine_channels(&empty, &a).is_empty());
        assert_eq!(output_extent(&a, &empty), Extent::new(0, 0));
    }
}
