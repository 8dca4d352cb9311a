// SPDX-License-Identifier: GPL-3.0-only

//! Source resolution for the per-frame anaglyph pass

use crate::stereo::frame::Frame;
use crate::stereo::kernel;

/// Build the anaglyph for one live frame.
///
/// An empty slot falls back to the live frame for that side, so the preview
/// degrades gracefully: with no stills the output equals the live frame,
/// with one still half the image pair is live, with both stills the frame
/// is a full anaglyph. `left_is_red` routes the left source into the red
/// channel; otherwise the right source feeds red.
///
/// Pure function of its inputs; runs once per incoming frame and never
/// fails. Degenerate geometry (a zero-extent source) produces a zero-extent
/// output and the stream continues.
pub fn composite(
    live: &Frame,
    left_slot: Option<&Frame>,
    right_slot: Option<&Frame>,
    left_is_red: bool,
) -> Frame {
    let effective_left = left_slot.unwrap_or(live);
    let effective_right = right_slot.unwrap_or(live);

    let (red_src, gb_src) = if left_is_red {
        (effective_left, effective_right)
    } else {
        (effective_right, effective_left)
    };

    kernel::combine_channels(red_src, gb_src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Frame {
        let mut data = Vec::with_capacity((width * height) as usize * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Frame::new(width, height, Arc::from(data))
    }

    #[test]
    fn test_no_slots_passes_live_frame_through() {
        let live = solid(8, 8, [12, 34, 56, 255]);

        let out = composite(&live, None, None, true);

        assert_eq!(out.extent(), live.extent());
        assert_eq!(out.pixel(4, 4), [12, 34, 56, 255]);
    }

    #[test]
    fn test_single_slot_feeds_its_side_only() {
        let live = solid(8, 8, [0, 200, 200, 255]);
        let left = solid(8, 8, [150, 1, 2, 255]);

        // left_is_red: the captured left still feeds red, live feeds green/blue
        let out = composite(&live, Some(&left), None, true);
        assert_eq!(out.pixel(0, 0), [150, 200, 200, 255]);

        // flag off: live feeds red, the left still feeds green/blue
        let out = composite(&live, Some(&left), None, false);
        assert_eq!(out.pixel(0, 0), [0, 1, 2, 255]);
    }

    #[test]
    fn test_toggle_swaps_sources_without_touching_slots() {
        let live = solid(4, 4, [9, 9, 9, 255]);
        let left = solid(4, 4, [100, 101, 102, 255]);
        let right = solid(4, 4, [200, 201, 202, 255]);

        let a = composite(&live, Some(&left), Some(&right), true);
        let b = composite(&live, Some(&left), Some(&right), false);

        assert_eq!(a.pixel(1, 1), [100, 201, 202, 255]);
        assert_eq!(b.pixel(1, 1), [200, 101, 102, 255]);
    }

    #[test]
    fn test_mismatched_slot_sizes_intersect() {
        let live = solid(100, 100, [5, 5, 5, 255]);
        let left = solid(80, 120, [50, 0, 0, 255]);

        let out = composite(&live, Some(&left), None, true);

        assert_eq!(out.width(), 80);
        assert_eq!(out.height(), 100);
    }

    #[test]
    fn test_empty_live_frame_degrades_to_empty_output() {
        let live = Frame::empty();
        let left = solid(8, 8, [1, 2, 3, 255]);

        let out = composite(&live, Some(&left), None, true);

        assert!(out.is_empty());
    }
}
