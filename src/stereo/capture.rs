// SPDX-License-Identifier: GPL-3.0-only

//! Capture state machine: intent flags, latched stills, completion latch

use crate::stereo::frame::Frame;

/// What one frame did to the capture state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    /// The frame was latched as the new left still
    pub left_latched: bool,
    /// The frame was latched as the new right still
    pub right_latched: bool,
    /// This frame completed the pair; reported once per transition
    pub both_just_captured: bool,
}

impl FrameOutcome {
    /// True when the frame changed either slot
    pub fn latched_any(&self) -> bool {
        self.left_latched || self.right_latched
    }
}

/// Tracks capture requests and the latched stills.
///
/// A capture gesture does not copy the current image; it arms an intent flag
/// that the next arriving frame consumes. Requests are idempotent until that
/// frame arrives: last request wins, there is no queue. Slots survive until
/// an explicit clear or a fresh capture for the same side.
///
/// Single-threaded by design. Every method runs on the frame context;
/// cross-thread gestures reach it through the session controls, which the
/// worker drains into these methods before offering each frame.
#[derive(Debug, Default)]
pub struct CaptureState {
    want_left: bool,
    want_right: bool,
    left: Option<Frame>,
    right: Option<Frame>,
    both_announced: bool,
}

impl CaptureState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the left capture; the next arriving frame satisfies it
    pub fn request_left(&mut self) {
        self.want_left = true;
    }

    /// Arm the right capture; the next arriving frame satisfies it
    pub fn request_right(&mut self) {
        self.want_right = true;
    }

    /// Drop both stills and re-arm the completion notification.
    ///
    /// Pending intent flags are left untouched; a request made just before
    /// the clear still applies to the next frame.
    pub fn clear(&mut self) {
        self.left = None;
        self.right = None;
        self.both_announced = false;
    }

    /// Offer one frame, in arrival order, consuming pending intents.
    ///
    /// A single frame may satisfy both a pending left and a pending right
    /// request; both slots then hold the same image. `both_just_captured`
    /// is reported exactly once per transition into the both-captured
    /// state, never again on later frames while both slots stay filled.
    pub fn on_frame(&mut self, frame: &Frame) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();

        if self.want_left {
            self.left = Some(frame.clone());
            self.want_left = false;
            outcome.left_latched = true;
        }
        if self.want_right {
            self.right = Some(frame.clone());
            self.want_right = false;
            outcome.right_latched = true;
        }

        if !self.both_announced && self.both_captured() {
            self.both_announced = true;
            outcome.both_just_captured = true;
        }

        outcome
    }

    /// True once both slots hold a still
    pub fn both_captured(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }

    /// The latched left still, if any
    pub fn left(&self) -> Option<&Frame> {
        self.left.as_ref()
    }

    /// The latched right still, if any
    pub fn right(&self) -> Option<&Frame> {
        self.right.as_ref()
    }
}
