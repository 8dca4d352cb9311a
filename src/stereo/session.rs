// SPDX-License-Identifier: GPL-3.0-only

//! Frame-processing session
//!
//! All capture state lives on one dedicated worker thread that drains the
//! camera frame channel. Each frame is processed fully (gesture drain,
//! latching, composite, handoff) before the next, so the capture state
//! machine never sees concurrent access. The interactive side talks to the
//! worker exclusively through [`SessionControls`] atomics and receives
//! results as [`SessionEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use futures::StreamExt;
use futures::channel::mpsc;
use tracing::{debug, info, warn};

use crate::backends::camera::convert;
use crate::backends::camera::types::{FrameReceiver, SensorRotation};
use crate::errors::CameraError;
use crate::stereo::capture::CaptureState;
use crate::stereo::compositor;
use crate::stereo::frame::Frame;

/// Events published by the session worker
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The first frame has been processed; the preview is live
    Started,
    /// A fresh composite for display
    Composite(Frame),
    /// Both stills are latched; fires once per completed pair
    BothCaptured,
    /// The session ended abnormally; the message is user-facing
    Error(String),
}

/// Event sender used by the worker
pub type EventSender = mpsc::Sender<SessionEvent>;

/// Event receiver drained by the viewer
pub type EventReceiver = mpsc::Receiver<SessionEvent>;

/// Cross-thread control surface for a running session.
///
/// The interactive context writes; the worker consumes. Intent flags are
/// swapped to false when the next frame picks them up, so a gesture applies
/// to exactly one upcoming frame and repeated gestures before that frame
/// collapse into one (last request wins). The channel assignment is read
/// once at the start of each compositing pass and therefore never changes
/// mid-frame.
#[derive(Debug, Default)]
pub struct SessionControls {
    want_left: AtomicBool,
    want_right: AtomicBool,
    clear_pending: AtomicBool,
    left_is_red: AtomicBool,
}

impl SessionControls {
    pub fn new(left_is_red: bool) -> Self {
        Self {
            left_is_red: AtomicBool::new(left_is_red),
            ..Default::default()
        }
    }

    /// Ask the next frame to become the left still
    pub fn capture_left(&self) {
        self.want_left.store(true, Ordering::Release);
    }

    /// Ask the next frame to become the right still
    pub fn capture_right(&self) {
        self.want_right.store(true, Ordering::Release);
    }

    /// Drop both stills before the next frame is composited
    pub fn clear(&self) {
        self.clear_pending.store(true, Ordering::Release);
    }

    /// Current channel assignment
    pub fn left_is_red(&self) -> bool {
        self.left_is_red.load(Ordering::Acquire)
    }

    pub fn set_left_is_red(&self, value: bool) {
        self.left_is_red.store(value, Ordering::Release);
    }

    /// Flip the channel assignment, returning the new value
    pub fn toggle_left_is_red(&self) -> bool {
        !self.left_is_red.fetch_xor(true, Ordering::AcqRel)
    }

    fn take_left(&self) -> bool {
        self.want_left.swap(false, Ordering::AcqRel)
    }

    fn take_right(&self) -> bool {
        self.want_right.swap(false, Ordering::AcqRel)
    }

    fn take_clear(&self) -> bool {
        self.clear_pending.swap(false, Ordering::AcqRel)
    }
}

/// A running compositing session over a stream of camera frames.
///
/// Owns the worker thread. Dropping the session (or calling [`stop`])
/// signals the worker and joins it; the frame channel closing on its own,
/// without a stop request, is reported as a stream error. The camera
/// pipeline feeding the channel is owned by the caller and must be torn
/// down first so the channel actually closes.
///
/// [`stop`]: StereoSession::stop
pub struct StereoSession {
    controls: Arc<SessionControls>,
    snapshot: Arc<Mutex<Option<Frame>>>,
    stop_signal: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl StereoSession {
    /// Spawn the worker over a camera frame stream.
    ///
    /// `rotation` is the device's sensor orientation hint, applied while
    /// converting each frame to the canonical raster. `left_is_red` seeds
    /// the channel assignment from the persisted configuration.
    pub fn spawn(
        frames: FrameReceiver,
        events: EventSender,
        rotation: SensorRotation,
        left_is_red: bool,
    ) -> Self {
        let controls = Arc::new(SessionControls::new(left_is_red));
        let snapshot: Arc<Mutex<Option<Frame>>> = Arc::new(Mutex::new(None));
        let stop_signal = Arc::new(AtomicBool::new(false));

        info!(rotation = %rotation, left_is_red, "Starting session worker");

        let worker = thread::spawn({
            let controls = Arc::clone(&controls);
            let snapshot = Arc::clone(&snapshot);
            let stop_signal = Arc::clone(&stop_signal);
            move || run_worker(frames, events, controls, snapshot, stop_signal, rotation)
        });

        Self {
            controls,
            snapshot,
            stop_signal,
            worker: Some(worker),
        }
    }

    /// Shared handle to the control surface
    pub fn controls(&self) -> Arc<SessionControls> {
        Arc::clone(&self.controls)
    }

    /// Snapshot of the most recent composite (cheap clone, copy-on-read)
    pub fn latest_composite(&self) -> Option<Frame> {
        self.snapshot.lock().ok()?.clone()
    }

    /// Signal the worker and wait for it to finish.
    ///
    /// Drop the frame producer first; the worker wakes on channel closure.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            debug!("Waiting for session worker to finish");
            if handle.join().is_err() {
                warn!("Session worker panicked");
            }
        }
    }
}

impl Drop for StereoSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            debug!("StereoSession dropped, stopping worker");
            self.stop();
        }
    }
}

fn run_worker(
    mut frames: FrameReceiver,
    mut events: EventSender,
    controls: Arc<SessionControls>,
    snapshot: Arc<Mutex<Option<Frame>>>,
    stop_signal: Arc<AtomicBool>,
    rotation: SensorRotation,
) {
    debug!("Session worker thread started");

    let mut state = CaptureState::new();
    let mut started = false;

    loop {
        if stop_signal.load(Ordering::SeqCst) {
            debug!("Stop signal received");
            break;
        }

        // Blocks until the next frame; channel closure wakes us up
        let Some(camera_frame) = pollster::block_on(frames.next()) else {
            if !stop_signal.load(Ordering::SeqCst) {
                warn!("Frame stream closed without a stop request");
                let _ = events.try_send(SessionEvent::Error(
                    CameraError::Disconnected.user_message().to_string(),
                ));
            }
            break;
        };

        let live = match convert::to_rgba_frame(&camera_frame, rotation) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable frame");
                continue;
            }
        };

        if !started {
            started = true;
            info!(
                width = live.width(),
                height = live.height(),
                "First frame processed"
            );
            let _ = events.try_send(SessionEvent::Started);
        }

        // Gestures armed since the previous frame apply to this one
        if controls.take_clear() {
            info!("Clearing captured stills");
            state.clear();
        }
        if controls.take_left() {
            state.request_left();
        }
        if controls.take_right() {
            state.request_right();
        }

        let outcome = state.on_frame(&live);
        if outcome.left_latched {
            info!(extent = %live.extent(), "Left still latched");
        }
        if outcome.right_latched {
            info!(extent = %live.extent(), "Right still latched");
        }

        // Read once per pass so a concurrent toggle cannot split a frame
        let left_is_red = controls.left_is_red();
        let composite = compositor::composite(&live, state.left(), state.right(), left_is_red);

        if let Ok(mut guard) = snapshot.lock() {
            *guard = Some(composite.clone());
        }

        if outcome.both_just_captured {
            info!("Both stills captured");
            let _ = events.try_send(SessionEvent::BothCaptured);
        }

        // Composites are droppable; a slow consumer only loses staleness
        let _ = events.try_send(SessionEvent::Composite(composite));
    }

    debug!("Session worker thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controls_intents_are_consumed_once() {
        let controls = SessionControls::new(false);

        controls.capture_left();
        controls.capture_left();
        assert!(controls.take_left());
        assert!(!controls.take_left());
        assert!(!controls.take_right());
    }

    #[test]
    fn test_controls_toggle_returns_new_value() {
        let controls = SessionControls::new(false);

        assert!(controls.toggle_left_is_red());
        assert!(controls.left_is_red());
        assert!(!controls.toggle_left_is_red());
        assert!(!controls.left_is_red());
    }

    #[test]
    fn test_controls_clear_is_independent_of_intents() {
        let controls = SessionControls::new(true);

        controls.capture_right();
        controls.clear();
        assert!(controls.take_clear());
        assert!(controls.take_right());
        assert!(!controls.take_clear());
    }
}
