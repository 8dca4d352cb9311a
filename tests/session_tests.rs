// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests driving a full session over a synthetic frame stream
//!
//! These spawn the real worker thread and talk to it the way the viewer
//! does: frames in through the bounded channel, gestures through the
//! control surface, results out through session events.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::channel::mpsc;

use stereo_camera::backends::camera::types::{CameraFrame, PixelFormat, SensorRotation};
use stereo_camera::errors::CameraError;
use stereo_camera::stereo::{EventReceiver, SessionEvent, StereoSession};

fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> CameraFrame {
    let mut data = Vec::with_capacity((width * height) as usize * 4);
    for _ in 0..width * height {
        data.extend_from_slice(&rgba);
    }
    CameraFrame {
        width,
        height,
        data: Arc::from(data),
        format: PixelFormat::RGBA,
        stride: width * 4,
        captured_at: Instant::now(),
    }
}

/// Poll the event channel until `pred` matches or the timeout passes.
fn next_matching(
    events: &mut EventReceiver,
    timeout: Duration,
    mut pred: impl FnMut(&SessionEvent) -> bool,
) -> Option<SessionEvent> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match events.try_recv() {
            Ok(event) => {
                if pred(&event) {
                    return Some(event);
                }
            }
            Err(_) => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    None
}

/// Drain events until `n` composites have been seen, returning everything.
fn collect_until_composites(
    events: &mut EventReceiver,
    n: usize,
    timeout: Duration,
) -> Vec<SessionEvent> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    let mut composites = 0;
    while Instant::now() < deadline && composites < n {
        match events.try_recv() {
            Ok(event) => {
                if matches!(event, SessionEvent::Composite(_)) {
                    composites += 1;
                }
                seen.push(event);
            }
            Err(_) => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    seen
}

#[test]
fn test_session_passes_live_frames_through_untouched() {
    let (mut frame_tx, frame_rx) = mpsc::channel(10);
    let (event_tx, mut events) = mpsc::channel(64);

    let mut session = StereoSession::spawn(frame_rx, event_tx, SensorRotation::None, true);

    frame_tx
        .try_send(solid_frame(4, 4, [10, 20, 30, 255]))
        .expect("send frame");

    let event = next_matching(&mut events, Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Composite(_))
    })
    .expect("composite should arrive");

    let SessionEvent::Composite(frame) = event else {
        unreachable!();
    };
    assert_eq!(frame.pixel(0, 0), [10, 20, 30, 255]);
    assert_eq!((frame.width(), frame.height()), (4, 4));

    drop(frame_tx);
    session.stop();
}

#[test]
fn test_session_latches_left_still_into_the_red_channel() {
    let (mut frame_tx, frame_rx) = mpsc::channel(10);
    let (event_tx, mut events) = mpsc::channel(64);

    let mut session = StereoSession::spawn(frame_rx, event_tx, SensorRotation::None, true);
    let controls = session.controls();

    // Frame 1 is plain preview; frame 2 becomes the left still; frame 3
    // shows the half-latched composite. Waiting for frame 1's composite
    // before arming keeps the latch target unambiguous.
    frame_tx
        .try_send(solid_frame(4, 4, [9, 9, 9, 255]))
        .expect("send frame");
    next_matching(&mut events, Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Composite(_))
    })
    .expect("preview composite should arrive");

    controls.capture_left();
    frame_tx
        .try_send(solid_frame(4, 4, [200, 11, 12, 255]))
        .expect("send frame");
    frame_tx
        .try_send(solid_frame(4, 4, [90, 100, 50, 255]))
        .expect("send frame");

    // left_is_red: red from the latched still, green/blue from live
    let matched = next_matching(&mut events, Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Composite(f) if f.pixel(0, 0) == [200, 100, 50, 255])
    });
    assert!(
        matched.is_some(),
        "composite should mix the left still's red with the live frame"
    );

    drop(frame_tx);
    session.stop();
}

#[test]
fn test_session_toggle_swaps_channel_sources_mid_stream() {
    let (mut frame_tx, frame_rx) = mpsc::channel(10);
    let (event_tx, mut events) = mpsc::channel(64);

    let mut session = StereoSession::spawn(frame_rx, event_tx, SensorRotation::None, true);
    let controls = session.controls();

    controls.capture_left();
    frame_tx
        .try_send(solid_frame(4, 4, [200, 11, 12, 255]))
        .expect("send frame");
    frame_tx
        .try_send(solid_frame(4, 4, [90, 100, 50, 255]))
        .expect("send frame");

    let matched = next_matching(&mut events, Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Composite(f) if f.pixel(0, 0) == [200, 100, 50, 255])
    });
    assert!(matched.is_some(), "left-red composite should arrive");

    // Flip the assignment; the next frame swaps sources without relatching
    controls.set_left_is_red(false);
    frame_tx
        .try_send(solid_frame(4, 4, [90, 100, 50, 255]))
        .expect("send frame");

    let matched = next_matching(&mut events, Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Composite(f) if f.pixel(0, 0) == [90, 11, 12, 255])
    });
    assert!(
        matched.is_some(),
        "after the toggle the live frame should feed red and the still green/blue"
    );

    drop(frame_tx);
    session.stop();
}

#[test]
fn test_both_captured_fires_once_per_pair_and_rearms_on_clear() {
    let (mut frame_tx, frame_rx) = mpsc::channel(10);
    let (event_tx, mut events) = mpsc::channel(64);

    let mut session = StereoSession::spawn(frame_rx, event_tx, SensorRotation::None, false);
    let controls = session.controls();

    // Step one frame at a time so every gesture targets a known frame
    let step = Duration::from_secs(2);
    let mut seen = Vec::new();

    frame_tx
        .try_send(solid_frame(2, 2, [1, 1, 1, 255]))
        .expect("send frame");
    seen.extend(collect_until_composites(&mut events, 1, step));

    controls.capture_left();
    frame_tx
        .try_send(solid_frame(2, 2, [2, 2, 2, 255]))
        .expect("send frame");
    seen.extend(collect_until_composites(&mut events, 1, step));

    controls.capture_right();
    frame_tx
        .try_send(solid_frame(2, 2, [3, 3, 3, 255]))
        .expect("send frame");
    seen.extend(collect_until_composites(&mut events, 1, step));

    // Extra frame while both stay latched must not re-announce
    frame_tx
        .try_send(solid_frame(2, 2, [4, 4, 4, 255]))
        .expect("send frame");
    seen.extend(collect_until_composites(&mut events, 1, step));

    // Clear re-arms; a frame satisfying both sides completes a second pair
    controls.clear();
    controls.capture_left();
    controls.capture_right();
    frame_tx
        .try_send(solid_frame(2, 2, [5, 5, 5, 255]))
        .expect("send frame");
    seen.extend(collect_until_composites(&mut events, 1, step));

    let composites = seen
        .iter()
        .filter(|e| matches!(e, SessionEvent::Composite(_)))
        .count();
    let announcements = seen
        .iter()
        .filter(|e| matches!(e, SessionEvent::BothCaptured))
        .count();

    assert_eq!(composites, 5, "every frame should produce a composite");
    assert_eq!(
        announcements, 2,
        "completion should fire once per pair: the first pair and the post-clear pair"
    );

    drop(frame_tx);
    session.stop();
}

#[test]
fn test_snapshot_holds_the_latest_composite() {
    let (mut frame_tx, frame_rx) = mpsc::channel(10);
    let (event_tx, mut events) = mpsc::channel(64);

    let mut session = StereoSession::spawn(frame_rx, event_tx, SensorRotation::None, true);

    assert!(session.latest_composite().is_none());

    frame_tx
        .try_send(solid_frame(2, 2, [50, 60, 70, 255]))
        .expect("send frame");
    next_matching(&mut events, Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Composite(_))
    })
    .expect("composite should arrive");

    let snapshot = session.latest_composite().expect("snapshot should be set");
    assert_eq!(snapshot.pixel(1, 1), [50, 60, 70, 255]);

    drop(frame_tx);
    session.stop();
}

#[test]
fn test_stream_closure_without_stop_reports_the_disconnect_message() {
    let (frame_tx, frame_rx) = mpsc::channel::<CameraFrame>(10);
    let (event_tx, mut events) = mpsc::channel(64);

    let mut session = StereoSession::spawn(frame_rx, event_tx, SensorRotation::None, false);

    // Closing the channel with no stop request simulates the camera dying
    drop(frame_tx);

    let event = next_matching(&mut events, Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Error(_))
    })
    .expect("stream closure should surface an error event");

    let SessionEvent::Error(message) = event else {
        unreachable!();
    };
    assert_eq!(message, CameraError::Disconnected.user_message());

    session.stop();
}

#[test]
fn test_session_applies_sensor_rotation_to_frames() {
    let (mut frame_tx, frame_rx) = mpsc::channel(10);
    let (event_tx, mut events) = mpsc::channel(64);

    let mut session = StereoSession::spawn(frame_rx, event_tx, SensorRotation::Rotate90, true);

    // 2x1 frame [A, B]; rotated 90 clockwise it becomes 1x2 with A on top
    let frame = CameraFrame {
        width: 2,
        height: 1,
        data: Arc::from(vec![10u8, 0, 0, 255, 20, 0, 0, 255]),
        format: PixelFormat::RGBA,
        stride: 8,
        captured_at: Instant::now(),
    };
    frame_tx.try_send(frame).expect("send frame");

    let event = next_matching(&mut events, Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Composite(_))
    })
    .expect("composite should arrive");

    let SessionEvent::Composite(out) = event else {
        unreachable!();
    };
    assert_eq!((out.width(), out.height()), (1, 2));
    assert_eq!(out.pixel(0, 0)[0], 10);
    assert_eq!(out.pixel(0, 1)[0], 20);

    drop(frame_tx);
    session.stop();
}
