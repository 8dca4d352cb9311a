// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for headless operation: listing cameras, two-shot
//! anaglyph capture with a repositioning countdown, and compositing two
//! existing image files offline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::channel::mpsc;

use stereo_camera::backends::camera::{self, CameraFormat};
use stereo_camera::config::Config;
use stereo_camera::constants::channels;
use stereo_camera::constants::timing::{FIRST_FRAME_TIMEOUT_SECS, WARMUP_MS};
use stereo_camera::errors::CameraError;
use stereo_camera::stereo::{EventReceiver, Frame, SessionEvent, StereoSession, compositor};
use stereo_camera::storage;

/// Print every usable camera with its top formats.
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let cameras = match camera::enumerate_cameras() {
        Ok(cameras) => cameras,
        Err(CameraError::NoCameraFound) => {
            println!("No cameras found.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Available cameras:");
    println!();
    for (index, device) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, device.name);

        let formats = camera::device_formats(device);
        if !formats.is_empty() {
            // One entry per resolution, keeping the fastest whole-fps rate
            let mut best_fps: BTreeMap<(u32, u32), u32> = BTreeMap::new();
            for format in &formats {
                let fps = format.framerate.map(|f| f.as_int()).unwrap_or(30);
                let entry = best_fps.entry((format.width, format.height)).or_insert(0);
                *entry = (*entry).max(fps);
            }

            // Largest first; three sizes are enough for a listing
            let mut sizes: Vec<((u32, u32), u32)> = best_fps.into_iter().collect();
            sizes.sort_by_key(|((w, h), _)| std::cmp::Reverse(w * h));
            let summary: Vec<String> = sizes
                .iter()
                .take(3)
                .map(|((w, h), fps)| format!("{}x{}@{}fps", w, h, fps))
                .collect();

            println!("      Formats: {}", summary.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Capture a stereo pair headlessly and save the anaglyph composite.
///
/// Latches the left still after warm-up, counts down `delay` seconds while
/// the user shifts the camera, then latches the right still. Ctrl+C during
/// the countdown cancels without saving.
pub fn take_photo(
    camera_index: usize,
    delay: u64,
    output: Option<PathBuf>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let cameras = camera::enumerate_cameras()?;
    if camera_index >= cameras.len() {
        return Err(format!(
            "No camera at index {}; 'stereo-camera list' shows {} device(s)",
            camera_index,
            cameras.len()
        )
        .into());
    }

    let device = &cameras[camera_index];
    println!("Using camera: {}", device.name);

    // Highest resolution for stills
    let formats = camera::device_formats(device);
    if formats.is_empty() {
        return Err("No formats available for camera".into());
    }
    let format = select_photo_format(&formats);
    println!("Capture format: {}x{}", format.width, format.height);

    let output_dir = resolve_output_dir(output.as_deref(), config);
    std::fs::create_dir_all(&output_dir)?;

    // Start the capture pipeline and the compositing session
    let (frame_sender, frame_receiver) = mpsc::channel(channels::FRAME_CHANNEL_CAPACITY);
    let (event_sender, mut events) = mpsc::channel(channels::EVENT_CHANNEL_CAPACITY);

    let capture = camera::start_capture(device, &format, frame_sender)?;
    let mut session = StereoSession::spawn(
        frame_receiver,
        event_sender,
        device.rotation,
        config.left_is_red,
    );
    let controls = session.controls();

    // Let exposure settle before trusting any capture
    println!("Starting camera...");
    wait_for_event(
        &mut events,
        Duration::from_secs(FIRST_FRAME_TIMEOUT_SECS),
        |event| matches!(event, SessionEvent::Composite(_)),
    )?;
    let warmup_start = Instant::now();
    while warmup_start.elapsed() < Duration::from_millis(WARMUP_MS) {
        drain_events(&mut events)?;
        std::thread::sleep(Duration::from_millis(16));
    }

    // Latch the left still. Waiting for two composites guarantees at least
    // one full frame was processed after the request.
    println!("Capturing left still...");
    drain_events(&mut events)?;
    controls.capture_left();
    let mut composites_seen = 0;
    wait_for_event(
        &mut events,
        Duration::from_secs(FIRST_FRAME_TIMEOUT_SECS),
        move |event| {
            if matches!(event, SessionEvent::Composite(_)) {
                composites_seen += 1;
            }
            composites_seen >= 2
        },
    )?;
    println!("Left still captured. Reposition the camera for the right eye view.");

    // Set up Ctrl+C handler for the countdown
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel.clone();
    ctrlc::set_handler(move || {
        cancel_clone.store(true, Ordering::SeqCst);
    })?;

    // Count down while the user shifts the camera
    let start = Instant::now();
    let target = Duration::from_secs(delay);
    while start.elapsed() < target {
        if cancel.load(Ordering::SeqCst) {
            println!();
            println!("Cancelled.");
            capture.stop();
            session.stop();
            return Ok(());
        }

        let remaining = target.saturating_sub(start.elapsed()).as_secs_f64().ceil() as u64;
        print!("\rCapturing right in: {}s ", remaining);
        std::io::Write::flush(&mut std::io::stdout())?;

        drain_events(&mut events)?;
        std::thread::sleep(Duration::from_millis(100));
    }
    println!();

    // Latch the right still - completes the pair
    controls.capture_right();
    wait_for_event(
        &mut events,
        Duration::from_secs(FIRST_FRAME_TIMEOUT_SECS),
        |event| matches!(event, SessionEvent::BothCaptured),
    )?;
    println!("Right still captured.");

    let composite = session
        .latest_composite()
        .ok_or("No composite produced")?;
    capture.stop();
    session.stop();

    let saved = storage::save_composite_sync(&composite, &output_dir)?;

    // A file path as --output means rename after the timestamped save
    if let Some(user_path) = output
        && !user_path.is_dir()
    {
        std::fs::rename(&saved, &user_path)?;
        println!("Composite saved: {}", user_path.display());
        return Ok(());
    }

    println!("Composite saved: {}", saved.display());
    Ok(())
}

/// Build an anaglyph from two existing image files.
///
/// The left image feeds the red channel unless `right_is_red` is set.
pub fn composite_files(
    left: PathBuf,
    right: PathBuf,
    output: Option<PathBuf>,
    right_is_red: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let left_frame = load_rgba_frame(&left)?;
    let right_frame = load_rgba_frame(&right)?;

    println!(
        "Left:  {} ({}x{})",
        left.display(),
        left_frame.width(),
        left_frame.height()
    );
    println!(
        "Right: {} ({}x{})",
        right.display(),
        right_frame.width(),
        right_frame.height()
    );

    // Both slots are filled, so the live argument never shows through
    let left_is_red = !right_is_red;
    let composite = compositor::composite(
        &left_frame,
        Some(&left_frame),
        Some(&right_frame),
        left_is_red,
    );
    if composite.is_empty() {
        return Err("Source images have no overlapping area".into());
    }
    println!("Composite: {}x{}", composite.width(), composite.height());

    let output_dir = resolve_output_dir(output.as_deref(), config);
    let saved = storage::save_composite_sync(&composite, &output_dir)?;

    if let Some(user_path) = output
        && !user_path.is_dir()
    {
        std::fs::rename(&saved, &user_path)?;
        println!("Composite saved: {}", user_path.display());
        return Ok(());
    }

    println!("Composite saved: {}", saved.display());
    Ok(())
}

/// Resolve the directory a composite should land in. A file path counts as
/// its parent directory; no path means the default photo directory.
fn resolve_output_dir(output: Option<&Path>, config: &Config) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.to_path_buf(),
        Some(path) => path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| storage::photo_directory(&config.save_folder)),
        None => storage::photo_directory(&config.save_folder),
    }
}

/// Pick the still-capture format: largest area, known rates breaking ties.
fn select_photo_format(formats: &[CameraFormat]) -> CameraFormat {
    formats
        .iter()
        .max_by_key(|f| {
            let rate = f.framerate.map(|r| r.as_int()).unwrap_or(0);
            (f.width * f.height, rate)
        })
        .cloned()
        .unwrap_or_else(|| formats[0].clone())
}

/// Load an image file as a canonical RGBA frame
fn load_rgba_frame(path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
    let img = image::open(path).map_err(|e| format!("Failed to load {}: {}", path.display(), e))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Frame::new(
        width,
        height,
        Arc::from(rgba.into_raw().into_boxed_slice()),
    ))
}

/// Drain pending session events, surfacing a stream error if one arrived.
fn drain_events(events: &mut EventReceiver) -> Result<(), Box<dyn std::error::Error>> {
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Error(message) = event {
            return Err(message.into());
        }
    }
    Ok(())
}

/// Poll the event channel until `pred` matches or the timeout passes.
fn wait_for_event(
    events: &mut EventReceiver,
    timeout: Duration,
    mut pred: impl FnMut(&SessionEvent) -> bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        match events.try_recv() {
            Ok(event) => {
                if let SessionEvent::Error(message) = &event {
                    return Err(message.clone().into());
                }
                if pred(&event) {
                    return Ok(());
                }
            }
            Err(_) => {
                // No event available yet, wait a bit
                std::thread::sleep(Duration::from_millis(16));
            }
        }
    }
    Err("Timed out waiting for the camera".into())
}
