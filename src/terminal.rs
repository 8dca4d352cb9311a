// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based stereo viewer
//!
//! Renders the live anaglyph composite using Unicode half-block characters
//! for improved vertical resolution. Keys latch the left and right stills,
//! flip the red/cyan assignment and save the finished composite.

use std::io::{self, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::channel::mpsc;
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use tracing::{debug, error, info};

use crate::backends::camera::{self, CameraDevice, CameraFormat, CaptureHandle};
use crate::config::Config;
use crate::constants::channels;
use crate::constants::formats::{PREVIEW_HEIGHT, PREVIEW_WIDTH};
use crate::constants::timing::POLL_INTERVAL_MS;
use crate::errors::StorageError;
use crate::stereo::{EventReceiver, Extent, Frame, SessionControls, SessionEvent, StereoSession};
use crate::storage;

/// Run the terminal stereo viewer
pub fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    // Raw mode and the alternate screen for the duration of the run
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, config);

    // Put the terminal back whatever the outcome
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// A camera feeding a compositing session. Everything here must be torn
/// down together when switching devices.
struct ActiveSession {
    capture: Option<CaptureHandle>,
    session: StereoSession,
    controls: Arc<SessionControls>,
    events: EventReceiver,
}

impl ActiveSession {
    fn open(device: &CameraDevice, config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        info!(device = %device.name, "Initializing camera");

        let formats = camera::device_formats(device);
        if formats.is_empty() {
            return Err(format!("No formats available for camera: {}", device.name).into());
        }

        let format = select_terminal_format(&formats);
        info!(format = %format, "Selected format");

        let (frame_sender, frame_receiver) = mpsc::channel(channels::FRAME_CHANNEL_CAPACITY);
        let (event_sender, event_receiver) = mpsc::channel(channels::EVENT_CHANNEL_CAPACITY);

        let capture = camera::start_capture(device, &format, frame_sender)?;
        let session = StereoSession::spawn(
            frame_receiver,
            event_sender,
            device.rotation,
            config.left_is_red,
        );
        let controls = session.controls();

        Ok(Self {
            capture: Some(capture),
            session,
            controls,
            events: event_receiver,
        })
    }

    /// Stop capture first so the frame channel closes and the worker wakes.
    fn close(mut self) {
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
        self.session.stop();
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let cameras = camera::enumerate_cameras().map_err(|e| e.user_message())?;
    info!(count = cameras.len(), "Found cameras");

    let multi_camera = cameras.len() > 1;
    let mut camera_index = cameras
        .iter()
        .position(|c| Some(c.path.as_str()) == config.last_camera_path.as_deref())
        .unwrap_or(0);

    let mut active = ActiveSession::open(&cameras[camera_index], &config)?;

    // Saves run off-thread; results come back through a plain channel
    // drained by the UI loop.
    let runtime = tokio::runtime::Runtime::new()?;
    let (save_tx, save_rx) = std_mpsc::channel::<Result<PathBuf, StorageError>>();

    let mut frame_widget = FrameWidget::new();
    let mut show_help = false;
    let mut status_message = build_status_message(multi_camera, config.left_is_red);
    let mut error_message: Option<String> = None;
    let mut last_saved: Option<PathBuf> = None;

    loop {
        // Drain session events - keep only the newest composite for display
        while let Ok(event) = active.events.try_recv() {
            match event {
                SessionEvent::Started => {
                    debug!("Session started");
                }
                SessionEvent::Composite(frame) => {
                    frame_widget.update_frame(frame);
                }
                SessionEvent::BothCaptured => {
                    // Lock the pair's aspect so later preview sizes cannot
                    // reframe the captured composition
                    if let Some(composite) = active.session.latest_composite() {
                        frame_widget.lock_aspect(composite.extent());
                    }
                    status_message = "Both stills captured".to_string();
                }
                SessionEvent::Error(message) => {
                    error_message = Some(message);
                }
            }
        }

        // Completed background saves
        while let Ok(result) = save_rx.try_recv() {
            match result {
                Ok(path) => {
                    status_message = format!("Saved: {}", path.display());
                    last_saved = Some(path);
                }
                Err(e) => {
                    error!(error = %e, "Failed to save composite");
                    status_message = format!("Error: {}", e);
                }
            }
        }

        terminal.draw(|f| {
            let area = f.area();

            // Bottom line belongs to the status bar
            let preview_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(1),
            };

            if let Some(message) = &error_message {
                f.render_widget(MessageWidget { message }, preview_area);
            } else {
                f.render_widget(&frame_widget, preview_area);
            }

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };

            let status = StatusBar {
                message: &status_message,
            };
            f.render_widget(status, status_area);
        })?;

        // Poll keys with a timeout so frames keep flowing between presses
        if event::poll(Duration::from_millis(POLL_INTERVAL_MS))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            // Ctrl+C always quits
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                break;
            }

            match key.code {
                // Latch the next frame as the left or right still
                KeyCode::Char('l') => {
                    show_help = false;
                    active.controls.capture_left();
                    status_message = "Left captures next frame".to_string();
                }
                KeyCode::Char('r') => {
                    show_help = false;
                    active.controls.capture_right();
                    status_message = "Right captures next frame".to_string();
                }
                // Drop both stills and follow the live feed again
                KeyCode::Char('c') => {
                    show_help = false;
                    active.controls.clear();
                    frame_widget.unlock_aspect();
                    status_message = "Cleared".to_string();
                }
                // Swap which eye feeds the red channel, persisted immediately
                KeyCode::Char('t') => {
                    show_help = false;
                    let left_is_red = active.controls.toggle_left_is_red();
                    config.left_is_red = left_is_red;
                    config.save();
                    status_message = build_status_message(multi_camera, left_is_red);
                }
                // Save the current composite
                KeyCode::Char('s') => {
                    show_help = false;
                    match active.session.latest_composite() {
                        Some(frame) if !frame.is_empty() => {
                            let dir = storage::photo_directory(&config.save_folder);
                            let sender = save_tx.clone();
                            runtime.spawn(async move {
                                let result = storage::save_composite(frame, dir).await;
                                let _ = sender.send(result);
                            });
                            status_message = "Saving...".to_string();
                        }
                        _ => {
                            status_message = "Nothing to save yet".to_string();
                        }
                    }
                }
                // Open the last saved composite in the system viewer
                KeyCode::Char('o') => {
                    show_help = false;
                    let dir = storage::photo_directory(&config.save_folder);
                    let target = last_saved
                        .clone()
                        .or_else(|| storage::latest_composite_path(&dir));
                    match target {
                        Some(path) => {
                            storage::open_in_viewer(&path);
                            status_message = format!("Opened: {}", path.display());
                        }
                        None => {
                            status_message = "No saved composite yet".to_string();
                        }
                    }
                }
                // Cycle to the next camera
                KeyCode::Char('n') if multi_camera => {
                    show_help = false;
                    camera_index = (camera_index + 1) % cameras.len();

                    // Tear down first - some devices cannot be held open twice
                    active.close();
                    frame_widget = FrameWidget::new();
                    error_message = None;

                    match ActiveSession::open(&cameras[camera_index], &config) {
                        Ok(next) => {
                            active = next;
                            config.last_camera_path = Some(cameras[camera_index].path.clone());
                            config.save();
                            status_message = build_status_message(multi_camera, config.left_is_red);
                        }
                        Err(e) => {
                            error!("Failed to switch camera: {}", e);
                            status_message = format!("Error: {}", e);
                            // Try to go back to the previous camera
                            camera_index = if camera_index == 0 {
                                cameras.len() - 1
                            } else {
                                camera_index - 1
                            };
                            active = ActiveSession::open(&cameras[camera_index], &config)?;
                        }
                    }
                }
                // Toggle help
                KeyCode::Char('h') => {
                    show_help = !show_help;
                    status_message = if show_help {
                        build_help_message(multi_camera)
                    } else {
                        build_status_message(multi_camera, active.controls.left_is_red())
                    };
                }
                KeyCode::Char('q') => break,
                _ => {}
            }
        }
    }

    active.close();
    Ok(())
}

fn build_status_message(multi_camera: bool, left_is_red: bool) -> String {
    let red_eye = if left_is_red { "left" } else { "right" };
    let mut msg = format!("'l'/'r' capture | 'c' clear | 't' swap (red={})", red_eye);
    msg.push_str(" | 's' save");
    if multi_camera {
        msg.push_str(" | 'n' camera");
    }
    msg.push_str(" | 'h' help | 'q' quit");
    msg
}

fn build_help_message(multi_camera: bool) -> String {
    let mut msg = String::from(
        "l/r: Capture left/right still | c: Clear stills | t: Swap red eye | s: Save | o: Open saved | ",
    );
    if multi_camera {
        msg.push_str("n: Next camera | ");
    }
    msg.push_str("h: Toggle help | q/Ctrl+C: Quit");
    msg
}

fn select_terminal_format(formats: &[CameraFormat]) -> CameraFormat {
    // Prefer a modest resolution - high resolution isn't useful on a cell
    // grid and lower resolution means faster conversion
    let target_pixels = (PREVIEW_WIDTH * PREVIEW_HEIGHT) as i64;

    formats
        .iter()
        .min_by_key(|f| {
            let pixels = (f.width * f.height) as i64;
            let diff = (pixels - target_pixels).abs();
            // A known rate beats an unknown one at equal size
            let fps_penalty = if f.framerate.is_some() { 0 } else { 1_000_000 };
            diff + fps_penalty
        })
        .cloned()
        .unwrap_or_else(|| formats[0].clone())
}

/// Sub-rectangle of a frame, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CropRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl CropRect {
    fn full(extent: Extent) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }
}

/// Centered sub-rectangle of `frame` with the aspect ratio of `locked`.
///
/// Degenerate inputs fall back to the full frame.
fn make_crop_rect(frame: Extent, locked: Extent) -> CropRect {
    if frame.is_empty() || locked.is_empty() {
        return CropRect::full(frame);
    }

    // Compare aspect ratios in integers: frame w/h versus locked w/h
    let lhs = frame.width as u64 * locked.height as u64;
    let rhs = locked.width as u64 * frame.height as u64;

    let (width, height) = if lhs > rhs {
        // Frame is wider than the locked aspect - trim the sides
        let w = (rhs / locked.height as u64).max(1) as u32;
        (w.min(frame.width), frame.height)
    } else if lhs < rhs {
        // Frame is taller - trim top and bottom
        let h = (lhs / locked.width as u64).max(1) as u32;
        (frame.width, h.min(frame.height))
    } else {
        (frame.width, frame.height)
    };

    CropRect {
        x: (frame.width - width) / 2,
        y: (frame.height - height) / 2,
        width,
        height,
    }
}

/// Widget that renders the composite using half-block characters
struct FrameWidget {
    frame: Option<Frame>,
    locked_aspect: Option<Extent>,
}

impl FrameWidget {
    fn new() -> Self {
        Self {
            frame: None,
            locked_aspect: None,
        }
    }

    fn update_frame(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }

    fn lock_aspect(&mut self, extent: Extent) {
        if !extent.is_empty() {
            self.locked_aspect = Some(extent);
        }
    }

    fn unlock_aspect(&mut self) {
        self.locked_aspect = None;
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let frame = match &self.frame {
            Some(frame) if !frame.is_empty() => frame,
            // No frame yet (or a zero-extent composite) - show placeholder
            _ => {
                let msg = "Waiting for camera...";
                let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
                let y = area.y + area.height / 2;
                if y < area.y + area.height && x < area.x + area.width {
                    buf.set_string(x, y, msg, ratatui::style::Style::default());
                }
                return;
            }
        };

        let crop = match self.locked_aspect {
            Some(locked) => make_crop_rect(frame.extent(), locked),
            None => CropRect::full(frame.extent()),
        };

        // Calculate display dimensions maintaining aspect ratio.
        // Each terminal cell displays 2 vertical pixels using half-blocks.
        let frame_aspect = crop.width as f64 / crop.height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            // Terminal wider than the frame: height limits
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            // Terminal taller than the frame: width limits
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };

        if display_width == 0 || display_height == 0 {
            return;
        }

        // Center within the preview area
        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        // Scale factors from display cells into the cropped source region
        let x_scale = crop.width as f64 / display_width as f64;
        let y_scale = crop.height as f64 / (display_height * 2) as f64;

        // One cell carries two stacked pixels: the upper half (▀) takes the
        // fg color, the lower half the bg
        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;

                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = crop.x + (tx as f64 * x_scale) as u32;
                let src_y_top = crop.y + (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = crop.y + ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let top_color = sample_pixel(frame, src_x, src_y_top);
                let bottom_color = sample_pixel(frame, src_x, src_y_bottom);

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(top_color);
                    cell.set_bg(bottom_color);
                }
            }
        }
    }
}

/// Sample a pixel, clamping out-of-range coordinates to the frame edge.
/// The frame is guaranteed non-empty by the render guard.
fn sample_pixel(frame: &Frame, x: u32, y: u32) -> Color {
    let x = x.min(frame.width() - 1);
    let y = y.min(frame.height() - 1);
    let [r, g, b, _] = frame.pixel(x, y);
    Color::Rgb(r, g, b)
}

/// Centered multi-line message shown in place of the preview
struct MessageWidget<'a> {
    message: &'a str,
}

impl Widget for MessageWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let lines: Vec<&str> = self.message.lines().collect();
        let start_y = area.y + (area.height.saturating_sub(lines.len() as u16)) / 2;

        for (i, line) in lines.iter().enumerate() {
            let y = start_y + i as u16;
            if y >= area.y + area.height {
                break;
            }
            let x = area.x + (area.width.saturating_sub(line.len() as u16)) / 2;
            buf.set_string(
                x,
                y,
                *line,
                ratatui::style::Style::default().fg(Color::Red),
            );
        }
    }
}

/// One-line status bar at the bottom of the screen
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Clear the line to the bar background first
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        // Truncate on character boundaries; paths may not be ASCII
        let text: String = self.message.chars().take(area.width as usize).collect();

        buf.set_string(
            area.x,
            area.y,
            &text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::Framerate;

    fn make_format(width: u32, height: u32, fps: Option<u32>) -> CameraFormat {
        CameraFormat {
            width,
            height,
            framerate: fps.map(Framerate::from_int),
            pixel_format: "YUY2".to_string(),
        }
    }

    #[test]
    fn test_select_terminal_format_prefers_preview_size() {
        let formats = vec![
            make_format(1920, 1080, Some(30)),
            make_format(640, 480, Some(30)),
            make_format(320, 240, Some(30)),
        ];
        let selected = select_terminal_format(&formats);
        assert_eq!((selected.width, selected.height), (640, 480));
    }

    #[test]
    fn test_select_terminal_format_penalizes_missing_framerate() {
        let formats = vec![make_format(640, 480, None), make_format(800, 600, Some(30))];
        let selected = select_terminal_format(&formats);
        assert_eq!((selected.width, selected.height), (800, 600));
    }

    #[test]
    fn test_crop_rect_matching_aspect_is_full_frame() {
        let crop = make_crop_rect(Extent::new(1280, 720), Extent::new(640, 360));
        assert_eq!(
            crop,
            CropRect {
                x: 0,
                y: 0,
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn test_crop_rect_trims_wider_frame_symmetrically() {
        let crop = make_crop_rect(Extent::new(1000, 480), Extent::new(640, 480));
        assert_eq!(
            crop,
            CropRect {
                x: 180,
                y: 0,
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn test_crop_rect_trims_taller_frame_symmetrically() {
        let crop = make_crop_rect(Extent::new(640, 1000), Extent::new(640, 480));
        assert_eq!(
            crop,
            CropRect {
                x: 0,
                y: 260,
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn test_crop_rect_degenerate_inputs_fall_back_to_full_frame() {
        let frame = Extent::new(640, 480);
        assert_eq!(make_crop_rect(frame, Extent::new(0, 0)), CropRect::full(frame));
        let empty = Extent::new(0, 0);
        assert_eq!(make_crop_rect(empty, frame), CropRect::full(empty));
    }

    #[test]
    fn test_status_message_mentions_camera_key_only_when_multi() {
        assert!(build_status_message(true, false).contains("'n'"));
        assert!(!build_status_message(false, false).contains("'n'"));
        assert!(build_status_message(false, true).contains("red=left"));
        assert!(build_status_message(false, false).contains("red=right"));
    }
}
