// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 camera capture
//!
//! Fallback for systems without a PipeWire session. Frames are pulled from
//! a memory-mapped kernel stream on a dedicated thread. Raw formats are
//! passed through for CPU conversion; MJPEG is decoded here so consumers
//! never see compressed data.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::backends::camera::types::{
    CameraDevice, CameraFormat, CameraFrame, FrameSender, PixelFormat,
};
use crate::errors::CameraError;

/// How the capture thread turns kernel buffers into frames.
#[derive(Debug, Clone, Copy)]
enum FrameKind {
    /// Raw pixels, forwarded as-is with a computed stride.
    Raw(PixelFormat),
    /// JPEG-compressed, decoded to RGBA on this thread.
    Mjpeg,
}

/// Camera pipeline using direct V4L2 kernel capture.
pub struct V4l2Pipeline {
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl V4l2Pipeline {
    /// Open the device, negotiate a format and start the capture thread.
    pub fn new(
        device: &CameraDevice,
        format: &CameraFormat,
        frame_sender: FrameSender,
    ) -> Result<Self, CameraError> {
        let v4l2_path = device
            .device_info
            .as_ref()
            .map(|info| info.path.clone())
            .or_else(|| match device.path.strip_prefix("v4l2:") {
                Some(stripped) => Some(stripped.to_string()),
                None => device
                    .path
                    .starts_with("/dev/video")
                    .then(|| device.path.clone()),
            })
            .ok_or_else(|| {
                CameraError::InitializationFailed(format!(
                    "no V4L2 device path for camera {}",
                    device.name
                ))
            })?;

        info!(
            device_path = %v4l2_path,
            format = %format,
            "creating V4L2 capture pipeline"
        );

        // Opening and format negotiation happen here so permission and
        // format errors surface to the caller instead of dying in the
        // capture thread.
        let mut dev = Device::with_path(&v4l2_path).map_err(CameraError::from)?;
        let (width, height, kind) = negotiate_format(&mut dev, format)?;

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let thread_handle = std::thread::spawn(move || {
            if let Err(e) = capture_loop(dev, width, height, kind, frame_sender, running_clone) {
                error!(error = %e, "V4L2 capture loop failed");
            }
        });

        Ok(Self {
            running,
            thread_handle: Some(thread_handle),
        })
    }

    /// Stop the capture thread and release the device.
    pub fn stop(mut self) {
        info!("stopping V4L2 pipeline");
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            match handle.join() {
                Ok(_) => info!("V4L2 capture thread stopped"),
                Err(_) => warn!("V4L2 capture thread panicked"),
            }
        }
    }
}

impl Drop for V4l2Pipeline {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // The thread may already be finished, do not join in drop.
    }
}

/// Ask the kernel for the requested format and classify what it granted.
fn negotiate_format(
    dev: &mut Device,
    requested: &CameraFormat,
) -> Result<(u32, u32, FrameKind), CameraError> {
    let mut fmt = dev
        .format()
        .map_err(|e| CameraError::InitializationFailed(format!("failed to query format: {e}")))?;
    fmt.width = requested.width;
    fmt.height = requested.height;
    if let Some(fourcc) = kernel_fourcc(&requested.pixel_format) {
        fmt.fourcc = fourcc;
    }

    let actual = match dev.set_format(&fmt) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "could not set format, using current device format");
            dev.format().map_err(|e| {
                CameraError::InitializationFailed(format!("failed to query format: {e}"))
            })?
        }
    };

    let fourcc_str = format!("{:?}", actual.fourcc);
    info!(
        width = actual.width,
        height = actual.height,
        fourcc = %fourcc_str,
        "V4L2 format negotiated"
    );

    let kind = if fourcc_str == "MJPG" || fourcc_str == "JPEG" {
        FrameKind::Mjpeg
    } else if let Some(pixel_format) = PixelFormat::from_fourcc(&fourcc_str) {
        FrameKind::Raw(pixel_format)
    } else {
        return Err(CameraError::FormatNotSupported(fourcc_str));
    };

    Ok((actual.width, actual.height, kind))
}

/// Map a pixel format spelling (FourCC or GStreamer name) onto the kernel
/// FourCC that requests it.
fn kernel_fourcc(pixel_format: &str) -> Option<v4l::FourCC> {
    let code: &[u8; 4] = match pixel_format {
        "YUYV" | "YUY2" => b"YUYV",
        "UYVY" => b"UYVY",
        "GREY" | "GRAY8" | "Y8" => b"GREY",
        "RGB" | "RGB3" => b"RGB3",
        "RGBA" | "AB24" => b"AB24",
        "MJPG" | "MJPEG" | "JPEG" => b"MJPG",
        other => other.as_bytes().try_into().ok()?,
    };
    Some(v4l::FourCC::new(code))
}

/// Exact row stride for the tightly packed formats this backend emits.
fn tight_stride(pixel_format: PixelFormat, width: u32) -> u32 {
    match pixel_format {
        PixelFormat::RGBA => width * 4,
        PixelFormat::RGB24 => width * 3,
        PixelFormat::YUYV | PixelFormat::UYVY => width * 2,
        PixelFormat::Gray8 => width,
    }
}

/// Capture loop running on its own thread until stopped or disconnected.
fn capture_loop(
    mut dev: Device,
    width: u32,
    height: u32,
    kind: FrameKind,
    mut frame_sender: FrameSender,
    running: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

    let mut stream = MmapStream::with_buffers(&mut dev, Type::VideoCapture, 4)
        .map_err(|e| format!("failed to create buffer stream: {e}"))?;

    info!("V4L2 capture stream started");

    while running.load(Ordering::SeqCst) {
        let frame_start = Instant::now();

        match stream.next() {
            Ok((buf, meta)) => {
                let frame_num = FRAME_COUNTER.fetch_add(1, Ordering::Relaxed);

                // bytesused is authoritative for compressed formats, the
                // mapped buffer itself is sized for the worst case.
                let used = (meta.bytesused as usize).min(buf.len());
                let payload = if used > 0 { &buf[..used] } else { buf };

                let frame = match kind {
                    FrameKind::Raw(pixel_format) => CameraFrame {
                        width,
                        height,
                        data: Arc::from(payload),
                        format: pixel_format,
                        stride: tight_stride(pixel_format, width),
                        captured_at: frame_start,
                    },
                    FrameKind::Mjpeg => match decode_mjpeg(payload, frame_start) {
                        Some(frame) => frame,
                        None => {
                            if frame_num % 30 == 0 {
                                warn!(frame = frame_num, "failed to decode MJPEG frame");
                            }
                            continue;
                        }
                    },
                };

                match frame_sender.try_send(frame) {
                    Ok(_) => {
                        if frame_num % 60 == 0 {
                            debug!(
                                frame = frame_num,
                                sequence = meta.sequence,
                                size = used,
                                elapsed_us = frame_start.elapsed().as_micros(),
                                "frame captured"
                            );
                        }
                    }
                    Err(e) if e.is_disconnected() => {
                        debug!("frame receiver dropped, stopping capture");
                        break;
                    }
                    Err(_) => {
                        if frame_num % 30 == 0 {
                            debug!(frame = frame_num, "frame dropped (channel full)");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to capture frame");
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        }
    }

    info!("V4L2 capture loop ended");
    Ok(())
}

/// Decode a JPEG buffer into an RGBA frame.
fn decode_mjpeg(payload: &[u8], captured_at: Instant) -> Option<CameraFrame> {
    let img = image::load_from_memory(payload).ok()?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    Some(CameraFrame {
        width,
        height,
        data: Arc::from(rgba.into_raw().into_boxed_slice()),
        format: PixelFormat::RGBA,
        stride: width * 4,
        captured_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_fourcc_spellings() {
        assert_eq!(kernel_fourcc("YUY2"), Some(v4l::FourCC::new(b"YUYV")));
        assert_eq!(kernel_fourcc("YUYV"), Some(v4l::FourCC::new(b"YUYV")));
        assert_eq!(kernel_fourcc("GRAY8"), Some(v4l::FourCC::new(b"GREY")));
        assert_eq!(kernel_fourcc("MJPG"), Some(v4l::FourCC::new(b"MJPG")));
        // Unknown 4-character codes pass through untranslated.
        assert_eq!(kernel_fourcc("NV12"), Some(v4l::FourCC::new(b"NV12")));
        assert_eq!(kernel_fourcc("toolong"), None);
    }

    #[test]
    fn test_tight_stride() {
        assert_eq!(tight_stride(PixelFormat::RGBA, 640), 2560);
        assert_eq!(tight_stride(PixelFormat::YUYV, 640), 1280);
        assert_eq!(tight_stride(PixelFormat::Gray8, 640), 640);
    }
}
