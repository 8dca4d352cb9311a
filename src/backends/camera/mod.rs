// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend
//!
//! Device discovery, format negotiation and frame capture. Two capture
//! paths exist behind one entry point:
//!
//! - [`pipeline::CapturePipeline`]: GStreamer pipewiresrc, used for every
//!   device discovered through PipeWire. Delivers RGBA.
//! - [`v4l2::V4l2Pipeline`]: memory-mapped kernel capture, used for devices
//!   found by the `/dev/video*` scan on systems without PipeWire. Delivers
//!   raw formats that [`convert`] turns into RGBA.
//!
//! Which path a device takes is decided by how it was discovered, encoded
//! in [`CameraDevice::path`].

pub mod convert;
pub mod enumeration;
pub mod pipeline;
pub mod types;
pub mod v4l2;

pub use enumeration::{device_formats, enumerate_cameras, is_pipewire_available};
pub use types::*;

use crate::errors::CameraError;

/// A running capture backend. Dropping it stops capture and closes the
/// frame channel.
pub enum CaptureHandle {
    Gst(pipeline::CapturePipeline),
    V4l2(v4l2::V4l2Pipeline),
}

impl CaptureHandle {
    /// Stop capturing and release the camera.
    pub fn stop(self) {
        match self {
            Self::Gst(p) => p.stop(),
            Self::V4l2(p) => p.stop(),
        }
    }
}

/// Start capturing from a device with the backend that discovered it.
///
/// PipeWire-addressed devices go through GStreamer; plain `/dev/video`
/// paths from the direct scan go straight to the kernel.
pub fn start_capture(
    device: &CameraDevice,
    format: &CameraFormat,
    frame_sender: FrameSender,
) -> Result<CaptureHandle, CameraError> {
    if device.path.starts_with("pipewire") || device.path.is_empty() {
        pipeline::CapturePipeline::new(device, format, frame_sender).map(CaptureHandle::Gst)
    } else {
        v4l2::V4l2Pipeline::new(device, format, frame_sender).map(CaptureHandle::V4l2)
    }
}
