// SPDX-License-Identifier: GPL-3.0-only

//! Backend layer for camera capture
//!
//! Hardware access lives below this line; everything above it deals in
//! [`camera::CameraFrame`] values arriving on a bounded channel:
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │       Viewer / CLI / Stereo session       │
//! └───────────────────┬───────────────────────┘
//!                     │ frames (mpsc)
//! ┌───────────────────┴───────────────────────┐
//! │               Backend layer               │
//! │  ┌─────────────────┐  ┌─────────────────┐ │
//! │  │    GStreamer    │  │   Direct V4L2   │ │
//! │  │  (pipewiresrc)  │  │  (mmap stream)  │ │
//! │  └─────────────────┘  └─────────────────┘ │
//! └───────────────────────────────────────────┘
//! ```

pub mod camera;
