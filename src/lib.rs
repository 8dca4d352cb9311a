// SPDX-License-Identifier: GPL-3.0-only

//! Stereo Camera - red/cyan anaglyph capture for the terminal
//!
//! This library provides the core functionality for the stereo-camera
//! application: camera capture backends, the anaglyph compositing core and
//! the terminal viewer.
//!
//! # Layout
//!
//! - [`stereo`]: the compositing core (frames, capture state, channel kernel, session)
//! - [`backends`]: camera capture via GStreamer/PipeWire or direct V4L2
//! - [`terminal`]: the interactive half-block viewer
//! - [`config`]: user configuration handling
//! - [`storage`]: saving composites and locating them afterwards

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod stereo;
pub mod storage;
pub mod terminal;

// The surface the binary and the integration tests consume
pub use config::Config;
pub use errors::{AppError, AppResult, CameraError, StorageError};
pub use stereo::{Frame, SessionEvent, StereoSession};
