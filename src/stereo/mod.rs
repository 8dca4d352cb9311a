// SPDX-License-Identifier: GPL-3.0-only

//! Anaglyph compositing core
//!
//! Everything needed to turn a stream of live frames plus two capture
//! gestures into a red/cyan anaglyph, independent of any camera or display:
//!
//! - [`frame`]: the canonical RGBA raster and extent arithmetic
//! - [`capture`]: the capture state machine (intent flags, latched stills)
//! - [`kernel`]: the per-pixel channel splice
//! - [`compositor`]: per-frame source resolution feeding the kernel
//! - [`session`]: the worker thread tying the core to a frame channel
//!
//! The first four modules are pure and single-threaded; tests drive them
//! directly with synthetic frames. Only [`session`] knows about threads
//! and channels.

pub mod capture;
pub mod compositor;
pub mod frame;
pub mod kernel;
pub mod session;

pub use capture::{CaptureState, FrameOutcome};
pub use frame::{Extent, Frame};
pub use session::{EventReceiver, EventSender, SessionControls, SessionEvent, StereoSession};
