// SPDX-License-Identifier: GPL-3.0-only

//! Tunables and fixed names used across the application

/// Channel capacities
pub mod channels {
    /// Camera frames in flight between the capture callback and the session worker.
    /// Kept small so stale frames are dropped instead of queued.
    pub const FRAME_CHANNEL_CAPACITY: usize = 10;

    /// Session events in flight between the worker and the viewer
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;
}

/// Format tables and preview sizing
pub mod formats {
    /// Frame rates probed when a device will not enumerate its own
    pub const COMMON_FRAMERATES: &[u32] = &[30, 60, 15, 24];

    /// Resolutions offered when a device reports no usable format list
    pub const FALLBACK_RESOLUTIONS: &[(u32, u32)] = &[(640, 480), (1280, 720), (1920, 1080)];

    /// Preferred preview resolution for terminal rendering
    pub const PREVIEW_WIDTH: u32 = 640;
    pub const PREVIEW_HEIGHT: u32 = 480;
}

/// Pipeline tuning
pub mod pipeline {
    /// Appsink queue depth; small keeps the preview close to live
    pub const MAX_BUFFERS: u32 = 2;

    /// Thread count handed to videoconvert, one per available CPU
    pub fn videoconvert_threads() -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4)
    }

    /// Format requested from the convert stage.
    /// RGBA uses 4 bytes/pixel, the canonical raster of the compositing core.
    pub const OUTPUT_FORMAT: &str = "RGBA";
}

/// Delays, timeouts and polling cadences
pub mod timing {
    /// Dropped-frame counter modulo for periodic logging
    pub const DROP_LOG_INTERVAL: u64 = 100;

    /// How long to wait for a pipeline state change to confirm.
    /// Async transitions are accepted, so this stays short.
    pub const STATE_CHANGE_TIMEOUT_MS: u64 = 50;

    /// Grace period for the pipeline to reach Null on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Terminal event poll cadence (~60 Hz)
    pub const POLL_INTERVAL_MS: u64 = 16;

    /// Warm-up period before a headless capture trusts exposure
    pub const WARMUP_MS: u64 = 500;

    /// How long to wait for the first frame before giving up
    pub const FIRST_FRAME_TIMEOUT_SECS: u64 = 5;
}

/// Output and configuration locations
pub mod storage {
    /// Folder created under the user's Pictures directory
    pub const DEFAULT_SAVE_FOLDER: &str = "Stereo";

    /// Prefix for saved composite filenames
    pub const FILENAME_PREFIX: &str = "anaglyph";

    /// Directory name under the user config directory
    pub const CONFIG_DIR: &str = "stereo-camera";

    /// Settings file name
    pub const CONFIG_FILE: &str = "config.json";
}

/// Build metadata
pub mod app_info {
    /// Version string baked in by the build script
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
