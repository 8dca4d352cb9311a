// SPDX-License-Identifier: GPL-3.0-only

//! Integration checks over the constants surface

use stereo_camera::constants::{app_info, pipeline};

#[test]
fn test_version_is_set() {
    // The build script must always produce a version string
    assert!(
        !app_info::version().is_empty(),
        "Version should not be empty"
    );
}

#[test]
fn test_videoconvert_threads_positive() {
    // videoconvert refuses a thread count of zero
    assert!(pipeline::videoconvert_threads() >= 1);
}
