// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Version changes with HEAD or the tag set
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");

    // Packaging builds have no .git and set the version explicitly
    let version = std::env::var("STEREO_CAMERA_VERSION")
        .ok()
        .or_else(describe_head)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` against v-prefixed tags, with the prefix stripped.
/// Gives "0.1.0" at a tag and "0.1.0-5-gabcdef1" past one.
fn describe_head() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()
        .filter(|out| out.status.success())?;

    let described = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Some(described.strip_prefix('v').unwrap_or(&described).to_string())
}
