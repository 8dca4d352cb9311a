// SPDX-License-Identifier: GPL-3.0-only

//! Camera discovery and format enumeration.
//!
//! PipeWire is the primary discovery path: `pw-cli ls Node` is parsed for
//! `Video/Source` nodes, which is the same view of the world the GStreamer
//! pipeline consumes. Systems without a usable PipeWire session fall back
//! to scanning `/dev/video*` through the v4l crate.

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info, warn};
use v4l::video::Capture;

use crate::backends::camera::types::{
    CameraDevice, CameraFormat, DeviceInfo, Framerate, SensorRotation,
};
use crate::constants::formats;
use crate::errors::CameraError;

/// Enumerate available cameras.
///
/// Tries PipeWire first and falls back to a direct V4L2 scan. Returns
/// `NoCameraFound` when both paths come up empty, or `AccessDenied` when
/// devices exist but could not be opened.
pub fn enumerate_cameras() -> Result<Vec<CameraDevice>, CameraError> {
    if is_pipewire_available() {
        match try_enumerate_with_pw_cli() {
            Some(cameras) if !cameras.is_empty() => {
                info!(count = cameras.len(), "enumerated cameras via PipeWire");
                return Ok(cameras);
            }
            _ => {
                debug!("pw-cli enumeration yielded nothing, trying V4L2 scan");
            }
        }
    }

    enumerate_v4l2_cameras()
}

/// Check whether the PipeWire capture element is usable.
pub fn is_pipewire_available() -> bool {
    if gstreamer::init().is_err() {
        return false;
    }
    gstreamer::ElementFactory::find("pipewiresrc").is_some()
}

/// Query the formats a camera advertises.
///
/// PipeWire nodes are asked through `pw-cli enum-params`; plain V4L2
/// devices through the kernel ioctls. When neither yields anything a
/// conservative fallback table is returned so callers always have
/// something to negotiate with.
pub fn device_formats(device: &CameraDevice) -> Vec<CameraFormat> {
    if let Some(node_id) = &device.node_id
        && let Some(formats) = try_formats_from_node(node_id)
    {
        return formats;
    }

    let v4l2_path = device
        .device_info
        .as_ref()
        .map(|info| info.path.clone())
        .or_else(|| {
            device
                .path
                .starts_with("/dev/video")
                .then(|| device.path.clone())
        });
    if let Some(path) = v4l2_path
        && let Some(formats) = try_formats_from_v4l2(&path)
    {
        return formats;
    }

    warn!(
        camera = %device.name,
        "no formats reported, using fallback table"
    );
    fallback_formats()
}

// ---------------------------------------------------------------------------
// PipeWire discovery
// ---------------------------------------------------------------------------

/// Property block accumulated for one PipeWire node while walking
/// `pw-cli ls Node` output.
#[derive(Default)]
struct NodeProps {
    id: String,
    is_video_source: bool,
    serial: Option<String>,
    object_path: Option<String>,
    nick: Option<String>,
    description: Option<String>,
}

impl NodeProps {
    fn new(id: String) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Turn the accumulated properties into a camera, if this node is one.
    fn into_camera(self) -> Option<CameraDevice> {
        if !self.is_video_source {
            return None;
        }
        let name = self.description.or_else(|| self.nick.clone())?;

        // Prefer the serial: pipewiresrc target-object matches on
        // object.serial, and node IDs are recycled across reconnects.
        let path = match &self.serial {
            Some(serial) => format!("pipewire-serial-{serial}"),
            None => format!("pipewire-{}", self.id),
        };

        let device_info = build_device_info(self.nick.as_deref(), self.object_path.as_deref());
        let rotation = query_node_rotation(&self.id);

        Some(CameraDevice {
            name,
            path,
            node_id: Some(self.id),
            device_info,
            rotation,
        })
    }
}

fn try_enumerate_with_pw_cli() -> Option<Vec<CameraDevice>> {
    let output = Command::new("pw-cli").args(["ls", "Node"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(parse_pw_cli_nodes(&stdout))
}

/// Parse `pw-cli ls Node` output into cameras.
///
/// Nodes are printed as an `id N, type PipeWire:Interface:Node` header
/// followed by indented `key = "value"` properties.
fn parse_pw_cli_nodes(stdout: &str) -> Vec<CameraDevice> {
    let mut cameras = Vec::new();
    let mut node: Option<NodeProps> = None;

    let flush = |node: &mut Option<NodeProps>, cameras: &mut Vec<CameraDevice>| {
        if let Some(props) = node.take()
            && let Some(camera) = props.into_camera()
        {
            debug!(name = %camera.name, path = %camera.path, "found PipeWire camera");
            cameras.push(camera);
        }
    };

    for line in stdout.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("id ") && trimmed.contains("type PipeWire:Interface:Node") {
            flush(&mut node, &mut cameras);
            if let Some(id) = trimmed
                .strip_prefix("id ")
                .and_then(|rest| rest.split(',').next())
            {
                node = Some(NodeProps::new(id.trim().to_string()));
            }
            continue;
        }

        let Some(props) = node.as_mut() else {
            continue;
        };

        if trimmed.contains("media.class") {
            props.is_video_source = trimmed.contains("\"Video/Source\"");
        } else if trimmed.contains("object.serial") {
            props.serial = extract_quoted_value(trimmed);
        } else if trimmed.contains("object.path") {
            props.object_path = extract_quoted_value(trimmed);
        } else if trimmed.contains("node.nick") {
            props.nick = extract_quoted_value(trimmed);
        } else if trimmed.contains("node.description") {
            props.description = extract_quoted_value(trimmed);
        }
    }
    flush(&mut node, &mut cameras);

    cameras
}

/// Extract the value from a `key = "value"` property line.
fn extract_quoted_value(line: &str) -> Option<String> {
    let start = line.find('"')? + 1;
    let end = line.rfind('"')?;
    (end > start).then(|| line[start..end].to_string())
}

/// Build V4L2 device info from a PipeWire `object.path` like
/// `v4l2:/dev/video0`. Nodes backed by libcamera have no such path.
fn build_device_info(nick: Option<&str>, object_path: Option<&str>) -> Option<DeviceInfo> {
    let v4l2_path = object_path?.strip_prefix("v4l2:")?.to_string();

    let driver = v4l::Device::with_path(&v4l2_path)
        .and_then(|dev| dev.query_caps())
        .map(|caps| caps.driver)
        .unwrap_or_default();

    Some(DeviceInfo {
        card: nick.unwrap_or_default().to_string(),
        driver,
        path: v4l2_path,
    })
}

/// Ask PipeWire for the sensor rotation of a node.
///
/// libcamera-backed nodes carry an `api.libcamera.rotation` property for
/// sensors mounted sideways or upside down, common on tablets and some
/// laptops. Plain V4L2 nodes have no such property and report no rotation.
fn query_node_rotation(node_id: &str) -> SensorRotation {
    let Ok(output) = Command::new("pw-cli").args(["info", node_id]).output() else {
        return SensorRotation::None;
    };
    if !output.status.success() {
        return SensorRotation::None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if line.contains("api.libcamera.rotation")
            && let Some(value) = extract_quoted_value(line)
            && let Ok(degrees) = value.parse::<i32>()
        {
            let rotation = SensorRotation::from_degrees_int(degrees);
            if rotation != SensorRotation::None {
                info!(node = %node_id, %rotation, "camera reports sensor rotation");
            }
            return rotation;
        }
    }

    SensorRotation::None
}

// ---------------------------------------------------------------------------
// PipeWire format enumeration
// ---------------------------------------------------------------------------

/// One format object being accumulated from `pw-cli enum-params` output.
#[derive(Default)]
struct FormatGroup {
    subtype: Option<String>,
    video_format: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    framerates: Vec<Framerate>,
}

impl FormatGroup {
    /// Emit the finished group into `formats` and reset for the next one.
    fn flush_into(&mut self, formats: &mut Vec<CameraFormat>) {
        let group = std::mem::take(self);
        let (Some(width), Some(height)) = (group.width, group.height) else {
            return;
        };

        // Raw video carries a VideoFormat; compressed subtypes (mjpg,
        // h264) only have the media subtype.
        let pixel_format = match group.video_format {
            Some(fmt) => fmt,
            None => match group.subtype {
                Some(sub) if sub != "raw" => sub.to_uppercase(),
                _ => return,
            },
        };

        if group.framerates.is_empty() {
            formats.push(CameraFormat {
                width,
                height,
                framerate: None,
                pixel_format,
            });
        } else {
            for framerate in group.framerates {
                formats.push(CameraFormat {
                    width,
                    height,
                    framerate: Some(framerate),
                    pixel_format: pixel_format.clone(),
                });
            }
        }
    }
}

fn try_formats_from_node(node_id: &str) -> Option<Vec<CameraFormat>> {
    let output = Command::new("pw-cli")
        .args(["enum-params", node_id, "EnumFormat"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let formats = parse_pw_cli_formats(&stdout);
    (!formats.is_empty()).then_some(formats)
}

/// Parse `pw-cli enum-params <id> EnumFormat` output.
///
/// Each format is an `Object:` block containing SPA ids for the media
/// subtype and video format, a `Rectangle WxH` size, and one `Fraction N/D`
/// per supported framerate.
fn parse_pw_cli_formats(stdout: &str) -> Vec<CameraFormat> {
    let mut formats = Vec::new();
    let mut group = FormatGroup::default();

    for line in stdout.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("Object:") {
            group.flush_into(&mut formats);
            continue;
        }

        if trimmed.contains("Spa:Enum:MediaSubtype:") {
            if let Some(idx) = trimmed.rfind(':') {
                let value = trimmed[idx + 1..].trim_end_matches(')').trim();
                group.subtype = Some(value.to_lowercase());
            }
        } else if trimmed.contains("Spa:Enum:VideoFormat:") {
            if let Some(idx) = trimmed.rfind(':') {
                let value = trimmed[idx + 1..].trim_end_matches(')').trim();
                group.video_format = Some(value.to_uppercase());
            }
        } else if let Some(rect) = trimmed.strip_prefix("Rectangle ") {
            if let Some((w, h)) = parse_dimensions(rect) {
                group.width = Some(w);
                group.height = Some(h);
            }
        } else if let Some(frac) = trimmed.strip_prefix("Fraction ") {
            if let Some(framerate) = parse_fraction(frac) {
                // pw-cli lists the same rate in both the default and the
                // choice list.
                if !group
                    .framerates
                    .iter()
                    .any(|existing| existing.as_int() == framerate.as_int())
                {
                    group.framerates.push(framerate);
                }
            }
        }
    }
    group.flush_into(&mut formats);

    formats
}

/// Parse `WxH` (e.g. `1280x720`).
fn parse_dimensions(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

/// Parse `N/D` (e.g. `30/1` or `30000/1001`).
fn parse_fraction(value: &str) -> Option<Framerate> {
    let (num, denom) = value.trim().split_once('/')?;
    Some(Framerate::new(
        num.trim().parse().ok()?,
        denom.trim().parse().ok()?,
    ))
}

// ---------------------------------------------------------------------------
// Direct V4L2 scan
// ---------------------------------------------------------------------------

/// Enumerate cameras by opening every `/dev/video*` node.
///
/// Metadata companion nodes are filtered out by requiring at least one
/// capture format. Permission failures are remembered so an all-denied
/// scan reports `AccessDenied` instead of pretending no camera exists.
fn enumerate_v4l2_cameras() -> Result<Vec<CameraDevice>, CameraError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir("/dev")
        .map_err(|e| CameraError::InitializationFailed(format!("cannot read /dev: {e}")))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("video"))
        })
        .collect();
    paths.sort();

    let mut cameras = Vec::new();
    let mut denied = 0usize;

    for path in paths {
        match v4l::Device::with_path(&path) {
            Ok(dev) => {
                let Ok(caps) = dev.query_caps() else {
                    continue;
                };
                let captures = dev.enum_formats().map(|f| !f.is_empty()).unwrap_or(false);
                if !captures {
                    debug!(path = %path.display(), "skipping non-capture video node");
                    continue;
                }

                let path_str = path.to_string_lossy().to_string();
                debug!(path = %path_str, card = %caps.card, "found V4L2 camera");
                cameras.push(CameraDevice {
                    name: caps.card.clone(),
                    path: path_str.clone(),
                    node_id: None,
                    device_info: Some(DeviceInfo {
                        card: caps.card,
                        driver: caps.driver,
                        path: path_str,
                    }),
                    rotation: SensorRotation::None,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!(path = %path.display(), "permission denied opening video device");
                denied += 1;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "failed to open video device");
            }
        }
    }

    if cameras.is_empty() {
        if denied > 0 {
            return Err(CameraError::AccessDenied);
        }
        return Err(CameraError::NoCameraFound);
    }
    info!(count = cameras.len(), "enumerated cameras via V4L2 scan");
    Ok(cameras)
}

/// Query formats straight from a V4L2 device.
fn try_formats_from_v4l2(path: &str) -> Option<Vec<CameraFormat>> {
    let dev = v4l::Device::with_path(path).ok()?;
    let mut formats = Vec::new();

    for fmt_desc in dev.enum_formats().ok()? {
        let pixel_format = format!("{:?}", fmt_desc.fourcc);

        let Ok(sizes) = dev.enum_framesizes(fmt_desc.fourcc) else {
            continue;
        };
        for size in sizes {
            let dimensions: Vec<(u32, u32)> = match size.size {
                v4l::framesize::FrameSizeEnum::Discrete(discrete) => {
                    vec![(discrete.width, discrete.height)]
                }
                v4l::framesize::FrameSizeEnum::Stepwise(step) => {
                    // Stepwise ranges would explode combinatorially, so
                    // only the corners are reported.
                    vec![
                        (step.min_width, step.min_height),
                        (step.max_width, step.max_height),
                    ]
                }
            };

            for (width, height) in dimensions {
                let mut rates = Vec::new();
                if let Ok(intervals) = dev.enum_frameintervals(fmt_desc.fourcc, width, height) {
                    for interval in intervals {
                        if let v4l::frameinterval::FrameIntervalEnum::Discrete(frac) =
                            interval.interval
                        {
                            // Frame intervals are the inverse of framerates.
                            rates.push(Framerate::new(frac.denominator, frac.numerator));
                        }
                    }
                }

                if rates.is_empty() {
                    formats.push(CameraFormat {
                        width,
                        height,
                        framerate: None,
                        pixel_format: pixel_format.clone(),
                    });
                } else {
                    for framerate in rates {
                        formats.push(CameraFormat {
                            width,
                            height,
                            framerate: Some(framerate),
                            pixel_format: pixel_format.clone(),
                        });
                    }
                }
            }
        }
    }

    (!formats.is_empty()).then_some(formats)
}

/// Conservative format table used when a device reports nothing.
fn fallback_formats() -> Vec<CameraFormat> {
    let mut formats = Vec::new();
    for &(width, height) in formats::FALLBACK_RESOLUTIONS {
        for &fps in formats::COMMON_FRAMERATES {
            formats.push(CameraFormat {
                width,
                height,
                framerate: Some(Framerate::from_int(fps)),
                pixel_format: "YUY2".to_string(),
            });
        }
    }
    formats
}
