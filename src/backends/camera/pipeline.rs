// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture pipeline
//!
//! Builds a pipewiresrc pipeline that delivers RGBA frames to a bounded
//! channel. Compressed camera formats are decoded in the pipeline and
//! everything is normalized through videoconvert, so consumers only ever
//! see tightly packed RGBA.

use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backends::camera::types::{
    CameraDevice, CameraFormat, CameraFrame, FrameSender, PixelFormat,
};
use crate::constants::{pipeline, timing};
use crate::errors::CameraError;

static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Retries for pipeline startup. PipeWire occasionally refuses the node
/// right after another client released it.
const PIPELINE_CREATE_RETRIES: u32 = 5;
/// Delay between retries, long enough for a camera mode switch.
const PIPELINE_RETRY_DELAY_MS: u64 = 500;

/// A running camera capture pipeline.
///
/// Frames arrive on the channel handed to [`CapturePipeline::new`] until
/// the pipeline is stopped or dropped. Dropping the pipeline closes the
/// sender, which readers observe as end of stream.
pub struct CapturePipeline {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
}

impl CapturePipeline {
    /// Create and start a pipeline for the given device and format.
    pub fn new(
        device: &CameraDevice,
        format: &CameraFormat,
        frame_sender: FrameSender,
    ) -> Result<Self, CameraError> {
        info!(device = %device.name, format = %format, "creating capture pipeline");

        gstreamer::init().map_err(|e| CameraError::InitializationFailed(e.to_string()))?;
        gstreamer::ElementFactory::find("pipewiresrc").ok_or_else(|| {
            CameraError::InitializationFailed("pipewiresrc element not available".to_string())
        })?;

        let source_prop = source_property(&device.path);
        let caps_filter = build_caps_filter(format);
        let pipeline_str =
            build_pipeline_string(&source_prop, &caps_filter, &format.pixel_format);

        let pipeline = launch_with_retries(&pipeline_str)?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::InitializationFailed("appsink not found".to_string()))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| {
                CameraError::InitializationFailed("sink element is not an appsink".to_string())
            })?;

        appsink.set_property("emit-signals", true);
        appsink.set_property("sync", false);
        // Extra buffering at high framerates so DMA transfers complete
        // before the buffer is mapped.
        let buffer_count = if format.framerate.map(|f| f.as_int()).unwrap_or(0) > 30 {
            3
        } else {
            pipeline::MAX_BUFFERS
        };
        appsink.set_property("max-buffers", buffer_count);
        appsink.set_property("drop", true);
        appsink.set_property("enable-last-sample", false);

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| on_new_sample(appsink, &frame_sender))
                .build(),
        );

        info!("capture pipeline running");
        Ok(Self { pipeline, appsink })
    }

    /// Stop the pipeline and release the camera.
    pub fn stop(self) {
        info!("stopping capture pipeline");

        // Clearing the callbacks drops the frame sender, which closes the
        // channel for readers.
        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());

        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!(error = %e, "failed to set pipeline to Null");
            return;
        }
        let (result, state, _) = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        match result {
            Ok(_) => debug!(?state, "capture pipeline stopped"),
            Err(e) => debug!(error = ?e, ?state, "pipeline state change had issues"),
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

/// Appsink callback: pull a sample, wrap it as a [`CameraFrame`] and push
/// it into the channel. Full channels drop the frame, the consumer is
/// behind and older frames are worthless.
fn on_new_sample(
    appsink: &AppSink,
    frame_sender: &FrameSender,
) -> Result<gstreamer::FlowSuccess, gstreamer::FlowError> {
    let captured_at = Instant::now();
    let frame_num = FRAME_COUNTER.fetch_add(1, Ordering::Relaxed);

    let sample = appsink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;

    let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
    if buffer.flags().contains(gstreamer::BufferFlags::CORRUPTED) {
        warn!(frame = frame_num, "skipping corrupted buffer");
        return Ok(gstreamer::FlowSuccess::Ok);
    }

    let caps = sample.caps().ok_or(gstreamer::FlowError::Error)?;
    let video_info = VideoInfo::from_caps(caps).map_err(|_| gstreamer::FlowError::Error)?;
    let map = buffer.map_readable().map_err(|_| gstreamer::FlowError::Error)?;

    let frame = CameraFrame {
        width: video_info.width(),
        height: video_info.height(),
        data: Arc::from(map.as_slice()),
        format: PixelFormat::RGBA,
        stride: video_info.stride()[0] as u32,
        captured_at,
    };

    let mut sender = frame_sender.clone();
    if let Err(e) = sender.try_send(frame) {
        if e.is_disconnected() {
            return Err(gstreamer::FlowError::Flushing);
        }
        if frame_num % timing::DROP_LOG_INTERVAL == 0 {
            debug!(frame = frame_num, "frame dropped, channel full");
        }
    } else if frame_num % timing::DROP_LOG_INTERVAL == 0 {
        debug!(
            frame = frame_num,
            width = video_info.width(),
            height = video_info.height(),
            size_kb = map.as_slice().len() / 1024,
            "frame delivered"
        );
    }

    Ok(gstreamer::FlowSuccess::Ok)
}

/// Map a device path onto the pipewiresrc property that selects it.
///
/// `pipewire-serial-N` targets `object.serial`, which survives node ID
/// recycling across reconnects. Plain `/dev/video` paths are still routed
/// through PipeWire via its `object.path` convention.
fn source_property(device_path: &str) -> String {
    if device_path.is_empty() {
        debug!("using default PipeWire camera");
        return String::new();
    }
    if let Some(serial) = device_path.strip_prefix("pipewire-serial-") {
        return format!("target-object={serial} ");
    }
    if let Some(node_id) = device_path.strip_prefix("pipewire-") {
        return format!("target-object={node_id} ");
    }
    if device_path.starts_with("v4l2:") {
        return format!("path={device_path} ");
    }
    if device_path.starts_with("/dev/video") {
        return format!("path=v4l2:{device_path} ");
    }
    warn!(device_path, "unknown device path format, passing through");
    format!("path={device_path} ")
}

/// Build the caps fragment restricting resolution and framerate.
fn build_caps_filter(format: &CameraFormat) -> String {
    match format.framerate {
        Some(framerate) => format!(
            "width=(int){},height=(int){},framerate=(fraction){}",
            format.width,
            format.height,
            framerate.as_gst_fraction()
        ),
        None => format!("width=(int){},height=(int){}", format.width, format.height),
    }
}

/// Build the full pipeline description for a pixel format.
///
/// MJPEG goes through jpegparse and a decoder; raw formats are constrained
/// by caps and handed to videoconvert. Either way the appsink sees RGBA.
fn build_pipeline_string(source_prop: &str, caps_filter: &str, pixel_format: &str) -> String {
    let convert = format!(
        "videoconvert n-threads={} ! video/x-raw,format={} ! appsink name=sink",
        pipeline::videoconvert_threads(),
        pipeline::OUTPUT_FORMAT
    );

    match pixel_format {
        "MJPG" | "MJPEG" | "JPEG" => {
            let decoder = mjpeg_decoder();
            debug!(decoder, "building MJPEG pipeline");
            format!(
                "pipewiresrc {}do-timestamp=true ! \
                 queue max-size-buffers={} leaky=downstream ! \
                 image/jpeg,{} ! jpegparse ! {} ! {}",
                source_prop,
                pipeline::MAX_BUFFERS,
                caps_filter,
                decoder,
                convert
            )
        }
        raw if PixelFormat::from_gst_format(gst_raw_format(raw)).is_some() => {
            format!(
                "pipewiresrc {}do-timestamp=true ! \
                 video/x-raw,format={},{} ! {}",
                source_prop,
                gst_raw_format(raw),
                caps_filter,
                convert
            )
        }
        other => {
            // Unknown format: let GStreamer negotiate and decode whatever
            // the node offers.
            debug!(pixel_format = other, "unknown format, using decodebin");
            format!(
                "pipewiresrc {}do-timestamp=true ! decodebin ! {}",
                source_prop, convert
            )
        }
    }
}

/// Translate V4L2 FourCC spellings onto GStreamer format names.
fn gst_raw_format(pixel_format: &str) -> &str {
    match pixel_format {
        "YUYV" => "YUY2",
        "GREY" => "GRAY8",
        "RGB3" => "RGB",
        other => other,
    }
}

/// Pick an MJPEG decoder element that is actually installed.
fn mjpeg_decoder() -> &'static str {
    for candidate in ["jpegdec", "avdec_mjpeg"] {
        if gstreamer::ElementFactory::find(candidate).is_some() {
            return candidate;
        }
    }
    "jpegdec"
}

/// Launch the pipeline, retrying around PipeWire's transient refusals.
fn launch_with_retries(pipeline_str: &str) -> Result<gstreamer::Pipeline, CameraError> {
    let mut last_error = None;
    for attempt in 1..=PIPELINE_CREATE_RETRIES {
        debug!(pipeline = %pipeline_str, attempt, "launching pipeline");
        match try_launch(pipeline_str) {
            Ok(pipeline) => return Ok(pipeline),
            Err(e) => {
                if attempt < PIPELINE_CREATE_RETRIES {
                    warn!(
                        attempt,
                        max_attempts = PIPELINE_CREATE_RETRIES,
                        error = %e,
                        "pipeline launch failed, retrying"
                    );
                    std::thread::sleep(std::time::Duration::from_millis(PIPELINE_RETRY_DELAY_MS));
                }
                last_error = Some(e);
            }
        }
    }
    Err(CameraError::InitializationFailed(
        last_error.unwrap_or_else(|| "pipeline creation failed".to_string()),
    ))
}

/// Parse and start a single pipeline, checking the bus on failure.
fn try_launch(pipeline_str: &str) -> Result<gstreamer::Pipeline, String> {
    let pipeline = gstreamer::parse::launch(pipeline_str)
        .map_err(|e| format!("failed to parse pipeline: {e}"))?
        .dynamic_cast::<gstreamer::Pipeline>()
        .map_err(|_| "parsed element is not a pipeline".to_string())?;

    if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
        let bus_error = check_bus_for_errors(&pipeline);
        let _ = pipeline.set_state(gstreamer::State::Null);
        let _ = pipeline.state(gstreamer::ClockTime::from_seconds(2));
        return Err(match bus_error {
            Some(detail) => detail,
            None => format!("failed to set pipeline to Playing: {e}"),
        });
    }

    let (result, state, pending) = pipeline.state(gstreamer::ClockTime::from_mseconds(
        timing::STATE_CHANGE_TIMEOUT_MS,
    ));

    if result.is_ok() && state == gstreamer::State::Playing {
        debug!(?state, "pipeline reached Playing");
        return Ok(pipeline);
    }
    // An async transition towards Playing is accepted for fast startup,
    // frames arrive once the device is ready.
    if matches!(result, Ok(gstreamer::StateChangeSuccess::Async))
        && pending == gstreamer::State::Playing
    {
        debug!(?state, ?pending, "pipeline transitioning asynchronously");
        return Ok(pipeline);
    }

    error!(?state, ?result, ?pending, "pipeline failed to reach Playing");
    let bus_error = check_bus_for_errors(&pipeline);
    let _ = pipeline.set_state(gstreamer::State::Null);
    // Wait for Null to complete so GStreamer releases all buffers.
    let _ = pipeline.state(gstreamer::ClockTime::from_seconds(2));
    Err(match bus_error {
        Some(detail) => detail,
        None => format!("pipeline failed to start (state: {state:?}, result: {result:?})"),
    })
}

/// Drain the bus for a concrete error message.
fn check_bus_for_errors(pipeline: &gstreamer::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let msg = bus.timed_pop_filtered(
        gstreamer::ClockTime::from_mseconds(100),
        &[
            gstreamer::MessageType::Error,
            gstreamer::MessageType::Warning,
        ],
    )?;
    match msg.view() {
        gstreamer::MessageView::Error(err) => {
            error!(
                error = %err.error(),
                debug = ?err.debug(),
                source = ?err.src().map(|s| s.name()),
                "GStreamer error during pipeline start"
            );
            Some(err.error().to_string())
        }
        gstreamer::MessageView::Warning(warn_msg) => {
            warn!(
                warning = %warn_msg.error(),
                debug = ?warn_msg.debug(),
                "GStreamer warning during pipeline start"
            );
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::Framerate;

    #[test]
    fn test_source_property_mapping() {
        assert_eq!(source_property(""), "");
        assert_eq!(source_property("pipewire-serial-1217"), "target-object=1217 ");
        assert_eq!(source_property("pipewire-50"), "target-object=50 ");
        assert_eq!(source_property("/dev/video0"), "path=v4l2:/dev/video0 ");
        assert_eq!(
            source_property("v4l2:/dev/video2"),
            "path=v4l2:/dev/video2 "
        );
    }

    #[test]
    fn test_caps_filter() {
        let format = CameraFormat {
            width: 1280,
            height: 720,
            framerate: Some(Framerate::from_int(30)),
            pixel_format: "YUY2".to_string(),
        };
        assert_eq!(
            build_caps_filter(&format),
            "width=(int)1280,height=(int)720,framerate=(fraction)30/1"
        );

        let no_rate = CameraFormat {
            framerate: None,
            ..format
        };
        assert_eq!(
            build_caps_filter(&no_rate),
            "width=(int)1280,height=(int)720"
        );
    }

    #[test]
    fn test_pipeline_string_shapes() {
        gstreamer::init().expect("gstreamer init");
        let mjpeg = build_pipeline_string("target-object=9 ", "width=(int)640", "MJPG");
        assert!(mjpeg.contains("image/jpeg"), "MJPEG goes through a decoder");
        assert!(mjpeg.contains("jpegparse"));
        assert!(mjpeg.ends_with("appsink name=sink"));

        let raw = build_pipeline_string("", "width=(int)640", "YUYV");
        assert!(
            raw.contains("video/x-raw,format=YUY2"),
            "YUYV maps onto GStreamer's YUY2 spelling"
        );
        assert!(raw.contains("format=RGBA"), "output is always RGBA");

        let unknown = build_pipeline_string("", "width=(int)640", "H264");
        assert!(unknown.contains("decodebin"));
    }
}
