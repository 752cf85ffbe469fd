// Live camera capture through GStreamer
//
// Pipeline: <camera src> ! videoconvert ! videoscale ! appsink(video/x-raw,format=RGB,WxH)
//
// The appsink keeps a single buffer and drops older ones, so a slow consumer
// always reads the most recent frame instead of falling behind the camera.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use gstreamer_video::prelude::*;

use super::{Frame, FrameSize, FrameSource, Result, VideoError};

/// How long to wait for the first frame before declaring the camera unusable
const FIRST_FRAME_TIMEOUT_SECS: u64 = 10;

/// Camera frame source backed by a GStreamer pipeline
pub struct CameraSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
}

impl CameraSource {
    /// Build and start the capture pipeline, then wait for the first frame.
    ///
    /// `element` is the source element factory (e.g. "autovideosrc", "v4l2src");
    /// `device`, when given, is set as the element's "device" property.
    pub fn open(element: &str, device: Option<&str>, size: FrameSize) -> Result<Self> {
        crate::gstreamer_init::init_gstreamer()?;

        let pipeline = gst::Pipeline::new();

        let mut source_builder = gst::ElementFactory::make(element).name("camera");
        if let Some(device) = device {
            source_builder = source_builder.property("device", device);
        }
        let source = source_builder.build().map_err(|e| {
            VideoError::DeviceUnavailable(format!("Failed to create {}: {}", element, e))
        })?;

        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| VideoError::Pipeline(format!("Failed to create videoconvert: {}", e)))?;

        let scale = gst::ElementFactory::make("videoscale")
            .build()
            .map_err(|e| VideoError::Pipeline(format!("Failed to create videoscale: {}", e)))?;

        let caps = gst_video::VideoCapsBuilder::new()
            .format(gst_video::VideoFormat::Rgb)
            .width(size.width as i32)
            .height(size.height as i32)
            .build();

        let appsink = gst_app::AppSink::builder()
            .name("frames")
            .caps(&caps)
            .max_buffers(1)
            .drop(true)
            .sync(false)
            .build();

        pipeline
            .add_many([&source, &convert, &scale, appsink.upcast_ref()])
            .map_err(|e| VideoError::Pipeline(format!("Failed to add elements: {}", e)))?;

        gst::Element::link_many([&source, &convert, &scale, appsink.upcast_ref()])
            .map_err(|e| VideoError::Pipeline(format!("Failed to link elements: {}", e)))?;

        pipeline.set_state(gst::State::Playing)?;

        let camera = Self {
            pipeline,
            appsink,
        };

        // A camera that never produces a frame is as good as missing
        if camera
            .appsink
            .try_pull_sample(gst::ClockTime::from_seconds(FIRST_FRAME_TIMEOUT_SECS))
            .is_none()
        {
            let reason = camera
                .pipeline_error()
                .unwrap_or_else(|| format!("no frame within {}s", FIRST_FRAME_TIMEOUT_SECS));
            return Err(VideoError::DeviceUnavailable(reason));
        }

        log::info!("Camera opened via {} at {}", element, size);
        Ok(camera)
    }

    /// Pop the first error message off the pipeline bus, if any
    fn pipeline_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(format!(
                "{} ({})",
                err.error(),
                err.debug().unwrap_or_default()
            )),
            _ => None,
        }
    }
}

impl FrameSource for CameraSource {
    fn read_frame(&mut self, frame: &mut Frame) -> Result<()> {
        let sample = self.appsink.pull_sample().map_err(|_| {
            match self.pipeline_error() {
                Some(reason) => VideoError::Pipeline(reason),
                None => VideoError::EndOfStream,
            }
        })?;

        let buffer = sample
            .buffer()
            .ok_or_else(|| VideoError::Pipeline("Sample without buffer".into()))?;
        let caps = sample
            .caps()
            .ok_or_else(|| VideoError::Pipeline("Sample without caps".into()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| VideoError::Pipeline(format!("Bad caps: {}", e)))?;
        let video_frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info)
            .map_err(|e| VideoError::Pipeline(format!("Failed to map frame: {}", e)))?;

        let width = video_frame.width();
        let height = video_frame.height();
        if width == 0 || height == 0 {
            return Err(VideoError::Pipeline("Empty frame from camera".into()));
        }
        let stride = video_frame.plane_stride()[0] as usize;
        let plane = video_frame
            .plane_data(0)
            .map_err(|e| VideoError::Pipeline(format!("Failed to read plane: {}", e)))?;

        frame.reshape(width, height);
        let row_bytes = width as usize * Frame::CHANNELS;
        // RGB rows are padded to 4 bytes in GStreamer buffers
        for (row, dst) in frame.data.chunks_exact_mut(row_bytes).enumerate() {
            let start = row * stride;
            dst.copy_from_slice(&plane[start..start + row_bytes]);
        }

        Ok(())
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
