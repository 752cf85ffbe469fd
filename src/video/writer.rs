// Video file writer
//
// Pipeline: appsrc(RGB) -> videoconvert -> encoder -> parser -> muxer -> filesink
//
// Creating the writer fails if any element is missing from the GStreamer
// installation; the recorder treats that as "this codec is unavailable" and
// moves on to the next one.

use std::path::{Path, PathBuf};

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use crate::encoding::VideoCodec;

use super::{Frame, FrameSize, Result, SinkFactory, VideoError, VideoSink};

/// How long `close()` waits for the muxer to finish writing
const FINALIZE_TIMEOUT_SECS: u64 = 5;

/// GStreamer-backed video file writer
pub struct GstVideoWriter {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    output_path: PathBuf,
    /// Bytes per row expected by the appsrc caps (RGB rows are 4-byte aligned)
    stride: usize,
    frame_duration_ns: u64,
    frames_written: u64,
}

impl GstVideoWriter {
    /// Create a new writer for `codec` and start its pipeline
    pub fn new(path: &Path, codec: VideoCodec, fps: u32, size: FrameSize) -> Result<Self> {
        crate::gstreamer_init::init_gstreamer()?;

        let fps = fps.max(1);
        let container = codec.container();
        let pipeline = gst::Pipeline::new();

        log::debug!(
            "Creating {} writer with {} codec for {}",
            container.extension(),
            codec,
            path.display()
        );

        let info = gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgb, size.width, size.height)
            .fps(gst::Fraction::new(fps as i32, 1))
            .build()
            .map_err(|e| VideoError::Pipeline(format!("Failed to create video info: {}", e)))?;
        let caps = info
            .to_caps()
            .map_err(|e| VideoError::Pipeline(format!("Failed to create caps: {}", e)))?;

        let appsrc = gst_app::AppSrc::builder()
            .name("src")
            .caps(&caps)
            .format(gst::Format::Time)
            .build();

        let convert = make_element("videoconvert")?;
        let encoder = make_element(codec.gst_encoder())?;
        if codec == VideoCodec::X264 {
            encoder.set_property_from_str("speed-preset", "ultrafast");
        }
        let parser = make_element(codec.gst_parser())?;
        let muxer = make_element(container.gst_muxer())?;

        let filesink = gst::ElementFactory::make("filesink")
            .property("location", path.to_string_lossy().to_string())
            .property("async", false)
            .build()
            .map_err(|e| VideoError::Pipeline(format!("Failed to create filesink: {}", e)))?;

        pipeline
            .add_many([appsrc.upcast_ref(), &convert, &encoder, &parser, &muxer, &filesink])
            .map_err(|e| VideoError::Pipeline(format!("Failed to add elements: {}", e)))?;

        gst::Element::link_many([appsrc.upcast_ref(), &convert, &encoder, &parser, &muxer, &filesink])
            .map_err(|e| VideoError::Pipeline(format!("Failed to link elements: {}", e)))?;

        let writer = Self {
            pipeline,
            appsrc,
            output_path: path.to_path_buf(),
            stride: info.stride()[0] as usize,
            frame_duration_ns: 1_000_000_000 / fps as u64,
            frames_written: 0,
        };

        // Drop cleans up the pipeline if this fails
        writer.pipeline.set_state(gst::State::Playing)?;

        Ok(writer)
    }

    /// Copy packed RGB rows into the stride layout the caps promise
    fn frame_bytes(&self, frame: &Frame) -> Vec<u8> {
        let row_bytes = frame.width as usize * Frame::CHANNELS;
        if row_bytes == self.stride || row_bytes == 0 {
            return frame.data.clone();
        }
        let mut bytes = vec![0u8; self.stride * frame.height as usize];
        for (src, dst) in frame
            .data
            .chunks_exact(row_bytes)
            .zip(bytes.chunks_exact_mut(self.stride))
        {
            dst[..row_bytes].copy_from_slice(src);
        }
        bytes
    }
}

impl VideoSink for GstVideoWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let pts = self.frames_written * self.frame_duration_ns;
        let mut buffer = gst::Buffer::from_mut_slice(self.frame_bytes(frame));
        if let Some(buffer_ref) = buffer.get_mut() {
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts));
            buffer_ref.set_duration(gst::ClockTime::from_nseconds(self.frame_duration_ns));
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| VideoError::Pipeline(format!("Failed to push buffer: {:?}", e)))?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<u64> {
        if let Err(e) = self.appsrc.end_of_stream() {
            log::warn!("Failed to send EOS to {}: {:?}", self.output_path.display(), e);
        }

        let mut pipeline_error: Option<String> = None;
        if let Some(bus) = self.pipeline.bus() {
            for msg in bus.iter_timed(gst::ClockTime::from_seconds(FINALIZE_TIMEOUT_SECS)) {
                match msg.view() {
                    gst::MessageView::Eos(..) => break,
                    gst::MessageView::Error(err) => {
                        pipeline_error = Some(format!(
                            "{} ({})",
                            err.error(),
                            err.debug().unwrap_or_default()
                        ));
                        break;
                    }
                    _ => {}
                }
            }
        }

        // Always set pipeline to NULL before dropping to avoid GStreamer warnings
        let _ = self.pipeline.set_state(gst::State::Null);

        if let Some(err) = pipeline_error {
            return Err(VideoError::Pipeline(err));
        }

        let size = std::fs::metadata(&self.output_path)
            .map(|m| m.len())
            .unwrap_or(0);
        log::debug!(
            "Writer finished: {} ({} frames, {} bytes)",
            self.output_path.display(),
            self.frames_written,
            size
        );
        Ok(size)
    }
}

impl Drop for GstVideoWriter {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn make_element(name: &str) -> Result<gst::Element> {
    gst::ElementFactory::make(name)
        .build()
        .map_err(|e| VideoError::Pipeline(format!("Failed to create {}: {}", name, e)))
}

/// Opens `GstVideoWriter`s
#[derive(Debug, Default, Clone, Copy)]
pub struct GstSinkFactory;

impl SinkFactory for GstSinkFactory {
    fn open(
        &mut self,
        path: &Path,
        codec: VideoCodec,
        fps: u32,
        size: FrameSize,
    ) -> Result<Box<dyn VideoSink>> {
        Ok(Box::new(GstVideoWriter::new(path, codec, fps, size)?))
    }
}
