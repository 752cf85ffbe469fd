// Video input and output
//
// The detection loop only talks to the traits in this module. The GStreamer
// implementations live in `source` (camera capture through an appsink) and
// `writer` (appsrc -> encoder -> muxer -> filesink).

pub mod frame;
pub mod source;
pub mod writer;

pub use frame::{Frame, FrameSize, GrayImage};
pub use source::CameraSource;
pub use writer::{GstSinkFactory, GstVideoWriter};

use std::path::Path;

use gstreamer as gst;

use crate::encoding::VideoCodec;

/// Error type for video capture and writing
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("GStreamer error: {0}")]
    Gst(#[from] gst::glib::Error),

    #[error("GStreamer state error: {0}")]
    StateChange(#[from] gst::StateChangeError),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Stream ended")]
    EndOfStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VideoError>;

/// Blocking source of frames
pub trait FrameSource {
    /// Block until the next frame arrives and write it into `frame`,
    /// reusing the frame's allocation.
    fn read_frame(&mut self, frame: &mut Frame) -> Result<()>;
}

/// An open video file accepting frames
pub trait VideoSink {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Finalize the file and return its size in bytes
    fn close(self: Box<Self>) -> Result<u64>;
}

/// Opens video sinks for a given codec
pub trait SinkFactory {
    fn open(
        &mut self,
        path: &Path,
        codec: VideoCodec,
        fps: u32,
        size: FrameSize,
    ) -> Result<Box<dyn VideoSink>>;
}
