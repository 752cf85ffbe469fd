//! GStreamer initialization
//!
//! Both the camera source and the video writer call `init_gstreamer()` before
//! building pipelines. The first call initializes the library and logs the
//! runtime version; later calls return the cached outcome.

use std::sync::OnceLock;

use crate::video::VideoError;

static GSTREAMER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize GStreamer once for the whole process
pub fn init_gstreamer() -> Result<(), VideoError> {
    GSTREAMER_INIT
        .get_or_init(|| match gstreamer::init() {
            Ok(()) => {
                log_gstreamer_version();
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to initialize GStreamer: {}", e);
                Err(e.to_string())
            }
        })
        .clone()
        .map_err(VideoError::Pipeline)
}

fn log_gstreamer_version() {
    let (major, minor, micro, nano) = gstreamer::version();
    log::info!(
        "GStreamer {}.{}.{}{} initialized",
        major,
        minor,
        micro,
        if nano > 0 { " (dev)" } else { "" }
    );
}
