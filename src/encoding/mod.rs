// Video codec and container support for motion clips
//
// Each codec is identified by the four character code users already know from
// the command line (H264, X264, XVID, MP4V). The recorder tries the preferred
// code first and then walks FALLBACK in order until a writer opens.
// To add a new codec:
// 1. Add variant to VideoCodec enum
// 2. Add the fourcc mapping in from_fourcc() and fourcc()
// 3. Add encoder/parser element names and the container mapping
// 4. Decide where it goes in FALLBACK

use serde::{Deserialize, Serialize};

/// Supported video codecs for recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    /// H.264 through Cisco's openh264 encoder
    #[serde(rename = "H264")]
    H264,
    /// H.264 through x264
    #[serde(rename = "X264")]
    X264,
    /// MPEG-4 Part 2 in an AVI container (the classic Xvid layout)
    #[serde(rename = "XVID")]
    Xvid,
    /// MPEG-4 Part 2 in an MP4 container
    #[serde(rename = "MP4V")]
    Mp4v,
}

impl VideoCodec {
    /// Fallback order used when no preferred codec is set or it fails to open
    pub const FALLBACK: &'static [VideoCodec] = &[
        VideoCodec::H264,
        VideoCodec::X264,
        VideoCodec::Xvid,
        VideoCodec::Mp4v,
    ];

    /// Parse a four character code (case-insensitive)
    pub fn from_fourcc(code: &str) -> Option<VideoCodec> {
        match code.to_ascii_uppercase().as_str() {
            "H264" | "AVC1" => Some(VideoCodec::H264),
            "X264" => Some(VideoCodec::X264),
            "XVID" => Some(VideoCodec::Xvid),
            "MP4V" | "FMP4" => Some(VideoCodec::Mp4v),
            _ => None,
        }
    }

    pub fn fourcc(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H264",
            VideoCodec::X264 => "X264",
            VideoCodec::Xvid => "XVID",
            VideoCodec::Mp4v => "MP4V",
        }
    }

    /// GStreamer encoder element name
    pub fn gst_encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "openh264enc",
            VideoCodec::X264 => "x264enc",
            VideoCodec::Xvid => "avenc_mpeg4",
            VideoCodec::Mp4v => "avenc_mpeg4",
        }
    }

    /// GStreamer parser element placed between encoder and muxer
    pub fn gst_parser(&self) -> &'static str {
        match self {
            VideoCodec::H264 | VideoCodec::X264 => "h264parse",
            VideoCodec::Xvid | VideoCodec::Mp4v => "mpeg4videoparse",
        }
    }

    pub fn container(&self) -> ContainerFormat {
        match self {
            VideoCodec::H264 | VideoCodec::X264 | VideoCodec::Mp4v => ContainerFormat::Mp4,
            VideoCodec::Xvid => ContainerFormat::Avi,
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.fourcc())
    }
}

/// Supported container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// MP4 (.mp4)
    Mp4,
    /// AVI (.avi)
    Avi,
}

impl ContainerFormat {
    /// Get the file extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Avi => "avi",
        }
    }

    /// Get the GStreamer muxer element name
    pub fn gst_muxer(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4mux",
            ContainerFormat::Avi => "avimux",
        }
    }
}

/// Ordered list of codecs to try for one recording attempt.
///
/// The preferred codec comes first; the fallback list follows without
/// repeating it.
pub fn codec_attempts(preferred: Option<VideoCodec>) -> Vec<VideoCodec> {
    let mut attempts = Vec::with_capacity(VideoCodec::FALLBACK.len() + 1);
    if let Some(codec) = preferred {
        attempts.push(codec);
    }
    for codec in VideoCodec::FALLBACK {
        if Some(*codec) != preferred {
            attempts.push(*codec);
        }
    }
    attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_parsing_is_case_insensitive() {
        assert_eq!(VideoCodec::from_fourcc("h264"), Some(VideoCodec::H264));
        assert_eq!(VideoCodec::from_fourcc("Xvid"), Some(VideoCodec::Xvid));
        assert_eq!(VideoCodec::from_fourcc("MJPG"), None);
        for codec in VideoCodec::FALLBACK {
            assert_eq!(VideoCodec::from_fourcc(codec.fourcc()), Some(*codec));
        }
    }

    #[test]
    fn attempts_without_preference_follow_fallback_order() {
        assert_eq!(codec_attempts(None), VideoCodec::FALLBACK.to_vec());
    }

    #[test]
    fn preferred_codec_goes_first_and_is_not_repeated() {
        let attempts = codec_attempts(Some(VideoCodec::Xvid));
        assert_eq!(
            attempts,
            vec![VideoCodec::Xvid, VideoCodec::H264, VideoCodec::X264, VideoCodec::Mp4v]
        );
    }

    #[test]
    fn xvid_lands_in_avi() {
        assert_eq!(VideoCodec::Xvid.container().extension(), "avi");
        assert_eq!(VideoCodec::H264.container().gst_muxer(), "mp4mux");
    }
}
