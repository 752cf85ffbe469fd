// Configuration management for mdet
//
// Settings come from a TOML file (`--config=PATH`, else the user config dir)
// and are then overridden by command-line flags. The result is an immutable
// snapshot handed to the detection loop at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::encoding::VideoCodec;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Option {0} needs a value")]
    MissingValue(String),

    #[error("Invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },

    #[error("Unknown video codec: {0}")]
    UnknownCodec(String),

    #[error("Motion threshold {0} is outside [0, 255]")]
    ThresholdOutOfRange(f64),

    #[error("Maximum video length {0} s must be finite and at most one day")]
    VideoLengthOutOfRange(f64),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Also write log records to this file
    pub log_file: Option<PathBuf>,

    /// Where clips are written
    pub video_dir: PathBuf,

    /// Finished clips are copied here in the background
    pub remote_copy_dir: Option<PathBuf>,

    /// Codec tried before the fallback list
    pub preferred_codec: Option<VideoCodec>,

    /// Exit after this many clips; 0 means never
    pub max_videos: u64,

    /// Clip length limit in seconds; 0 or less disables capture
    pub max_video_length_secs: f64,

    /// Frames are read and discarded this long before the background is taken
    pub startup_delay_secs: u32,

    /// Fixed threshold; calibrated at startup when absent
    pub motion_threshold: Option<f64>,

    /// Start with the status line off
    pub headless: bool,

    /// Camera device node; `autovideosrc` picks one when unset
    pub camera_device: Option<String>,

    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_file: None,
            video_dir: PathBuf::from("."),
            remote_copy_dir: None,
            preferred_codec: None,
            max_videos: 512,
            max_video_length_secs: 30.0,
            startup_delay_secs: 5,
            motion_threshold: None,
            headless: false,
            camera_device: None,
            frame_width: 640,
            frame_height: 480,
        }
    }
}

/// What the command line asked for
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Run(Config),
    Help,
}

/// Longest clip a single recording may be configured for (one day)
pub const MAX_VIDEO_LENGTH_SECS: f64 = 86_400.0;

pub const USAGE: &str = "\
usage: mdet [options]
  --config=PATH             read settings from PATH
  --headless                start with the status line off
  --log-file=PATH           also log to PATH
  --max-videos=N            exit after N clips (0: never)
  --max-video-length=SECS   clip length limit (0: capture disabled)
  --motion-threshold=X      fixed threshold in [0, 255], skips calibration
  --preferred-fourcc=CODE   try this codec first (H264, X264, XVID, MP4V)
  --remote-copy=DIR         copy finished clips into DIR
  --startup-delay=SECS      warm-up before the background is taken
  --video-dir=DIR           write clips into DIR
  -h, --help                show this help";

impl Config {
    /// Load config from `path`, failing on unreadable or malformed files
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load config from the default location, or defaults if there is no file.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default() -> Result<Self> {
        Self::load_if_present(&get_config_path())
    }

    fn load_if_present(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(threshold) = self.motion_threshold {
            if !(0.0..=255.0).contains(&threshold) {
                return Err(ConfigError::ThresholdOutOfRange(threshold));
            }
        }
        let length = self.max_video_length_secs;
        if !length.is_finite() || length > MAX_VIDEO_LENGTH_SECS {
            return Err(ConfigError::VideoLengthOutOfRange(length));
        }
        Ok(())
    }

    /// Apply one `--name[=value]` flag
    fn apply_flag(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        let need = |value: Option<&str>| {
            value
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ConfigError::MissingValue(name.to_string()))
        };
        match name {
            "--headless" => self.headless = true,
            "--log-file" => self.log_file = Some(PathBuf::from(need(value)?)),
            "--max-videos" => self.max_videos = parse_number(name, &need(value)?)?,
            "--max-video-length" => {
                self.max_video_length_secs = parse_number(name, &need(value)?)?
            }
            "--motion-threshold" => {
                self.motion_threshold = Some(parse_number(name, &need(value)?)?)
            }
            "--preferred-fourcc" => {
                let code = need(value)?;
                self.preferred_codec =
                    Some(VideoCodec::from_fourcc(&code).ok_or(ConfigError::UnknownCodec(code))?);
            }
            "--remote-copy" => self.remote_copy_dir = Some(PathBuf::from(need(value)?)),
            "--startup-delay" => self.startup_delay_secs = parse_number(name, &need(value)?)?,
            "--video-dir" => self.video_dir = PathBuf::from(need(value)?),
            _ => return Err(ConfigError::UnknownOption(name.to_string())),
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(option: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    })
}

/// Build the run configuration from command-line arguments (without argv[0]).
///
/// `--config=PATH` selects the file the other flags are layered on.
pub fn parse_args<I, S>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
    let mut flags = Vec::new();
    let mut config_file = None;

    for arg in &args {
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg.as_str(), None),
        };
        match name {
            "-h" | "--help" => return Ok(Invocation::Help),
            "--config" => {
                config_file = Some(PathBuf::from(
                    value
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| ConfigError::MissingValue(name.to_string()))?,
                ))
            }
            _ => flags.push((name, value)),
        }
    }

    let mut config = match config_file {
        Some(path) => Config::load(&path)?,
        None => Config::load_or_default()?,
    };
    for (name, value) in flags {
        config.apply_flag(name, value)?;
    }
    config.validate()?;
    Ok(Invocation::Run(config))
}

/// Get the config file path
fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mdet")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_config(args: &[&str]) -> Config {
        match parse_args(args.iter()).unwrap() {
            Invocation::Run(config) => config,
            Invocation::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "video_dir = \"/var/clips\"\nmax_videos = 10\npreferred_codec = \"XVID\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.video_dir, PathBuf::from("/var/clips"));
        assert_eq!(config.max_videos, 10);
        assert_eq!(config.preferred_codec, Some(VideoCodec::Xvid));
        assert_eq!(config.max_video_length_secs, 30.0);
        assert_eq!(config.startup_delay_secs, 5);
    }

    #[test]
    fn flags_override_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "max_videos = 10\nheadless = false\n").unwrap();

        let config_arg = format!("--config={}", path.display());
        let config = run_config(&[
            config_arg.as_str(),
            "--max-videos=3",
            "--headless",
            "--motion-threshold=4.5",
            "--preferred-fourcc=x264",
            "--remote-copy=/mnt/offsite",
            "--max-video-length=0",
        ]);

        assert_eq!(config.max_videos, 3);
        assert!(config.headless);
        assert_eq!(config.motion_threshold, Some(4.5));
        assert_eq!(config.preferred_codec, Some(VideoCodec::X264));
        assert_eq!(config.remote_copy_dir, Some(PathBuf::from("/mnt/offsite")));
        assert_eq!(config.max_video_length_secs, 0.0);
    }

    #[test]
    fn help_wins() {
        assert_eq!(parse_args(["--bogus", "-h"]).unwrap(), Invocation::Help);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            parse_args(["--frobnicate"]),
            Err(ConfigError::UnknownOption(_))
        ));
        assert!(matches!(
            parse_args(["--max-videos=lots"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_args(["--video-dir"]),
            Err(ConfigError::MissingValue(_))
        ));
        assert!(matches!(
            parse_args(["--preferred-fourcc=DIVX"]),
            Err(ConfigError::UnknownCodec(_))
        ));
        assert!(matches!(
            parse_args(["--motion-threshold=300"]),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "max_videos = \"many\"").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn malformed_default_file_is_not_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "max_videos = \"many\"").unwrap();
        assert!(matches!(
            Config::load_if_present(&path),
            Err(ConfigError::Parse { .. })
        ));

        let missing = tmp.path().join("absent.toml");
        assert_eq!(
            Config::load_if_present(&missing).unwrap().max_videos,
            Config::default().max_videos
        );
    }

    #[test]
    fn rejects_unbounded_video_length() {
        for arg in ["--max-video-length=inf", "--max-video-length=1e30", "--max-video-length=NaN"] {
            assert!(
                matches!(parse_args([arg]), Err(ConfigError::VideoLengthOutOfRange(_))),
                "{arg}"
            );
        }
        assert!(matches!(
            parse_args(["--max-video-length=-inf"]),
            Err(ConfigError::VideoLengthOutOfRange(_))
        ));

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "max_video_length_secs = inf\n").unwrap();
        let config_arg = format!("--config={}", path.display());
        assert!(matches!(
            parse_args([config_arg.as_str()]),
            Err(ConfigError::VideoLengthOutOfRange(_))
        ));

        let config = run_config(&["--max-video-length=3600"]);
        assert_eq!(config.max_video_length_secs, 3600.0);
    }
}
