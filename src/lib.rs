// mdet - motion-triggered pre-roll video capture
// Main library entry point

pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod encoding;
pub mod gstreamer_init;
pub mod motion;
pub mod recording;
pub mod storage;
pub mod video;

use std::fs::{File, OpenOptions};
use std::io::{IsTerminal, Write};
use std::path::Path;

use anyhow::Context;

use crate::commands::{CommandInput, NoCommands, StdinCommands};
use crate::config::{Config, Invocation};
use crate::recording::MotionMonitor;
use crate::video::{CameraSource, FrameSize, GstSinkFactory};

/// Written next to the working directory when startup fails, for runs where
/// nobody watches stderr (e.g. launched by a scheduler)
const FATAL_LOG: &str = "fatal.log";

/// Default source element when no device node is configured
const AUTO_CAMERA: &str = "autovideosrc";
const V4L2_CAMERA: &str = "v4l2src";

/// Log writer that copies every record to stderr and a log file
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = std::io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = std::io::stderr().flush();
        self.file.flush()
    }
}

/// Set up `env_logger` with local timestamps, optionally teeing to `log_file`
pub fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
    }

    builder.try_init().context("failed to initialize logging")?;
    Ok(())
}

/// Report an unrecoverable startup error and exit
fn fatal(error: &anyhow::Error) -> ! {
    let message = format!("FATAL: {:#}", error);
    log::error!("{}", message);
    if let Ok(mut file) = File::create(FATAL_LOG) {
        let _ = writeln!(file, "{}", message);
    }
    std::process::exit(1);
}

fn open_camera(config: &Config) -> anyhow::Result<CameraSource> {
    let size = FrameSize::new(config.frame_width, config.frame_height);
    let camera = match &config.camera_device {
        Some(device) => CameraSource::open(V4L2_CAMERA, Some(device.as_str()), size),
        None => CameraSource::open(AUTO_CAMERA, None, size),
    };
    camera.context("cannot open camera")
}

fn command_input() -> Box<dyn CommandInput> {
    if !std::io::stdin().is_terminal() {
        return Box::new(NoCommands);
    }
    match StdinCommands::spawn() {
        Ok(input) => Box::new(input),
        Err(e) => {
            log::warn!("key commands unavailable: {:#}", e);
            Box::new(NoCommands)
        }
    }
}

/// Build the detector from `config` and run it to completion
pub fn run_with(config: Config) -> anyhow::Result<()> {
    crate::gstreamer_init::init_gstreamer()?;

    let camera = match open_camera(&config) {
        Ok(camera) => camera,
        Err(e) => fatal(&e),
    };

    storage::create_directory_if_absent(&config.video_dir)
        .with_context(|| format!("cannot create {}", config.video_dir.display()))?;

    if let Some(remote) = &config.remote_copy_dir {
        if !storage::is_absolute_path(remote) {
            log::warn!("remote copy directory {} is not absolute", remote.display());
        }
        if !storage::directory_exists(remote) {
            log::warn!("remote copy directory {} does not exist yet", remote.display());
        }
    }

    let mut monitor = MotionMonitor::new(
        config,
        Box::new(camera),
        Box::new(GstSinkFactory),
        command_input(),
    );
    let summary = monitor.run()?;
    log::info!(
        "{} recordings, {} abandoned, {} frames",
        summary.recordings,
        summary.abandoned,
        summary.frames
    );
    Ok(())
}

/// Parse the command line and run
pub fn run() {
    let invocation = match config::parse_args(std::env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{}\n{}", e, config::USAGE);
            std::process::exit(2);
        }
    };
    let config = match invocation {
        Invocation::Help => {
            println!("{}", config::USAGE);
            return;
        }
        Invocation::Run(config) => config,
    };

    if let Err(e) = init_logging(config.log_file.as_deref()) {
        eprintln!("{:#}", e);
        fatal(&e);
    }

    if let Err(e) = run_with(config) {
        fatal(&e);
    }
}
