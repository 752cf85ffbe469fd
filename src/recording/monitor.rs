// Motion monitoring loop that triggers pre-roll recordings
//
// Single-threaded: every iteration blocks on the camera, scores the frame and
// then polls for a key command with whatever is left of the frame budget.
// That poll is the only place commands and the exit flag are observed.
// Copy workers are the only other threads and are reaped from here.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::commands::{Command, CommandInput, HELP};
use crate::config::Config;
use crate::diagnostics::{downsample, sparkline, Diagnostics};
use crate::encoding::{codec_attempts, VideoCodec};
use crate::motion::{run_countdown, BackgroundReference, Calibrator, MotionScorer, Tick};
use crate::recording::copy::{CopyDispatcher, CopyFn};
use crate::recording::preroll::{RingBuffer, PREVIOUS_FRAMES};
use crate::recording::samples::TimingSamples;
use crate::recording::trigger::{CaptureTrigger, Decision, StopReason, TriggerReason};
use crate::storage;
use crate::video::{Frame, FrameSize, FrameSource, SinkFactory, VideoError, VideoSink};

pub const TARGET_FPS: u32 = 30;

/// Time available per frame at the target rate
pub const FRAME_BUDGET: Duration = Duration::from_micros(1_000_000 / TARGET_FPS as u64);

/// A zero timeout would not wait at all
const MIN_POLL: Duration = Duration::from_millis(1);

/// Finished copies are reaped about every four seconds
pub const REAP_INTERVAL_FRAMES: u64 = 128;

/// The status line is printed about once per second
const HUD_INTERVAL_FRAMES: u64 = TARGET_FPS as u64;

/// Time source for pacing and recording length
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Mutable run flags, owned by the monitor and checked between frames
#[derive(Debug, Clone, Copy, Default)]
pub struct RunState {
    pub exit: bool,
    pub hud_enabled: bool,
}

/// What happened during a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Recordings that were opened and closed
    pub recordings: u64,
    /// Triggers whose sink could not be opened with any codec
    pub abandoned: u64,
    /// Triggers dropped because capture was disabled
    pub disabled: u64,
    pub frames: u64,
}

pub struct MotionMonitor {
    config: Config,
    source: Box<dyn FrameSource>,
    sinks: Box<dyn SinkFactory>,
    input: Box<dyn CommandInput>,
    clock: Box<dyn Clock>,
    calibrator: Calibrator,
    state: RunState,
    frames: RingBuffer<Frame>,
    background: BackgroundReference,
    scorer: MotionScorer,
    trigger: CaptureTrigger,
    copies: CopyDispatcher,
    frame_overhead: TimingSamples,
    hud_timing: TimingSamples,
    /// Commands that arrived while busy and wait for the next idle frame
    pending: VecDeque<Command>,
    summary: RunSummary,
    started: Option<Instant>,
    last_read_done: Option<Instant>,
}

impl MotionMonitor {
    pub fn new(
        config: Config,
        source: Box<dyn FrameSource>,
        sinks: Box<dyn SinkFactory>,
        input: Box<dyn CommandInput>,
    ) -> Self {
        let trigger = CaptureTrigger::new(
            config.motion_threshold.unwrap_or_default(),
            config.max_video_length_secs,
            config.max_videos,
        );
        Self {
            copies: CopyDispatcher::new(config.remote_copy_dir.clone()),
            state: RunState {
                exit: false,
                hud_enabled: !config.headless,
            },
            config,
            source,
            sinks,
            input,
            clock: Box::new(MonotonicClock),
            calibrator: Calibrator::new(),
            frames: RingBuffer::new(PREVIOUS_FRAMES),
            background: BackgroundReference::new(),
            scorer: MotionScorer::new(),
            trigger,
            frame_overhead: TimingSamples::new(),
            hud_timing: TimingSamples::new(),
            pending: VecDeque::new(),
            summary: RunSummary::default(),
            started: None,
            last_read_done: None,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_calibrator(mut self, calibrator: Calibrator) -> Self {
        self.calibrator = calibrator;
        self
    }

    pub fn with_copier(mut self, copier: CopyFn) -> Self {
        self.copies = CopyDispatcher::with_copier(self.config.remote_copy_dir.clone(), copier);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Warm up, take the background, calibrate, then watch until told to exit
    pub fn run(&mut self) -> anyhow::Result<RunSummary> {
        self.started = Some(self.clock.now());
        self.warm_up();
        if !self.state.exit {
            self.reset_background(0, "initial background")?;
        }
        if !self.state.exit {
            match self.config.motion_threshold {
                Some(threshold) => log::info!("motion threshold {:.3} (configured)", threshold),
                None => self.calibrate()?,
            }
        }

        log::info!("running");
        while !self.state.exit {
            self.step()?;
        }

        self.shutdown();
        Ok(self.summary.clone())
    }

    /// Read and discard frames while the camera's exposure settles
    fn warm_up(&mut self) {
        log::info!("warming up");
        let delay = Duration::from_secs(self.config.startup_delay_secs as u64);
        let start = self.clock.now();
        while !self.state.exit && self.clock.now().saturating_duration_since(start) < delay {
            let started = self.clock.now();
            self.capture_frame();
            if let Some(command) = self.pace(started) {
                self.on_busy_command(command);
            }
        }
    }

    /// One idle iteration: capture, score, maybe record, then wait for input
    fn step(&mut self) -> anyhow::Result<()> {
        let started = self.clock.now();
        if !self.capture_frame() {
            return Ok(());
        }

        let score = self.score_newest();
        self.hud(None);

        let threshold = self.trigger.threshold();
        if score > threshold {
            log::info!("motion detected ({:.3} > {:.3})", score, threshold);
        }
        match self.trigger.on_score(score, self.clock.now()) {
            Decision::Stay => {}
            decision => {
                self.handle_decision(decision)?;
                // the trigger may have been a lighting change; take it as the
                // new baseline so it does not fire again
                self.reset_background(0, "motion detected")?;
            }
        }

        if self.summary.frames % REAP_INTERVAL_FRAMES == 0 {
            self.copies.reap();
        }

        if let Some(command) = self.pace(started) {
            self.handle_command(command)?;
        }
        while !self.state.exit && !self.trigger.is_recording() {
            let Some(command) = self.pending.pop_front() else { break };
            self.handle_command(command)?;
        }
        Ok(())
    }

    fn handle_decision(&mut self, decision: Decision) -> anyhow::Result<()> {
        match decision {
            Decision::Stay => {}
            Decision::Start { index, reason } => self.record(index, reason)?,
            Decision::Disabled { reason } => {
                log::info!("aborting capture (vidcap disabled, {})", reason);
                self.summary.disabled += 1;
            }
        }
        Ok(())
    }

    /// Read the next frame into the ring.
    ///
    /// Returns `false` when the camera failed or its stream ended; the exit
    /// flag is set and the run winds down normally.
    fn capture_frame(&mut self) -> bool {
        // frame overhead: everything between two camera reads
        if let Some(done) = self.last_read_done.take() {
            let overhead = self.clock.now().saturating_duration_since(done);
            self.frame_overhead.record(overhead);
        }
        let slot = self.frames.add();
        match self.source.read_frame(slot) {
            Ok(()) => {
                self.summary.frames += 1;
                self.last_read_done = Some(self.clock.now());
                true
            }
            Err(VideoError::EndOfStream) => {
                log::warn!("camera stream ended");
                self.state.exit = true;
                false
            }
            Err(e) => {
                log::error!("failed to read frame: {}", e);
                self.state.exit = true;
                false
            }
        }
    }

    fn score_newest(&mut self) -> f64 {
        match self.frames.newest() {
            Some(frame) => self.scorer.score(frame, &self.background),
            None => 0.0,
        }
    }

    /// Wait out the rest of the frame budget, returning any command typed
    fn pace(&mut self, started: Instant) -> Option<Command> {
        let elapsed = self.clock.now().saturating_duration_since(started);
        let timeout = FRAME_BUDGET.saturating_sub(elapsed).max(MIN_POLL);
        self.input.poll(timeout)
    }

    /// Replace the background with a fresh frame, optionally after a countdown.
    ///
    /// A countdown cancelled by quitting keeps the old background.
    fn reset_background(&mut self, countdown_secs: u32, why: &str) -> anyhow::Result<()> {
        log::info!("resetting background ({})", why);
        if countdown_secs > 0 && !run_countdown(countdown_secs, |left| self.countdown_tick(left)) {
            log::info!("background reset cancelled");
            return Ok(());
        }
        if !self.capture_frame() {
            return Ok(());
        }
        if let Some(frame) = self.frames.newest() {
            let image = self.scorer.preprocess(frame);
            self.background.replace(image);
        }
        Ok(())
    }

    /// One second of countdown; quitting cancels it
    fn countdown_tick(&mut self, left: u32) -> Tick {
        println!("{}...", left);
        let deadline = self.clock.now() + Duration::from_secs(1);
        loop {
            if self.state.exit {
                return Tick::Cancel;
            }
            let now = self.clock.now();
            if now >= deadline {
                return Tick::Continue;
            }
            if let Some(command) = self.input.poll(deadline - now) {
                self.on_busy_command(command);
            }
        }
    }

    /// Derive the threshold from the next few frames of ambient noise
    fn calibrate(&mut self) -> anyhow::Result<()> {
        let calibrator = self.calibrator;
        let result = calibrator.run(|| -> anyhow::Result<f64> {
            let started = self.clock.now();
            if !self.capture_frame() {
                anyhow::bail!("no frame from camera");
            }
            let score = self.score_newest();
            if let Some(command) = self.pace(started) {
                self.on_busy_command(command);
            }
            if self.state.exit {
                anyhow::bail!("exit requested");
            }
            Ok(score)
        });

        match result {
            Ok(calibration) => {
                self.trigger.set_threshold(calibration.threshold);
                Ok(())
            }
            Err(e) if self.state.exit => {
                log::info!("calibration interrupted: {}", e);
                Ok(())
            }
            Err(e) => Err(e.context("calibration failed")),
        }
    }

    /// Open a sink for capture `index`, preferred codec first
    fn open_sink(&mut self, index: u64, size: FrameSize) -> Option<(Box<dyn VideoSink>, PathBuf)> {
        let preferred = self.config.preferred_codec;
        for (attempt, codec) in codec_attempts(preferred).into_iter().enumerate() {
            let is_preferred = attempt == 0 && preferred.is_some();
            if !is_preferred {
                if attempt == usize::from(preferred.is_some()) {
                    log::info!("falling back to other formats");
                }
                log::info!("trying {}", codec);
            }
            if let Some(opened) = self.try_open(index, codec, size) {
                if is_preferred {
                    log::info!("opened video (in preferred format {})", codec);
                } else {
                    log::info!("opened video (in {})", codec);
                }
                return Some(opened);
            }
        }
        None
    }

    fn try_open(
        &mut self,
        index: u64,
        codec: VideoCodec,
        size: FrameSize,
    ) -> Option<(Box<dyn VideoSink>, PathBuf)> {
        let file_name = format!("video{:05}.{}", index, codec.container().extension());
        let path = storage::join_path(&self.config.video_dir, &file_name);
        match self.sinks.open(&path, codec, TARGET_FPS, size) {
            Ok(sink) => Some((sink, path)),
            Err(e) => {
                log::warn!("{}: {} unavailable: {}", path.display(), codec, e);
                if let Err(e) = storage::remove_if_exists(&path) {
                    log::warn!("{}: failed to remove partial file: {}", path.display(), e);
                }
                None
            }
        }
    }

    /// Write the pre-roll and then live frames until a stop condition
    fn record(&mut self, index: u64, reason: TriggerReason) -> anyhow::Result<()> {
        let Some(size) = self.frames.newest().map(Frame::size) else {
            self.trigger.abandon();
            return Ok(());
        };
        log::info!("capturing video ({}) as capture {}", reason, index);

        let Some((mut sink, path)) = self.open_sink(index, size) else {
            log::error!("failed to open video writer after several tries; giving up");
            self.trigger.abandon();
            self.summary.abandoned += 1;
            return Ok(());
        };

        let mut failed = false;
        for frame in self.frames.iter() {
            if let Err(e) = sink.write(frame) {
                log::error!("{}: failed to write pre-roll: {}", path.display(), e);
                failed = true;
                break;
            }
        }

        let mut stop_requested = false;
        let stop = loop {
            if failed {
                break StopReason::WriteFailed;
            }
            let started = self.clock.now();
            if !self.capture_frame() {
                break StopReason::Exit;
            }
            if let Some(frame) = self.frames.newest() {
                if let Err(e) = sink.write(frame) {
                    log::error!("{}: failed to write frame: {}", path.display(), e);
                    failed = true;
                    continue;
                }
            }

            if let Some(stop) = self.trigger.should_stop(self.clock.now(), false, self.state.exit) {
                break stop;
            }

            let elapsed = self.trigger.elapsed(self.clock.now());
            self.hud(elapsed);

            match self.pace(started) {
                Some(Command::ToggleCapture) => stop_requested = true,
                Some(command) => self.on_busy_command(command),
                None => {}
            }
            if let Some(stop) =
                self.trigger
                    .should_stop(self.clock.now(), stop_requested, self.state.exit)
            {
                break stop;
            }
        };

        log::info!("{}: stopping video recording ({})", path.display(), stop);
        match sink.close() {
            Ok(bytes) => log::info!("{}: closed ({} bytes)", path.display(), bytes),
            Err(e) => log::error!("{}: failed to finalize: {}", path.display(), e),
        }

        self.summary.recordings += 1;
        if self.trigger.finish() {
            log::info!("exiting because we created the maximum number of videos");
            self.state.exit = true;
        }
        self.copies.submit(&path);
        self.copies.reap();
        Ok(())
    }

    /// Act on a command typed while idle
    fn handle_command(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::ToggleCapture => {
                let decision = self.trigger.on_force(self.clock.now());
                if decision == Decision::Stay {
                    log::info!("capture not started (maximum number of videos reached)");
                }
                self.handle_decision(decision)?;
            }
            Command::Recalibrate => {
                log::info!("recalibrating motion threshold (forced)");
                self.calibrate()?;
            }
            Command::ResetBackground { countdown } => {
                let secs = if countdown { self.config.startup_delay_secs } else { 0 };
                self.reset_background(secs, "forced")?;
            }
            other => self.apply_immediate(other),
        }
        Ok(())
    }

    /// Act on a command typed during a recording, countdown or calibration
    fn on_busy_command(&mut self, command: Command) {
        if command.is_immediate() {
            self.apply_immediate(command);
        } else {
            log::debug!("deferring {:?}", command);
            self.pending.push_back(command);
        }
    }

    fn apply_immediate(&mut self, command: Command) {
        match command {
            Command::Quit => {
                log::info!("exit requested");
                self.state.exit = true;
            }
            Command::ToggleHud => {
                self.state.hud_enabled = !self.state.hud_enabled;
                log::info!("hud_enabled: {}", self.state.hud_enabled);
            }
            Command::ToggleCaptureDisabled => {
                let disabled = !self.trigger.is_disabled();
                self.trigger.set_disabled(disabled);
                log::info!("vidcap_disabled: {}", disabled);
            }
            Command::DumpDiagnostics => println!("{}", self.diagnostics()),
            Command::Help => println!("{}", HELP),
            Command::Unknown(key) => {
                println!("unrecognized key: {:?}", key);
                println!("{}", HELP);
            }
            Command::ToggleCapture | Command::Recalibrate | Command::ResetBackground { .. } => {
                self.pending.push_back(command)
            }
        }
    }

    /// Status line, printed about once a second while enabled
    fn hud(&mut self, recording: Option<Duration>) {
        if !self.state.hud_enabled || self.summary.frames % HUD_INTERVAL_FRAMES != 0 {
            return;
        }
        self.hud_timing.start();

        let samples = self.scorer.samples();
        let history: Vec<f64> = samples.iter().collect();
        let threshold = self.trigger.threshold();
        let mut line = format!(
            "score {:.3} threshold {:.3} avg {:.3} {}",
            self.scorer.last_score(),
            threshold,
            samples.average(),
            sparkline(downsample(&history, 32).into_iter(), threshold * 1.5)
        );
        if let Some(elapsed) = recording {
            line.push_str(&format!(" recording ({:.1})", elapsed.as_secs_f64()));
        }
        log::info!("{}", line);

        self.hud_timing.stop();
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let now = self.clock.now();
        Diagnostics {
            uptime: self
                .started
                .map(|start| now.saturating_duration_since(start))
                .unwrap_or_default(),
            status: self.trigger.status(),
            frames: self.summary.frames,
            score: self.scorer.last_score(),
            threshold: self.trigger.threshold(),
            average: self.scorer.samples().average(),
            min_score: self.scorer.min_score(),
            max_score: self.scorer.max_score(),
            history: self.scorer.samples().iter().collect(),
            score_ms: self.scorer.timing().average_ms(),
            hud_ms: self.hud_timing.average_ms(),
            frame_overhead_ms: self.frame_overhead.average_ms(),
            recordings: self.trigger.completed(),
            next_index: self.trigger.next_index(),
            background_resets: self.background.resets(),
            capture_enabled: self.trigger.capture_enabled(),
            hud_enabled: self.state.hud_enabled,
            copies: self.copies.statuses(),
            remote_dir: self.copies.destination_dir().map(|d| d.to_path_buf()),
        }
    }

    /// Wait for outstanding copies before the process ends
    fn shutdown(&mut self) {
        log::info!("shutting down");
        if self.copies.pending_count() > 0 {
            log::info!("waiting for {} copy thread(s)", self.copies.pending_count());
        }
        self.copies.drain();
    }
}

impl std::fmt::Debug for MotionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionMonitor")
            .field("state", &self.state)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    const WIDTH: u32 = 8;
    const HEIGHT: u32 = 6;
    /// Sources stop after this many frames so a broken loop cannot hang a test
    const FRAME_LIMIT: u64 = 20_000;

    #[derive(Clone)]
    struct ManualClock {
        base: Instant,
        offset_us: Arc<AtomicU64>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset_us: Arc::new(AtomicU64::new(0)),
            }
        }

        fn advance(&self, by: Duration) {
            self.offset_us.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + Duration::from_micros(self.offset_us.load(Ordering::SeqCst))
        }
    }

    /// Produces `pattern(n)` for the n-th frame read
    struct ScriptedSource {
        pattern: fn(u64) -> [u8; 3],
        read: Arc<AtomicU64>,
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&mut self, frame: &mut Frame) -> crate::video::Result<()> {
            let n = self.read.fetch_add(1, Ordering::SeqCst);
            if n >= FRAME_LIMIT {
                return Err(VideoError::EndOfStream);
            }
            *frame = Frame::filled(WIDTH, HEIGHT, (self.pattern)(n));
            Ok(())
        }
    }

    /// Hands out each command once the source has read `at_frame` frames.
    /// Every poll advances the clock by its full timeout.
    struct ScriptedInput {
        clock: ManualClock,
        read: Arc<AtomicU64>,
        script: VecDeque<(u64, Command)>,
    }

    impl CommandInput for ScriptedInput {
        fn poll(&mut self, timeout: Duration) -> Option<Command> {
            self.clock.advance(timeout);
            let read = self.read.load(Ordering::SeqCst);
            match self.script.front() {
                Some(&(at_frame, command)) if read >= at_frame => {
                    self.script.pop_front();
                    Some(command)
                }
                _ => None,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Closed {
        path: PathBuf,
        frames: u64,
    }

    #[derive(Default)]
    struct SinkLog {
        attempts: Vec<(PathBuf, VideoCodec)>,
        closed: Vec<Closed>,
    }

    /// Writes one byte per frame to a real file; listed codecs fail to open
    /// after leaving an empty file behind
    struct FakeSinks {
        failing: Vec<VideoCodec>,
        log: Arc<Mutex<SinkLog>>,
    }

    struct FakeSink {
        path: PathBuf,
        file: std::fs::File,
        frames: u64,
        log: Arc<Mutex<SinkLog>>,
    }

    impl SinkFactory for FakeSinks {
        fn open(
            &mut self,
            path: &Path,
            codec: VideoCodec,
            fps: u32,
            size: FrameSize,
        ) -> crate::video::Result<Box<dyn VideoSink>> {
            assert_eq!(fps, TARGET_FPS);
            assert_eq!(size, FrameSize::new(WIDTH, HEIGHT));
            self.log.lock().attempts.push((path.to_path_buf(), codec));
            let file = std::fs::File::create(path)?;
            if self.failing.contains(&codec) {
                return Err(VideoError::Pipeline(format!("no {} encoder", codec)));
            }
            Ok(Box::new(FakeSink {
                path: path.to_path_buf(),
                file,
                frames: 0,
                log: self.log.clone(),
            }))
        }
    }

    impl VideoSink for FakeSink {
        fn write(&mut self, _frame: &Frame) -> crate::video::Result<()> {
            use std::io::Write;
            self.file.write_all(&[1])?;
            self.frames += 1;
            Ok(())
        }

        fn close(self: Box<Self>) -> crate::video::Result<u64> {
            self.log.lock().closed.push(Closed {
                path: self.path.clone(),
                frames: self.frames,
            });
            Ok(self.frames)
        }
    }

    struct Harness {
        monitor: MotionMonitor,
        log: Arc<Mutex<SinkLog>>,
        _video_dir: tempfile::TempDir,
        video_path: PathBuf,
    }

    fn alternating(n: u64) -> [u8; 3] {
        if n % 2 == 0 {
            [0, 0, 0]
        } else {
            [255, 255, 255]
        }
    }

    fn still(_: u64) -> [u8; 3] {
        [90, 90, 90]
    }

    fn test_config(video_dir: &Path) -> Config {
        Config {
            video_dir: video_dir.to_path_buf(),
            startup_delay_secs: 0,
            motion_threshold: Some(10.0),
            max_videos: 0,
            max_video_length_secs: 1.0,
            headless: true,
            ..Config::default()
        }
    }

    fn harness(
        pattern: fn(u64) -> [u8; 3],
        script: Vec<(u64, Command)>,
        failing: Vec<VideoCodec>,
        configure: impl FnOnce(&mut Config),
    ) -> Harness {
        let video_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(video_dir.path());
        configure(&mut config);

        let clock = ManualClock::new();
        let read = Arc::new(AtomicU64::new(0));
        let log = Arc::new(Mutex::new(SinkLog::default()));

        let source = ScriptedSource {
            pattern,
            read: read.clone(),
        };
        let input = ScriptedInput {
            clock: clock.clone(),
            read,
            script: script.into(),
        };
        let sinks = FakeSinks {
            failing,
            log: log.clone(),
        };

        let monitor = MotionMonitor::new(config, Box::new(source), Box::new(sinks), Box::new(input))
            .with_clock(Box::new(clock));
        Harness {
            monitor,
            log,
            video_path: video_dir.path().to_path_buf(),
            _video_dir: video_dir,
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn stops_after_maximum_number_of_videos() {
        let mut h = harness(alternating, vec![], vec![], |c| c.max_videos = 3);

        let summary = h.monitor.run().unwrap();

        assert_eq!(summary.recordings, 3);
        assert!(h.monitor.state().exit);
        assert!(summary.frames < FRAME_LIMIT);
        let log = h.log.lock();
        assert_eq!(log.attempts.len(), 3);
        assert_eq!(log.closed.len(), 3);
        assert_eq!(
            files_in(&h.video_path),
            vec!["video00000.mp4", "video00001.mp4", "video00002.mp4"]
        );
        // roughly one second of live frames plus the pre-roll
        assert!(log.closed.iter().all(|c| c.frames > 30), "{:?}", log.closed);
    }

    #[test]
    fn first_recording_starts_with_preroll() {
        let mut h = harness(alternating, vec![], vec![], |c| c.max_videos = 1);

        h.monitor.run().unwrap();

        // background frame + triggering frame are flushed before live frames;
        // live frames run until just over one second has elapsed
        let live = 31;
        let log = h.log.lock();
        assert_eq!(log.closed[0].frames, 2 + live);
    }

    #[test]
    fn disabled_capture_never_opens_a_sink() {
        let mut h = harness(
            alternating,
            vec![(40, Command::Quit)],
            vec![],
            |c| c.max_video_length_secs = 0.0,
        );

        let summary = h.monitor.run().unwrap();

        assert_eq!(summary.recordings, 0);
        assert!(summary.disabled > 0);
        assert!(h.log.lock().attempts.is_empty());
        assert!(files_in(&h.video_path).is_empty());
    }

    #[test]
    fn runtime_disable_blocks_forced_capture() {
        let mut h = harness(
            still,
            vec![
                (3, Command::ToggleCaptureDisabled),
                (4, Command::ToggleCapture),
                (8, Command::Quit),
            ],
            vec![],
            |_| {},
        );

        let summary = h.monitor.run().unwrap();

        assert_eq!(summary.disabled, 1);
        assert!(h.log.lock().attempts.is_empty());
    }

    #[test]
    fn falls_back_through_codecs() {
        let mut h = harness(
            still,
            vec![
                (3, Command::ToggleCapture),
                (10, Command::ToggleCapture),
                (15, Command::Quit),
            ],
            vec![VideoCodec::H264, VideoCodec::X264],
            |c| c.preferred_codec = Some(VideoCodec::H264),
        );

        let summary = h.monitor.run().unwrap();

        assert_eq!(summary.recordings, 1);
        let codecs: Vec<VideoCodec> = h.log.lock().attempts.iter().map(|(_, c)| *c).collect();
        assert_eq!(codecs, vec![VideoCodec::H264, VideoCodec::X264, VideoCodec::Xvid]);
        // failed attempts leave nothing behind
        assert_eq!(files_in(&h.video_path), vec!["video00000.avi"]);
    }

    #[test]
    fn unopenable_sink_abandons_only_that_attempt() {
        let mut h = harness(
            still,
            vec![
                (3, Command::ToggleCapture),
                (6, Command::Quit),
            ],
            VideoCodec::FALLBACK.to_vec(),
            |_| {},
        );

        let summary = h.monitor.run().unwrap();

        assert_eq!(summary.abandoned, 1);
        assert_eq!(summary.recordings, 0);
        assert_eq!(h.log.lock().attempts.len(), VideoCodec::FALLBACK.len());
        assert!(files_in(&h.video_path).is_empty());
        // the index was consumed anyway
        assert_eq!(h.monitor.diagnostics().next_index, 1);
    }

    #[test]
    fn quit_during_recording_closes_the_file() {
        let mut h = harness(
            still,
            vec![(3, Command::ToggleCapture), (8, Command::Quit)],
            vec![],
            |c| c.max_video_length_secs = 60.0,
        );

        let summary = h.monitor.run().unwrap();

        assert_eq!(summary.recordings, 1);
        assert_eq!(h.log.lock().closed.len(), 1);
    }

    #[test]
    fn background_reset_waits_for_recording_to_end() {
        let mut h = harness(
            still,
            vec![
                (3, Command::ToggleCapture),
                (5, Command::ResetBackground { countdown: false }),
                (10, Command::ToggleCapture),
                (20, Command::Quit),
            ],
            vec![],
            |c| c.max_video_length_secs = 60.0,
        );

        h.monitor.run().unwrap();

        // initial reset plus the deferred one
        assert_eq!(h.monitor.diagnostics().background_resets, 2);
        assert_eq!(h.log.lock().closed.len(), 1);
    }

    #[test]
    fn countdown_reset_can_be_cancelled() {
        // one second of warm-up reads 31 frames before the loop starts
        let mut h = harness(
            still,
            vec![
                (40, Command::ResetBackground { countdown: true }),
                (40, Command::Quit),
            ],
            vec![],
            |c| c.startup_delay_secs = 1,
        );

        h.monitor.run().unwrap();

        assert_eq!(h.monitor.diagnostics().background_resets, 1);
    }

    #[test]
    fn countdown_reset_replaces_background() {
        let mut h = harness(
            still,
            vec![
                (40, Command::ResetBackground { countdown: true }),
                (45, Command::Quit),
            ],
            vec![],
            |c| c.startup_delay_secs = 1,
        );

        h.monitor.run().unwrap();

        assert_eq!(h.monitor.diagnostics().background_resets, 2);
    }

    #[test]
    fn calibrates_from_ambient_noise() {
        fn flicker(n: u64) -> [u8; 3] {
            if n % 2 == 0 {
                [100, 100, 100]
            } else {
                [104, 104, 104]
            }
        }
        let mut h = harness(
            flicker,
            vec![(12, Command::Quit)],
            vec![],
            |c| {
                c.motion_threshold = None;
                c.max_video_length_secs = 0.0;
            },
        );
        h.monitor = h.monitor.with_calibrator(Calibrator::new().with_samples(8));

        h.monitor.run().unwrap();

        let diagnostics = h.monitor.diagnostics();
        assert!((diagnostics.threshold - 2.4).abs() < 1e-9, "{}", diagnostics.threshold);
        assert!(diagnostics.history.len() >= 8);
    }

    #[test]
    fn finished_recordings_are_copied() {
        let remote = tempfile::tempdir().unwrap();
        let remote_dir = remote.path().to_path_buf();
        let mut h = harness(alternating, vec![], vec![], move |c| {
            c.max_videos = 2;
            c.max_video_length_secs = 0.2;
            c.remote_copy_dir = Some(remote_dir);
        });

        h.monitor.run().unwrap();

        assert_eq!(files_in(remote.path()), vec!["video00000.mp4", "video00001.mp4"]);
        for name in ["video00000.mp4", "video00001.mp4"] {
            assert_eq!(
                std::fs::read(remote.path().join(name)).unwrap(),
                std::fs::read(h.video_path.join(name)).unwrap()
            );
        }
        assert!(h.monitor.diagnostics().copies.is_empty());
    }

    /// Fails every read from `fail_at` on, like an unplugged camera
    struct UnpluggedSource {
        fail_at: u64,
        read: Arc<AtomicU64>,
    }

    impl FrameSource for UnpluggedSource {
        fn read_frame(&mut self, frame: &mut Frame) -> crate::video::Result<()> {
            let n = self.read.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_at {
                return Err(VideoError::Pipeline("device disconnected".into()));
            }
            *frame = Frame::filled(WIDTH, HEIGHT, alternating(n));
            Ok(())
        }
    }

    #[test]
    fn camera_failure_closes_recording_and_ends_run() {
        let video_dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let read = Arc::new(AtomicU64::new(0));
        let log = Arc::new(Mutex::new(SinkLog::default()));
        let source = UnpluggedSource {
            fail_at: 10,
            read: read.clone(),
        };
        let input = ScriptedInput {
            clock: clock.clone(),
            read,
            script: VecDeque::new(),
        };
        let sinks = FakeSinks {
            failing: vec![],
            log: log.clone(),
        };
        let mut monitor = MotionMonitor::new(
            test_config(video_dir.path()),
            Box::new(source),
            Box::new(sinks),
            Box::new(input),
        )
        .with_clock(Box::new(clock));

        let summary = monitor.run().unwrap();

        assert!(monitor.state().exit);
        assert_eq!(summary.recordings, 1);
        assert_eq!(summary.frames, 10);
        // background and trigger frames, then live frames until the failure
        let log = log.lock();
        assert_eq!(log.closed[0].frames, 10);
    }

    #[test]
    fn frame_overhead_spans_time_between_reads() {
        let mut h = harness(still, vec![(40, Command::Quit)], vec![], |_| {});

        h.monitor.run().unwrap();

        // the fake camera returns instantly and each idle poll waits out the
        // frame budget, so almost every gap between reads is one budget long;
        // only the gap between the background frame and the first scored
        // frame is empty
        let overhead = h.monitor.diagnostics().frame_overhead_ms;
        let budget_ms = FRAME_BUDGET.as_secs_f64() * 1000.0;
        assert!(overhead > budget_ms * 0.9, "{overhead}");
        assert!(overhead <= budget_ms + 1e-6, "{overhead}");
    }
}
