// Capture state machine
//
// Idle -> Recording when a score exceeds the threshold or a capture is forced.
// Recording -> Idle on the first of: exit signal, stop command, max length.
// A score dropping back under the threshold never ends a recording.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Idle,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Motion,
    Forced,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerReason::Motion => write!(f, "motion"),
            TriggerReason::Forced => write!(f, "forced"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxLength,
    Command,
    Exit,
    WriteFailed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::MaxLength => write!(f, "maximum length reached"),
            StopReason::Command => write!(f, "stop requested"),
            StopReason::Exit => write!(f, "exiting"),
            StopReason::WriteFailed => write!(f, "write failed"),
        }
    }
}

/// What the detection loop should do after a score or a force command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing changes
    Stay,
    /// Open a sink for capture `index` and start recording
    Start { index: u64, reason: TriggerReason },
    /// A capture would have started, but capturing is disabled
    Disabled { reason: TriggerReason },
}

#[derive(Debug, Clone)]
pub struct CaptureTrigger {
    threshold: f64,
    /// `None` when the configured length is not positive (capture disabled)
    max_length: Option<Duration>,
    /// 0 means unlimited
    max_videos: u64,
    disabled: bool,
    status: CaptureStatus,
    next_index: u64,
    completed: u64,
    started_at: Option<Instant>,
    cap_reached: bool,
}

impl CaptureTrigger {
    pub fn new(threshold: f64, max_length_secs: f64, max_videos: u64) -> Self {
        // non-positive lengths disable capture; unrepresentable ones are
        // rejected by config validation and treated the same here
        let max_length = Some(max_length_secs)
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        Self {
            threshold,
            max_length,
            max_videos,
            disabled: false,
            status: CaptureStatus::Idle,
            next_index: 0,
            completed: 0,
            started_at: None,
            cap_reached: false,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn is_recording(&self) -> bool {
        self.status == CaptureStatus::Recording
    }

    pub fn max_length(&self) -> Option<Duration> {
        self.max_length
    }

    /// Whether a trigger would currently open a sink
    pub fn capture_enabled(&self) -> bool {
        self.max_length.is_some() && !self.disabled
    }

    /// Runtime capture switch; a non-positive max length stays disabled
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Index the next started recording will get
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn cap_reached(&self) -> bool {
        self.cap_reached
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.started_at.map(|start| now.saturating_duration_since(start))
    }

    /// Feed one motion score
    pub fn on_score(&mut self, score: f64, now: Instant) -> Decision {
        if self.is_recording() || score <= self.threshold {
            return Decision::Stay;
        }
        self.begin(TriggerReason::Motion, now)
    }

    /// Explicit "start capture" request
    pub fn on_force(&mut self, now: Instant) -> Decision {
        if self.is_recording() {
            return Decision::Stay;
        }
        self.begin(TriggerReason::Forced, now)
    }

    fn begin(&mut self, reason: TriggerReason, now: Instant) -> Decision {
        if self.cap_reached {
            return Decision::Stay;
        }
        if !self.capture_enabled() {
            return Decision::Disabled { reason };
        }
        let index = self.next_index;
        self.next_index += 1;
        self.status = CaptureStatus::Recording;
        self.started_at = Some(now);
        Decision::Start { index, reason }
    }

    /// Check the stop conditions for the running recording
    pub fn should_stop(&self, now: Instant, stop_requested: bool, exit: bool) -> Option<StopReason> {
        if !self.is_recording() {
            return None;
        }
        if exit {
            return Some(StopReason::Exit);
        }
        if stop_requested {
            return Some(StopReason::Command);
        }
        match (self.max_length, self.elapsed(now)) {
            (Some(max), Some(elapsed)) if elapsed > max => Some(StopReason::MaxLength),
            _ => None,
        }
    }

    /// The sink for the current attempt could not be opened.
    ///
    /// The index stays consumed; the attempt does not count as completed.
    pub fn abandon(&mut self) {
        self.status = CaptureStatus::Idle;
        self.started_at = None;
    }

    /// The current recording was closed.
    ///
    /// Returns `true` exactly once: when this completion reaches the
    /// configured maximum number of recordings.
    pub fn finish(&mut self) -> bool {
        self.status = CaptureStatus::Idle;
        self.started_at = None;
        self.completed += 1;
        if self.max_videos > 0 && self.completed >= self.max_videos && !self.cap_reached {
            self.cap_reached = true;
            return true;
        }
        false
    }
}
