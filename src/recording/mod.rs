// Recording modules

pub mod copy;
pub mod monitor;
pub mod preroll;
pub mod samples;
pub mod trigger;

pub use copy::{CopyDispatcher, CopyOutcome, CopyStatus};
pub use monitor::{Clock, MonotonicClock, MotionMonitor, RunState, RunSummary};
pub use preroll::RingBuffer;
pub use samples::{SampleHistory, TimingSamples};
pub use trigger::{CaptureStatus, CaptureTrigger, Decision, StopReason, TriggerReason};
