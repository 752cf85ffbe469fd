// Motion detection: frame scoring, the background baseline and threshold
// calibration

pub mod background;
pub mod calibration;
pub mod scorer;

pub use background::{run_countdown, BackgroundReference, Tick};
pub use calibration::{Calibration, Calibrator, CALIBRATION_MULTIPLIER, CALIBRATION_SAMPLES};
pub use scorer::{MotionScorer, Preprocessor};
