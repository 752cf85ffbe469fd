// Startup threshold calibration
//
// Scores a fixed number of consecutive frames of (hopefully) empty scene and
// sets the threshold a little above their mean. The scores stay in the
// scorer's history; calibration does not clear anything.

use crate::recording::samples::MOTION_SAMPLES;

/// Frames scored per calibration run (about 8.5 seconds at 30 fps)
pub const CALIBRATION_SAMPLES: usize = MOTION_SAMPLES;

/// Headroom above the ambient mean
pub const CALIBRATION_MULTIPLIER: f64 = 1.2;

/// Result of a calibration run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub mean: f64,
    pub threshold: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Calibrator {
    samples: usize,
    multiplier: f64,
}

impl Calibrator {
    pub fn new() -> Self {
        Self {
            samples: CALIBRATION_SAMPLES,
            multiplier: CALIBRATION_MULTIPLIER,
        }
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples.max(1);
        self
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Pull `samples` scores from `next_score` and derive the threshold.
    ///
    /// `next_score` captures and scores one frame; its first error aborts the
    /// run.
    pub fn run<E>(&self, mut next_score: impl FnMut() -> Result<f64, E>) -> Result<Calibration, E> {
        log::info!("calibrating over {} frames", self.samples);
        let mut sum = 0.0;
        for _ in 0..self.samples {
            sum += next_score()?;
        }
        let mean = sum / self.samples as f64;
        let threshold = self.multiplier * mean;
        log::info!("calibrated threshold {:.3} (mean {:.3})", threshold, mean);
        Ok(Calibration {
            mean,
            threshold,
            samples: self.samples,
        })
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}
