// Whole-frame motion scoring
//
// Each frame is reduced to grayscale, blurred with a 21x21 Gaussian and
// compared against the background reference. The score is the mean absolute
// difference over all pixels, so it lives in [0, 255]. Localized sensor noise
// mostly averages away; there is no per-region analysis.

use std::time::Instant;

use crate::recording::samples::{SampleHistory, TimingSamples, MOTION_SAMPLES};
use crate::video::{Frame, GrayImage};

use super::BackgroundReference;

/// Blur kernel width and height
pub const BLUR_KERNEL_SIZE: usize = 21;

/// Sigma derived from the kernel size the way OpenCV does for sigma <= 0
fn auto_sigma(kernel_size: usize) -> f64 {
    0.3 * ((kernel_size as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

fn gaussian_kernel(kernel_size: usize) -> Vec<f32> {
    let sigma = auto_sigma(kernel_size);
    let radius = (kernel_size / 2) as f64;
    let weights: Vec<f64> = (0..kernel_size)
        .map(|i| {
            let x = i as f64 - radius;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Mirror an out-of-range index back into [0, n), not repeating the edge pixel
fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let mut i = i.rem_euclid(period);
    if i >= n as isize {
        i = period - i;
    }
    i as usize
}

/// Grayscale conversion plus Gaussian blur, reusing its scratch buffers
pub struct Preprocessor {
    kernel: Vec<f32>,
    gray: GrayImage,
    horizontal: Vec<f32>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            kernel: gaussian_kernel(BLUR_KERNEL_SIZE),
            gray: GrayImage::default(),
            horizontal: Vec::new(),
        }
    }

    /// Gray + blur `frame` into `out`
    pub fn process_into(&mut self, frame: &Frame, out: &mut GrayImage) {
        to_gray(frame, &mut self.gray);
        self.blur(out);
    }

    pub fn process(&mut self, frame: &Frame) -> GrayImage {
        let mut out = GrayImage::default();
        self.process_into(frame, &mut out);
        out
    }

    fn blur(&mut self, out: &mut GrayImage) {
        let width = self.gray.width as usize;
        let height = self.gray.height as usize;
        let radius = (self.kernel.len() / 2) as isize;
        out.reshape(self.gray.width, self.gray.height);
        if width == 0 || height == 0 {
            return;
        }

        self.horizontal.clear();
        self.horizontal.resize(width * height, 0.0);
        for y in 0..height {
            let row = &self.gray.data[y * width..(y + 1) * width];
            for x in 0..width {
                let mut acc = 0.0f32;
                for (k, weight) in self.kernel.iter().enumerate() {
                    let sx = reflect101(x as isize + k as isize - radius, width);
                    acc += weight * row[sx] as f32;
                }
                self.horizontal[y * width + x] = acc;
            }
        }

        for y in 0..height {
            for x in 0..width {
                let mut acc = 0.0f32;
                for (k, weight) in self.kernel.iter().enumerate() {
                    let sy = reflect101(y as isize + k as isize - radius, height);
                    acc += weight * self.horizontal[sy * width + x];
                }
                out.data[y * width + x] = acc.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// ITU-R BT.601 luma in 14-bit fixed point
fn to_gray(frame: &Frame, gray: &mut GrayImage) {
    gray.reshape(frame.width, frame.height);
    for (dst, px) in gray
        .data
        .iter_mut()
        .zip(frame.data.chunks_exact(Frame::CHANNELS))
    {
        let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
        *dst = ((r * 4899 + g * 9617 + b * 1868 + 8192) >> 14) as u8;
    }
}

/// Scores frames against the background and keeps the score history
pub struct MotionScorer {
    preprocessor: Preprocessor,
    blurred: GrayImage,
    samples: SampleHistory,
    min_score: Option<f64>,
    max_score: Option<f64>,
    last_score: f64,
    timing: TimingSamples,
}

impl MotionScorer {
    pub fn new() -> Self {
        Self {
            preprocessor: Preprocessor::new(),
            blurred: GrayImage::default(),
            samples: SampleHistory::new(MOTION_SAMPLES),
            min_score: None,
            max_score: None,
            last_score: 0.0,
            timing: TimingSamples::new(),
        }
    }

    /// Grayscale and blurred copy of `frame`, ready to become a background
    pub fn preprocess(&mut self, frame: &Frame) -> GrayImage {
        self.preprocessor.process(frame)
    }

    /// Score `frame` and record the result in the sample history.
    ///
    /// Without a usable background (none yet, or a different resolution) the
    /// frame scores 0.
    pub fn score(&mut self, frame: &Frame, background: &BackgroundReference) -> f64 {
        let started = Instant::now();
        self.preprocessor.process_into(frame, &mut self.blurred);

        let score = match background.image() {
            Some(reference) if reference.size() == self.blurred.size() => {
                mean_abs_diff(&self.blurred, reference)
            }
            Some(reference) => {
                log::warn!(
                    "frame size {} does not match background {}",
                    self.blurred.size(),
                    reference.size()
                );
                0.0
            }
            None => 0.0,
        };

        self.record(score);
        self.timing.record(started.elapsed());
        score
    }

    fn record(&mut self, score: f64) {
        self.samples.push(score);
        self.last_score = score;
        self.min_score = Some(self.min_score.map_or(score, |m| m.min(score)));
        self.max_score = Some(self.max_score.map_or(score, |m| m.max(score)));
    }

    pub fn last_score(&self) -> f64 {
        self.last_score
    }

    pub fn samples(&self) -> &SampleHistory {
        &self.samples
    }

    pub fn min_score(&self) -> Option<f64> {
        self.min_score
    }

    pub fn max_score(&self) -> Option<f64> {
        self.max_score
    }

    /// Time spent per `score()` call
    pub fn timing(&self) -> &TimingSamples {
        &self.timing
    }
}

impl Default for MotionScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f64 {
    if a.data.is_empty() {
        return 0.0;
    }
    let sum: u64 = a
        .data
        .iter()
        .zip(&b.data)
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();
    sum as f64 / a.data.len() as f64
}
