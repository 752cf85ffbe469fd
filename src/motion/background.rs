// Background reference and the reset countdown

use crate::video::GrayImage;

/// The cached "no motion" baseline.
///
/// Replaced wholesale on every reset, never edited in place.
#[derive(Debug, Default)]
pub struct BackgroundReference {
    image: Option<GrayImage>,
    resets: u64,
}

impl BackgroundReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, image: GrayImage) {
        self.image = Some(image);
        self.resets += 1;
    }

    pub fn image(&self) -> Option<&GrayImage> {
        self.image.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.image.is_some()
    }

    /// Number of times the reference has been replaced
    pub fn resets(&self) -> u64 {
        self.resets
    }
}

/// Outcome of one countdown tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Cancel,
}

/// Count down from `secs`, calling `tick` once per remaining second.
///
/// `tick` receives the seconds left and is responsible for waiting out that
/// second; it is the only cancellation point. Returns `false` if cancelled.
pub fn run_countdown(secs: u32, mut tick: impl FnMut(u32) -> Tick) -> bool {
    for remaining in (1..=secs).rev() {
        if tick(remaining) == Tick::Cancel {
            return false;
        }
    }
    true
}
