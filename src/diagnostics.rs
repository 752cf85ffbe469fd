// Read-only snapshot of detector state for the 'd' dump and the status line

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::recording::copy::CopyStatus;
use crate::recording::trigger::CaptureStatus;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render `values` as a sparkline scaled to `max`
pub fn sparkline(values: impl Iterator<Item = f64>, max: f64) -> String {
    let top = SPARK_LEVELS.len() - 1;
    values
        .map(|v| {
            if max <= 0.0 || !v.is_finite() {
                return SPARK_LEVELS[0];
            }
            let level = ((v / max).clamp(0.0, 1.0) * top as f64).round() as usize;
            SPARK_LEVELS[level.min(top)]
        })
        .collect()
}

/// Every `step`th value of `values`, so long histories fit on one line
pub fn downsample(values: &[f64], width: usize) -> Vec<f64> {
    if width == 0 || values.len() <= width {
        return values.to_vec();
    }
    let step = values.len().div_ceil(width);
    values.chunks(step).map(|c| c.iter().sum::<f64>() / c.len() as f64).collect()
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub uptime: Duration,
    pub status: CaptureStatus,
    pub frames: u64,
    pub score: f64,
    pub threshold: f64,
    pub average: f64,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub history: Vec<f64>,
    pub score_ms: f64,
    pub hud_ms: f64,
    pub frame_overhead_ms: f64,
    pub recordings: u64,
    pub next_index: u64,
    pub background_resets: u64,
    pub capture_enabled: bool,
    pub hud_enabled: bool,
    pub copies: Vec<CopyStatus>,
    pub remote_dir: Option<PathBuf>,
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v))
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "uptime:        {:.1} s", self.uptime.as_secs_f64())?;
        writeln!(f, "status:        {:?}", self.status)?;
        writeln!(f, "frames:        {}", self.frames)?;
        writeln!(
            f,
            "score:         {:.3} (threshold {:.3}, average {:.3}, min {}, max {})",
            self.score,
            self.threshold,
            self.average,
            opt(self.min_score),
            opt(self.max_score)
        )?;
        let scale = self.max_score.unwrap_or(0.0).max(self.threshold);
        writeln!(
            f,
            "history:       {}",
            sparkline(downsample(&self.history, 64).into_iter(), scale)
        )?;
        writeln!(
            f,
            "timing (ms):   score {:.2}, hud {:.2}, frame overhead {:.2}",
            self.score_ms, self.hud_ms, self.frame_overhead_ms
        )?;
        writeln!(
            f,
            "recordings:    {} completed, next index {}, capture {}",
            self.recordings,
            self.next_index,
            if self.capture_enabled { "enabled" } else { "disabled" }
        )?;
        writeln!(f, "background:    {} resets", self.background_resets)?;
        writeln!(f, "status line:   {}", if self.hud_enabled { "on" } else { "off" })?;
        match &self.remote_dir {
            Some(dir) => writeln!(f, "remote copy:   {}", dir.display())?,
            None => writeln!(f, "remote copy:   off")?,
        }
        for copy in &self.copies {
            write!(
                f,
                "  {} [{}]",
                copy.destination.display(),
                if copy.done { "done" } else { "copying" }
            )?;
            if let Some(error) = &copy.error {
                write!(f, " {}", error)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparkline_scales_to_max() {
        let line = sparkline([0.0, 5.0, 10.0, 20.0].into_iter(), 10.0);
        assert_eq!(line.chars().collect::<Vec<_>>(), vec!['▁', '▅', '█', '█']);
        assert_eq!(sparkline([3.0].into_iter(), 0.0), "▁");
    }

    #[test]
    fn downsample_averages_buckets() {
        let values: Vec<f64> = (0..8).map(f64::from).collect();
        assert_eq!(downsample(&values, 4), vec![0.5, 2.5, 4.5, 6.5]);
        assert_eq!(downsample(&values, 16), values);
    }

    #[test]
    fn display_lists_pending_copies() {
        let diagnostics = Diagnostics {
            uptime: Duration::from_secs(12),
            status: CaptureStatus::Idle,
            frames: 10,
            score: 1.0,
            threshold: 2.0,
            average: 1.5,
            min_score: None,
            max_score: Some(3.0),
            history: vec![1.0, 2.0],
            score_ms: 0.0,
            hud_ms: 0.0,
            frame_overhead_ms: 0.0,
            recordings: 1,
            next_index: 2,
            background_resets: 3,
            capture_enabled: true,
            hud_enabled: false,
            copies: vec![CopyStatus {
                destination: PathBuf::from("/remote/video00001.mp4"),
                done: true,
                error: Some("disk full".into()),
            }],
            remote_dir: Some(PathBuf::from("/remote")),
        };
        let text = diagnostics.to_string();
        assert!(text.contains("/remote/video00001.mp4 [done] disk full"), "{text}");
        assert!(text.contains("min -, max 3.000"), "{text}");
        assert!(text.contains("uptime:        12.0 s"), "{text}");
    }
}
