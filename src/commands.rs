// Interactive key commands
//
// Single-character commands read from stdin. The detection loop polls for
// them with a timeout that doubles as frame pacing, so a command is only ever
// acted on between frames.

use std::io::Read;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

pub const HELP: &str = "\
keys:
  c      start capture now, or stop the running capture
  d      dump diagnostics
  h      toggle the status line
  k      recalibrate the motion threshold
  r      reset background after a countdown
  R      reset background now
  v      toggle capture on/off
  q ESC  quit
  ?      show this help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleCapture,
    DumpDiagnostics,
    Recalibrate,
    ToggleHud,
    Quit,
    ResetBackground { countdown: bool },
    ToggleCaptureDisabled,
    Help,
    Unknown(char),
}

impl Command {
    /// Map a key to its command; whitespace maps to nothing
    pub fn from_key(key: char) -> Option<Self> {
        let command = match key {
            'c' => Command::ToggleCapture,
            'd' => Command::DumpDiagnostics,
            'k' => Command::Recalibrate,
            'h' => Command::ToggleHud,
            'q' | '\u{1b}' => Command::Quit,
            'r' => Command::ResetBackground { countdown: true },
            'R' => Command::ResetBackground { countdown: false },
            'v' => Command::ToggleCaptureDisabled,
            '?' => Command::Help,
            c if c.is_whitespace() => return None,
            c => Command::Unknown(c),
        };
        Some(command)
    }

    /// Commands that act immediately, even mid-recording or mid-countdown
    pub fn is_immediate(&self) -> bool {
        matches!(
            self,
            Command::Quit
                | Command::DumpDiagnostics
                | Command::ToggleHud
                | Command::ToggleCaptureDisabled
                | Command::Help
                | Command::Unknown(_)
        )
    }
}

/// Source of external commands
pub trait CommandInput {
    /// Wait up to `timeout` for the next command
    fn poll(&mut self, timeout: Duration) -> Option<Command>;
}

/// Commands typed on stdin, read by a background thread
pub struct StdinCommands {
    rx: Receiver<Command>,
}

impl StdinCommands {
    pub fn spawn() -> anyhow::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::Builder::new()
            .name("mdet-stdin".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for byte in stdin.lock().bytes() {
                    let Ok(byte) = byte else { break };
                    if let Some(command) = Command::from_key(byte as char) {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                }
                log::debug!("stdin closed; no more key commands");
            })?;
        Ok(Self { rx })
    }
}

impl CommandInput for StdinCommands {
    fn poll(&mut self, timeout: Duration) -> Option<Command> {
        match self.rx.recv_timeout(timeout) {
            Ok(command) => Some(command),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // keep pacing even without a terminal
                std::thread::sleep(timeout);
                None
            }
        }
    }
}

/// Never yields a command; used when stdin is not interactive
#[derive(Debug, Default)]
pub struct NoCommands;

impl CommandInput for NoCommands {
    fn poll(&mut self, timeout: Duration) -> Option<Command> {
        std::thread::sleep(timeout);
        None
    }
}
