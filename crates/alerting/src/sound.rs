//! Alert sound backends

use std::io::Write;
use std::time::Duration;

use crate::AlertError;

/// Something that can make the user notice an alert.
///
/// `play` may block (it runs on the blocking pool), but it must return.
pub trait AlertSound: Send + Sync + 'static {
    fn play(&self) -> Result<(), AlertError>;
}

/// Rings the terminal bell and holds for the tone duration
#[derive(Debug, Clone)]
pub struct TerminalBell {
    pub duration: Duration,
}

impl TerminalBell {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl AlertSound for TerminalBell {
    fn play(&self) -> Result<(), AlertError> {
        let mut out = std::io::stdout().lock();
        out.write_all(b"\x07")
            .and_then(|_| out.flush())
            .map_err(|e| AlertError::Playback(e.to_string()))?;
        drop(out);
        std::thread::sleep(self.duration);
        Ok(())
    }
}

/// Makes no sound (headless servers, tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl AlertSound for Silent {
    fn play(&self) -> Result<(), AlertError> {
        Ok(())
    }
}
