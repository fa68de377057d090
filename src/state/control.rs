//! Operator control signal for a running job
//!
//! The signal is raised from outside the run (CLI Ctrl-C, an API handler) and
//! read by the orchestrator between batches only.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// What the operator asked the run to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Continue,
    Pause,
    Cancel,
}

impl ControlSignal {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Pause,
            2 => Self::Cancel,
            _ => Self::Continue,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Continue => 0,
            Self::Pause => 1,
            Self::Cancel => 2,
        }
    }
}

/// Shared, cloneable handle to one run's control signal
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    signal: Arc<AtomicU8>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; overrides a pending pause
    pub fn cancel(&self) {
        self.signal
            .store(ControlSignal::Cancel.as_u8(), Ordering::SeqCst);
    }

    /// Requests a pause unless cancellation was already requested
    pub fn pause(&self) {
        let _ = self.signal.compare_exchange(
            ControlSignal::Continue.as_u8(),
            ControlSignal::Pause.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn signal(&self) -> ControlSignal {
        ControlSignal::from_u8(self.signal.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_continue() {
        assert_eq!(RunControl::new().signal(), ControlSignal::Continue);
    }

    #[test]
    fn test_clones_share_signal() {
        let control = RunControl::new();
        let handle = control.clone();
        handle.pause();
        assert_eq!(control.signal(), ControlSignal::Pause);
    }

    #[test]
    fn test_cancel_wins_over_pause() {
        let control = RunControl::new();
        control.cancel();
        control.pause();
        assert_eq!(control.signal(), ControlSignal::Cancel);
    }
}
