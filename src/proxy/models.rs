//! Proxy validation data models

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Where a single candidate currently stands in its probe rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// Round `n` (1-based) is about to run
    Probing(u32),
    Accepted,
    Rejected,
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeState::Probing(round) => write!(f, "probing (round {})", round),
            ProbeState::Accepted => write!(f, "accepted"),
            ProbeState::Rejected => write!(f, "rejected"),
        }
    }
}

/// Final verdict for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub candidate: String,
    pub accepted: bool,
    /// Number of rounds that were actually sent
    pub rounds: u32,
}

impl ProbeOutcome {
    pub fn accepted(candidate: String, rounds: u32) -> Self {
        Self {
            candidate,
            accepted: true,
            rounds,
        }
    }

    pub fn rejected(candidate: String, rounds: u32) -> Self {
        Self {
            candidate,
            accepted: false,
            rounds,
        }
    }
}

/// Window-level progress of a batched run
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub completed_windows: usize,
    pub total_windows: usize,
    pub started_at: Instant,
}

impl RunProgress {
    pub fn new(total_windows: usize) -> Self {
        Self {
            completed_windows: 0,
            total_windows,
            started_at: Instant::now(),
        }
    }

    /// Share of finished windows, 0.0 to 100.0
    pub fn percent(&self) -> f64 {
        if self.total_windows == 0 {
            return 100.0;
        }
        self.completed_windows as f64 * 100.0 / self.total_windows as f64
    }

    /// Linear extrapolation from the average window duration so far.
    ///
    /// Approximate by nature; `None` until the first window has finished.
    pub fn eta(&self) -> Option<Duration> {
        if self.completed_windows == 0 {
            return None;
        }
        let remaining = self.total_windows.saturating_sub(self.completed_windows);
        let per_window = self.started_at.elapsed() / self.completed_windows as u32;
        Some(per_window * remaining as u32)
    }
}
