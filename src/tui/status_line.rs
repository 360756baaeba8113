//! Single overwritable status line for window progress

use crate::proxy::{ProgressReporter, RunProgress};
use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};

/// Progress text shown while windows are being checked
pub fn format_status(progress: &RunProgress) -> String {
    let eta = match progress.eta() {
        Some(eta) => format!("~{:.2} min left", eta.as_secs_f64() / 60.0),
        None => "??? min left".to_string(),
    };
    format!("Checking proxies... ~{:.1}%, {}", progress.percent(), eta)
}

/// Rewrites one terminal line in place after every window
pub struct StatusLine<W: Write = io::Stderr> {
    out: W,
    active: bool,
}

impl StatusLine {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> StatusLine<W> {
    pub fn new(out: W) -> Self {
        Self { out, active: false }
    }

    /// Replace the current line with `text`
    pub fn show(&mut self, text: &str) -> io::Result<()> {
        queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(text)
        )?;
        self.out.flush()?;
        self.active = true;
        Ok(())
    }

    /// Wipe the line so later log output starts clean
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        self.out.flush()?;
        self.active = false;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressReporter for StatusLine<W> {
    fn report(&mut self, progress: &RunProgress) {
        // Progress is cosmetic; a closed terminal must not stop the run
        let _ = self.show(&format_status(progress));
    }
}
