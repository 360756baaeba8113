//! Terminal output for long-running checks

mod status_line;

pub use status_line::{format_status, StatusLine};
