//! Candidate parser turning fetched list lines into `host:port` candidates

use std::collections::HashSet;

/// Parser for raw proxy-list lines
pub struct ProxyParser;

impl ProxyParser {
    /// Normalise a single line into a candidate.
    ///
    /// Only surrounding whitespace is stripped; host and port are not checked here,
    /// malformed entries are left to fail during probing.
    pub fn parse_line(line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(line.to_string())
    }

    /// Deduplicated candidate set from any collection of lines
    pub fn parse_lines<I, S>(lines: I) -> HashSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .filter_map(|line| Self::parse_line(line.as_ref()))
            .collect()
    }

    /// Candidate set from a whole text body
    pub fn parse_string(content: &str) -> HashSet<String> {
        Self::parse_lines(content.split('\n'))
    }
}
