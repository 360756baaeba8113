//! Proxychains output formatting

use std::collections::HashSet;

/// Column width of the proxychains `[ProxyList]` layout
pub const TAB_WIDTH: usize = 17;

/// Proxy protocol written in the first column
const PROXY_SCHEME: &str = "socks5";

/// Expand every tab to the next multiple of `width`, always advancing at least one column
pub fn expand_tabs(line: &str, width: usize) -> String {
    let mut out = String::with_capacity(line.len() + width * 2);
    let mut column = 0;
    for ch in line.chars() {
        match ch {
            '\t' => {
                let pad = width - column % width;
                out.extend(std::iter::repeat(' ').take(pad));
                column += pad;
            }
            '\n' | '\r' => {
                out.push(ch);
                column = 0;
            }
            _ => {
                out.push(ch);
                column += 1;
            }
        }
    }
    out
}

/// Formatter for the accepted proxy set
pub struct ProxyFormatter;

impl ProxyFormatter {
    /// One proxychains line for a `host:port` candidate
    pub fn format_line(candidate: &str) -> String {
        let raw = match candidate.split_once(':') {
            Some((host, port)) => format!("{}\t{}\t{}", PROXY_SCHEME, host, port),
            None => format!("{}\t{}", PROXY_SCHEME, candidate),
        };
        expand_tabs(&raw, TAB_WIDTH)
    }

    /// All accepted proxies, one per line, sorted so repeated runs write identical files
    pub fn format_proxies(proxies: &HashSet<String>) -> String {
        let mut lines: Vec<String> = proxies.iter().map(|p| Self::format_line(p)).collect();
        lines.sort();
        lines.join("\n")
    }
}
