//! Proxy module for fetching, checking and formatting proxies
//!
//! This module provides functionality for:
//! - Fetching raw proxy lists from remote sources
//! - Parsing them into deduplicated `host:port` candidates
//! - Probing every candidate through a SOCKS5 tunnel in bounded windows
//! - Formatting the survivors for proxychains

pub mod checker;
pub mod crawler;
pub mod formatter;
pub mod models;
pub mod parser;
pub mod scheduler;

pub use checker::{
    descriptors_exhausted, CandidateProbe, ExhaustionFlag, ProbeConfig, ProbeError, ProbeSession,
    ProxyChecker, Socks5Session, Socks5Tunnel, Tunnel,
};
pub use crawler::{FetchError, FetchResult, FetcherConfig, SourceFetcher};
pub use formatter::ProxyFormatter;
pub use models::{ProbeOutcome, ProbeState, RunProgress};
pub use parser::ProxyParser;
pub use scheduler::{BatchScheduler, NoProgress, ProgressReporter};
