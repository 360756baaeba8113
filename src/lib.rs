//! Get Proxies - SOCKS5 proxy harvester
//!
//! Fetches public proxy lists, probes every entry through a SOCKS5 tunnel several
//! times and keeps the proxies that pass every round, formatted for proxychains.

pub mod config;
pub mod harvester;
pub mod proxy;
pub mod tui;

#[cfg(test)]
mod test_support;

pub use config::{Config, ConfigError};
pub use harvester::Harvester;
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
