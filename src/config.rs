//! TOML configuration loading and validation
//!
//! The file has two required sections, `[io]` and `[tests]`. Unknown keys, wrong
//! types and out-of-range values are rejected here so the engine never sees them.

use crate::proxy::checker::ProbeConfig;
use crate::proxy::crawler::{FetcherConfig, DEFAULT_FETCH_TIMEOUT_SECS};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error while decoding config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("\"{key}\" item in \"[{section}]\" section {reason}")]
    Invalid {
        section: &'static str,
        key: &'static str,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(section: &'static str, key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            section,
            key,
            reason: reason.into(),
        }
    }
}

/// `[io]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    /// Enables debug logging
    pub debug_mode: bool,
    /// Proxy-list URLs
    pub sources: Vec<String>,
    /// Where the proxychains list is written
    pub output_filename: String,
    /// Upper bound in seconds for fetching one source
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: f64,
}

fn default_fetch_timeout() -> f64 {
    DEFAULT_FETCH_TIMEOUT_SECS as f64
}

/// `[tests]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestsConfig {
    pub number_of_tests: u32,
    pub tests_url: String,
    pub expected_response_code: u16,
    /// Seconds
    pub connection_timeout: f64,
    /// Seconds
    pub delay_between_tests: f64,
    /// `0` means no limit
    #[serde(rename = "N_at_once")]
    pub n_at_once: usize,
}

/// Whole configuration file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub io: IoConfig,
    pub tests: TestsConfig,
}

impl Config {
    /// Read, parse and validate a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate config text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let io = &self.io;
        if io.sources.is_empty() {
            return Err(ConfigError::invalid("io", "sources", "is empty"));
        }
        for source in &io.sources {
            check_http_url(source).map_err(|reason| ConfigError::invalid("io", "sources", reason))?;
        }
        if io.output_filename.trim().is_empty() {
            return Err(ConfigError::invalid("io", "output_filename", "is empty"));
        }
        check_seconds(io.fetch_timeout, false)
            .map_err(|reason| ConfigError::invalid("io", "fetch_timeout", reason))?;

        let tests = &self.tests;
        if tests.number_of_tests == 0 {
            return Err(ConfigError::invalid("tests", "number_of_tests", "must be at least 1"));
        }
        check_http_url(&tests.tests_url)
            .map_err(|reason| ConfigError::invalid("tests", "tests_url", reason))?;
        if !(100..=999).contains(&tests.expected_response_code) {
            return Err(ConfigError::invalid(
                "tests",
                "expected_response_code",
                "is not an HTTP status code",
            ));
        }
        check_seconds(tests.connection_timeout, false)
            .map_err(|reason| ConfigError::invalid("tests", "connection_timeout", reason))?;
        check_seconds(tests.delay_between_tests, true)
            .map_err(|reason| ConfigError::invalid("tests", "delay_between_tests", reason))?;

        Ok(())
    }

    /// Engine view of the `[tests]` section
    pub fn probe_config(&self) -> ProbeConfig {
        let tests = &self.tests;
        ProbeConfig::new()
            .with_tests_url(tests.tests_url.clone())
            .with_expected_response_code(
                StatusCode::from_u16(tests.expected_response_code).unwrap_or(StatusCode::OK),
            )
            .with_connection_timeout(seconds(tests.connection_timeout))
            .with_number_of_tests(tests.number_of_tests)
            .with_delay_between_tests(seconds(tests.delay_between_tests))
            .with_n_at_once(tests.n_at_once)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig::new().with_timeout(seconds(self.io.fetch_timeout))
    }
}

fn check_http_url(value: &str) -> Result<(), String> {
    let url = Url::parse(value).map_err(|e| format!("is not a valid URL ({}): {}", e, value))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("has unsupported scheme \"{}\": {}", other, value)),
    }
}

fn check_seconds(value: f64, allow_zero: bool) -> Result<(), String> {
    if Duration::try_from_secs_f64(value).is_err() {
        return Err("is not a valid number of seconds".to_string());
    }
    if !allow_zero && value == 0.0 {
        return Err("must be greater than 0".to_string());
    }
    Ok(())
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}
