//! Probe runner deciding whether one candidate is a usable SOCKS5 proxy

use crate::proxy::models::{ProbeOutcome, ProbeState};
use reqwest::{Client, Proxy as ReqwestProxy, StatusCode};
use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpSocket;
use tracing::{debug, trace, warn};

/// Default connect timeout for proxy checks in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of rounds every candidate has to pass
const DEFAULT_NUMBER_OF_TESTS: u32 = 3;

/// Default number of concurrent probes
const DEFAULT_CONCURRENCY: usize = 500;

/// Default URL to test proxies against
const DEFAULT_TEST_URL: &str = "http://httpbin.org/ip";

/// Configuration for probing candidates
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// URL requested through every candidate
    pub tests_url: String,
    /// Status a round has to return to count as passed
    pub expected_response_code: StatusCode,
    /// Connect timeout of each round, also the bound on a whole round
    pub connection_timeout: Duration,
    /// Rounds a candidate has to pass in a row
    pub number_of_tests: u32,
    /// Pause between two passed rounds
    pub delay_between_tests: Duration,
    /// Probes launched together; `usize::MAX` means unbounded
    pub n_at_once: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            tests_url: DEFAULT_TEST_URL.to_string(),
            expected_response_code: StatusCode::OK,
            connection_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            number_of_tests: DEFAULT_NUMBER_OF_TESTS,
            delay_between_tests: Duration::from_secs(1),
            n_at_once: DEFAULT_CONCURRENCY,
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tests_url(mut self, url: String) -> Self {
        self.tests_url = url;
        self
    }

    pub fn with_expected_response_code(mut self, status: StatusCode) -> Self {
        self.expected_response_code = status;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_number_of_tests(mut self, rounds: u32) -> Self {
        self.number_of_tests = rounds.max(1);
        self
    }

    pub fn with_delay_between_tests(mut self, delay: Duration) -> Self {
        self.delay_between_tests = delay;
        self
    }

    /// `0` lifts the limit entirely
    pub fn with_n_at_once(mut self, n_at_once: usize) -> Self {
        self.n_at_once = if n_at_once == 0 { usize::MAX } else { n_at_once };
        self
    }
}

type BoxError = Box<dyn StdError + Send + Sync>;

/// Why a probe round failed
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid proxy candidate {candidate}: {source}")]
    InvalidCandidate {
        candidate: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("too many open files: {0}")]
    ResourceExhausted(#[source] BoxError),
    #[error("request failed: {0}")]
    Transport(#[source] BoxError),
}

impl ProbeError {
    /// Split descriptor exhaustion from ordinary network failures
    pub fn classify<E: Into<BoxError>>(err: E) -> Self {
        let err = err.into();
        if is_too_many_open_files(err.as_ref()) {
            ProbeError::ResourceExhausted(err)
        } else {
            ProbeError::Transport(err)
        }
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, ProbeError::ResourceExhausted(_))
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        Self::classify(err)
    }
}

/// Whether `EMFILE` shows up anywhere in the error's source chain
pub fn is_too_many_open_files(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.raw_os_error() == Some(libc::EMFILE) {
                return true;
            }
            // io::Error::source() skips a wrapped error, so step into it directly
            if let Some(inner) = io.get_ref() {
                current = Some(inner as &(dyn StdError + 'static));
                continue;
            }
        }
        current = e.source();
    }
    false
}

/// Whether the process is out of file descriptors right now.
///
/// reqwest flattens SOCKS connect failures into strings, so the errno is lost by the
/// time the error reaches us; allocating a socket asks the OS directly.
pub fn descriptors_exhausted() -> bool {
    match TcpSocket::new_v4() {
        Ok(_) => false,
        Err(e) => e.raw_os_error() == Some(libc::EMFILE),
    }
}

/// One-shot flag for the "too many open files" warning of a run
#[derive(Debug, Default)]
pub struct ExhaustionFlag(AtomicBool);

impl ExhaustionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag; true only for the call that actually flipped it
    pub fn trip(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A session tunneled through one candidate
#[allow(async_fn_in_trait)]
pub trait ProbeSession {
    /// GET `url` and return the response status
    async fn get_status(&self, url: &str) -> Result<StatusCode, ProbeError>;
}

/// Opens sessions through candidates
pub trait Tunnel {
    type Session: ProbeSession;

    fn open(&self, candidate: &str, config: &ProbeConfig) -> Result<Self::Session, ProbeError>;
}

/// Real tunnel: a fresh reqwest client with the candidate as SOCKS5 proxy
#[derive(Debug, Clone, Copy, Default)]
pub struct Socks5Tunnel;

/// Client bound to one candidate
#[derive(Debug, Clone)]
pub struct Socks5Session {
    client: Client,
}

impl Tunnel for Socks5Tunnel {
    type Session = Socks5Session;

    fn open(&self, candidate: &str, config: &ProbeConfig) -> Result<Socks5Session, ProbeError> {
        let proxy_url = format!("socks5://{}", candidate);
        let proxy = ReqwestProxy::all(&proxy_url).map_err(|source| ProbeError::InvalidCandidate {
            candidate: candidate.to_string(),
            source,
        })?;

        let client = Client::builder()
            .proxy(proxy)
            .connect_timeout(config.connection_timeout)
            .build()?;

        Ok(Socks5Session { client })
    }
}

impl ProbeSession for Socks5Session {
    async fn get_status(&self, url: &str) -> Result<StatusCode, ProbeError> {
        match self.client.get(url).send().await {
            Ok(response) => Ok(response.status()),
            Err(e) => match ProbeError::from(e) {
                ProbeError::Transport(source) if descriptors_exhausted() => {
                    Err(ProbeError::ResourceExhausted(source))
                }
                other => Err(other),
            },
        }
    }
}

/// Any probe the batch scheduler can drive
#[allow(async_fn_in_trait)]
pub trait CandidateProbe {
    async fn probe(&self, candidate: String, exhaustion: &ExhaustionFlag) -> ProbeOutcome;
}

/// Runs the multi-round test for single candidates
pub struct ProxyChecker<T: Tunnel = Socks5Tunnel> {
    config: ProbeConfig,
    tunnel: T,
}

impl ProxyChecker {
    pub fn new() -> Self {
        Self::with_config(ProbeConfig::default())
    }

    pub fn with_config(config: ProbeConfig) -> Self {
        Self::with_tunnel(config, Socks5Tunnel)
    }
}

impl Default for ProxyChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Tunnel> ProxyChecker<T> {
    pub fn with_tunnel(config: ProbeConfig, tunnel: T) -> Self {
        Self { config, tunnel }
    }

    /// Probe one candidate until it is accepted or rejected.
    ///
    /// The first failed round rejects the candidate; nothing is retried. A round that
    /// outlives `connection_timeout` counts as a transport failure.
    pub async fn check_candidate(&self, candidate: String, exhaustion: &ExhaustionFlag) -> ProbeOutcome {
        let session = match self.tunnel.open(&candidate, &self.config) {
            Ok(session) => session,
            Err(e) => {
                self.note_failure(&candidate, &e, exhaustion);
                return ProbeOutcome::rejected(candidate, 0);
            }
        };

        let total = self.config.number_of_tests.max(1);
        let mut rounds = 0;
        let mut state = ProbeState::Probing(1);

        while let ProbeState::Probing(round) = state {
            rounds = round;
            let response = tokio::time::timeout(
                self.config.connection_timeout,
                session.get_status(&self.config.tests_url),
            )
            .await
            .unwrap_or_else(|elapsed| Err(ProbeError::Transport(elapsed.into())));

            state = match response {
                Ok(status) if status == self.config.expected_response_code => {
                    if round >= total {
                        ProbeState::Accepted
                    } else {
                        tokio::time::sleep(self.config.delay_between_tests).await;
                        ProbeState::Probing(round + 1)
                    }
                }
                Ok(status) => {
                    trace!(%candidate, round, %status, "unexpected status");
                    ProbeState::Rejected
                }
                Err(e) => {
                    self.note_failure(&candidate, &e, exhaustion);
                    ProbeState::Rejected
                }
            };
        }

        debug!(%candidate, rounds, %state, "probe finished");
        if state == ProbeState::Accepted {
            ProbeOutcome::accepted(candidate, rounds)
        } else {
            ProbeOutcome::rejected(candidate, rounds)
        }
    }

    fn note_failure(&self, candidate: &str, err: &ProbeError, exhaustion: &ExhaustionFlag) {
        if err.is_resource_exhausted() && exhaustion.trip() {
            warn!("OS Error #24 occurred. Try lowering \"N_at_once\" parameter in your config.");
        }
        trace!(%candidate, error = %err, "probe round failed");
    }
}

impl<T: Tunnel> CandidateProbe for ProxyChecker<T> {
    async fn probe(&self, candidate: String, exhaustion: &ExhaustionFlag) -> ProbeOutcome {
        self.check_candidate(candidate, exhaustion).await
    }
}
