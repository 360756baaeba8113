//! The validation engine: fetch candidates, test them, format the survivors

use crate::config::Config;
use crate::proxy::{
    BatchScheduler, CandidateProbe, ProbeConfig, ProgressReporter, ProxyChecker, ProxyFormatter,
    ProxyParser, SourceFetcher,
};
use crate::Result;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Engine bound to one validated configuration
pub struct Harvester {
    sources: Vec<String>,
    fetcher: SourceFetcher,
    probe_config: ProbeConfig,
}

impl Harvester {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            sources: config.io.sources.clone(),
            fetcher: SourceFetcher::with_config(config.fetcher_config())?,
            probe_config: config.probe_config(),
        })
    }

    pub fn with_parts(sources: Vec<String>, fetcher: SourceFetcher, probe_config: ProbeConfig) -> Self {
        Self {
            sources,
            fetcher,
            probe_config,
        }
    }

    /// Fetch every source and return the deduplicated candidates
    pub async fn fetch_candidates(&self) -> HashSet<String> {
        info!(sources = self.sources.len(), "Fetching proxies...");
        let lines = self.fetcher.fetch_lines(&self.sources).await;
        let candidates = ProxyParser::parse_lines(lines);
        info!(count = candidates.len(), "Fetched {} proxies.", candidates.len());
        candidates
    }

    /// Probe candidates through SOCKS5 and return the ones that passed every round
    pub async fn test_candidates<R>(&self, candidates: HashSet<String>, reporter: &mut R) -> HashSet<String>
    where
        R: ProgressReporter + ?Sized,
    {
        let checker = ProxyChecker::with_config(self.probe_config.clone());
        self.test_candidates_with(&checker, candidates, reporter).await
    }

    /// Same as [`Harvester::test_candidates`] with a custom probe
    pub async fn test_candidates_with<P, R>(
        &self,
        probe: &P,
        candidates: HashSet<String>,
        reporter: &mut R,
    ) -> HashSet<String>
    where
        P: CandidateProbe,
        R: ProgressReporter + ?Sized,
    {
        let total = candidates.len();
        let scheduler = BatchScheduler::new(self.probe_config.n_at_once);
        debug!(total, window = scheduler.window(), "testing candidates");

        let passed = scheduler.run(probe, candidates, reporter).await;

        if scheduler.resources_exhausted() {
            warn!(total, "some proxies were rejected because the process ran out of file descriptors");
        }
        info!(passed = passed.len(), total, "Tests completed, {} proxies passed.", passed.len());
        passed
    }

    /// Proxychains lines for the accepted set
    pub fn format_proxies(proxies: &HashSet<String>) -> String {
        ProxyFormatter::format_proxies(proxies)
    }
}
