//! Batch scheduler running probes in bounded windows
//!
//! Candidates are split into windows of `n_at_once`. Every probe inside a window runs
//! concurrently on the current task; the next window starts only after the previous one
//! has fully drained, which caps open connections and file descriptors.

use crate::proxy::checker::{CandidateProbe, ExhaustionFlag};
use crate::proxy::models::{ProbeOutcome, RunProgress};
use futures::future::join_all;
use std::collections::HashSet;
use tracing::debug;

/// Receives progress before the first window and after every completed one
pub trait ProgressReporter {
    fn report(&mut self, progress: &RunProgress);
}

impl<F: FnMut(&RunProgress)> ProgressReporter for F {
    fn report(&mut self, progress: &RunProgress) {
        self(progress)
    }
}

/// Reporter that drops every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _progress: &RunProgress) {}
}

/// Number of windows needed for `candidates` probes of at most `window` each
pub fn window_count(candidates: usize, window: usize) -> usize {
    let window = window.max(1);
    candidates / window + usize::from(candidates % window != 0)
}

pub struct BatchScheduler {
    window: usize,
    exhaustion: ExhaustionFlag,
}

impl BatchScheduler {
    /// `window == 0` means unbounded
    pub fn new(window: usize) -> Self {
        Self {
            window: if window == 0 { usize::MAX } else { window },
            exhaustion: ExhaustionFlag::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Whether a probe of this run ran out of file descriptors
    pub fn resources_exhausted(&self) -> bool {
        self.exhaustion.is_tripped()
    }

    /// Probe every candidate once and return the accepted ones
    pub async fn run<P, R>(&self, probe: &P, candidates: HashSet<String>, reporter: &mut R) -> HashSet<String>
    where
        P: CandidateProbe,
        R: ProgressReporter + ?Sized,
    {
        let mut accepted = HashSet::new();

        if candidates.len() <= self.window {
            let outcomes = self.run_window(probe, candidates.into_iter().collect()).await;
            collect_accepted(&mut accepted, outcomes);
            return accepted;
        }

        let mut progress = RunProgress::new(window_count(candidates.len(), self.window));
        reporter.report(&progress);
        let mut pending = candidates.into_iter();

        loop {
            let window: Vec<String> = pending.by_ref().take(self.window).collect();
            if window.is_empty() {
                break;
            }

            let outcomes = self.run_window(probe, window).await;
            collect_accepted(&mut accepted, outcomes);

            progress.completed_windows += 1;
            debug!(
                window = progress.completed_windows,
                total = progress.total_windows,
                percent = progress.percent(),
                eta_secs = progress.eta().map(|eta| eta.as_secs()),
                accepted = accepted.len(),
                "window finished"
            );
            reporter.report(&progress);
        }

        accepted
    }

    async fn run_window<P: CandidateProbe>(&self, probe: &P, window: Vec<String>) -> Vec<ProbeOutcome> {
        let exhaustion = &self.exhaustion;
        join_all(
            window
                .into_iter()
                .map(|candidate| probe.probe(candidate, exhaustion)),
        )
        .await
    }
}

fn collect_accepted(accepted: &mut HashSet<String>, outcomes: Vec<ProbeOutcome>) {
    accepted.extend(
        outcomes
            .into_iter()
            .filter(|outcome| outcome.accepted)
            .map(|outcome| outcome.candidate),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Probe that sleeps a second, records concurrency and accepts by name
    #[derive(Default)]
    struct RecordingProbe {
        in_flight: RefCell<usize>,
        peak: RefCell<usize>,
        started: RefCell<Vec<(String, Instant)>>,
        exhaust: Option<&'static str>,
    }

    impl CandidateProbe for RecordingProbe {
        async fn probe(&self, candidate: String, exhaustion: &ExhaustionFlag) -> ProbeOutcome {
            *self.in_flight.borrow_mut() += 1;
            {
                let current = *self.in_flight.borrow();
                let mut peak = self.peak.borrow_mut();
                *peak = (*peak).max(current);
            }
            self.started
                .borrow_mut()
                .push((candidate.clone(), Instant::now()));

            tokio::time::sleep(Duration::from_secs(1)).await;
            *self.in_flight.borrow_mut() -= 1;

            if self.exhaust == Some(candidate.as_str()) {
                exhaustion.trip();
                return ProbeOutcome::rejected(candidate, 1);
            }
            if candidate.starts_with("good") {
                ProbeOutcome::accepted(candidate, 1)
            } else {
                ProbeOutcome::rejected(candidate, 1)
            }
        }
    }

    fn candidates(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_window_count() {
        assert_eq!(window_count(5, 2), 3);
        assert_eq!(window_count(4, 2), 2);
        assert_eq!(window_count(0, 2), 0);
        assert_eq!(window_count(3, usize::MAX), 1);
    }

    #[test]
    fn test_zero_window_is_unbounded() {
        assert_eq!(BatchScheduler::new(0).window(), usize::MAX);
        assert_eq!(BatchScheduler::new(7).window(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_set_runs_in_one_step_without_progress() {
        let probe = RecordingProbe::default();
        let scheduler = BatchScheduler::new(10);
        let mut reports = 0;

        let start = Instant::now();
        let accepted = scheduler
            .run(
                &probe,
                candidates(&["good-1", "bad-1", "good-2"]),
                &mut |_: &RunProgress| reports += 1,
            )
            .await;

        assert_eq!(accepted, candidates(&["good-1", "good-2"]));
        assert_eq!(*probe.peak.borrow(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(reports, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_run_strictly_in_sequence() {
        let probe = RecordingProbe::default();
        let scheduler = BatchScheduler::new(2);
        let mut reports: Vec<(usize, usize)> = Vec::new();

        let start = Instant::now();
        let accepted = scheduler
            .run(
                &probe,
                candidates(&["good-1", "good-2", "bad-1", "bad-2", "good-3"]),
                &mut |p: &RunProgress| reports.push((p.completed_windows, p.total_windows)),
            )
            .await;

        assert_eq!(accepted, candidates(&["good-1", "good-2", "good-3"]));
        assert_eq!(*probe.peak.borrow(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(reports, vec![(0, 3), (1, 3), (2, 3), (3, 3)]);

        // Window sizes 2, 2, 1 by start time
        let started = probe.started.borrow();
        let mut per_second = [0usize; 3];
        for (_, at) in started.iter() {
            per_second[(*at - start).as_secs() as usize] += 1;
        }
        assert_eq!(per_second, [2, 2, 1]);
        assert_eq!(started.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_candidate_probed_once() {
        let probe = RecordingProbe::default();
        let scheduler = BatchScheduler::new(3);
        let input: HashSet<String> = (0..10).map(|i| format!("good-{}", i)).collect();

        let accepted = scheduler.run(&probe, input.clone(), &mut NoProgress).await;

        let probed: Vec<String> = probe.started.borrow().iter().map(|(c, _)| c.clone()).collect();
        assert_eq!(probed.len(), input.len());
        assert_eq!(probed.into_iter().collect::<HashSet<_>>(), input);
        assert!(accepted.is_subset(&input));
        assert!(*probe.peak.borrow() <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_and_eta_non_negative() {
        let probe = RecordingProbe::default();
        let scheduler = BatchScheduler::new(1);
        let mut percents = Vec::new();
        let mut etas = Vec::new();

        scheduler
            .run(
                &probe,
                candidates(&["a", "b", "c", "d"]),
                &mut |p: &RunProgress| {
                    percents.push(p.percent());
                    etas.push(p.eta());
                },
            )
            .await;

        assert_eq!(percents, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(etas.first(), Some(&None));
        assert_eq!(etas.get(1), Some(&Some(Duration::from_secs(3))));
        assert_eq!(etas.last(), Some(&Some(Duration::ZERO)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_recorded_without_aborting() {
        let probe = RecordingProbe {
            exhaust: Some("good-2"),
            ..Default::default()
        };
        let scheduler = BatchScheduler::new(1);

        let accepted = scheduler
            .run(&probe, candidates(&["good-1", "good-2", "good-3"]), &mut NoProgress)
            .await;

        assert!(scheduler.resources_exhausted());
        assert_eq!(accepted, candidates(&["good-1", "good-3"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_candidate_set() {
        let probe = RecordingProbe::default();
        let scheduler = BatchScheduler::new(2);

        let accepted = scheduler.run(&probe, HashSet::new(), &mut NoProgress).await;

        assert!(accepted.is_empty());
        assert!(probe.started.borrow().is_empty());
    }
}
