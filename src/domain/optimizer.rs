//! Parameter sweeps over a search space: plain training, walk-forward and
//! Monte Carlo window selection.
//!
//! Every trial the optimizer launches gets a unique run label. Labels have
//! the form `train-0003`, `wf2-train-0001`, `wf2-validate`, `mc4-train-0000`
//! and `mc4-validate`; the counter is the point's position in the search
//! space. Later calls on the same optimizer prefix their labels with `rN/`.

use crate::domain::error::{BackflowError, Result};
use crate::domain::metrics::MetricSnapshot;
use crate::domain::run_registry::RunRegistry;
use crate::domain::search_space::{Params, SearchSpace};
use crate::domain::timeframe::{Timeframe, TradingPeriod};
use crate::domain::trial::{RunBuilder, Trial};
use crate::ports::feed_port::Feed;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// What a sweep does when a trial fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log, record the failure and continue.
    #[default]
    Skip,
    /// Stop the sweep and return `TrialFailed`.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = BackflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(FailurePolicy::Skip),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(BackflowError::invalid_argument(format!(
                "unknown failure policy '{other}', expected skip or abort"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Validation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => f.write_str("train"),
            Phase::Validation => f.write_str("validation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub run: String,
    pub params: Params,
    pub timeframe: Timeframe,
    pub score: f64,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialFailure {
    pub run: String,
    pub params: Params,
    pub timeframe: Timeframe,
    pub reason: String,
}

/// Orders two scores with NaN after every number, whichever the direction.
fn compare_scores(a: f64, b: f64, descending: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) if descending => b.total_cmp(&a),
        (false, false) => a.total_cmp(&b),
    }
}

/// Highest score first; ties keep their order.
pub fn rank_descending(results: &mut [RunResult]) {
    results.sort_by(|a, b| compare_scores(a.score, b.score, true));
}

/// Lowest score first; ties keep their order.
pub fn rank_ascending(results: &mut [RunResult]) {
    results.sort_by(|a, b| compare_scores(a.score, b.score, false));
}

/// The first training result with the highest score.
pub fn best(results: &[RunResult]) -> Option<&RunResult> {
    results
        .iter()
        .filter(|r| r.phase == Phase::Train && !r.score.is_nan())
        .fold(None, |best: Option<&RunResult>, r| match best {
            Some(b) if b.score >= r.score => Some(b),
            _ => Some(r),
        })
}

/// Train/test window pairs for a walk-forward run over `total`.
///
/// The first train window starts at `total.start + anchor`. Each later
/// window moves forward by `test`. Rolling windows keep their length;
/// anchored windows keep their start and grow. Pairs whose test window
/// would end past `total.end` are dropped.
pub fn walk_forward_windows(
    total: Timeframe,
    train: TradingPeriod,
    test: TradingPeriod,
    anchor: TradingPeriod,
    rolling: bool,
) -> Result<Vec<(Timeframe, Timeframe)>> {
    train.checked_add(test)?;
    let origin = anchor.add_to(total.start);
    if train.add_to(origin) <= origin || test.add_to(origin) <= origin {
        return Err(BackflowError::invalid_argument(format!(
            "walk-forward periods must be positive, got train={train} test={test}"
        )));
    }

    let mut windows = Vec::new();
    for i in 0..i32::MAX {
        let shift = test.times(i).add_to(origin);
        let train_end = train.add_to(shift);
        let test_end = test.add_to(train_end);
        if test_end > total.end || test_end <= shift {
            break;
        }
        let train_start = if rolling { shift } else { origin };
        windows.push((
            Timeframe {
                start: train_start,
                end: train_end,
            },
            Timeframe {
                start: train_end,
                end: test_end,
            },
        ));
    }
    Ok(windows)
}

struct Job {
    run: String,
    params: Params,
    trial: Box<dyn Trial>,
}

pub struct Optimizer {
    space: SearchSpace,
    score: String,
    builder: RunBuilder,
    parallelism: usize,
    failure_policy: FailurePolicy,
    seed: u64,
    registry: Mutex<RunRegistry>,
    failures: Mutex<Vec<TrialFailure>>,
    sessions: AtomicUsize,
}

impl Optimizer {
    /// `score` is the dotted metric path each trial's final snapshot is
    /// ranked by.
    pub fn new<F>(space: SearchSpace, score: &str, builder: F) -> Self
    where
        F: Fn(&Params) -> Result<Box<dyn Trial>> + Send + Sync + 'static,
    {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            space,
            score: score.to_string(),
            builder: Arc::new(builder),
            parallelism,
            failure_policy: FailurePolicy::default(),
            seed: 0,
            registry: Mutex::new(RunRegistry::new()),
            failures: Mutex::new(Vec::new()),
            sessions: AtomicUsize::new(0),
        }
    }

    /// Maximum trials running at once; at least one.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Seed for Monte Carlo window sampling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Failures recorded under [`FailurePolicy::Skip`] since the last call.
    pub fn take_failures(&self) -> Vec<TrialFailure> {
        std::mem::take(&mut *self.failures.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Every run label issued so far, sorted.
    pub fn run_labels(&self) -> Vec<String> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .labels()
            .map(str::to_string)
            .collect()
    }

    /// One trial per search-space point over `timeframe`, in enumeration
    /// order.
    pub async fn train(&self, feed: Arc<dyn Feed>, timeframe: Timeframe) -> Result<Vec<RunResult>> {
        let session = self.session_prefix();
        self.sweep(&format!("{session}train"), &feed, timeframe).await
    }

    /// Train on successive windows of the feed, validating each window's
    /// best point on the test period that follows it.
    pub async fn walk_forward(
        &self,
        feed: Arc<dyn Feed>,
        train: TradingPeriod,
        test: TradingPeriod,
        anchor: TradingPeriod,
        rolling: bool,
    ) -> Result<Vec<RunResult>> {
        let total = feed_timeframe(feed.as_ref())?;
        let windows = walk_forward_windows(total, train, test, anchor, rolling)?;
        tracing::info!(windows = windows.len(), %train, %test, rolling, "walk-forward");

        let session = self.session_prefix();
        let mut results = Vec::new();
        for (w, (train_tf, test_tf)) in windows.into_iter().enumerate() {
            let prefix = format!("{session}wf{w}");
            results.extend(self.train_and_validate(&prefix, &feed, train_tf, test_tf).await?);
        }
        Ok(results)
    }

    /// Train and validate on `samples` randomly placed windows of length
    /// `train + test`.
    pub async fn monte_carlo(
        &self,
        feed: Arc<dyn Feed>,
        train: TradingPeriod,
        test: TradingPeriod,
        samples: usize,
    ) -> Result<Vec<RunResult>> {
        let total = feed_timeframe(feed.as_ref())?;
        let period = train.checked_add(test)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let windows = total.sample(period, samples, &mut rng)?;
        tracing::info!(samples, %period, seed = self.seed, "monte carlo");

        let session = self.session_prefix();
        let mut results = Vec::new();
        for (k, window) in windows.into_iter().enumerate() {
            let split = train.add_to(window.start).min(window.end);
            let train_tf = Timeframe {
                start: window.start,
                end: split,
            };
            let test_tf = Timeframe {
                start: split,
                end: window.end,
            };
            let prefix = format!("{session}mc{k}");
            results.extend(self.train_and_validate(&prefix, &feed, train_tf, test_tf).await?);
        }
        Ok(results)
    }

    async fn train_and_validate(
        &self,
        prefix: &str,
        feed: &Arc<dyn Feed>,
        train_tf: Timeframe,
        test_tf: Timeframe,
    ) -> Result<Vec<RunResult>> {
        tracing::debug!(prefix, train = %train_tf, test = %test_tf, "window");
        let mut results = self.sweep(&format!("{prefix}-train"), feed, train_tf).await?;
        let Some(winner) = best(&results).map(|r| r.params.clone()) else {
            tracing::warn!(prefix, "no successful training run, skipping validation");
            return Ok(results);
        };
        let run = format!("{prefix}-validate");
        let validation = self
            .run_jobs(vec![(run, winner)], feed, test_tf, Phase::Validation)
            .await?;
        results.extend(validation);
        Ok(results)
    }

    async fn sweep(
        &self,
        prefix: &str,
        feed: &Arc<dyn Feed>,
        timeframe: Timeframe,
    ) -> Result<Vec<RunResult>> {
        let points: Vec<(String, Params)> = self
            .space
            .points()
            .enumerate()
            .map(|(i, params)| (format!("{prefix}-{i:04}"), params))
            .collect();
        tracing::debug!(prefix, points = points.len(), %timeframe, "sweep");
        self.run_jobs(points, feed, timeframe, Phase::Train).await
    }

    async fn run_jobs(
        &self,
        points: Vec<(String, Params)>,
        feed: &Arc<dyn Feed>,
        timeframe: Timeframe,
        phase: Phase,
    ) -> Result<Vec<RunResult>> {
        let mut jobs = Vec::with_capacity(points.len());
        for (run, params) in points {
            self.register(&run, timeframe)?;
            match (self.builder)(&params) {
                Ok(trial) => jobs.push(Job { run, params, trial }),
                Err(e) => self.trial_failed(run, params, timeframe, e.to_string())?,
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut running: Vec<(String, Params, JoinHandle<Result<MetricSnapshot>>)> =
            Vec::with_capacity(jobs.len());
        for Job { run, params, mut trial } in jobs {
            let feed = Arc::clone(feed);
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                trial.run(feed, timeframe).await
            });
            running.push((run, params, handle));
        }

        let mut results = Vec::with_capacity(running.len());
        let mut pending = running.into_iter();
        while let Some((run, params, handle)) = pending.next() {
            let score = match handle.await {
                Ok(Ok(snapshot)) => snapshot.value(&self.score),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(BackflowError::TrialFailed {
                    run: run.clone(),
                    reason: e.to_string(),
                }),
            };
            match score {
                Ok(score) => {
                    tracing::debug!(run = %run, %params, score, "trial finished");
                    results.push(RunResult {
                        run,
                        params,
                        timeframe,
                        score,
                        phase,
                    });
                }
                Err(e) => {
                    if let Err(abort) = self.trial_failed(run, params, timeframe, e.to_string()) {
                        for (_, _, handle) in pending {
                            handle.abort();
                        }
                        return Err(abort);
                    }
                }
            }
        }
        Ok(results)
    }

    fn register(&self, run: &str, timeframe: Timeframe) -> Result<()> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(run, timeframe)
    }

    fn trial_failed(
        &self,
        run: String,
        params: Params,
        timeframe: Timeframe,
        reason: String,
    ) -> Result<()> {
        match self.failure_policy {
            FailurePolicy::Abort => Err(BackflowError::TrialFailed { run, reason }),
            FailurePolicy::Skip => {
                tracing::warn!(run = %run, %params, %reason, "trial failed, skipping");
                self.failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(TrialFailure {
                        run,
                        params,
                        timeframe,
                        reason,
                    });
                Ok(())
            }
        }
    }

    fn session_prefix(&self) -> String {
        match self.sessions.fetch_add(1, AtomicOrdering::Relaxed) {
            0 => String::new(),
            n => format!("r{n}/"),
        }
    }
}

fn feed_timeframe(feed: &dyn Feed) -> Result<Timeframe> {
    let timeframe = feed.timeframe();
    if timeframe.is_empty() {
        return Err(BackflowError::EmptyFeed(timeframe.to_string()));
    }
    if timeframe.is_infinite() {
        return Err(BackflowError::invalid_argument(
            "cannot window an unbounded feed",
        ));
    }
    Ok(timeframe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn result(run: &str, score: f64) -> RunResult {
        RunResult {
            run: run.to_string(),
            params: Params::new(),
            timeframe: Timeframe::infinite(),
            score,
            phase: Phase::Train,
        }
    }

    #[test]
    fn rolling_windows_slide() {
        let total = Timeframe::new(at(2020, 1, 1), at(2021, 1, 1)).unwrap();
        let windows = walk_forward_windows(
            total,
            TradingPeriod::months(6),
            TradingPeriod::months(2),
            TradingPeriod::months(0),
            true,
        )
        .unwrap();
        // floor((12 - 6) / 2)
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].0, Timeframe::new(at(2020, 1, 1), at(2020, 7, 1)).unwrap());
        assert_eq!(windows[0].1, Timeframe::new(at(2020, 7, 1), at(2020, 9, 1)).unwrap());
        assert_eq!(windows[2].0, Timeframe::new(at(2020, 5, 1), at(2020, 11, 1)).unwrap());
        assert_eq!(windows[2].1.end, at(2021, 1, 1));
    }

    #[test]
    fn anchored_windows_grow() {
        let total = Timeframe::new(at(2020, 1, 1), at(2021, 1, 1)).unwrap();
        let windows = walk_forward_windows(
            total,
            TradingPeriod::months(6),
            TradingPeriod::months(2),
            TradingPeriod::months(0),
            false,
        )
        .unwrap();
        assert_eq!(windows.len(), 3);
        for (i, (train, _)) in windows.iter().enumerate() {
            assert_eq!(train.start, at(2020, 1, 1));
            assert_eq!(train.end, TradingPeriod::months(6 + 2 * i as i32).add_to(at(2020, 1, 1)));
        }
    }

    #[test]
    fn anchor_offsets_the_origin() {
        let total = Timeframe::new(at(2020, 1, 1), at(2021, 1, 1)).unwrap();
        let windows = walk_forward_windows(
            total,
            TradingPeriod::months(6),
            TradingPeriod::months(2),
            TradingPeriod::months(2),
            true,
        )
        .unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].0.start, at(2020, 3, 1));
    }

    #[test]
    fn windows_reject_mixed_and_empty_periods() {
        let total = Timeframe::new(at(2020, 1, 1), at(2021, 1, 1)).unwrap();
        assert!(matches!(
            walk_forward_windows(
                total,
                TradingPeriod::months(6),
                TradingPeriod::hours(1),
                TradingPeriod::months(0),
                true
            ),
            Err(BackflowError::IncompatiblePeriodKind { .. })
        ));
        assert!(
            walk_forward_windows(
                total,
                TradingPeriod::months(6),
                TradingPeriod::months(0),
                TradingPeriod::months(0),
                true
            )
            .is_err()
        );
    }

    #[test]
    fn too_short_feed_has_no_windows() {
        let total = Timeframe::new(at(2020, 1, 1), at(2020, 6, 1)).unwrap();
        let windows = walk_forward_windows(
            total,
            TradingPeriod::months(6),
            TradingPeriod::months(1),
            TradingPeriod::months(0),
            true,
        )
        .unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn ranking_puts_nan_last() {
        let mut results = vec![
            result("a", 1.0),
            result("b", f64::NAN),
            result("c", 3.0),
            result("d", 1.0),
        ];
        rank_descending(&mut results);
        let order: Vec<&str> = results.iter().map(|r| r.run.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "d", "b"]);

        rank_ascending(&mut results);
        let order: Vec<&str> = results.iter().map(|r| r.run.as_str()).collect();
        assert_eq!(order, vec!["a", "d", "c", "b"]);
    }

    #[test]
    fn best_prefers_first_of_ties_and_ignores_validation() {
        let mut validation = result("v", 99.0);
        validation.phase = Phase::Validation;
        let results = vec![result("a", 2.0), result("b", 2.0), validation, result("c", f64::NAN)];
        assert_eq!(best(&results).map(|r| r.run.as_str()), Some("a"));
        assert!(best(&[]).is_none());
    }

    #[test]
    fn failure_policy_parses() {
        assert_eq!("Skip".parse::<FailurePolicy>().unwrap(), FailurePolicy::Skip);
        assert_eq!("abort".parse::<FailurePolicy>().unwrap(), FailurePolicy::Abort);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
