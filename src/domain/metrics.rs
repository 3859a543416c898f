//! Run metrics: dotted-key snapshots, progress counters and equity statistics.

use crate::domain::error::{BackflowError, Result};
use crate::domain::event::Event;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

const PERIODS_PER_YEAR: f64 = 252.0;

/// Flat view of a run's final metrics, keyed by dotted path such as
/// `account.equity`. Sorted by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSnapshot {
    values: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, value: f64) {
        self.values.insert(path.into(), value);
    }

    pub fn get(&self, path: &str) -> Option<f64> {
        self.values.get(path).copied()
    }

    /// Like [`get`](Self::get) but fails with `MetricNotFound`.
    pub fn value(&self, path: &str) -> Result<f64> {
        self.get(path)
            .ok_or_else(|| BackflowError::MetricNotFound(path.to_string()))
    }

    /// Copy every entry of `other` under `prefix.`.
    pub fn merge_prefixed(&mut self, prefix: &str, other: &MetricSnapshot) {
        for (key, value) in &other.values {
            self.values.insert(format!("{prefix}.{key}"), *value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for MetricSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.values {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value:.4}")?;
            first = false;
        }
        Ok(())
    }
}

/// Counts events and actions seen by a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressMetric {
    pub events: u64,
    pub actions: u64,
    pub last_time: Option<DateTime<Utc>>,
}

impl ProgressMetric {
    pub fn record(&mut self, event: &Event) {
        self.events += 1;
        self.actions += event.actions.len() as u64;
        self.last_time = Some(event.time);
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::new();
        snapshot.insert("run.events", self.events as f64);
        snapshot.insert("run.actions", self.actions as f64);
        snapshot
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub equity: f64,
}

/// Summary statistics of an equity curve.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityStats {
    pub final_equity: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
}

impl EquityStats {
    pub fn compute(equity_curve: &[EquityPoint], initial_capital: f64) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve);

        EquityStats {
            final_equity,
            total_return,
            max_drawdown,
            max_drawdown_duration,
            sharpe_ratio,
            sortino_ratio,
        }
    }

    /// Write the statistics under `account.*`.
    pub fn write_to(&self, snapshot: &mut MetricSnapshot) {
        snapshot.insert("account.equity", self.final_equity);
        snapshot.insert("account.return", self.total_return);
        snapshot.insert("account.max_drawdown", self.max_drawdown);
        snapshot.insert("account.sharpe", self.sharpe_ratio);
        snapshot.insert("account.sortino", self.sortino_ratio);
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            max_dd = max_dd.max(dd);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint]) -> (f64, f64) {
    if equity_curve.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let sharpe = if stddev > 0.0 {
        (mean / stddev) * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|r| r.powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside.sqrt();

    let sortino = if downside_stddev > 0.0 {
        (mean / downside_stddev) * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
