//! Typed configuration built from a [`ConfigPort`], validated up front.

use crate::domain::channel::DEFAULT_CHANNEL_CAPACITY;
use crate::domain::currency::Currency;
use crate::domain::error::{BackflowError, Result};
use crate::domain::optimizer::FailurePolicy;
use crate::domain::search_space::{GridSearch, ParamRange, RandomSearch, SearchSpace};
use crate::domain::timeframe::{Timeframe, TradingPeriod, parse_instant};
use crate::ports::config_port::ConfigPort;
use std::path::PathBuf;
use std::str::FromStr;

const SEARCH_RESERVED_KEYS: [&str; 3] = ["kind", "seed", "samples"];

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> BackflowError {
    BackflowError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String> {
    match config.get_string(section, key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(BackflowError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Parse `[section] key` as `T`, or `default` when absent.
fn parsed<T: FromStr>(config: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match config.get_string(section, key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(section, key, e.to_string())),
        _ => Ok(default),
    }
}

fn period(config: &dyn ConfigPort, section: &str, key: &str) -> Result<TradingPeriod> {
    required(config, section, key)?
        .parse()
        .map_err(|e: BackflowError| invalid(section, key, e.to_string()))
}

fn instant(config: &dyn ConfigPort, section: &str, key: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    parse_instant(&required(config, section, key)?)
        .map_err(|_| invalid(section, key, "expected YYYY-MM-DD or an RFC 3339 timestamp"))
}

fn timeframe(config: &dyn ConfigPort, section: &str) -> Result<Timeframe> {
    let start = instant(config, section, "start")?;
    let end = instant(config, section, "end")?;
    Timeframe::new(start, end).map_err(|_| invalid(section, "start", "start must be before end"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedConfig {
    Csv { path: PathBuf, currency: Currency },
    RandomWalk {
        assets: usize,
        timeframe: Timeframe,
        seed: u64,
    },
}

impl FeedConfig {
    /// `[feed] kind` is `csv` or `random_walk`; it defaults to `csv` when a
    /// path is given.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self> {
        let default_kind = if config.get_string("feed", "path").is_some() {
            "csv"
        } else {
            "random_walk"
        };
        let kind = config
            .get_string("feed", "kind")
            .unwrap_or_else(|| default_kind.to_string());
        match kind.trim() {
            "csv" => Ok(FeedConfig::Csv {
                path: PathBuf::from(required(config, "feed", "path")?),
                currency: Currency::new(
                    &config
                        .get_string("feed", "currency")
                        .unwrap_or_else(|| "USD".to_string()),
                ),
            }),
            "random_walk" => {
                let assets: usize = parsed(config, "feed", "assets", 3)?;
                if assets == 0 {
                    return Err(invalid("feed", "assets", "assets must be positive"));
                }
                Ok(FeedConfig::RandomWalk {
                    assets,
                    timeframe: timeframe(config, "feed")?,
                    seed: parsed(config, "feed", "seed", 0)?,
                })
            }
            other => Err(invalid(
                "feed",
                "kind",
                format!("unknown feed kind '{other}', expected csv or random_walk"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub capacity: usize,
}

impl ChannelConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self> {
        let capacity = parsed(config, "channel", "capacity", DEFAULT_CHANNEL_CAPACITY)?;
        if capacity == 0 {
            return Err(invalid("channel", "capacity", "capacity must be positive"));
        }
        Ok(Self { capacity })
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerMode {
    Train,
    WalkForward {
        train: TradingPeriod,
        test: TradingPeriod,
        anchor: TradingPeriod,
        rolling: bool,
    },
    MonteCarlo {
        train: TradingPeriod,
        test: TradingPeriod,
        samples: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub score: String,
    pub mode: OptimizerMode,
    /// `None` means one trial per available core.
    pub parallelism: Option<usize>,
    pub failure_policy: FailurePolicy,
    pub seed: u64,
    pub initial_cash: f64,
}

impl OptimizerConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self> {
        let section = "optimizer";
        let mode = match config
            .get_string(section, "mode")
            .unwrap_or_else(|| "train".to_string())
            .trim()
        {
            "train" => OptimizerMode::Train,
            "walk_forward" => {
                let train = period(config, section, "train_period")?;
                let test = period(config, section, "test_period")?;
                train
                    .checked_add(test)
                    .map_err(|e| invalid(section, "test_period", e.to_string()))?;
                let anchor = match config.get_string(section, "anchor") {
                    Some(_) => period(config, section, "anchor")?,
                    None => TradingPeriod::days(0),
                };
                OptimizerMode::WalkForward {
                    train,
                    test,
                    anchor,
                    rolling: config.get_bool(section, "rolling", true),
                }
            }
            "monte_carlo" => {
                let train = period(config, section, "train_period")?;
                let test = period(config, section, "test_period")?;
                train
                    .checked_add(test)
                    .map_err(|e| invalid(section, "test_period", e.to_string()))?;
                let samples: usize = parsed(config, section, "samples", 10)?;
                if samples == 0 {
                    return Err(invalid(section, "samples", "samples must be positive"));
                }
                OptimizerMode::MonteCarlo {
                    train,
                    test,
                    samples,
                }
            }
            other => {
                return Err(invalid(
                    section,
                    "mode",
                    format!("unknown mode '{other}', expected train, walk_forward or monte_carlo"),
                ));
            }
        };

        let parallelism = match parsed::<usize>(config, section, "parallelism", 0)? {
            0 => None,
            n => Some(n),
        };
        let initial_cash: f64 = parsed(config, section, "initial_cash", 10_000.0)?;
        if !initial_cash.is_finite() || initial_cash <= 0.0 {
            return Err(invalid(section, "initial_cash", "initial_cash must be positive"));
        }

        Ok(Self {
            score: config
                .get_string(section, "score")
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| "account.return".to_string()),
            mode,
            parallelism,
            failure_policy: parsed(config, section, "failure_policy", FailurePolicy::Skip)?,
            seed: parsed(config, section, "seed", 0)?,
            initial_cash,
        })
    }
}

/// `[search]` holds `kind`, `seed`, `samples` and one `name = range` entry
/// per parameter.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub space: SearchSpace,
}

impl SearchConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self> {
        let section = "search";
        let mut params = Vec::new();
        for key in config.keys(section) {
            if SEARCH_RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let spec = required(config, section, &key)?;
            let range: ParamRange = spec
                .parse()
                .map_err(|e: BackflowError| invalid(section, &key, e.to_string()))?;
            params.push((key, range));
        }

        let default_kind = if params.is_empty() { "empty" } else { "grid" };
        let kind = config
            .get_string(section, "kind")
            .unwrap_or_else(|| default_kind.to_string());
        let space = match kind.trim() {
            "empty" => SearchSpace::Empty,
            "grid" => {
                let mut grid = GridSearch::new();
                for (name, range) in params {
                    grid.add(&name, range)
                        .map_err(|e| invalid(section, &name, e.to_string()))?;
                }
                SearchSpace::Grid(grid)
            }
            "random" => {
                let samples: usize = parsed(config, section, "samples", 20)?;
                let mut random = RandomSearch::new(samples, parsed(config, section, "seed", 0)?);
                for (name, range) in params {
                    random
                        .add(&name, range)
                        .map_err(|e| invalid(section, &name, e.to_string()))?;
                }
                SearchSpace::Random(random)
            }
            other => {
                return Err(invalid(
                    section,
                    "kind",
                    format!("unknown search kind '{other}', expected grid, random or empty"),
                ));
            }
        };
        Ok(Self { space })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatesConfig {
    pub path: PathBuf,
    pub base: Currency,
}

impl RatesConfig {
    /// `None` when the config has no `[rates] path`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Option<Self>> {
        if config.get_string("rates", "path").is_none() {
            return Ok(None);
        }
        Ok(Some(Self {
            path: PathBuf::from(required(config, "rates", "path")?),
            base: Currency::new(&required(config, "rates", "base")?),
        }))
    }
}

/// Everything a run needs, built and checked in one pass.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub channel: ChannelConfig,
    pub optimizer: OptimizerConfig,
    pub search: SearchConfig,
    pub rates: Option<RatesConfig>,
}

impl AppConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self> {
        Ok(Self {
            feed: FeedConfig::from_config(config)?,
            channel: ChannelConfig::from_config(config)?,
            optimizer: OptimizerConfig::from_config(config)?,
            search: SearchConfig::from_config(config)?,
            rates: RatesConfig::from_config(config)?,
        })
    }
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<()> {
    AppConfig::from_config(config).map(|_| ())
}
