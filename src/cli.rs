//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{CsvFeedAdapter, CsvRatesAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::random_walk_feed::RandomWalkFeed;
use crate::domain::config_validation::{AppConfig, FeedConfig, OptimizerMode, validate_config};
use crate::domain::converter::{CurrencyConverter, TimeRateConverter};
use crate::domain::currency::Currency;
use crate::domain::error::{BackflowError, Result};
use crate::domain::multi_asset_series::MultiAssetSeries;
use crate::domain::optimizer::{Optimizer, Phase, RunResult, rank_descending};
use crate::domain::playback::replay;
use crate::domain::price_bar_series::PriceBarSeries;
use crate::domain::search_space::Params;
use crate::domain::sma_cross::SmaCrossTrial;
use crate::domain::timeframe::parse_instant;
use crate::domain::trial::Trial;
use crate::ports::feed_port::Feed;

#[derive(Parser, Debug)]
#[command(name = "backflow", about = "Event-driven market replay and parameter optimizer")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play the configured feed into rolling series and report counts
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        /// Bars kept per asset
        #[arg(short, long, default_value_t = 100)]
        window: usize,
    },
    /// Aggregate a CSV bar file into coarser bars
    Aggregate {
        #[arg(short, long)]
        input: PathBuf,
        /// Bars merged into one
        #[arg(short = 'n', long)]
        size: usize,
        /// Symbol to aggregate; defaults to the first in the file
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// Convert an amount between currencies using a rates CSV
    Convert {
        #[arg(short, long)]
        rates: PathBuf,
        #[arg(short, long, default_value = "USD")]
        base: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: f64,
        /// YYYY-MM-DD or RFC 3339
        #[arg(long)]
        at: String,
    },
    /// Run the configured parameter sweep
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Results printed per phase
        #[arg(short, long, default_value_t = 10)]
        top: usize,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the level.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(io::stderr)
        .init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Replay { config, window } => run_replay(&config, window),
        Command::Aggregate {
            input,
            size,
            symbol,
        } => run_aggregate(&input, size, symbol.as_deref()),
        Command::Convert {
            rates,
            base,
            from,
            to,
            amount,
            at,
        } => run_convert(&rates, &base, &from, &to, amount, &at),
        Command::Optimize { config, top } => run_optimize(&config, top),
        Command::Validate { config } => run_validate(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(&e)
        }
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    tracing::info!(path = %path.display(), "loading config");
    let adapter = FileConfigAdapter::from_file(path)?;
    AppConfig::from_config(&adapter)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

pub fn build_feed(config: &FeedConfig) -> Result<Arc<dyn Feed>> {
    match config {
        FeedConfig::Csv { path, currency } => Ok(Arc::new(
            CsvFeedAdapter::new(path)
                .with_currency(currency.clone())
                .load()?,
        )),
        FeedConfig::RandomWalk {
            assets,
            timeframe,
            seed,
        } => Ok(Arc::new(RandomWalkFeed::new(*timeframe, *assets, *seed)?)),
    }
}

fn run_replay(config_path: &Path, window: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let feed = build_feed(&config.feed)?;
    let timeframe = feed.timeframe();
    tracing::info!(%timeframe, assets = feed.assets().len(), "replaying");
    let mut series = MultiAssetSeries::new(window);

    let progress = runtime()?.block_on(replay(
        Arc::clone(&feed),
        timeframe,
        config.channel.capacity,
        &mut series,
    ))?;

    println!("timeframe: {timeframe}");
    println!("events:    {}", progress.get("run.events").unwrap_or(0.0));
    println!("actions:   {}", progress.get("run.actions").unwrap_or(0.0));
    println!("assets:    {}", series.len());
    for (asset, bars) in series.iter() {
        let last_close = bars.last().map(|[_, _, _, close, _]| close);
        match last_close {
            Some(close) => println!("  {asset:<16} bars={:<6} last_close={close:.4}", bars.len()),
            None => println!("  {asset:<16} bars=0"),
        }
    }
    Ok(())
}

fn run_aggregate(input: &Path, size: usize, symbol: Option<&str>) -> Result<()> {
    let bars = CsvFeedAdapter::new(input).load_bars()?;
    let symbol = match symbol {
        Some(symbol) => symbol.to_string(),
        None => bars
            .first()
            .map(|(_, bar)| bar.asset.symbol.clone())
            .ok_or_else(|| BackflowError::EmptyFeed(input.display().to_string()))?,
    };
    let selected: Vec<_> = bars
        .into_iter()
        .filter(|(_, bar)| bar.asset.symbol == symbol)
        .collect();
    if selected.is_empty() {
        return Err(BackflowError::UnknownAsset(symbol));
    }

    let mut series = PriceBarSeries::new(selected.len());
    for (_, bar) in &selected {
        series.add(bar);
    }
    let aggregated = series.aggregate(size)?;
    tracing::info!(symbol = %symbol, bars = selected.len(), size, out = aggregated.len(), "aggregated");

    let mut wtr = csv::Writer::from_writer(io::stdout());
    wtr.write_record(["time", "symbol", "open", "high", "low", "close", "volume"])?;
    for (g, [open, high, low, close, volume]) in aggregated.iter().enumerate() {
        let time = selected[g * size].0;
        wtr.write_record([
            time.to_rfc3339(),
            symbol.clone(),
            open.to_string(),
            high.to_string(),
            low.to_string(),
            close.to_string(),
            volume.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn run_convert(rates: &Path, base: &str, from: &str, to: &str, amount: f64, at: &str) -> Result<()> {
    let table = CsvRatesAdapter::new(rates).load()?;
    let converter = TimeRateConverter::new(Currency::new(base), table);
    let at = parse_instant(at)?;
    let converted = converter.convert(&Currency::new(from), &Currency::new(to), amount, at)?;
    println!("{converted:.6}");
    Ok(())
}

fn run_optimize(config_path: &Path, top: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let feed = build_feed(&config.feed)?;

    let converter: Option<(Arc<dyn CurrencyConverter>, Currency)> = match &config.rates {
        Some(rates) => {
            let table = CsvRatesAdapter::new(&rates.path).load()?;
            let converter = TimeRateConverter::new(rates.base.clone(), table);
            Some((Arc::new(converter), rates.base.clone()))
        }
        None => None,
    };
    let capacity = config.channel.capacity;
    let initial_cash = config.optimizer.initial_cash;
    let builder = move |params: &Params| -> Result<Box<dyn Trial>> {
        let mut trial = SmaCrossTrial::from_params(params, initial_cash)?.with_capacity(capacity);
        if let Some((converter, base)) = &converter {
            trial = trial.with_converter(Arc::clone(converter), base.clone());
        }
        Ok(Box::new(trial))
    };

    let settings = &config.optimizer;
    let mut optimizer = Optimizer::new(config.search.space.clone(), &settings.score, builder)
        .with_failure_policy(settings.failure_policy)
        .with_seed(settings.seed);
    if let Some(parallelism) = settings.parallelism {
        optimizer = optimizer.with_parallelism(parallelism);
    }
    tracing::info!(
        points = optimizer.space().size(),
        parallelism = optimizer.parallelism(),
        score = %settings.score,
        "optimizing"
    );

    let results = runtime()?.block_on(async {
        match settings.mode {
            OptimizerMode::Train => optimizer.train(Arc::clone(&feed), feed.timeframe()).await,
            OptimizerMode::WalkForward {
                train,
                test,
                anchor,
                rolling,
            } => {
                optimizer
                    .walk_forward(Arc::clone(&feed), train, test, anchor, rolling)
                    .await
            }
            OptimizerMode::MonteCarlo {
                train,
                test,
                samples,
            } => {
                optimizer
                    .monte_carlo(Arc::clone(&feed), train, test, samples)
                    .await
            }
        }
    })?;

    let failures = optimizer.take_failures();
    if !failures.is_empty() {
        tracing::warn!(count = failures.len(), "some trials failed");
    }

    print_ranked("train", &results, Phase::Train, top);
    if results.iter().any(|r| r.phase == Phase::Validation) {
        print_ranked("validation", &results, Phase::Validation, top);
    }
    Ok(())
}

fn print_ranked(title: &str, results: &[RunResult], phase: Phase, top: usize) {
    let mut ranked: Vec<RunResult> = results.iter().filter(|r| r.phase == phase).cloned().collect();
    rank_descending(&mut ranked);
    println!("== {title} ({} runs) ==", ranked.len());
    println!("{:<24} {:>12}  {:<45}  params", "run", "score", "timeframe");
    for r in ranked.iter().take(top) {
        println!(
            "{:<24} {:>12.6}  {:<45}  {}",
            r.run,
            r.score,
            r.timeframe.to_string(),
            r.params
        );
    }
}

fn run_validate(config_path: &Path) -> Result<()> {
    let adapter = FileConfigAdapter::from_file(config_path)?;
    validate_config(&adapter)?;
    println!("{}: ok", config_path.display());
    Ok(())
}
