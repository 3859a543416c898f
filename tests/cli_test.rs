//! CLI dispatch with real files on disk.
//!
//! Tests cover:
//! - Config loading and validation
//! - Feed construction from config
//! - Exit codes for each command, including error paths

mod common;

use backflow::adapters::file_config_adapter::FileConfigAdapter;
use backflow::cli::{self, Cli, Command};
use backflow::domain::config_validation::{FeedConfig, OptimizerMode};
use backflow::domain::error::BackflowError;
use backflow::domain::timeframe::TradingPeriod;
use common::*;
use std::path::PathBuf;
use std::process::ExitCode;

const RANDOM_WALK_INI: &str = r#"
[feed]
kind = random_walk
assets = 2
start = 2024-01-01
end = 2024-03-01
seed = 9

[channel]
capacity = 4

[optimizer]
mode = walk_forward
train_period = 20d
test_period = 10d
score = account.return
parallelism = 2
failure_policy = skip

[search]
fast = 2,3
slow = 5..6
"#;

fn same_code(actual: ExitCode, expected: u8) {
    assert_eq!(format!("{actual:?}"), format!("{:?}", ExitCode::from(expected)));
}

fn csv_feed_ini(csv: &std::path::Path) -> String {
    format!(
        "[feed]\npath = {}\n\n[optimizer]\nscore = run.events\n\n[search]\nfast = 2\nslow = 4\n",
        csv.display()
    )
}

fn run(command: Command) -> ExitCode {
    cli::run(Cli {
        verbose: false,
        command,
    })
}

mod config_loading {
    use super::*;

    #[test]
    fn loads_random_walk_config() {
        let file = write_temp(RANDOM_WALK_INI, ".ini");
        let config = cli::load_config(file.path()).unwrap();

        match config.feed {
            FeedConfig::RandomWalk { assets, seed, .. } => {
                assert_eq!(assets, 2);
                assert_eq!(seed, 9);
            }
            other => panic!("unexpected feed: {other:?}"),
        }
        assert_eq!(config.channel.capacity, 4);
        assert_eq!(config.optimizer.parallelism, Some(2));
        assert_eq!(
            config.optimizer.mode,
            OptimizerMode::WalkForward {
                train: TradingPeriod::days(20),
                test: TradingPeriod::days(10),
                anchor: TradingPeriod::days(0),
                rolling: true,
            }
        );
        assert_eq!(config.search.space.size(), 4);
        assert!(config.rates.is_none());
    }

    #[test]
    fn missing_file_is_rejected() {
        let err = cli::load_config(&PathBuf::from("/nonexistent/backflow.ini")).unwrap_err();
        assert!(matches!(err, BackflowError::ConfigParse { .. } | BackflowError::Io(_)));
    }

    #[test]
    fn builds_csv_feed() {
        let csv = write_temp(&bars_csv("AAA", 6), ".csv");
        let ini = csv_feed_ini(csv.path());
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let config = backflow::domain::config_validation::AppConfig::from_config(&adapter).unwrap();
        let feed = cli::build_feed(&config.feed).unwrap();
        assert_eq!(feed.assets().len(), 1);
        assert_eq!(feed.timeframe().start, day(0));
    }

    #[test]
    fn csv_feed_without_rows_is_empty() {
        let csv = write_temp("time,symbol,open,high,low,close,volume\n", ".csv");
        let feed = FeedConfig::Csv {
            path: csv.path().to_path_buf(),
            currency: "USD".into(),
        };
        let err = cli::build_feed(&feed).err().unwrap();
        assert!(matches!(err, BackflowError::EmptyFeed(_)));
    }
}

mod commands {
    use super::*;

    #[test]
    fn validate_accepts_good_config() {
        let file = write_temp(RANDOM_WALK_INI, ".ini");
        same_code(
            run(Command::Validate {
                config: file.path().to_path_buf(),
            }),
            0,
        );
    }

    #[test]
    fn validate_rejects_bad_value() {
        let file = write_temp("[channel]\ncapacity = 0\n[feed]\npath = x.csv\n", ".ini");
        same_code(
            run(Command::Validate {
                config: file.path().to_path_buf(),
            }),
            2,
        );
    }

    #[test]
    fn replay_random_walk() {
        let file = write_temp(RANDOM_WALK_INI, ".ini");
        same_code(
            run(Command::Replay {
                config: file.path().to_path_buf(),
                window: 5,
            }),
            0,
        );
    }

    #[test]
    fn optimize_walk_forward() {
        let file = write_temp(RANDOM_WALK_INI, ".ini");
        same_code(
            run(Command::Optimize {
                config: file.path().to_path_buf(),
                top: 3,
            }),
            0,
        );
    }

    #[test]
    fn optimize_csv_feed() {
        let csv = write_temp(&bars_csv("AAA", 12), ".csv");
        let ini = write_temp(&csv_feed_ini(csv.path()), ".ini");
        same_code(
            run(Command::Optimize {
                config: ini.path().to_path_buf(),
                top: 1,
            }),
            0,
        );
    }

    #[test]
    fn aggregate_csv() {
        let csv = write_temp(&bars_csv("AAA", 9), ".csv");
        same_code(
            run(Command::Aggregate {
                input: csv.path().to_path_buf(),
                size: 3,
                symbol: None,
            }),
            0,
        );
    }

    #[test]
    fn aggregate_unknown_symbol() {
        let csv = write_temp(&bars_csv("AAA", 9), ".csv");
        same_code(
            run(Command::Aggregate {
                input: csv.path().to_path_buf(),
                size: 3,
                symbol: Some("ZZZ".to_string()),
            }),
            4,
        );
    }

    #[test]
    fn aggregate_zero_size() {
        let csv = write_temp(&bars_csv("AAA", 9), ".csv");
        same_code(
            run(Command::Aggregate {
                input: csv.path().to_path_buf(),
                size: 0,
                symbol: None,
            }),
            4,
        );
    }

    #[test]
    fn convert_with_rates() {
        let rates = write_temp(
            "time,currency,rate\n2024-01-01,EUR,1.10\n2024-02-01,EUR,1.20\n",
            ".csv",
        );
        same_code(
            run(Command::Convert {
                rates: rates.path().to_path_buf(),
                base: "USD".to_string(),
                from: "EUR".to_string(),
                to: "USD".to_string(),
                amount: 100.0,
                at: "2024-01-15".to_string(),
            }),
            0,
        );
    }

    #[test]
    fn convert_unknown_currency() {
        let rates = write_temp("time,currency,rate\n2024-01-01,EUR,1.10\n", ".csv");
        same_code(
            run(Command::Convert {
                rates: rates.path().to_path_buf(),
                base: "USD".to_string(),
                from: "JPY".to_string(),
                to: "USD".to_string(),
                amount: 100.0,
                at: "2024-01-15".to_string(),
            }),
            4,
        );
    }

    #[test]
    fn missing_input_file() {
        same_code(
            run(Command::Aggregate {
                input: PathBuf::from("/nonexistent/bars.csv"),
                size: 2,
                symbol: None,
            }),
            3,
        );
    }
}
