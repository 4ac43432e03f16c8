//! CLI integration tests: real INI and CSV files on disk driven through `cli::run`.

mod common;

use clap::Parser;
use common::*;
use std::process::ExitCode;
use tradelab::adapters::csv_adapter::CsvAdapter;
use tradelab::adapters::file_config_adapter::FileConfigAdapter;
use tradelab::cli::{self, Cli};
use tradelab::domain::config_validation::{load_param_grid, validate_config};
use tradelab::ports::data_port::DataPort;

fn closes() -> Vec<f64> {
    let mut closes = Vec::new();
    let mut price = 50.0;
    for _ in 0..5 {
        for _ in 0..4 {
            price += 1.0;
            closes.push(price);
        }
        for _ in 0..4 {
            price -= 0.5;
            closes.push(price);
        }
    }
    closes
}

fn ini(data: &str, extra: &str) -> String {
    format!(
        r#"
[backtest]
initial_balance = 100000
leverage = 5
data = {data}

[instrument]
ticker = ABC
class = shares
tick_size = 0.01

[strategy]
name = three_bar
volume = 100
high_bars = 3
low_bars = 3
{extra}"#
    )
}

const GRID: &str = r#"
[optimize]
high_bars = 2,3
low_bars = 2:4:1
"#;

fn exit(args: &[&str]) -> String {
    format!("{:?}", cli::run(Cli::parse_from(args)))
}

fn code(n: u8) -> String {
    format!("{:?}", ExitCode::from(n))
}

fn success() -> String {
    format!("{:?}", ExitCode::SUCCESS)
}

mod config_loading {
    use super::*;

    #[test]
    fn full_config_validates() {
        let adapter = FileConfigAdapter::from_string(&ini("bars.csv", GRID)).unwrap();
        assert!(validate_config(&adapter).is_ok());
        let grid = load_param_grid(&adapter).unwrap();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.axes()[0].0, "high_bars");
    }

    #[test]
    fn csv_round_trip_through_adapter() {
        let csv = write_temp(&bars_csv(&closes()), ".csv");
        let series = CsvAdapter::new(csv.path()).load_bars().unwrap();
        assert_eq!(series.len(), closes().len());
        assert_eq!(series.last().close, *closes().last().unwrap());
    }
}

mod commands {
    use super::*;

    #[test]
    fn backtest_succeeds() {
        let csv = write_temp(&bars_csv(&closes()), ".csv");
        let config = write_temp(&ini(&csv.path().display().to_string(), ""), ".ini");
        let result = exit(&[
            "tradelab",
            "backtest",
            "--config",
            config.path().to_str().unwrap(),
        ]);
        assert_eq!(result, success());
    }

    #[test]
    fn backtest_data_flag_overrides_config() {
        let csv = write_temp(&bars_csv(&closes()), ".csv");
        let config = write_temp(&ini("/nonexistent/bars.csv", ""), ".ini");
        let result = exit(&[
            "tradelab",
            "backtest",
            "--config",
            config.path().to_str().unwrap(),
            "--data",
            csv.path().to_str().unwrap(),
            "--trades",
        ]);
        assert_eq!(result, success());
    }

    #[test]
    fn optimize_succeeds_sequential_and_parallel() {
        let csv = write_temp(&bars_csv(&closes()), ".csv");
        let config = write_temp(&ini(&csv.path().display().to_string(), GRID), ".ini");
        let path = config.path().to_str().unwrap();
        assert_eq!(exit(&["tradelab", "optimize", "--config", path]), success());
        assert_eq!(
            exit(&["tradelab", "optimize", "--config", path, "--parallel"]),
            success()
        );
    }

    #[test]
    fn validate_succeeds() {
        let config = write_temp(&ini("bars.csv", GRID), ".ini");
        let result = exit(&["tradelab", "validate", "--config", config.path().to_str().unwrap()]);
        assert_eq!(result, success());
    }

    #[test]
    fn missing_config_file_is_io_or_config_error() {
        let result = exit(&["tradelab", "validate", "--config", "/nonexistent/tradelab.ini"]);
        assert_eq!(result, code(2));
    }

    #[test]
    fn unknown_strategy_is_config_error() {
        let content = ini("bars.csv", "").replace("three_bar", "martingale");
        let config = write_temp(&content, ".ini");
        let result = exit(&["tradelab", "validate", "--config", config.path().to_str().unwrap()]);
        assert_eq!(result, code(2));
    }

    #[test]
    fn missing_data_file_is_data_error() {
        let config = write_temp(&ini("/nonexistent/bars.csv", ""), ".ini");
        let result = exit(&["tradelab", "backtest", "--config", config.path().to_str().unwrap()]);
        assert_eq!(result, code(3));
    }

    #[test]
    fn malformed_grid_is_configuration_error() {
        let csv = write_temp(&bars_csv(&closes()), ".csv");
        let grid = "\n[optimize]\nhigh_bars = two,three\n";
        let config = write_temp(&ini(&csv.path().display().to_string(), grid), ".ini");
        let result = exit(&["tradelab", "optimize", "--config", config.path().to_str().unwrap()]);
        assert_eq!(result, code(5));
    }

    #[test]
    fn optimize_without_grid_is_config_error() {
        let csv = write_temp(&bars_csv(&closes()), ".csv");
        let config = write_temp(&ini(&csv.path().display().to_string(), ""), ".ini");
        let result = exit(&["tradelab", "optimize", "--config", config.path().to_str().unwrap()]);
        assert_eq!(result, code(2));
    }
}
