//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig};
use crate::domain::config_validation::{
    load_backtest_config, load_instrument, load_param_grid, load_strategy_kind,
    strategy_overrides, validate_config,
};
use crate::domain::error::TradelabError;
use crate::domain::instrument::Instrument;
use crate::domain::metrics::{AggregatePerformance, BriefPerformance};
use crate::domain::ohlcv::BarSeries;
use crate::domain::optimizer::{run_optimization_parallel, ParamGrid};
use crate::domain::portfolio::{Portfolio, Summary};
use crate::domain::stats::Cohort;
use crate::domain::strategies::StrategyKind;
use crate::domain::strategy::Params;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "tradelab", about = "Bar-by-bar strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single backtest and print cohort performance
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Bar CSV; overrides `[backtest] data`
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Also print every closed trade to stdout
        #[arg(long)]
        trades: bool,
    },
    /// Run the `[optimize]` parameter grid and print one row per combination
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Evaluate combinations on all cores
        #[arg(long)]
        parallel: bool,
    },
    /// Validate a configuration file without running
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            data,
            trades,
        } => run_backtest(&config, data.as_deref(), trades),
        Command::Optimize {
            config,
            data,
            parallel,
        } => run_optimize(&config, data.as_deref(), parallel),
        Command::Validate { config } => run_validate(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TradelabError> {
    FileConfigAdapter::from_file(path).map_err(|e| TradelabError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Everything a run needs, loaded and validated from the config file.
struct Session {
    backtest: BacktestConfig,
    instrument: Arc<Instrument>,
    kind: StrategyKind,
    volume: f64,
    overrides: Vec<(String, f64)>,
    bars: BarSeries,
}

fn resolve_data_path(
    config: &dyn ConfigPort,
    config_path: &Path,
    data_override: Option<&Path>,
) -> Result<PathBuf, TradelabError> {
    if let Some(path) = data_override {
        return Ok(path.to_path_buf());
    }
    let data = config
        .get_string("backtest", "data")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| TradelabError::ConfigMissing {
            section: "backtest".into(),
            key: "data".into(),
        })?;
    let path = PathBuf::from(data.trim());
    // relative paths are relative to the config file
    Ok(match config_path.parent() {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    })
}

fn load_session(
    config_path: &Path,
    data_override: Option<&Path>,
) -> Result<Session, TradelabError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_config(&adapter)?;

    let instrument = load_instrument(&adapter)?;
    let (kind, volume) = load_strategy_kind(&adapter)?;
    let overrides = strategy_overrides(&adapter)?;

    let data_path = resolve_data_path(&adapter, config_path, data_override)?;
    eprintln!("Loading bars from {}", data_path.display());
    let bars = CsvAdapter::new(data_path).load_bars()?;
    eprintln!(
        "  {} bars, {} to {} ({:?})",
        bars.len(),
        bars.first().time,
        bars.last().time,
        bars.timeframe()
    );

    Ok(Session {
        backtest: load_backtest_config(&adapter),
        instrument,
        kind,
        volume,
        overrides,
        bars,
    })
}

fn run_backtest(
    config_path: &Path,
    data: Option<&Path>,
    trades: bool,
) -> Result<(), TradelabError> {
    let session = load_session(config_path, data)?;
    let mut strategy = session.kind.build(Arc::clone(&session.instrument), session.volume);
    let params = Params::resolve(&strategy.parameters(), &session.overrides)?;

    eprintln!(
        "Running {} on {} [{}]",
        strategy.name(),
        session.instrument.ticker,
        params
    );

    let mut portfolio = Portfolio::new(session.backtest.initial_balance, session.backtest.leverage);
    let summary = backtest_engine::run_backtest(
        &mut strategy,
        &params,
        &session.bars,
        &mut portfolio,
        None,
    )?;

    print_summary(summary);
    if trades {
        print_trades(summary);
    }
    eprintln!("\nFinal balance:    {:.2}", portfolio.balance);
    Ok(())
}

fn run_optimize(
    config_path: &Path,
    data: Option<&Path>,
    parallel: bool,
) -> Result<(), TradelabError> {
    let adapter = load_config(config_path)?;
    let grid = load_param_grid(&adapter)?;
    let session = load_session(config_path, data)?;
    let parallel = parallel || session.backtest.parallel;

    eprintln!(
        "Optimizing {} combinations{}",
        grid.len(),
        if parallel { " in parallel" } else { "" }
    );

    let rows = if parallel {
        let instrument = Arc::clone(&session.instrument);
        let (kind, volume) = (session.kind, session.volume);
        run_optimization_parallel(
            || kind.build(Arc::clone(&instrument), volume),
            &grid,
            &session.bars,
            session.backtest.initial_balance,
            session.backtest.leverage,
            None,
        )?
    } else {
        let mut strategy = session.kind.build(Arc::clone(&session.instrument), session.volume);
        let mut portfolio =
            Portfolio::new(session.backtest.initial_balance, session.backtest.leverage);
        portfolio
            .run_optimization(&mut strategy, &grid, &session.bars, None)?
            .to_vec()
    };

    print_brief_rows(&grid, &rows);
    let failed = rows.iter().filter(|r| r.is_failed()).count();
    if failed > 0 {
        eprintln!("\n{failed} of {} combinations failed", rows.len());
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), TradelabError> {
    eprintln!("Validating {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_config(&adapter)?;

    let instrument = load_instrument(&adapter)?;
    let (kind, volume) = load_strategy_kind(&adapter)?;
    let strategy = kind.build(Arc::clone(&instrument), volume);
    let params = Params::resolve(&strategy.parameters(), &strategy_overrides(&adapter)?)?;

    eprintln!("\nInstrument:");
    eprintln!(
        "  {} ({:?}), tick size {}",
        instrument.ticker, instrument.class, instrument.tick_size
    );
    eprintln!("\nStrategy:");
    eprintln!("  {} [{}], volume {}", strategy.name(), params, volume);

    if adapter.has_section("optimize") {
        let grid = load_param_grid(&adapter)?;
        eprintln!("\nOptimization grid: {} combinations", grid.len());
        for (name, candidates) in grid.axes() {
            eprintln!("  {name}: {candidates:?}");
        }
    }

    eprintln!("\nConfiguration is valid");
    Ok(())
}

fn print_performance(perf: &AggregatePerformance) {
    eprintln!("Net Profit:       {:.2} ({:.2}%)", perf.net_profit_abs, perf.net_profit_perc);
    eprintln!("Year Profit:      {:.2}", perf.year_profit);
    eprintln!("Total Trades:     {}", perf.total_trades);
    eprintln!("Win Rate:         {:.2}%", perf.win_trades_perc);
    eprintln!("Profit Factor:    {:.2}", perf.profit_factor);
    eprintln!("Recovery Factor:  {:.2}", perf.recovery_factor);
    eprintln!("Payoff Ratio:     {:.2}", perf.payoff_ratio);
    eprintln!("Max Drawdown:     {:.2}", perf.max_drawdown_abs);
    eprintln!("Sharpe Ratio:     {:.2}", perf.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", perf.sortino_ratio);
}

fn print_summary(summary: &Summary) {
    for cohort in Cohort::ALL {
        let perf = summary.performance.get(cohort);
        if perf.total_trades == 0 {
            continue;
        }
        eprintln!("\n=== {} ===", cohort.label());
        print_performance(perf);
    }
}

fn print_trades(summary: &Summary) {
    println!("ticket,side,open_time,close_time,open_price,close_price,abs,perc,bars_held,mae,mfe");
    for stat in &summary.stats.all {
        println!(
            "{},{:?},{},{},{},{},{:.2},{:.4},{},{:.2},{:.2}",
            stat.ticket,
            stat.side,
            stat.open_time,
            stat.close_time,
            stat.open_price,
            stat.close_price,
            stat.abs,
            stat.perc,
            stat.bars_held,
            stat.mae,
            stat.mfe,
        );
    }
}

fn print_brief_rows(grid: &ParamGrid, rows: &[BriefPerformance]) {
    let names: Vec<&str> = grid.axes().iter().map(|(n, _)| n.as_str()).collect();
    println!(
        "{},net_profit_abs,net_profit_perc,year_profit,total_trades,win_trades_perc,\
         profit_factor,recovery_factor,payoff_ratio,status",
        names.join(",")
    );
    for row in rows {
        let values: Vec<String> = row.params.iter().map(|(_, v)| v.to_string()).collect();
        let status = row.failure.as_deref().unwrap_or("ok").replace(',', ";");
        println!(
            "{},{:.2},{:.2},{:.2},{},{:.2},{:.2},{:.2},{:.2},{}",
            values.join(","),
            row.net_profit_abs,
            row.net_profit_perc,
            row.year_profit,
            row.total_trades,
            row.win_trades_perc,
            row.profit_factor,
            row.recovery_factor,
            row.payoff_ratio,
            status,
        );
    }
}
