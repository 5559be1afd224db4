//! CLI definition and dispatch.

use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig};
use crate::domain::config_validation::{
    parse_date, parse_positive_list, validate_backtest_config, validate_strategy_config,
    validate_sweep_config,
};
use crate::domain::error::RebalError;
use crate::domain::ledger::CashPolicy;
use crate::domain::metrics::{ComparisonRow, Metrics, TradeSummary};
use crate::domain::strategies;
use crate::domain::strategy::{Strategy, StrategyParams};
use crate::domain::sweep::{best_by_return, compare_strategies, run_sweep};
use crate::domain::universe::{self, Coverage, parse_assets};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_OUTPUT_DIR: &str = "results";

#[derive(Parser, Debug)]
#[command(name = "rebaltrader", about = "Periodic portfolio rebalancing backtester")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the holding period × portfolio size grid
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run several strategies under one configuration and compare them
    Compare {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma separated strategy names; defaults to `[compare] strategies`,
        /// then every built-in strategy
        #[arg(long)]
        strategies: Option<String>,
    },
    /// Show the stored data range for configured asset(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        asset: Option<String>,
    },
    /// List assets available in the data directory
    ListAssets {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List built-in strategies and their parameters
    Strategies,
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(cli.verbose);

    match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_deref())
            }
        }
        Command::Sweep { config, output } => run_sweep_command(&config, output.as_deref()),
        Command::Compare {
            config,
            output,
            strategies,
        } => run_compare_command(&config, output.as_deref(), strategies.as_deref()),
        Command::Info { config, asset } => run_info(&config, asset.as_deref()),
        Command::ListAssets { config } => run_list_assets(&config),
        Command::Strategies => run_strategies(),
    }
}

fn log_level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the stderr subscriber. A second call keeps the first subscriber.
pub fn init_logging(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn fail(err: RebalError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        fail(RebalError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        })
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, RebalError> {
    let assets_str =
        adapter
            .get_string("backtest", "assets")
            .ok_or_else(|| RebalError::ConfigMissing {
                section: "backtest".into(),
                key: "assets".into(),
            })?;
    let assets = parse_assets(&assets_str).map_err(|e| invalid("backtest", "assets", e))?;

    let start_date = parse_date(
        adapter.get_string("backtest", "start_date").as_deref(),
        "start_date",
    )?;
    let end_date = parse_date(
        adapter.get_string("backtest", "end_date").as_deref(),
        "end_date",
    )?;

    let mut config = BacktestConfig::new(assets, start_date, end_date);
    config.initial_capital = adapter
        .try_double("backtest", "initial_capital")?
        .unwrap_or(config.initial_capital);
    config.lookback_period = non_negative(adapter, "lookback_period", config.lookback_period)?;
    config.holding_period = non_negative(adapter, "holding_period", config.holding_period)?;
    config.n_assets = non_negative(adapter, "n_assets", config.n_assets as u64)? as usize;
    config.commission_buy = adapter
        .try_double("backtest", "commission_buy")?
        .unwrap_or(config.commission_buy);
    config.commission_sell = adapter
        .try_double("backtest", "commission_sell")?
        .unwrap_or(config.commission_sell);

    if let Some(raw) = adapter.get_string("backtest", "allocation_method") {
        config.allocation_method = raw
            .parse()
            .map_err(|e| invalid("backtest", "allocation_method", e))?;
    }
    if let Some(raw) = adapter.get_string("backtest", "cash_policy") {
        config.cash_policy = raw
            .parse::<CashPolicy>()
            .map_err(|e| invalid("backtest", "cash_policy", e))?;
    }

    if let Some(name) = adapter.get_string("strategy", "name") {
        config.strategy_name = name.trim().to_lowercase();
    }
    config.strategy_params = build_strategy_params(adapter);

    Ok(config)
}

/// Every key of `[strategy_params]`, passed through as raw strings.
pub fn build_strategy_params(adapter: &dyn ConfigPort) -> StrategyParams {
    let mut params = StrategyParams::new();
    for key in adapter.keys("strategy_params") {
        if let Some(value) = adapter.get_string("strategy_params", &key) {
            params.insert(&key, value);
        }
    }
    params
}

fn non_negative(adapter: &dyn ConfigPort, key: &str, default: u64) -> Result<u64, RebalError> {
    let Some(raw) = adapter.try_int("backtest", key)? else {
        return Ok(default);
    };
    u64::try_from(raw).map_err(|_| invalid("backtest", key, format!("{raw} is negative")))
}

fn invalid(section: &str, key: &str, reason: impl ToString) -> RebalError {
    RebalError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: reason.to_string(),
    }
}

/// `[data] path` as a CSV data directory.
pub fn build_data_port(adapter: &dyn ConfigPort) -> Result<CsvAdapter, RebalError> {
    let path = adapter
        .get_string("data", "path")
        .ok_or_else(|| RebalError::ConfigMissing {
            section: "data".into(),
            key: "path".into(),
        })?;
    let path = PathBuf::from(path.trim());
    if !path.is_dir() {
        return Err(invalid(
            "data",
            "path",
            format!("{} is not a directory", path.display()),
        ));
    }
    Ok(CsvAdapter::new(path))
}

/// `--output` wins over `[report] output_dir`, which wins over `./results`.
pub fn resolve_output_dir(output_override: Option<&Path>, adapter: &dyn ConfigPort) -> PathBuf {
    output_override
        .map(Path::to_path_buf)
        .or_else(|| {
            adapter
                .get_string("report", "output_dir")
                .map(|s| PathBuf::from(s.trim()))
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

/// Stages shared by `backtest` and `sweep`: load, validate, build.
fn prepare(config_path: &Path) -> Result<(FileConfigAdapter, BacktestConfig), ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;

    validate_backtest_config(&adapter).map_err(fail)?;
    validate_strategy_config(&adapter).map_err(fail)?;
    let bt_config = build_backtest_config(&adapter).map_err(fail)?;
    Ok((adapter, bt_config))
}

fn run_backtest(config_path: &Path, output_override: Option<&Path>) -> ExitCode {
    let (adapter, bt_config) = match prepare(config_path) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let strategy = match strategies::lookup(&bt_config.strategy_name) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    eprintln!("Strategy: {}", bt_config.strategy_name);

    let data_port = match build_data_port(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let output_dir = resolve_output_dir(output_override, &adapter);
    run_backtest_pipeline(&data_port, &strategy, &bt_config, &output_dir)
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    strategy: &dyn Strategy,
    bt_config: &BacktestConfig,
    output_dir: &Path,
) -> ExitCode {
    // Survey the universe
    let coverage = universe::survey(data_port, &bt_config.assets);
    for c in coverage.iter().filter(|c| !c.is_available()) {
        eprintln!("warning: no usable data for {}", c.asset);
    }
    if let Err(e) = universe::require_any(&coverage) {
        return fail(e);
    }

    // Load and run
    eprintln!(
        "Running backtest: {} assets, {} to {}, every {} days, top {}",
        bt_config.assets.len(),
        bt_config.start_date,
        bt_config.end_date,
        bt_config.holding_period,
        bt_config.n_assets,
    );
    let result = match backtest_engine::run(data_port, strategy, bt_config) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    // Metrics and console summary
    let metrics = match Metrics::compute(&result.history, bt_config.initial_capital) {
        Ok(m) => m,
        Err(e) => return fail(e),
    };
    let trades = TradeSummary::from_trades(result.ledger.trade_log());
    print_summary(&metrics, &trades);

    // Reports
    if let Err(e) = CsvReportAdapter.write(&result, &metrics, output_dir) {
        return fail(e);
    }
    eprintln!("\nReports written to: {}", output_dir.display());
    ExitCode::SUCCESS
}

fn print_summary(metrics: &Metrics, trades: &TradeSummary) {
    eprintln!("\n=== Results ===");
    eprintln!("Final Value:      {:.2}", metrics.final_value);
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!(
        "Annualized:       {:.2}%",
        metrics.annualized_return * 100.0
    );
    eprintln!("Volatility:       {:.2}%", metrics.volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Rebalances:       {}", metrics.num_rebalances);
    eprintln!(
        "Trades:           {} buys, {} sells",
        trades.buys, trades.sells
    );
    eprintln!("Commission Paid:  {:.2}", trades.total_commission);
}

fn run_sweep_command(config_path: &Path, output_override: Option<&Path>) -> ExitCode {
    let (adapter, bt_config) = match prepare(config_path) {
        Ok(p) => p,
        Err(code) => return code,
    };
    if let Err(e) = validate_sweep_config(&adapter) {
        return fail(e);
    }

    let grid = adapter
        .get_string("sweep", "holding_periods")
        .zip(adapter.get_string("sweep", "n_assets"))
        .ok_or_else(|| RebalError::ConfigMissing {
            section: "sweep".into(),
            key: "holding_periods".into(),
        })
        .and_then(|(hp, n)| {
            Ok((
                parse_positive_list(&hp, "sweep", "holding_periods")?,
                parse_positive_list(&n, "sweep", "n_assets")?,
            ))
        });
    let (holding_periods, n_assets) = match grid {
        Ok(g) => g,
        Err(e) => return fail(e),
    };
    let n_assets: Vec<usize> = n_assets.into_iter().map(|n| n as usize).collect();

    let strategy = match strategies::lookup(&bt_config.strategy_name) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let data_port = match build_data_port(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let output_dir = resolve_output_dir(output_override, &adapter);
    run_sweep_pipeline(
        &data_port,
        &strategy,
        &bt_config,
        &holding_periods,
        &n_assets,
        &output_dir,
    )
}

pub fn run_sweep_pipeline(
    data_port: &dyn DataPort,
    strategy: &dyn Strategy,
    base: &BacktestConfig,
    holding_periods: &[u64],
    n_assets: &[usize],
    output_dir: &Path,
) -> ExitCode {
    let data = match data_port.get_data(&base.assets, base.data_start(), base.end_date) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };

    eprintln!(
        "Running sweep: {} holding periods × {} portfolio sizes over {} assets",
        holding_periods.len(),
        n_assets.len(),
        data.asset_count(),
    );
    let rows = match run_sweep(&data, strategy, base, holding_periods, n_assets) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    if rows.is_empty() {
        return fail(RebalError::EmptyHistory);
    }

    eprintln!("\n=== Sweep Results ===");
    eprintln!(
        "{:>8} {:>4} {:>10} {:>10} {:>8} {:>8}",
        "holding", "n", "total", "annual", "sharpe", "max dd"
    );
    for row in &rows {
        eprintln!(
            "{:>8} {:>4} {:>9.2}% {:>9.2}% {:>8.2} {:>7.1}%",
            row.holding_period,
            row.n_assets,
            row.total_return * 100.0,
            row.annualized_return * 100.0,
            row.sharpe_ratio,
            row.max_drawdown * 100.0,
        );
    }
    if let Some(best) = best_by_return(&rows) {
        eprintln!(
            "\nBest: holding_period={} n_assets={} ({:.2}% annualized)",
            best.holding_period,
            best.n_assets,
            best.annualized_return * 100.0
        );
    }

    if let Err(e) = CsvReportAdapter.write_sweep(&rows, output_dir) {
        return fail(e);
    }
    eprintln!("\nSweep written to: {}", output_dir.display());
    ExitCode::SUCCESS
}

/// `--strategies` when given, else `[compare] strategies`, else every built-in.
pub fn resolve_compare_strategies(
    strategies_override: Option<&str>,
    adapter: &dyn ConfigPort,
) -> Vec<String> {
    let listed = strategies_override
        .map(str::to_string)
        .or_else(|| adapter.get_string("compare", "strategies"));
    match listed {
        Some(raw) => raw
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect(),
        None => strategies::available()
            .iter()
            .map(|info| info.name.to_string())
            .collect(),
    }
}

fn run_compare_command(
    config_path: &Path,
    output_override: Option<&Path>,
    strategies_override: Option<&str>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let bt_config = match validate_backtest_config(&adapter)
        .and_then(|_| build_backtest_config(&adapter))
    {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let names = resolve_compare_strategies(strategies_override, &adapter);
    for name in &names {
        if let Err(e) = strategies::lookup(name) {
            return fail(e);
        }
    }

    let data_port = match build_data_port(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let output_dir = resolve_output_dir(output_override, &adapter);
    run_compare_pipeline(&data_port, &bt_config, &names, &output_dir)
}

pub fn run_compare_pipeline(
    data_port: &dyn DataPort,
    base: &BacktestConfig,
    names: &[String],
    output_dir: &Path,
) -> ExitCode {
    let data = match data_port.get_data(&base.assets, base.data_start(), base.end_date) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };

    eprintln!(
        "Comparing {} strategies over {} assets",
        names.len(),
        data.asset_count()
    );
    let rows = match compare_strategies(&data, base, names) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    if rows.is_empty() {
        return fail(RebalError::EmptyHistory);
    }
    print_comparison(&rows);

    if let Err(e) = CsvReportAdapter.write_comparison(&rows, output_dir) {
        return fail(e);
    }
    eprintln!("\nComparison written to: {}", output_dir.display());
    ExitCode::SUCCESS
}

fn print_comparison(rows: &[ComparisonRow]) {
    eprintln!("\n=== Strategy Comparison ===");
    eprintln!(
        "{:<20} {:>12} {:>9} {:>9} {:>7} {:>8} {:>8} {:>5}",
        "strategy", "final", "total", "annual", "sharpe", "max dd", "vol", "reb"
    );
    for row in rows {
        eprintln!(
            "{:<20} {:>12.2} {:>8.2}% {:>8.2}% {:>7.2} {:>7.1}% {:>7.1}% {:>5}",
            row.strategy,
            row.final_value,
            row.total_return_pct,
            row.annual_return_pct,
            row.sharpe_ratio,
            row.max_drawdown_pct,
            row.volatility_pct,
            row.num_rebalances,
        );
    }
}

pub fn run_dry_run(config_path: &Path) -> ExitCode {
    let (adapter, bt_config) = match prepare(config_path) {
        Ok(p) => p,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully");

    if let Err(e) = bt_config.validate(bt_config.assets.len()) {
        return fail(e);
    }

    eprintln!("\nRun:");
    for (name, value) in bt_config.parameter_rows() {
        eprintln!("  {:<18} {}", name, value);
    }
    eprintln!("  {:<18} {}", "data_start", bt_config.data_start());

    match adapter.get_string("data", "path") {
        Some(path) => eprintln!("\nData directory: {}", path.trim()),
        None => {
            return fail(RebalError::ConfigMissing {
                section: "data".into(),
                key: "path".into(),
            });
        }
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path, asset: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = match build_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let assets = match resolve_assets(asset, &config) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    for c in universe::survey(&data_port, &assets) {
        match c.coverage {
            Coverage::Available { first, last, bars } => {
                println!("{}: {} bars, {} to {}", c.asset, bars, first, last);
            }
            Coverage::Missing => eprintln!("{}: no data found", c.asset),
            Coverage::Failed(reason) => eprintln!("error reading {}: {}", c.asset, reason),
        }
    }
    ExitCode::SUCCESS
}

/// `--asset` when given, else `[backtest] assets`, else every asset on disk.
pub fn resolve_assets(
    asset_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, RebalError> {
    if let Some(a) = asset_override {
        return Ok(vec![a.trim().to_uppercase()]);
    }
    match config.get_string("backtest", "assets") {
        Some(raw) => parse_assets(&raw).map_err(|e| invalid("backtest", "assets", e)),
        None => build_data_port(config)?.list_assets(),
    }
}

fn run_list_assets(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = match build_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let assets = match data_port.list_assets() {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    if assets.is_empty() {
        eprintln!("No assets found in {}", data_port.base_path().display());
    } else {
        for asset in &assets {
            println!("{}", asset);
        }
        eprintln!("{} assets found", assets.len());
    }
    ExitCode::SUCCESS
}

fn run_strategies() -> ExitCode {
    for info in strategies::available() {
        println!("{}", info.name);
        println!("    {}", info.description);
        for (param, default) in info.params {
            println!("    {} = {}", param, default);
        }
    }
    ExitCode::SUCCESS
}
