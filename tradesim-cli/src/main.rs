//! TradeSim CLI: Monte Carlo backtest batches from CSV bars.
//!
//! Commands:
//! - `run`: run a batch and write the JSON report
//! - `replay`: re-simulate one run of a batch from its index
//! - `config`: print the default configuration as TOML

mod bars;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use tradesim_core::strategy::{BuyAndHold, HoldStrategy, MaCrossover, Strategy};
use tradesim_runner::{BacktestConfig, BatchReport, MetricValue, MonteCarloSampler};

#[derive(Parser)]
#[command(
    name = "tradesim",
    about = "TradeSim CLI: Monte Carlo strategy backtesting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct BatchArgs {
    /// CSV file with timestamp,open,high,low,close,volume rows.
    #[arg(long)]
    bars: PathBuf,

    /// TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reference strategy: hold, buy-and-hold, ma-crossover.
    #[arg(long, default_value = "ma-crossover")]
    strategy: String,

    /// Fast SMA period (ma-crossover).
    #[arg(long, default_value_t = 10)]
    fast: usize,

    /// Slow SMA period (ma-crossover).
    #[arg(long, default_value_t = 50)]
    slow: usize,

    /// Override the config's run count.
    #[arg(long)]
    runs: Option<usize>,

    /// Override the config's base seed.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Monte Carlo batch and write the JSON report.
    Run {
        #[command(flatten)]
        batch: BatchArgs,

        /// Output path for the report JSON. Printed to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Re-simulate a single run of a batch from its index.
    Replay {
        #[command(flatten)]
        batch: BatchArgs,

        /// Run index within the batch.
        #[arg(long)]
        index: u64,
    },
    /// Print the default configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { batch, output } => run_batch_cmd(&batch, output.as_deref()),
        Commands::Replay { batch, index } => run_replay_cmd(&batch, index),
        Commands::Config => {
            print!("{}", BacktestConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn run_batch_cmd(args: &BatchArgs, output: Option<&Path>) -> Result<()> {
    let (sampler, strategy, series) = prepare(args)?;
    let report = sampler.run(&series, strategy.as_ref())?;

    let json = report.to_json_pretty()?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            print_summary(&report);
            info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_replay_cmd(args: &BatchArgs, index: u64) -> Result<()> {
    let (sampler, strategy, series) = prepare(args)?;
    let run = sampler.replay_run(&series, strategy.as_ref(), index)?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

fn prepare(
    args: &BatchArgs,
) -> Result<(MonteCarloSampler, Box<dyn Strategy>, tradesim_core::domain::BarSeries)> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => BacktestConfig::default(),
    };
    if let Some(runs) = args.runs {
        config.sampler.runs = runs;
    }
    if let Some(seed) = args.seed {
        config.sampler.base_seed = seed;
    }

    let strategy = build_strategy(&args.strategy, args.fast, args.slow)?;
    let series = bars::load_bars(&args.bars)?;
    let sampler = MonteCarloSampler::new(config)?;
    Ok((sampler, strategy, series))
}

fn load_config(path: &Path) -> Result<BacktestConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    BacktestConfig::from_toml_str(&content)
        .with_context(|| format!("invalid config {}", path.display()))
}

fn build_strategy(name: &str, fast: usize, slow: usize) -> Result<Box<dyn Strategy>> {
    Ok(match name {
        "hold" => Box::new(HoldStrategy),
        "buy-and-hold" | "buy_and_hold" => Box::new(BuyAndHold),
        "ma-crossover" | "ma_crossover" => Box::new(MaCrossover::new(fast, slow)?),
        _ => bail!("unknown strategy '{name}'. Valid: hold, buy-and-hold, ma-crossover"),
    })
}

fn format_metric(value: MetricValue, scale: f64, precision: usize) -> String {
    match value {
        MetricValue::Defined(v) => format!("{:.*}", precision, v * scale),
        MetricValue::Undefined => "n/a".to_string(),
    }
}

fn print_summary(report: &BatchReport) {
    let agg = &report.aggregate;
    let base = &report.baseline.metrics;
    println!();
    println!("=== Monte Carlo Batch ===");
    println!("Strategy:       {}", report.strategy);
    println!("Mode:           {}", report.mode);
    println!("Bars:           {}", report.bar_count);
    println!(
        "Runs:           {} ({} included, {} failed)",
        agg.runs_total, agg.runs_included, report.failures.count
    );
    println!("Fingerprint:    {}", &report.fingerprint[..16.min(report.fingerprint.len())]);
    println!();
    println!("--- Baseline ---");
    println!("Final Equity:   {:.2}", base.final_equity);
    println!("Total Return:   {:.2}%", base.total_return * 100.0);
    println!("Sharpe:         {}", format_metric(base.sharpe, 1.0, 3));
    println!("Max Drawdown:   {:.2}%", base.max_drawdown * 100.0);
    println!("Trades:         {}", base.trade_count);
    println!("Win Rate:       {}%", format_metric(base.win_rate, 100.0, 1));
    println!("Profit Factor:  {}", format_metric(base.profit_factor, 1.0, 2));
    println!();
    println!("--- Distribution ---");
    if let Some(dist) = &agg.final_equity {
        for band in &dist.percentiles {
            println!("Equity p{:<3}     {:.2}", band.p, band.value);
        }
    }
    if let Some(dist) = &agg.max_drawdown {
        for band in &dist.percentiles {
            println!("Drawdown p{:<3}   {:.2}%", band.p, band.value * 100.0);
        }
    }
    println!(
        "P(loss):        {}%",
        format_metric(agg.probability_of_loss, 100.0, 1)
    );
    println!("Mean Sharpe:    {}", format_metric(agg.mean_sharpe, 1.0, 3));
    for (kind, count) in &report.failures.by_kind {
        println!("WARNING: {count} run(s) ended with {kind}");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_bars(n: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        let start = chrono::NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        for i in 0..n {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let date = start + chrono::Duration::days(i as i64);
            writeln!(
                file,
                "{date},{close},{},{},{close},100000",
                close + 1.0,
                close - 1.0
            )
            .unwrap();
        }
        file
    }

    fn args(bars: &Path, config: Option<PathBuf>) -> BatchArgs {
        BatchArgs {
            bars: bars.to_path_buf(),
            config,
            strategy: "ma-crossover".into(),
            fast: 5,
            slow: 20,
            runs: Some(20),
            seed: None,
        }
    }

    #[test]
    fn unknown_strategy_rejected() {
        assert!(build_strategy("martingale", 5, 20).is_err());
        assert!(build_strategy("ma-crossover", 20, 5).is_err());
        assert_eq!(build_strategy("hold", 0, 0).unwrap().name(), "hold");
    }

    #[test]
    fn run_writes_report() {
        let bars = write_bars(200);
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("batch.toml");
        std::fs::write(
            &config_path,
            "[sampler]\nbase_seed = 9\n\n[sampler.mode]\nmode = \"price_bootstrap\"\nmethod = { type = \"iid\" }\n",
        )
        .unwrap();
        let output = dir.path().join("out/report.json");

        run_batch_cmd(&args(bars.path(), Some(config_path)), Some(&output)).unwrap();

        let report = BatchReport::from_json(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report.summaries.len(), 20);
        assert_eq!(report.config.sampler.base_seed, 9);
        assert_eq!(report.mode, "price_bootstrap");
    }

    #[test]
    fn invalid_config_is_reported() {
        let bars = write_bars(50);
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("bad.toml");
        std::fs::write(&config_path, "[engine]\ninitial_cash = -5.0\n").unwrap();
        assert!(prepare(&args(bars.path(), Some(config_path))).is_err());
    }

    #[test]
    fn replay_out_of_range_fails() {
        let bars = write_bars(200);
        assert!(run_replay_cmd(&args(bars.path(), None), 20).is_err());
    }

    #[test]
    fn default_config_prints_as_toml() {
        let text = BacktestConfig::default().to_toml_string().unwrap();
        assert!(text.contains("[sampler]"));
        assert_eq!(BacktestConfig::from_toml_str(&text).unwrap(), BacktestConfig::default());
    }
}
