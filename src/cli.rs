//! Command-line interface for the walk-forward engine.

use cryptowalk::analytics::{PerformanceReport, ResultFormatter};
use cryptowalk::backtest::{backtest_holdout, backtest_walk_forward};
use cryptowalk::config::EngineFileConfig;
use cryptowalk::data::{load_events_csv, load_prices_csv, random_walk, DataConfig};
use cryptowalk::error::{Result, WalkForwardError};
use cryptowalk::export::{
    write_dataset_csv, write_folds_csv, write_json, write_portfolio_csv, write_predictions_csv,
    write_prices_csv, ExportConfig, RunReport,
};
use cryptowalk::features::{create_target, Dataset, FeatureEngine};
use cryptowalk::metadata::RunMetadata;
use cryptowalk::model::{ModelComparator, TrainerKind};
use cryptowalk::types::{ExternalEvent, PricePoint, TargetKind};
use cryptowalk::walkforward::WalkForwardAnalyzer;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// cryptowalk - walk-forward validation and strategy backtesting for crypto
/// price models.
#[derive(Parser)]
#[command(name = "cryptowalk")]
#[command(version)]
#[command(about = "Walk-forward validation and strategy backtesting for crypto price models")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the labeled feature dataset and write it as CSV
    Features {
        #[command(flatten)]
        run: RunArgs,

        /// Output CSV path
        #[arg(long, default_value = "features.csv")]
        out: PathBuf,
    },

    /// Show the chronological train/validation/test split
    Split {
        #[command(flatten)]
        run: RunArgs,

        /// Fraction of rows held out for testing
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Fraction of the remaining rows used for validation
        #[arg(long)]
        validation_fraction: Option<f64>,
    },

    /// Run walk-forward validation and simulate the out-of-sample stream
    WalkForward {
        #[command(flatten)]
        run: RunArgs,

        /// Rows per training window
        #[arg(long)]
        train_window: Option<usize>,

        /// Rows per test window
        #[arg(long)]
        test_window: Option<usize>,

        /// Rows between retrains
        #[arg(long)]
        retrain_frequency: Option<usize>,

        /// Train folds on all cores
        #[arg(long)]
        parallel: bool,

        /// Show a progress bar over folds
        #[arg(long)]
        progress: bool,

        /// Directory for predictions, folds, portfolio and report files
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },

    /// Train once on train+validation and backtest the test partition
    Backtest {
        #[command(flatten)]
        run: RunArgs,

        /// Directory for portfolio and report files
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },

    /// Train every built-in model on the same split and rank them
    Compare {
        #[command(flatten)]
        run: RunArgs,

        /// Ranking metric (mae, rmse, mape, r2, direction, accuracy, f1)
        #[arg(long)]
        rank_by: Option<String>,
    },

    /// Validate a price file
    Validate {
        /// Path to price CSV
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Write a seeded synthetic price series
    Generate {
        /// Output CSV path
        #[arg(long, default_value = "synthetic.csv")]
        out: PathBuf,

        /// Number of daily rows
        #[arg(long, default_value = "730")]
        days: usize,

        #[arg(long, default_value = "30000")]
        start_price: f64,

        /// Mean log return per day
        #[arg(long, default_value = "0.001")]
        drift: f64,

        /// Daily log-return volatility
        #[arg(long, default_value = "0.03")]
        volatility: f64,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(long, default_value = "cryptowalk.toml")]
        out: PathBuf,
    },
}

/// Inputs shared by the dataset-building commands. Flags override the
/// configuration file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to price CSV
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Path to event CSV
    #[arg(short, long)]
    pub events: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Feature preset
    #[arg(long, value_enum)]
    pub preset: Option<PresetArg>,

    /// Prediction target
    #[arg(long, value_enum)]
    pub target: Option<TargetArg>,

    /// Prediction horizon in rows
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Model family
    #[arg(short, long, value_enum)]
    pub model: Option<ModelArg>,

    /// Regularization strength
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Position rule
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Cost per unit of position change (0.001 = 0.1%)
    #[arg(long)]
    pub cost: Option<f64>,

    /// Initial capital
    #[arg(long)]
    pub capital: Option<f64>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
    Default,
    Minimal,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum TargetArg {
    Regression,
    Classification,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    Mean,
    Ridge,
    Logistic,
    Ensemble,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    LongShort,
    LongOnly,
    Continuous,
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("warning: a tracing subscriber was already installed");
        }
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Features { run, out } => {
            let (config, _) = resolve(run)?;
            let input = prepare(&config)?;
            write_dataset_csv(&input.dataset, out, &ExportConfig::default())?;
            println!(
                "Wrote {} rows x {} features ({}) to {}",
                input.dataset.len(),
                input.dataset.n_features(),
                input.dataset.target_name,
                out.display()
            );
            Ok(())
        }

        Commands::Split {
            run,
            test_fraction,
            validation_fraction,
        } => {
            let (mut config, _) = resolve(run)?;
            if let Some(t) = test_fraction {
                config.split.test_fraction = *t;
            }
            if let Some(v) = validation_fraction {
                config.split.validation_fraction = *v;
            }
            show_split(&config, cli.output)
        }

        Commands::WalkForward {
            run,
            train_window,
            test_window,
            retrain_frequency,
            parallel,
            progress,
            export_dir,
        } => {
            let (mut config, _) = resolve(run)?;
            if let Some(w) = train_window {
                config.walkforward.train_window = *w;
            }
            if let Some(w) = test_window {
                config.walkforward.test_window = *w;
            }
            if let Some(r) = retrain_frequency {
                config.walkforward.retrain_frequency = *r;
            }
            config.walkforward.parallel |= *parallel;
            run_walk_forward(&config, *progress, export_dir.as_deref(), cli.output)
        }

        Commands::Backtest { run, export_dir } => {
            let (config, _) = resolve(run)?;
            run_holdout(&config, export_dir.as_deref(), cli.output)
        }

        Commands::Compare { run, rank_by } => {
            let (mut config, _) = resolve(run)?;
            if let Some(r) = rank_by {
                config.model.rank_by = r.clone();
            }
            run_comparison(&config, cli.output)
        }

        Commands::Validate { data } => validate_data(data),

        Commands::Generate {
            out,
            days,
            start_price,
            drift,
            volatility,
            seed,
        } => {
            let prices = random_walk(*days, *start_price, *drift, *volatility, *seed);
            write_prices_csv(&prices, out)?;
            println!("Wrote {} synthetic rows to {}", prices.len(), out.display());
            Ok(())
        }

        Commands::Init { out } => init_config(out),
    }
}

/// Merge the configuration file (if any) with command-line overrides.
fn resolve(args: &RunArgs) -> Result<(EngineFileConfig, Option<PathBuf>)> {
    let mut config = match &args.config {
        Some(path) => EngineFileConfig::load(path)?,
        None => EngineFileConfig::default(),
    };

    if let Some(data) = &args.data {
        config.data.prices = Some(data.display().to_string());
    }
    if let Some(events) = &args.events {
        config.data.events = Some(events.display().to_string());
    }
    if let Some(preset) = args.preset {
        config.features.preset = match preset {
            PresetArg::Default => "default",
            PresetArg::Minimal => "minimal",
        }
        .to_string();
    }
    if let Some(target) = args.target {
        config.target.kind = match target {
            TargetArg::Regression => TargetKind::Regression,
            TargetArg::Classification => TargetKind::Classification,
        };
    }
    if let Some(h) = args.horizon {
        config.target.horizon = h;
    }
    if let Some(model) = args.model {
        config.model.trainer = match model {
            ModelArg::Mean => TrainerKind::Mean,
            ModelArg::Ridge => TrainerKind::Ridge,
            ModelArg::Logistic => TrainerKind::Logistic,
            ModelArg::Ensemble => TrainerKind::Ensemble,
        }
        .to_string();
    }
    if let Some(alpha) = args.alpha {
        config.model.alpha = alpha;
    }
    if let Some(strategy) = args.strategy {
        config.backtest.strategy = match strategy {
            StrategyArg::LongShort => "long_short",
            StrategyArg::LongOnly => "long_only",
            StrategyArg::Continuous => "continuous",
        }
        .to_string();
    }
    if let Some(cost) = args.cost {
        config.backtest.transaction_cost = cost;
    }
    if let Some(capital) = args.capital {
        config.backtest.initial_capital = capital;
    }

    let data_path = config.data.prices.as_ref().map(PathBuf::from);
    Ok((config, data_path))
}

/// Loaded inputs and the labeled dataset built from them.
struct PreparedInput {
    prices: Vec<PricePoint>,
    dataset: Dataset,
    data_path: PathBuf,
}

fn prepare(config: &EngineFileConfig) -> Result<PreparedInput> {
    let data_path = config
        .data
        .prices
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| WalkForwardError::config("No price file given (use --data or [data] prices)"))?;

    let data_config = DataConfig {
        date_format: config.data.date_format.clone(),
        ..Default::default()
    };
    let prices = load_prices_csv(&data_path, &data_config)?;
    let events: Option<Vec<ExternalEvent>> = match &config.data.events {
        Some(path) => Some(load_events_csv(path, &data_config)?),
        None => None,
    };

    let engine = FeatureEngine::new(config.feature_config()?);
    let horizon = config.horizon()?;
    let rows = engine.create_features(&prices, events.as_deref())?;
    if rows.len() <= horizon {
        return Err(WalkForwardError::InsufficientData {
            required: engine.warmup_period() + horizon + 1,
            available: prices.len(),
        });
    }
    let dataset = create_target(&rows, horizon, config.target_kind())?;
    info!(
        "Dataset: {} rows, {} features, target {}",
        dataset.len(),
        dataset.n_features(),
        dataset.target_name
    );

    Ok(PreparedInput {
        prices,
        dataset,
        data_path,
    })
}

fn show_split(config: &EngineFileConfig, output: OutputFormat) -> Result<()> {
    let input = prepare(config)?;
    let splitter = config.splitter()?;
    let split = splitter.split_indices(input.dataset.len())?;
    let ts = &input.dataset.timestamps;

    let parts = [
        ("train", split.train.clone()),
        ("validation", split.validation.clone()),
        ("test", split.test.clone()),
    ];

    match output {
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(&split)),
        OutputFormat::Csv => {
            println!("partition,start_row,end_row,rows");
            for (name, range) in &parts {
                println!("{},{},{},{}", name, range.start, range.end, range.len());
            }
        }
        OutputFormat::Text => {
            println!("Data Split ({} rows):", input.dataset.len());
            for (name, range) in &parts {
                if range.is_empty() {
                    println!("  {:<11} 0 rows", name);
                    continue;
                }
                println!(
                    "  {:<11} {:>5} rows  {} to {}",
                    name,
                    range.len(),
                    ts[range.start].format("%Y-%m-%d"),
                    ts[range.end - 1].format("%Y-%m-%d")
                );
            }
        }
    }
    Ok(())
}

fn run_walk_forward(
    config: &EngineFileConfig,
    progress: bool,
    export_dir: Option<&Path>,
    output: OutputFormat,
) -> Result<()> {
    let input = prepare(config)?;
    let trainer = config.trainer()?;
    let wf_config = config.walk_forward_config()?.with_progress(progress);
    let backtest_config = config.backtest_config()?;

    let result = WalkForwardAnalyzer::new(wf_config).run(&input.dataset, trainer.as_ref())?;
    let state = backtest_walk_forward(&result, &backtest_config)?;
    let report = PerformanceReport::from_walk_forward(&result, &state);

    let metadata = RunMetadata::new("walk-forward", config)
        .with_prices(&input.prices)
        .with_data_file(&input.data_path);
    let run_report = RunReport::new(metadata, report.clone()).with_walk_forward(&result);

    if let Some(dir) = export_dir {
        fs::create_dir_all(dir)?;
        write_predictions_csv(&result, dir.join("predictions.csv"))?;
        write_folds_csv(&result.folds, dir.join("folds.csv"))?;
        write_portfolio_csv(&state, dir.join("portfolio.csv"), &ExportConfig::default())?;
        write_json(&run_report, dir.join("report.json"))?;
        info!("Exported results to {}", dir.display());
    }

    match output {
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(&run_report)),
        OutputFormat::Csv => {
            println!("{}", ResultFormatter::csv_header());
            if let Some(report) = &report {
                println!("{}", ResultFormatter::to_csv_line(report));
            }
        }
        OutputFormat::Text => {
            ResultFormatter::print_folds(&result);
            match &report {
                Some(report) => ResultFormatter::print_report(report),
                None => println!("No out-of-sample predictions: nothing to simulate."),
            }
        }
    }
    Ok(())
}

fn run_holdout(config: &EngineFileConfig, export_dir: Option<&Path>, output: OutputFormat) -> Result<()> {
    let input = prepare(config)?;
    let trainer = config.trainer()?;
    let backtest_config = config.backtest_config()?;

    let holdout = backtest_holdout(
        &input.dataset,
        &config.splitter()?,
        trainer.as_ref(),
        &backtest_config,
    )?;
    let report = PerformanceReport::compute(&holdout.state, Some(&holdout.actuals));

    let metadata = RunMetadata::new("backtest", config)
        .with_prices(&input.prices)
        .with_data_file(&input.data_path);
    let run_report = RunReport::new(metadata, report.clone());

    if let Some(dir) = export_dir {
        fs::create_dir_all(dir)?;
        write_portfolio_csv(&holdout.state, dir.join("portfolio.csv"), &ExportConfig::default())?;
        write_json(&run_report, dir.join("report.json"))?;
    }

    match output {
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(&run_report)),
        OutputFormat::Csv => {
            println!("{}", ResultFormatter::csv_header());
            if let Some(report) = &report {
                println!("{}", ResultFormatter::to_csv_line(report));
            }
        }
        OutputFormat::Text => {
            println!(
                "Holdout: {} trained on {} rows, tested on {}",
                holdout.trainer, holdout.train_rows, holdout.test_rows
            );
            match &report {
                Some(report) => ResultFormatter::print_report(report),
                None => println!("Empty test partition: nothing to simulate."),
            }
        }
    }
    Ok(())
}

fn run_comparison(config: &EngineFileConfig, output: OutputFormat) -> Result<()> {
    let input = prepare(config)?;
    let target = config.target_kind();
    let split = config.splitter()?.split_indices(input.dataset.len())?;
    let rank_by = config.rank_metric()?;

    let mut comparator = ModelComparator::new();
    for kind in TrainerKind::ALL.iter().filter(|k| k.supports(target)) {
        comparator.add(kind.build(target, config.model.alpha));
    }

    let report = comparator.compare(
        &input.dataset,
        split.train_and_validation(),
        split.test,
        rank_by,
    )?;

    match output {
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(&report)),
        OutputFormat::Csv => {
            println!("rank,model,mae,rmse,mape,r2,directional_accuracy,fit_seconds");
            for (i, s) in report.scores.iter().enumerate() {
                println!(
                    "{},{},{:.8},{:.8},{:.4},{:.4},{:.4},{:.4}",
                    i + 1,
                    s.name,
                    s.regression.mae,
                    s.regression.rmse,
                    s.regression.mape,
                    s.regression.r2,
                    s.regression.directional_accuracy,
                    s.fit_seconds
                );
            }
        }
        OutputFormat::Text => ResultFormatter::print_comparison(&report),
    }
    Ok(())
}

fn init_config(output: &Path) -> Result<()> {
    fs::write(output, EngineFileConfig::example())?;
    println!("Created example configuration file: {}", output.display());
    println!("\nEdit this file, then run:");
    println!("  cryptowalk walk-forward -c {}", output.display());
    Ok(())
}

fn validate_data(data_path: &Path) -> Result<()> {
    println!("Validating data file: {}", data_path.display());

    let prices = load_prices_csv(data_path, &DataConfig::default())?;

    println!("\nData Summary:");
    println!("  Rows: {}", prices.len());
    if let (Some(first), Some(last)) = (prices.first(), prices.last()) {
        println!("  Start: {}", first.timestamp);
        println!("  End: {}", last.timestamp);

        let closes: Vec<f64> = prices.iter().map(|p| p.close).collect();
        let min_price = closes.iter().fold(f64::INFINITY, |a: f64, &b| a.min(b));
        let max_price = closes.iter().fold(f64::NEG_INFINITY, |a: f64, &b| a.max(b));
        let avg_price: f64 = closes.iter().sum::<f64>() / closes.len() as f64;
        println!("  Price Range: {:.2} - {:.2}", min_price, max_price);
        println!("  Average Price: {:.2}", avg_price);

        let default_warmup = FeatureEngine::default().warmup_period();
        if prices.len() <= default_warmup + 1 {
            println!(
                "  Note: fewer than {} rows; use --preset minimal for features",
                default_warmup + 2
            );
        }
    }

    println!("\nValidation: PASSED");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_walk_forward() {
        let cli = Cli::try_parse_from([
            "cryptowalk",
            "walk-forward",
            "-d",
            "btc.csv",
            "--model",
            "ridge",
            "--train-window",
            "120",
            "--strategy",
            "long-only",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::WalkForward {
                run, train_window, ..
            } => {
                assert_eq!(train_window, Some(120));
                let (config, path) = resolve(&run).unwrap();
                assert_eq!(path, Some(PathBuf::from("btc.csv")));
                assert_eq!(config.backtest.strategy, "long_only");
                assert_eq!(config.model.trainer, "ridge");
                assert!(config.backtest_config().is_ok());
            }
            _ => panic!("expected walk-forward"),
        }
    }

    #[test]
    fn test_cli_parse_other_commands() {
        assert!(Cli::try_parse_from(["cryptowalk", "generate", "--days", "400"]).is_ok());
        assert!(Cli::try_parse_from(["cryptowalk", "init"]).is_ok());
        assert!(Cli::try_parse_from(["cryptowalk", "compare", "-d", "x.csv", "--rank-by", "rmse"]).is_ok());
        assert!(Cli::try_parse_from(["cryptowalk", "walk-forward", "--model", "svm"]).is_err());
    }

    #[test]
    fn test_prepare_requires_data() {
        let (config, _) = resolve(&RunArgs::default()).unwrap();
        assert!(matches!(prepare(&config), Err(WalkForwardError::ConfigError(_))));
    }
}
