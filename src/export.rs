//! Export utilities for datasets and run results.
//!
//! | Output | Format |
//! |--------|--------|
//! | Labeled dataset | CSV |
//! | Price series | CSV |
//! | Portfolio series | CSV |
//! | Fold diagnostics, predictions | CSV |
//! | Full run report | JSON |

use crate::analytics::PerformanceReport;
use crate::backtest::PortfolioState;
use crate::error::Result;
use crate::features::Dataset;
use crate::metadata::RunMetadata;
use crate::types::PricePoint;
use crate::walkforward::{FoldDiagnostics, SkippedWindow, WalkForwardResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Configuration for CSV exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Timestamp format.
    pub date_format: String,
    /// Decimal precision for numeric values.
    pub precision: usize,
    pub include_headers: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
            precision: 6,
            include_headers: true,
        }
    }
}

/// Write a labeled dataset: timestamp, close, every feature, then the target.
pub fn write_dataset_csv(dataset: &Dataset, path: impl AsRef<Path>, config: &ExportConfig) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);

    if config.include_headers {
        writeln!(
            writer,
            "timestamp,close,{},{}",
            dataset.feature_names.join(","),
            dataset.target_name
        )?;
    }

    let prec = config.precision;
    for i in 0..dataset.len() {
        write!(
            writer,
            "{},{:.prec$}",
            dataset.timestamps[i].format(&config.date_format),
            dataset.closes[i]
        )?;
        for value in &dataset.features[i] {
            write!(writer, ",{:.prec$}", value)?;
        }
        writeln!(writer, ",{:.prec$}", dataset.targets[i])?;
    }
    writer.flush()?;

    info!(
        "Wrote {} rows x {} features to {}",
        dataset.len(),
        dataset.n_features(),
        path.as_ref().display()
    );
    Ok(())
}

/// Write prices in the layout `load_prices_csv` reads.
pub fn write_prices_csv(prices: &[PricePoint], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "timestamp,open,high,low,close,volume")?;
    for p in prices {
        writeln!(
            writer,
            "{},{:.6},{:.6},{:.6},{:.6},{:.2}",
            p.timestamp.format("%Y-%m-%d %H:%M:%S"),
            p.open,
            p.high,
            p.low,
            p.close,
            p.volume
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the per-period portfolio series.
pub fn write_portfolio_csv(state: &PortfolioState, path: impl AsRef<Path>, config: &ExportConfig) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    if config.include_headers {
        writeln!(
            writer,
            "timestamp,price,prediction,position,price_return,gross_return,transaction_cost,net_return,cumulative_strategy,cumulative_buy_hold,portfolio_value,buy_hold_value"
        )?;
    }

    let prec = config.precision;
    for p in state.points() {
        writeln!(
            writer,
            "{},{:.prec$},{:.prec$},{:.prec$},{:.prec$},{:.prec$},{:.prec$},{:.prec$},{:.prec$},{:.prec$},{:.2},{:.2}",
            p.timestamp.format(&config.date_format),
            p.price,
            p.prediction,
            p.position,
            p.price_return,
            p.gross_return,
            p.transaction_cost,
            p.net_return,
            p.cumulative_strategy,
            p.cumulative_buy_hold,
            p.portfolio_value,
            p.buy_hold_value,
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write per-fold diagnostics.
pub fn write_folds_csv(folds: &[FoldDiagnostics], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    writeln!(
        writer,
        "fold,train_start,train_end,test_start,test_end,train_rows,test_rows,mae,rmse,directional_accuracy"
    )?;
    for f in folds {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{:.8},{:.8},{:.4}",
            f.fold,
            f.train_start.format("%Y-%m-%d"),
            f.train_end.format("%Y-%m-%d"),
            f.test_start.format("%Y-%m-%d"),
            f.test_end.format("%Y-%m-%d"),
            f.train_rows,
            f.test_rows,
            f.mae,
            f.rmse,
            f.directional_accuracy
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the stitched out-of-sample prediction stream.
pub fn write_predictions_csv(result: &WalkForwardResult, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    writeln!(writer, "timestamp,fold,price,actual,predicted")?;
    for p in &result.predictions {
        writeln!(
            writer,
            "{},{},{:.6},{:.8},{:.8}",
            p.timestamp.format("%Y-%m-%d %H:%M:%S"),
            p.fold,
            p.price,
            p.actual,
            p.predicted
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Everything a run produced, for JSON export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    /// `None` when there was nothing to simulate.
    pub performance: Option<PerformanceReport>,
    pub folds: Vec<FoldDiagnostics>,
    pub skipped: Vec<SkippedWindow>,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn new(metadata: RunMetadata, performance: Option<PerformanceReport>) -> Self {
        Self {
            metadata,
            performance,
            folds: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_walk_forward(mut self, result: &WalkForwardResult) -> Self {
        self.folds = result.folds.clone();
        self.skipped = result.skipped.clone();
        self.warnings = result.stability_warnings();
        self
    }
}

/// Write any serializable value as pretty JSON.
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}
