//! Loading price and event data, plus a seeded synthetic generator.

use crate::error::{Result, WalkForwardError};
use crate::types::{EventCategory, ExternalEvent, PricePoint, Sentiment, Severity};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use csv::ReaderBuilder;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Raw price row with flexible column names.
#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(
        alias = "Date",
        alias = "DATE",
        alias = "Timestamp",
        alias = "timestamp",
        alias = "Time",
        alias = "time",
        alias = "datetime",
        alias = "Datetime"
    )]
    date: String,
    #[serde(alias = "Open", alias = "o")]
    open: f64,
    #[serde(alias = "High", alias = "h")]
    high: f64,
    #[serde(alias = "Low", alias = "l")]
    low: f64,
    #[serde(alias = "Close", alias = "c", alias = "Adj Close")]
    close: f64,
    #[serde(alias = "Volume", alias = "v", alias = "vol", alias = "Vol", default)]
    volume: f64,
}

/// Raw event row with flexible column names.
#[derive(Debug, Deserialize)]
struct EventRow {
    #[serde(
        alias = "Date",
        alias = "Timestamp",
        alias = "timestamp",
        alias = "datetime",
        alias = "data"
    )]
    date: String,
    #[serde(alias = "Category", alias = "categoria", alias = "type", default)]
    category: String,
    #[serde(alias = "Severity", alias = "severidade", alias = "impact", default)]
    severity: String,
    #[serde(alias = "Sentiment", alias = "sentimento", default)]
    sentiment: String,
}

/// CSV loading options.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Explicit timestamp format, tried before the built-in ones.
    pub date_format: Option<String>,
    pub has_headers: bool,
    /// Delimiter; auto-detected from the first lines when `None`.
    pub delimiter: Option<u8>,
    /// Skip invalid rows instead of failing.
    pub skip_invalid: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            date_format: None,
            has_headers: true,
            delimiter: None,
            skip_invalid: true,
        }
    }
}

/// Records loaded from a source, with counts of what was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    /// Rows that failed to parse or validate.
    pub skipped: usize,
    /// Rows dropped for repeating an earlier timestamp.
    pub duplicates: usize,
}

/// Pick the delimiter giving a consistent field count over the first lines.
fn detect_delimiter(path: &Path, min_fields: usize) -> Result<u8> {
    let reader = BufReader::new(File::open(path)?);
    let lines: Vec<String> = reader.lines().take(5).filter_map(|l| l.ok()).collect();
    if lines.is_empty() {
        return Ok(b',');
    }

    let mut best = (b',', 0usize);
    for delim in [b',', b'\t', b';', b'|'] {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| line.bytes().filter(|&b| b == delim).count() + 1)
            .collect();
        let consistent = counts.iter().all(|&c| c == counts[0]);
        if consistent && counts[0] >= min_fields && counts[0] > best.1 {
            best = (delim, counts[0]);
        }
    }
    debug!("Detected delimiter {:?} ({} fields)", best.0 as char, best.1);
    Ok(best.0)
}

/// Parse a timestamp: explicit format, common datetime and date formats,
/// then unix seconds.
pub fn parse_timestamp(s: &str, format: Option<&str>) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Some(fmt) = format {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let datetime_formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ];
    for fmt in &datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }

    let date_formats = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%b %d, %Y"];
    for fmt in &date_formats {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)));
        }
    }

    if let Ok(ts) = s.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(ts, 0) {
            return Ok(dt);
        }
    }

    Err(WalkForwardError::DataError(format!(
        "Could not parse timestamp: '{}'",
        s
    )))
}

/// Handle a bad row: count it when skipping, otherwise fail.
fn reject(config: &DataConfig, skipped: &mut usize, row: usize, err: WalkForwardError) -> Result<()> {
    if config.skip_invalid {
        debug!("Skipping row {}: {}", row, err);
        *skipped += 1;
        Ok(())
    } else {
        Err(err)
    }
}

/// Sort by timestamp and drop repeated timestamps, keeping the first.
fn finish<T>(
    mut records: Vec<T>,
    skipped: usize,
    key: impl Fn(&T) -> DateTime<Utc>,
    what: &str,
) -> Result<Loaded<T>> {
    if skipped > 0 {
        warn!("Skipped {} invalid {} rows", skipped, what);
    }
    records.sort_by_key(|r| key(r));
    let before = records.len();
    records.dedup_by_key(|r| key(r));
    let duplicates = before - records.len();
    if duplicates > 0 {
        warn!("Removed {} duplicate {} timestamps", duplicates, what);
    }
    Ok(Loaded {
        records,
        skipped,
        duplicates,
    })
}

/// Read prices from any CSV source.
pub fn read_prices<R: Read>(source: R, delimiter: u8, config: &DataConfig) -> Result<Loaded<PricePoint>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(config.has_headers)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let mut prices = Vec::new();
    let mut skipped = 0;

    for (i, result) in reader.deserialize::<PriceRow>().enumerate() {
        let row_num = i + 1;
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                reject(config, &mut skipped, row_num, e.into())?;
                continue;
            }
        };
        let timestamp = match parse_timestamp(&row.date, config.date_format.as_deref()) {
            Ok(ts) => ts,
            Err(e) => {
                reject(config, &mut skipped, row_num, e)?;
                continue;
            }
        };
        let point = PricePoint::new(timestamp, row.open, row.high, row.low, row.close, row.volume);
        if !point.validate() {
            let err = WalkForwardError::DataError(format!(
                "Invalid OHLCV at row {}: {:?}",
                row_num, point
            ));
            reject(config, &mut skipped, row_num, err)?;
            continue;
        }
        prices.push(point);
    }

    finish(prices, skipped, |p| p.timestamp, "price")
}

/// Load an OHLCV CSV file, sorted and de-duplicated by timestamp.
///
/// An empty result is an error.
pub fn load_prices_csv(path: impl AsRef<Path>, config: &DataConfig) -> Result<Vec<PricePoint>> {
    let path = path.as_ref();
    info!("Loading prices from: {}", path.display());

    let delimiter = match config.delimiter {
        Some(d) => d,
        None => detect_delimiter(path, 5)?,
    };
    let loaded = read_prices(File::open(path)?, delimiter, config)?;
    if loaded.records.is_empty() {
        return Err(WalkForwardError::DataError(format!(
            "No valid price rows in {}",
            path.display()
        )));
    }

    info!(
        "Loaded {} prices from {} to {}",
        loaded.records.len(),
        loaded.records[0].timestamp,
        loaded.records[loaded.records.len() - 1].timestamp
    );
    Ok(loaded.records)
}

/// Read events from any CSV source.
pub fn read_events<R: Read>(source: R, delimiter: u8, config: &DataConfig) -> Result<Loaded<ExternalEvent>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(config.has_headers)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let mut events = Vec::new();
    let mut skipped = 0;

    for (i, result) in reader.deserialize::<EventRow>().enumerate() {
        let row_num = i + 1;
        let parsed = result
            .map_err(WalkForwardError::from)
            .and_then(|row| {
                Ok(ExternalEvent::new(
                    parse_timestamp(&row.date, config.date_format.as_deref())?,
                    row.category.parse::<EventCategory>()?,
                    if row.severity.trim().is_empty() {
                        Severity::Medium
                    } else {
                        row.severity.parse::<Severity>()?
                    },
                    row.sentiment.parse::<Sentiment>()?,
                ))
            });
        match parsed {
            Ok(event) => events.push(event),
            Err(e) => reject(config, &mut skipped, row_num, e)?,
        }
    }

    // Several events may share a timestamp; only sort.
    if skipped > 0 {
        warn!("Skipped {} invalid event rows", skipped);
    }
    events.sort_by_key(|e| e.timestamp);
    Ok(Loaded {
        records: events,
        skipped,
        duplicates: 0,
    })
}

/// Load an event CSV file (timestamp, category, severity, sentiment).
pub fn load_events_csv(path: impl AsRef<Path>, config: &DataConfig) -> Result<Vec<ExternalEvent>> {
    let path = path.as_ref();
    info!("Loading events from: {}", path.display());

    let delimiter = match config.delimiter {
        Some(d) => d,
        None => detect_delimiter(path, 2)?,
    };
    let loaded = read_events(File::open(path)?, delimiter, config)?;
    info!("Loaded {} events", loaded.records.len());
    Ok(loaded.records)
}

/// Standard normal draw (Box-Muller).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Generate `n` daily prices as a geometric random walk.
///
/// Each close is the previous one times `exp(drift + volatility * z)`, so
/// prices stay positive. The same seed always produces the same series.
pub fn random_walk(n: usize, start_price: f64, drift: f64, volatility: f64, seed: u64) -> Vec<PricePoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    // 2020-01-01T00:00:00Z
    let start = DateTime::<Utc>::from_timestamp(1_577_836_800, 0).unwrap_or_default();

    let mut prices = Vec::with_capacity(n);
    let mut prev_close = start_price;
    for i in 0..n {
        let open = prev_close;
        let close = prev_close * (drift + volatility * standard_normal(&mut rng)).exp();
        let wick_up: f64 = rng.gen_range(0.0..0.5) * volatility;
        let wick_down: f64 = rng.gen_range(0.0..0.5) * volatility;
        let high = open.max(close) * (1.0 + wick_up);
        let low = open.min(close) * (1.0 - wick_down);
        let volume = 1_000.0 * (1.0 + rng.gen_range(0.0..1.0));

        prices.push(PricePoint::new(
            start + Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume,
        ));
        prev_close = close;
    }
    prices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::is_chronological;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_timestamp_formats() {
        let day = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-15", None).unwrap(), day);
        assert_eq!(parse_timestamp("2024/01/15", None).unwrap(), day);
        assert_eq!(parse_timestamp("2024-01-15T00:00:00Z", None).unwrap(), day);
        assert_eq!(parse_timestamp("1705276800", None).unwrap(), day);
        assert_eq!(
            parse_timestamp("15.01.2024", Some("%d.%m.%Y")).unwrap(),
            day
        );
        assert!(parse_timestamp("not a date", None).is_err());
    }

    #[test]
    fn test_read_prices_sorts_dedups_and_skips() {
        let csv = "Date,Open,High,Low,Close,Volume\n\
                   2024-01-03,102,104,101,103,900\n\
                   2024-01-01,100,102,99,101,1000\n\
                   2024-01-02,101,103,100,102,1100\n\
                   2024-01-02,101,103,100,102,1100\n\
                   garbage,1,1,1,1,1\n\
                   2024-01-04,105,104,101,103,900\n";
        let loaded = read_prices(csv.as_bytes(), b',', &DataConfig::default()).unwrap();
        assert_eq!(loaded.records.len(), 3);
        assert_eq!(loaded.skipped, 2);
        assert_eq!(loaded.duplicates, 1);
        assert!(is_chronological(&loaded.records));
        assert_eq!(loaded.records[0].close, 101.0);
    }

    #[test]
    fn test_strict_mode_fails_on_bad_row() {
        let csv = "date,open,high,low,close,volume\nnope,1,1,1,1,1\n";
        let config = DataConfig {
            skip_invalid: false,
            ..Default::default()
        };
        assert!(read_prices(csv.as_bytes(), b',', &config).is_err());
    }

    #[test]
    fn test_load_prices_file_with_semicolons() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp;open;high;low;close;volume").unwrap();
        writeln!(file, "2024-01-01;100;102;99;101;1000").unwrap();
        writeln!(file, "2024-01-02;101;103;100;102;1100").unwrap();
        file.flush().unwrap();

        let prices = load_prices_csv(file.path(), &DataConfig::default()).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[1].volume, 1100.0);
    }

    #[test]
    fn test_empty_price_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "date,open,high,low,close,volume").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            load_prices_csv(file.path(), &DataConfig::default()),
            Err(WalkForwardError::DataError(_))
        ));
    }

    #[test]
    fn test_read_events() {
        let csv = "date,category,severity,sentiment\n\
                   2024-01-05,economic,high,negative\n\
                   2024-01-02,innovation,low,positive\n\
                   2024-01-05,political,,neutral\n\
                   2024-01-06,weather,low,positive\n";
        let loaded = read_events(csv.as_bytes(), b',', &DataConfig::default()).unwrap();
        assert_eq!(loaded.records.len(), 3);
        assert_eq!(loaded.skipped, 1);
        assert_eq!(loaded.records[0].category, EventCategory::Innovation);
        assert_eq!(loaded.records[2].severity, Severity::Medium);
    }

    #[test]
    fn test_random_walk_is_seeded_and_valid() {
        let a = random_walk(200, 100.0, 0.001, 0.02, 42);
        let b = random_walk(200, 100.0, 0.001, 0.02, 42);
        let c = random_walk(200, 100.0, 0.001, 0.02, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(is_chronological(&a));
        assert!(a.iter().all(|p| p.validate()));
        for pair in a.windows(2) {
            assert_eq!(pair[1].open, pair[0].close);
        }
    }
}
