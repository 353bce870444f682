//! Core data types for the walk-forward engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WalkForwardError;

/// OHLCV record for a single period of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PricePoint {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate that the OHLCV values are consistent.
    pub fn validate(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite());

        finite
            && self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }

    /// Typical price (HLC average).
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// High-low range.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Check that a price series is strictly increasing in time.
pub fn is_chronological(prices: &[PricePoint]) -> bool {
    prices.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}

/// Category of an external event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Economic,
    Political,
    Innovation,
    Other,
}

impl FromStr for EventCategory {
    type Err = WalkForwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "economic" | "econômico" | "economico" => Ok(EventCategory::Economic),
            "political" | "político" | "politico" => Ok(EventCategory::Political),
            "innovation" | "inovação" | "inovacao" => Ok(EventCategory::Innovation),
            "" | "other" | "outro" => Ok(EventCategory::Other),
            other => Err(WalkForwardError::DataError(format!(
                "Unknown event category: '{}'",
                other
            ))),
        }
    }
}

/// Severity of an external event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl FromStr for Severity {
    type Err = WalkForwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "baixo" => Ok(Severity::Low),
            "medium" | "médio" | "medio" => Ok(Severity::Medium),
            "high" | "alto" => Ok(Severity::High),
            other => Err(WalkForwardError::DataError(format!(
                "Unknown event severity: '{}'",
                other
            ))),
        }
    }
}

/// Sentiment attached to an external event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Numeric score: +1, 0 or -1.
    pub fn score(&self) -> f64 {
        match self {
            Sentiment::Positive => 1.0,
            Sentiment::Neutral => 0.0,
            Sentiment::Negative => -1.0,
        }
    }
}

impl FromStr for Sentiment {
    type Err = WalkForwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "positivo" | "1" | "+1" => Ok(Sentiment::Positive),
            "neutral" | "neutro" | "0" | "" => Ok(Sentiment::Neutral),
            "negative" | "negativo" | "-1" => Ok(Sentiment::Negative),
            other => Err(WalkForwardError::DataError(format!(
                "Unknown event sentiment: '{}'",
                other
            ))),
        }
    }
}

/// An externally supplied event (news, macro, geopolitical).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    pub severity: Severity,
    pub sentiment: Sentiment,
}

impl ExternalEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        category: EventCategory,
        severity: Severity,
        sentiment: Sentiment,
    ) -> Self {
        Self {
            timestamp,
            category,
            severity,
            sentiment,
        }
    }
}

/// Kind of prediction target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Percent change of close over the horizon.
    #[default]
    Regression,
    /// 1.0 when the future return is positive, else 0.0.
    Classification,
}

impl TargetKind {
    /// Column name of the target for a horizon.
    pub fn column_name(&self, horizon: usize) -> String {
        match self {
            TargetKind::Regression => format!("target_return_{}", horizon),
            TargetKind::Classification => format!("target_direction_{}", horizon),
        }
    }
}

impl FromStr for TargetKind {
    type Err = WalkForwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "regression" | "return" => Ok(TargetKind::Regression),
            "classification" | "direction" => Ok(TargetKind::Classification),
            other => Err(WalkForwardError::config(format!(
                "Unknown target kind: '{}'",
                other
            ))),
        }
    }
}

/// Rule converting a prediction into a position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStrategy {
    /// +1 when the prediction is positive, otherwise -1.
    #[default]
    LongShort,
    /// +1 when the prediction is positive, otherwise flat.
    LongOnly,
    /// Prediction times `scale`, clamped to [-1, 1].
    Continuous { scale: f64 },
}

impl PositionStrategy {
    /// Position implied by a single prediction.
    pub fn position(&self, prediction: f64) -> f64 {
        match *self {
            PositionStrategy::LongShort => {
                if prediction > 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            PositionStrategy::LongOnly => {
                if prediction > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            PositionStrategy::Continuous { scale } => {
                let p = prediction * scale;
                if p.is_finite() {
                    p.clamp(-1.0, 1.0)
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for PositionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStrategy::LongShort => write!(f, "long_short"),
            PositionStrategy::LongOnly => write!(f, "long_only"),
            PositionStrategy::Continuous { scale } => write!(f, "continuous(x{})", scale),
        }
    }
}

impl FromStr for PositionStrategy {
    type Err = WalkForwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "long_short" => Ok(PositionStrategy::LongShort),
            "long_only" => Ok(PositionStrategy::LongOnly),
            "continuous" => Ok(PositionStrategy::Continuous { scale: 1.0 }),
            other => Err(WalkForwardError::config(format!(
                "Unknown strategy: '{}' (expected long_short, long_only or continuous)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_price_point_validation() {
        let ok = PricePoint::new(ts(1), 100.0, 105.0, 98.0, 103.0, 1_000.0);
        assert!(ok.validate());

        let high_below_close = PricePoint::new(ts(1), 100.0, 101.0, 98.0, 103.0, 1_000.0);
        assert!(!high_below_close.validate());

        let negative_volume = PricePoint::new(ts(1), 100.0, 105.0, 98.0, 103.0, -1.0);
        assert!(!negative_volume.validate());

        let nan_close = PricePoint::new(ts(1), 100.0, 105.0, 98.0, f64::NAN, 1.0);
        assert!(!nan_close.validate());
    }

    #[test]
    fn test_chronological() {
        let a = PricePoint::new(ts(1), 1.0, 1.0, 1.0, 1.0, 0.0);
        let b = PricePoint::new(ts(2), 1.0, 1.0, 1.0, 1.0, 0.0);
        assert!(is_chronological(&[a.clone(), b.clone()]));
        assert!(!is_chronological(&[b, a.clone()]));
        assert!(!is_chronological(&[a.clone(), a]));
    }

    #[test]
    fn test_position_rules() {
        assert_eq!(PositionStrategy::LongShort.position(0.01), 1.0);
        assert_eq!(PositionStrategy::LongShort.position(0.0), -1.0);
        assert_eq!(PositionStrategy::LongShort.position(-0.3), -1.0);

        assert_eq!(PositionStrategy::LongOnly.position(0.01), 1.0);
        assert_eq!(PositionStrategy::LongOnly.position(-0.01), 0.0);

        let cont = PositionStrategy::Continuous { scale: 50.0 };
        assert!((cont.position(0.01) - 0.5).abs() < 1e-12);
        assert_eq!(cont.position(0.5), 1.0);
        assert_eq!(cont.position(-0.5), -1.0);
    }

    #[test]
    fn test_parsing() {
        assert_eq!("Positivo".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(
            "Econômico".parse::<EventCategory>().unwrap(),
            EventCategory::Economic
        );
        assert_eq!(
            "long-only".parse::<PositionStrategy>().unwrap(),
            PositionStrategy::LongOnly
        );
        assert!("sideways".parse::<PositionStrategy>().is_err());
        assert_eq!(
            TargetKind::Classification.column_name(3),
            "target_direction_3"
        );
    }
}
