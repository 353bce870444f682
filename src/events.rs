//! Event-derived features.
//!
//! Aggregates an external event stream over trailing windows `(t - d, t]`
//! for every price timestamp. Both sequences are sorted by time, so the join
//! is a single sweep with monotone pointers over prefix sums: O(n + m).

use crate::types::{EventCategory, ExternalEvent, Severity, Sentiment};
use chrono::{DateTime, Duration, Utc};

/// Cap for `days_since_last_event`, also used when no event has happened yet.
pub const MAX_DAYS_SINCE_EVENT: f64 = 999.0;

/// Short trailing window in days.
pub const SHORT_WINDOW_DAYS: i64 = 7;
/// Long trailing window in days.
pub const LONG_WINDOW_DAYS: i64 = 30;

/// Aggregated event statistics visible at one timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventWindowStats {
    pub events_7d: usize,
    pub events_30d: usize,
    pub sentiment_sum_7d: f64,
    pub sentiment_sum_30d: f64,
    pub high_severity_7d: usize,
    pub high_severity_30d: usize,
    pub positive_7d: usize,
    pub negative_7d: usize,
    pub economic_30d: usize,
    pub political_30d: usize,
    pub innovation_30d: usize,
    pub days_since_last_event: f64,
    pub last_event_sentiment: f64,
}

impl EventWindowStats {
    /// Mean sentiment over the short window (0 when empty).
    pub fn avg_sentiment_7d(&self) -> f64 {
        if self.events_7d == 0 {
            0.0
        } else {
            self.sentiment_sum_7d / self.events_7d as f64
        }
    }

    /// Mean sentiment over the long window (0 when empty).
    pub fn avg_sentiment_30d(&self) -> f64 {
        if self.events_30d == 0 {
            0.0
        } else {
            self.sentiment_sum_30d / self.events_30d as f64
        }
    }
}

/// Prefix sums over the sorted event stream; entry `k` covers events `0..k`.
struct Prefix {
    sentiment: Vec<f64>,
    high: Vec<usize>,
    positive: Vec<usize>,
    negative: Vec<usize>,
    economic: Vec<usize>,
    political: Vec<usize>,
    innovation: Vec<usize>,
}

impl Prefix {
    fn build(events: &[ExternalEvent]) -> Self {
        let m = events.len();
        let mut p = Prefix {
            sentiment: Vec::with_capacity(m + 1),
            high: Vec::with_capacity(m + 1),
            positive: Vec::with_capacity(m + 1),
            negative: Vec::with_capacity(m + 1),
            economic: Vec::with_capacity(m + 1),
            political: Vec::with_capacity(m + 1),
            innovation: Vec::with_capacity(m + 1),
        };
        p.sentiment.push(0.0);
        p.high.push(0);
        p.positive.push(0);
        p.negative.push(0);
        p.economic.push(0);
        p.political.push(0);
        p.innovation.push(0);

        for (k, e) in events.iter().enumerate() {
            p.sentiment.push(p.sentiment[k] + e.sentiment.score());
            p.high.push(p.high[k] + usize::from(e.severity == Severity::High));
            p.positive
                .push(p.positive[k] + usize::from(e.sentiment == Sentiment::Positive));
            p.negative
                .push(p.negative[k] + usize::from(e.sentiment == Sentiment::Negative));
            p.economic
                .push(p.economic[k] + usize::from(e.category == EventCategory::Economic));
            p.political
                .push(p.political[k] + usize::from(e.category == EventCategory::Political));
            p.innovation
                .push(p.innovation[k] + usize::from(e.category == EventCategory::Innovation));
        }
        p
    }
}

/// Compute trailing event statistics for each timestamp.
///
/// `timestamps` must be non-decreasing. Events are sorted internally, and an
/// event is eligible for timestamp `t` only if its own timestamp is `<= t`.
pub fn event_window_stats(
    timestamps: &[DateTime<Utc>],
    events: &[ExternalEvent],
) -> Vec<EventWindowStats> {
    let mut sorted: Vec<ExternalEvent> = events.to_vec();
    sorted.sort_by_key(|e| e.timestamp);
    let prefix = Prefix::build(&sorted);

    let short = Duration::days(SHORT_WINDOW_DAYS);
    let long = Duration::days(LONG_WINDOW_DAYS);

    // Number of events with timestamp <= t, <= t - 7d, <= t - 30d.
    let mut hi = 0usize;
    let mut lo_short = 0usize;
    let mut lo_long = 0usize;

    let mut out = Vec::with_capacity(timestamps.len());
    for &t in timestamps {
        while hi < sorted.len() && sorted[hi].timestamp <= t {
            hi += 1;
        }
        while lo_short < sorted.len() && sorted[lo_short].timestamp <= t - short {
            lo_short += 1;
        }
        while lo_long < sorted.len() && sorted[lo_long].timestamp <= t - long {
            lo_long += 1;
        }
        let (s, l) = (lo_short.min(hi), lo_long.min(hi));

        let (days_since_last_event, last_event_sentiment) = if hi > 0 {
            let last = &sorted[hi - 1];
            let days = (t - last.timestamp).num_days() as f64;
            (days.min(MAX_DAYS_SINCE_EVENT), last.sentiment.score())
        } else {
            (MAX_DAYS_SINCE_EVENT, 0.0)
        };

        out.push(EventWindowStats {
            events_7d: hi - s,
            events_30d: hi - l,
            sentiment_sum_7d: prefix.sentiment[hi] - prefix.sentiment[s],
            sentiment_sum_30d: prefix.sentiment[hi] - prefix.sentiment[l],
            high_severity_7d: prefix.high[hi] - prefix.high[s],
            high_severity_30d: prefix.high[hi] - prefix.high[l],
            positive_7d: prefix.positive[hi] - prefix.positive[s],
            negative_7d: prefix.negative[hi] - prefix.negative[s],
            economic_30d: prefix.economic[hi] - prefix.economic[l],
            political_30d: prefix.political[hi] - prefix.political[l],
            innovation_30d: prefix.innovation[hi] - prefix.innovation[l],
            days_since_last_event,
            last_event_sentiment,
        });
    }
    out
}
