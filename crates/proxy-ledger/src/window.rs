//! Query time windows for cost aggregation.

use chrono::{DateTime, Duration, Utc};
use proxy_core::ProxyError;

/// Optional bounds applied to ledger timestamps.
///
/// Either bound may be absent; a window with neither matches the whole
/// ledger. Bounds are inclusive, matching `timestamp >= start` and
/// `timestamp <= end` filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    /// Earliest timestamp included, if any.
    pub start: Option<DateTime<Utc>>,
    /// Latest timestamp included, if any.
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Window with no bounds at all.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build a window from the two mutually exclusive selection styles.
    ///
    /// `last_hours` selects a trailing window ending now; explicit bounds
    /// select an absolute range. Supplying both styles at once, a zero
    /// trailing window, or an inverted range is rejected.
    pub fn resolve(
        last_hours: Option<u32>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, ProxyError> {
        if let Some(hours) = last_hours {
            if start.is_some() || end.is_some() {
                return Err(ProxyError::invalid_argument(
                    "last_hours cannot be combined with start_time or end_time",
                ));
            }
            if hours == 0 {
                return Err(ProxyError::invalid_argument("last_hours must be at least 1"));
            }
            return Ok(Self {
                start: Some(now - Duration::hours(i64::from(hours))),
                end: None,
            });
        }

        if let (Some(from), Some(to)) = (start, end) {
            if from > to {
                return Err(ProxyError::invalid_argument(
                    "start_time must not be after end_time",
                ));
            }
        }

        Ok(Self { start, end })
    }

    /// True when neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}
