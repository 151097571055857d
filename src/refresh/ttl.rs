//! Freshness windows for remote data.
//!
//! A dataset is refreshed only once its stored timestamp is older than the
//! window for its category and time range. Longer time ranges drift slower
//! upstream, so their windows are wider.

use crate::library_store::TimeRange;
use chrono::Duration;

#[derive(Debug, Clone)]
pub struct TtlPolicy {
    pub top_artists_short: Duration,
    pub top_artists_medium: Duration,
    pub top_artists_long: Duration,
    pub top_tracks_short: Duration,
    pub top_tracks_medium: Duration,
    pub top_tracks_long: Duration,
    pub recent_history: Duration,
}

impl TtlPolicy {
    pub fn top_artists(&self, time_range: TimeRange) -> Duration {
        match time_range {
            TimeRange::Short => self.top_artists_short,
            TimeRange::Medium => self.top_artists_medium,
            TimeRange::Long => self.top_artists_long,
        }
    }

    pub fn top_tracks(&self, time_range: TimeRange) -> Duration {
        match time_range {
            TimeRange::Short => self.top_tracks_short,
            TimeRange::Medium => self.top_tracks_medium,
            TimeRange::Long => self.top_tracks_long,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            top_artists_short: Duration::weeks(4),
            top_artists_medium: Duration::weeks(6),
            top_artists_long: Duration::weeks(12),
            top_tracks_short: Duration::days(1),
            top_tracks_medium: Duration::weeks(1),
            top_tracks_long: Duration::weeks(4),
            recent_history: Duration::minutes(30),
        }
    }
}
