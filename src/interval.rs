//! Watched-range bookkeeping.
//!
//! Everything in here is pure: no I/O, no errors. Bad input from a playback
//! client is dropped on the floor rather than reported, because telemetry is
//! noisy and one broken range must never block an otherwise good update.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};

/// A played range `[start, end)` on a video's timeline, in seconds.
///
/// A `WatchInterval` obtained through [WatchInterval::new] or
/// [RawInterval::validate] always satisfies `0 <= start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WatchInterval {
    pub start: f64,
    pub end: f64,
}

impl WatchInterval {
    /// Returns `None` when the range is empty, inverted, negative or not finite.
    pub fn new(start: f64, end: f64) -> Option<Self> {
        let interval = Self { start, end };
        interval.is_valid().then_some(interval)
    }

    pub fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start >= 0.0 && self.start < self.end
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// An interval exactly as a client reported it.
///
/// Missing or non-numeric bounds deserialize to `None` instead of failing the
/// whole payload; [RawInterval::validate] decides whether the entry is usable.
#[serde_as]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInterval {
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub start: Option<f64>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub end: Option<f64>,
}

impl RawInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn validate(&self) -> Option<WatchInterval> {
        WatchInterval::new(self.start?, self.end?)
    }
}

impl From<WatchInterval> for RawInterval {
    fn from(interval: WatchInterval) -> Self {
        Self::new(interval.start, interval.end)
    }
}

/// A normalized collection of watched ranges: sorted by `start`, and no two
/// neighbours overlap or touch.
///
/// The only ways to build one go through [normalize], so the invariant holds
/// for every value of this type, including ones read back from storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<WatchInterval>", into = "Vec<WatchInterval>")]
pub struct WatchedSet(Vec<WatchInterval>);

impl WatchedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `incoming` into this set, see [merge_intervals].
    pub fn merge(&self, incoming: &[RawInterval]) -> WatchedSet {
        merge_intervals(self, incoming)
    }

    pub fn total_seconds(&self) -> f64 {
        calculate_total_seconds(&self.0)
    }

    pub fn as_slice(&self) -> &[WatchInterval] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchInterval> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<WatchInterval>> for WatchedSet {
    fn from(intervals: Vec<WatchInterval>) -> Self {
        normalize(intervals)
    }
}

impl From<WatchedSet> for Vec<WatchInterval> {
    fn from(set: WatchedSet) -> Self {
        set.0
    }
}

impl FromIterator<WatchInterval> for WatchedSet {
    fn from_iter<I: IntoIterator<Item = WatchInterval>>(iter: I) -> Self {
        normalize(iter)
    }
}

impl<'a> IntoIterator for &'a WatchedSet {
    type Item = &'a WatchInterval;
    type IntoIter = std::slice::Iter<'a, WatchInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Merges newly reported ranges into an already stored set.
///
/// Invalid entries of `incoming` are discarded. The result does not depend on
/// the order of `incoming`, and merging the result again with nothing returns
/// it unchanged.
pub fn merge_intervals(existing: &WatchedSet, incoming: &[RawInterval]) -> WatchedSet {
    let valid = incoming.iter().filter_map(RawInterval::validate);
    normalize(existing.iter().copied().chain(valid))
}

/// Sort-and-sweep. Touching endpoints (`next.start == current.end`) count as
/// overlapping so frequent small reports do not fragment the set.
fn normalize(intervals: impl IntoIterator<Item = WatchInterval>) -> WatchedSet {
    let mut sorted: Vec<WatchInterval> = intervals
        .into_iter()
        .filter(WatchInterval::is_valid)
        .collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<WatchInterval> = Vec::with_capacity(sorted.len());
    for next in sorted {
        match merged.last_mut() {
            Some(current) if next.start <= current.end => {
                current.end = current.end.max(next.end);
            }
            _ => merged.push(next),
        }
    }

    WatchedSet(merged)
}

/// Sum of `end - start`. Invalid entries are skipped so this is safe to call
/// on data that never went through [merge_intervals].
pub fn calculate_total_seconds(intervals: &[WatchInterval]) -> f64 {
    intervals
        .iter()
        .filter(|interval| interval.start.is_finite() && interval.end.is_finite())
        .filter(|interval| interval.end >= interval.start)
        .map(WatchInterval::length)
        .sum()
}

/// Completion percentage rounded to two decimals and clamped to `[0, 100]`.
///
/// A non-positive duration yields 0.
pub fn calculate_progress(total_unique_watched_seconds: f64, video_duration: f64) -> f64 {
    if !(video_duration.is_finite() && video_duration > 0.0) {
        if total_unique_watched_seconds > 0.0 {
            tracing::warn!(
                total_unique_watched_seconds,
                video_duration,
                "cannot compute progress percentage without a positive video duration"
            );
        }
        return 0.0;
    }

    let percentage = total_unique_watched_seconds / video_duration * 100.0;
    let rounded = (percentage * 100.0).round() / 100.0;
    rounded.clamp(0.0, 100.0)
}
