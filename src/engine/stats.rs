// src/engine/stats.rs
//
// Encoding statistics and the shared "last encode" slot.
//
// The slot is an explicit handle so tests can give each encoder its own sink.
// `StatisticsSink::global()` is the process-wide shim for callers that want
// the classic "most recent encode" diagnostic.

use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Size and timing of one encode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingStatistics {
    /// Canonical buffer size in bytes (height * stride).
    pub original_size: usize,
    /// Encoded WebP stream size in bytes.
    pub encoded_size: usize,
    /// Un-premultiply + picture import.
    pub import_duration: Duration,
    /// libwebp compression.
    pub encoding_duration: Duration,
}

impl EncodingStatistics {
    /// `original_size / encoded_size`, e.g. 10.0 means 10x smaller. 0 when nothing was written.
    pub fn compression_ratio(&self) -> f64 {
        if self.encoded_size == 0 {
            return 0.0;
        }
        self.original_size as f64 / self.encoded_size as f64
    }

    /// Fraction of space saved, e.g. 0.82 means 82% smaller. 0 for empty input.
    pub fn space_savings(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        1.0 - self.encoded_size as f64 / self.original_size as f64
    }

    pub fn total_duration(&self) -> Duration {
        self.import_duration + self.encoding_duration
    }
}

/// Single-slot, last-write-wins record of the most recent encode.
///
/// Cloning yields another handle to the same slot.
#[derive(Debug, Clone, Default)]
pub struct StatisticsSink {
    slot: Arc<Mutex<Option<EncodingStatistics>>>,
}

static GLOBAL_SINK: OnceLock<StatisticsSink> = OnceLock::new();

impl StatisticsSink {
    /// A fresh, isolated sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide sink shared by every `WebPEncoder::default()`.
    pub fn global() -> StatisticsSink {
        GLOBAL_SINK.get_or_init(StatisticsSink::new).clone()
    }

    pub fn record(&self, stats: EncodingStatistics) {
        *self.slot.lock() = Some(stats);
    }

    /// Most recent statistics, if any encode has completed.
    pub fn last(&self) -> Option<EncodingStatistics> {
        *self.slot.lock()
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    /// True when both handles point at the same slot.
    pub fn same_slot(&self, other: &StatisticsSink) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(original: usize, encoded: usize) -> EncodingStatistics {
        EncodingStatistics {
            original_size: original,
            encoded_size: encoded,
            import_duration: Duration::from_millis(1),
            encoding_duration: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_derived_ratios() {
        let s = stats(1000, 100);
        assert_eq!(s.compression_ratio(), 10.0);
        assert!((s.space_savings() - 0.9).abs() < 1e-12);
        assert_eq!(s.total_duration(), Duration::from_millis(3));
    }

    #[test]
    fn test_zero_guards() {
        assert_eq!(stats(1000, 0).compression_ratio(), 0.0);
        assert_eq!(stats(0, 0).space_savings(), 0.0);
        assert_eq!(stats(0, 10).compression_ratio(), 0.0);
    }

    #[test]
    fn test_sink_last_write_wins() {
        let sink = StatisticsSink::new();
        assert!(sink.last().is_none());
        sink.record(stats(1, 1));
        sink.record(stats(2, 2));
        assert_eq!(sink.last(), Some(stats(2, 2)));
        sink.clear();
        assert!(sink.last().is_none());
    }

    #[test]
    fn test_sinks_are_isolated() {
        let a = StatisticsSink::new();
        let b = StatisticsSink::new();
        let a2 = a.clone();
        a.record(stats(5, 5));
        assert!(b.last().is_none());
        assert_eq!(a2.last(), Some(stats(5, 5)));
        assert!(a.same_slot(&a2));
        assert!(!a.same_slot(&b));
        assert!(StatisticsSink::global().same_slot(&StatisticsSink::global()));
    }
}
