/*
[INPUT]:  Normalized events observed by monitor callbacks
[OUTPUT]: Snapshot-friendly per-stream counters for the periodic summary
[POS]:    Shared runtime metrics between stream callbacks and the summary loop
[UPDATE]: When adding/removing stream-level runtime signals
*/

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct StreamMetricsSnapshot {
    pub stream_id: String,
    pub events: u64,
    /// Event timestamp (ms) of the latest event
    pub last_event_ms: Option<i64>,
    pub last_price: Option<Decimal>,
    pub last_update: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct StreamMetrics {
    events: u64,
    last_event_ms: Option<i64>,
    last_price: Option<Decimal>,
    last_update: Option<Instant>,
}

impl StreamMetrics {
    pub fn snapshot(&self, stream_id: &str) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            stream_id: stream_id.to_string(),
            events: self.events,
            last_event_ms: self.last_event_ms,
            last_price: self.last_price,
            last_update: self.last_update,
        }
    }

    pub fn record_event(&mut self, timestamp: i64, price: Option<Decimal>) {
        self.events += 1;
        self.last_event_ms = Some(timestamp);
        if price.is_some() {
            self.last_price = price;
        }
        self.last_update = Some(Instant::now());
    }
}

/// Per-stream metrics keyed by stream id.
#[derive(Debug, Default)]
pub struct FeedMetrics {
    streams: Mutex<BTreeMap<String, StreamMetrics>>,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a stream show up in summaries before its first event.
    pub fn track(&self, stream_id: &str) {
        self.lock().entry(stream_id.to_string()).or_default();
    }

    pub fn record(&self, stream_id: &str, timestamp: i64, price: Option<Decimal>) {
        self.lock()
            .entry(stream_id.to_string())
            .or_default()
            .record_event(timestamp, price);
    }

    pub fn snapshot(&self) -> Vec<StreamMetricsSnapshot> {
        self.lock()
            .iter()
            .map(|(stream_id, metrics)| metrics.snapshot(stream_id))
            .collect()
    }

    pub fn total_events(&self) -> u64 {
        self.lock().values().map(|metrics| metrics.events).sum()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StreamMetrics>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
