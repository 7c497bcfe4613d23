/*
[INPUT]:  Inbound text frames from the combined stream
[OUTPUT]: Canonical events fanned out to every registered callback, in order
[POS]:    WebSocket layer - frame routing, normalization and isolated delivery
[UPDATE]: When changing drop rules, delivery semantics or frame logging
*/

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use super::message::StreamEnvelope;
use super::normalize::normalize;
use super::registry::SubscriptionRegistry;
use crate::types::{MarketEvent, Validate};

const PARSE_FAIL_LOG_LIMIT: usize = 3;
const PAYLOAD_FAIL_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static PAYLOAD_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not JSON
    Malformed,
    /// No `stream`/`data` envelope, e.g. a subscription ack
    NotData,
    /// No subscription for the stream id
    UnknownStream,
    /// Payload does not match the subscription's kind
    InvalidPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered {
        stream_id: String,
        delivered: usize,
        failed: usize,
    },
    Dropped(DropReason),
}

/// Routes frames to the callbacks registered for their stream.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    validate: bool,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            registry,
            validate: false,
        }
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Dispatch one frame stamped with the current wall-clock time.
    pub fn dispatch(&self, text: &str) -> DispatchOutcome {
        self.dispatch_at(text, chrono::Utc::now().timestamp_millis())
    }

    /// Dispatch one frame. Never panics and never returns an error: every
    /// failure is logged and reported as [`DispatchOutcome::Dropped`].
    pub fn dispatch_at(&self, text: &str, received_at: i64) -> DispatchOutcome {
        let envelope = match serde_json::from_str::<StreamEnvelope>(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                log_parse_fail_once(&err, text);
                return DispatchOutcome::Dropped(DropReason::Malformed);
            }
        };

        let (Some(stream_id), Some(data)) = (envelope.stream, envelope.data) else {
            return DispatchOutcome::Dropped(DropReason::NotData);
        };

        let Some(route) = self.registry.route(&stream_id) else {
            debug!(%stream_id, "frame for unregistered stream dropped");
            return DispatchOutcome::Dropped(DropReason::UnknownStream);
        };

        let event = match normalize(&route.kind, &route.symbol, data, received_at) {
            Ok(event) => event,
            Err(err) => {
                log_payload_fail_once(&stream_id, &err);
                return DispatchOutcome::Dropped(DropReason::InvalidPayload);
            }
        };

        if self.validate {
            log_violations(&stream_id, &event);
        }

        let mut delivered = 0;
        let mut failed = 0;
        for (index, handler) in route.handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler.deliver(&event))) {
                Ok(true) => delivered += 1,
                Ok(false) => {
                    debug!(%stream_id, index, "handler type does not match event");
                }
                Err(_) => {
                    failed += 1;
                    warn!(%stream_id, index, "callback panicked; continuing with remaining callbacks");
                }
            }
        }

        DispatchOutcome::Delivered {
            stream_id,
            delivered,
            failed,
        }
    }
}

fn log_violations(stream_id: &str, event: &MarketEvent) {
    let violations = event.violations();
    if violations.is_empty() {
        return;
    }

    let summary = violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    warn!(
        %stream_id,
        symbol = event.symbol(),
        ts = event.timestamp(),
        violations = %summary,
        "event violates market invariants"
    );
}

fn log_parse_fail_once(err: &serde_json::Error, raw: &str) {
    let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PARSE_FAIL_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "ws frame parse failed"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            message = %preview,
            "ws frame parse failed"
        );
    } else {
        debug!(error = %err, bytes = raw.len(), "ws frame parse failed");
    }
}

fn log_payload_fail_once(stream_id: &str, err: &crate::error::FeedError) {
    let count = PAYLOAD_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PAYLOAD_FAIL_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = PAYLOAD_FAIL_LOG_LIMIT,
            %stream_id,
            error = %err,
            "ws payload does not match stream kind"
        );
    } else {
        debug!(%stream_id, error = %err, "ws payload does not match stream kind");
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
