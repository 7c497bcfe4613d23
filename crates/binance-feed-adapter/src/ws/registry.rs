/*
[INPUT]:  Subscription requests (symbol, kind, parameters) and consumer callbacks
[OUTPUT]: Wire stream ids, per-stream callback lists, current stream set
[POS]:    WebSocket layer - join between what the socket delivers and who asked for it
[UPDATE]: When adding stream kinds or changing stream naming
*/

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use crate::types::{Bar, DepthLevels, KlineInterval, MarketEvent, OrderBook, Ticker, Trade, UpdateSpeed};

/// Consumer callback. Expected to be fast and non-blocking.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Logical stream kind together with its naming parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Kline(KlineInterval),
    Ticker,
    Trade,
    Depth {
        levels: DepthLevels,
        speed: UpdateSpeed,
    },
}

impl StreamKind {
    fn suffix(&self) -> String {
        match self {
            StreamKind::Kline(interval) => format!("@kline_{interval}"),
            StreamKind::Ticker => "@bookTicker".to_string(),
            StreamKind::Trade => "@trade".to_string(),
            StreamKind::Depth { levels, speed } => {
                format!("@depth{}@{}ms", levels.count(), speed.millis())
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Kline(_) => "kline",
            StreamKind::Ticker => "ticker",
            StreamKind::Trade => "trade",
            StreamKind::Depth { .. } => "depth",
        }
    }
}

/// Wire stream name for `(symbol, kind)`. Pure: equal inputs give equal ids.
pub fn stream_id(symbol: &str, kind: &StreamKind) -> String {
    format!("{}{}", symbol.trim().to_lowercase(), kind.suffix())
}

/// One registered callback, tagged with the canonical type it accepts.
#[derive(Clone)]
pub enum Handler {
    Kline(Callback<Bar>),
    Ticker(Callback<Ticker>),
    Trade(Callback<Trade>),
    Depth(Callback<OrderBook>),
}

impl Handler {
    /// Invoke the callback if `event` has the matching type.
    pub fn deliver(&self, event: &MarketEvent) -> bool {
        match (self, event) {
            (Handler::Kline(callback), MarketEvent::Bar(bar)) => callback(bar),
            (Handler::Ticker(callback), MarketEvent::Ticker(ticker)) => callback(ticker),
            (Handler::Trade(callback), MarketEvent::Trade(trade)) => callback(trade),
            (Handler::Depth(callback), MarketEvent::OrderBook(book)) => callback(book),
            _ => return false,
        }
        true
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Handler::Kline(_) => "kline",
            Handler::Ticker(_) => "ticker",
            Handler::Trade(_) => "trade",
            Handler::Depth(_) => "depth",
        };
        f.debug_tuple("Handler").field(&kind).finish()
    }
}

#[derive(Debug)]
struct Subscription {
    symbol: String,
    kind: StreamKind,
    handlers: Vec<Handler>,
}

/// Snapshot of one subscription taken for dispatch, detached from the lock.
#[derive(Debug, Clone)]
pub struct Route {
    pub symbol: String,
    pub kind: StreamKind,
    pub handlers: Vec<Handler>,
}

/// Thread-safe map from stream id to subscription.
///
/// Callbacks never run under the lock: dispatch works on a [`Route`] snapshot,
/// so a callback may call back into the registry.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<BTreeMap<String, Subscription>>,
    changed: Notify,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_kline(
        &self,
        symbol: &str,
        interval: KlineInterval,
        callback: impl Fn(&Bar) + Send + Sync + 'static,
    ) -> String {
        self.register(symbol, StreamKind::Kline(interval), Handler::Kline(Arc::new(callback)))
    }

    pub fn subscribe_ticker(
        &self,
        symbol: &str,
        callback: impl Fn(&Ticker) + Send + Sync + 'static,
    ) -> String {
        self.register(symbol, StreamKind::Ticker, Handler::Ticker(Arc::new(callback)))
    }

    pub fn subscribe_trade(
        &self,
        symbol: &str,
        callback: impl Fn(&Trade) + Send + Sync + 'static,
    ) -> String {
        self.register(symbol, StreamKind::Trade, Handler::Trade(Arc::new(callback)))
    }

    pub fn subscribe_depth(
        &self,
        symbol: &str,
        callback: impl Fn(&OrderBook) + Send + Sync + 'static,
        levels: DepthLevels,
        speed: UpdateSpeed,
    ) -> String {
        self.register(
            symbol,
            StreamKind::Depth { levels, speed },
            Handler::Depth(Arc::new(callback)),
        )
    }

    /// Add `handler` under the stream id of `(symbol, kind)`.
    ///
    /// Repeated registrations accumulate callbacks on one stream.
    pub fn register(&self, symbol: &str, kind: StreamKind, handler: Handler) -> String {
        let id = stream_id(symbol, &kind);
        let created = {
            let mut subscriptions = self.lock();
            match subscriptions.get_mut(&id) {
                Some(existing) => {
                    existing.handlers.push(handler);
                    false
                }
                None => {
                    subscriptions.insert(
                        id.clone(),
                        Subscription {
                            symbol: symbol.trim().to_uppercase(),
                            kind,
                            handlers: vec![handler],
                        },
                    );
                    true
                }
            }
        };

        debug!(stream_id = %id, created, kind = kind.name(), "subscription registered");
        if created {
            self.changed.notify_one();
        }
        id
    }

    /// Remove a stream and all of its callbacks. Returns false if unknown.
    pub fn unsubscribe(&self, stream_id: &str) -> bool {
        let removed = self.lock().remove(stream_id).is_some();
        if removed {
            debug!(%stream_id, "subscription removed");
            self.changed.notify_one();
        }
        removed
    }

    /// Stream ids the next connection should request, in stable order.
    pub fn current_stream_ids(&self) -> BTreeSet<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn route(&self, stream_id: &str) -> Option<Route> {
        self.lock().get(stream_id).map(|subscription| Route {
            symbol: subscription.symbol.clone(),
            kind: subscription.kind,
            handlers: subscription.handlers.clone(),
        })
    }

    pub fn contains(&self, stream_id: &str) -> bool {
        self.lock().contains_key(stream_id)
    }

    pub fn callback_count(&self, stream_id: &str) -> usize {
        self.lock()
            .get(stream_id)
            .map_or(0, |subscription| subscription.handlers.len())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolves after the stream set changes. A change made while nobody
    /// waits is remembered for the next call.
    pub(crate) async fn changed(&self) {
        self.changed.notified().await;
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
