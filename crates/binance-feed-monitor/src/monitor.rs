/*
[INPUT]:  MonitorConfig, CancellationToken
[OUTPUT]: Open Binance streams with every event logged and counted, periodic summaries
[POS]:    Execution layer - stream supervision and reporting
[UPDATE]: When changing subscription wiring, summary output or give-up handling
*/

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{Context as _, Result};
use binance_feed_adapter::{
    BinanceWebSocket, ConnectionState, FeedError, OrderBook, StreamHealth, StreamKind,
};
use rust_decimal::Decimal;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{MonitorConfig, SubscriptionConfig};
use crate::metrics::FeedMetrics;

static PANIC_HOOK_ONCE: Once = Once::new();

fn ensure_panic_hook_installed() {
    PANIC_HOOK_ONCE.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!("panic in stream callback: {info}");
            previous(info);
        }));
    });
}

/// Runs one client over the configured subscriptions.
pub struct FeedMonitor {
    client: BinanceWebSocket,
    metrics: Arc<FeedMetrics>,
    summary_interval: Duration,
}

impl FeedMonitor {
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let monitor = Self {
            client: BinanceWebSocket::new(config.feed_config()),
            metrics: Arc::new(FeedMetrics::new()),
            summary_interval: config.summary_interval(),
        };
        for subscription in &config.subscriptions {
            monitor.install(subscription)?;
        }
        Ok(monitor)
    }

    pub fn client(&self) -> &BinanceWebSocket {
        &self.client
    }

    pub fn metrics(&self) -> Arc<FeedMetrics> {
        self.metrics.clone()
    }

    /// Register a logging/counting callback for one subscription.
    pub fn install(&self, subscription: &SubscriptionConfig) -> Result<String> {
        let kind = subscription.stream_kind()?;
        let symbol = subscription.symbol();
        let stream_id = binance_feed_adapter::stream_id(symbol, &kind);
        self.metrics.track(&stream_id);

        let metrics = self.metrics.clone();
        let key = stream_id.clone();
        let registered = match kind {
            StreamKind::Kline(interval) => self.client.subscribe_kline(symbol, interval, move |bar| {
                debug!(stream_id = %key, ts = bar.timestamp, close = %bar.close, volume = %bar.volume, "bar");
                metrics.record(&key, bar.timestamp, Some(bar.close));
            }),
            StreamKind::Ticker => self.client.subscribe_ticker(symbol, move |ticker| {
                debug!(stream_id = %key, bid = ?ticker.bid_price, ask = ?ticker.ask_price, "ticker");
                metrics.record(&key, ticker.timestamp, ticker.mid_price());
            }),
            StreamKind::Trade => self.client.subscribe_trade(symbol, move |trade| {
                debug!(
                    stream_id = %key,
                    side = trade.side.as_str(),
                    price = %trade.price,
                    qty = %trade.quantity,
                    "trade"
                );
                metrics.record(&key, trade.timestamp, Some(trade.price));
            }),
            StreamKind::Depth { levels, speed } => self.client.subscribe_depth(
                symbol,
                move |book| {
                    debug!(
                        stream_id = %key,
                        bids = book.bids.len(),
                        asks = book.asks.len(),
                        last_update_id = book.last_update_id,
                        "order book"
                    );
                    metrics.record(&key, book.timestamp, top_of_book_mid(book));
                },
                levels,
                speed,
            ),
        };

        info!(stream_id = %registered, "subscription installed");
        Ok(registered)
    }

    /// Connect and supervise until `shutdown` fires or the client gives up.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        ensure_panic_hook_installed();

        let mut health = self.client.subscribe_health();
        let mut state = self.client.subscribe_connection_state();

        self.client.connect().await.context("connect to Binance streams")?;
        info!(streams = self.client.registry().len(), "monitor running");

        let mut summary = tokio::time::interval(self.summary_interval);
        summary.set_missed_tick_behavior(MissedTickBehavior::Delay);
        summary.tick().await;

        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                signal = health.recv() => match signal {
                    Ok(StreamHealth::Stale { idle }) => {
                        warn!(idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX), "stream stale");
                    }
                    Ok(StreamHealth::Recovered) => info!("stream recovered"),
                    Ok(StreamHealth::GaveUp { attempts }) => {
                        error!(attempts, "stream client gave up reconnecting");
                        break Err(anyhow::Error::new(FeedError::MaxReconnectAttempts { attempts })
                            .context("Binance stream lost"));
                    }
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "health signals skipped"),
                    Err(RecvError::Closed) => break Ok(()),
                },
                changed = state.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    let current = state.borrow_and_update().clone();
                    log_state(&current);
                }
                _ = summary.tick() => self.log_summary(),
            }
        };

        self.client.close();
        self.log_summary();
        result
    }

    pub fn log_summary(&self) {
        let snapshot = self.metrics.snapshot();
        info!(
            streams = snapshot.len(),
            total_events = self.metrics.total_events(),
            state = ?self.client.state(),
            "feed summary"
        );
        for stream in snapshot {
            let idle_ms = stream
                .last_update
                .map(|at| u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX));
            info!(
                stream_id = %stream.stream_id,
                events = stream.events,
                last_event_ms = ?stream.last_event_ms,
                last_price = ?stream.last_price,
                idle_ms = ?idle_ms,
                "stream summary"
            );
        }
    }
}

fn log_state(state: &ConnectionState) {
    match state {
        ConnectionState::Disconnected { attempt, delay } => warn!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "connection lost"
        ),
        ConnectionState::Failed { attempts } => error!(attempts, "connection failed"),
        other => info!(state = ?other, "connection state changed"),
    }
}

fn top_of_book_mid(book: &OrderBook) -> Option<Decimal> {
    let bid = book.best_bid()?.price;
    let ask = book.best_ask()?.price;
    Some((bid + ask) / Decimal::TWO)
}
