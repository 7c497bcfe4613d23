/*
[INPUT]:  FeedConfig, subscriptions registered by callers
[OUTPUT]: One live combined-stream socket feeding the dispatcher, connection state and health signals
[POS]:    WebSocket layer - connection lifecycle, keepalive, reconnect backoff
[UPDATE]: When changing connection states, reconnect policy or keepalive behaviour
*/

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::message::{ControlFrame, ControlMethod};
use super::registry::SubscriptionRegistry;
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::types::{Bar, DepthLevels, KlineInterval, OrderBook, Ticker, Trade, UpdateSpeed};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

const HEALTH_CHANNEL_CAPACITY: usize = 16;
const IDLE_WATCHDOG: Duration = Duration::from_secs(3600);
const MIN_PING_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    /// Socket lost; reconnect `attempt` is scheduled after `delay`
    Disconnected { attempt: u32, delay: Duration },
    /// Terminal. `attempts == 0` means the first connect failed.
    Failed { attempts: u32 },
    Closed,
}

impl ConnectionState {
    /// States in which a socket is open or about to be reopened.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Disconnected { .. }
        )
    }
}

/// Out-of-band signals about the data flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamHealth {
    /// No data frame for `idle` while connected
    Stale { idle: Duration },
    /// Data resumed after a stale signal
    Recovered,
    /// Reconnect ceiling reached; the client will not retry on its own
    GaveUp { attempts: u32 },
}

#[derive(Debug)]
struct Session {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Binance combined-stream client.
///
/// Owns at most one physical connection. Subscriptions may be added or removed
/// at any time; see [`FeedConfig::live_subscriptions`] for when they take effect.
#[derive(Debug)]
pub struct BinanceWebSocket {
    config: FeedConfig,
    registry: Arc<SubscriptionRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    health_tx: broadcast::Sender<StreamHealth>,
    session: Mutex<Option<Session>>,
}

impl BinanceWebSocket {
    pub fn new(config: FeedConfig) -> Self {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Idle);
        let (health_tx, _health_rx) = broadcast::channel(HEALTH_CHANNEL_CAPACITY);
        Self {
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            state_tx,
            health_tx,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.registry.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_health(&self) -> broadcast::Receiver<StreamHealth> {
        self.health_tx.subscribe()
    }

    /// Subscribe to candles for `symbol`; returns the stream id.
    pub fn subscribe_kline(
        &self,
        symbol: &str,
        interval: KlineInterval,
        callback: impl Fn(&Bar) + Send + Sync + 'static,
    ) -> String {
        self.registry.subscribe_kline(symbol, interval, callback)
    }

    /// Subscribe to best bid/ask updates for `symbol`.
    pub fn subscribe_ticker(
        &self,
        symbol: &str,
        callback: impl Fn(&Ticker) + Send + Sync + 'static,
    ) -> String {
        self.registry.subscribe_ticker(symbol, callback)
    }

    /// Subscribe to trade prints for `symbol`.
    pub fn subscribe_trade(
        &self,
        symbol: &str,
        callback: impl Fn(&Trade) + Send + Sync + 'static,
    ) -> String {
        self.registry.subscribe_trade(symbol, callback)
    }

    /// Subscribe to partial depth snapshots for `symbol`.
    pub fn subscribe_depth(
        &self,
        symbol: &str,
        callback: impl Fn(&OrderBook) + Send + Sync + 'static,
        levels: DepthLevels,
        speed: UpdateSpeed,
    ) -> String {
        self.registry.subscribe_depth(symbol, callback, levels, speed)
    }

    /// Drop a stream and all of its callbacks. No-op for unknown ids.
    pub fn unsubscribe(&self, stream_id: &str) {
        self.registry.unsubscribe(stream_id);
    }

    /// Open the connection for the currently registered streams.
    ///
    /// Fails without retrying when nothing is registered, when a connection is
    /// already active, or when the first handshake fails. Once this returns
    /// `Ok`, disconnects are handled in the background.
    pub async fn connect(&self) -> Result<()> {
        let streams = self.registry.current_stream_ids();
        if streams.is_empty() {
            return Err(FeedError::NoStreams);
        }

        let claimed = self.state_tx.send_if_modified(|state| {
            if state.is_active() {
                return false;
            }
            *state = ConnectionState::Connecting;
            true
        });
        if !claimed {
            return Err(FeedError::AlreadyConnected);
        }

        let cancel = CancellationToken::new();
        self.replace_session(Some(Session {
            cancel: cancel.clone(),
            handle: None,
        }));

        let url = match self.config.stream_url(&streams) {
            Ok(url) => url,
            Err(err) => return Err(self.fail_initial_connect(err)),
        };

        info!(%url, stream_count = streams.len(), "connecting to Binance combined stream");
        let socket = match open_socket(&url, self.config.connect_timeout).await {
            Ok(socket) => socket,
            Err(err) => return Err(self.fail_initial_connect(err)),
        };

        let promoted = self.state_tx.send_if_modified(|state| {
            if *state != ConnectionState::Connecting {
                return false;
            }
            *state = ConnectionState::Connected;
            true
        });
        if !promoted || cancel.is_cancelled() {
            debug!("client closed while connecting; dropping socket");
            return Err(FeedError::Closed);
        }
        info!(stream_count = streams.len(), "Binance stream connected");

        let worker = ConnectionWorker {
            dispatcher: Dispatcher::new(self.registry.clone())
                .with_validation(self.config.validate_events),
            config: self.config.clone(),
            registry: self.registry.clone(),
            state_tx: self.state_tx.clone(),
            health_tx: self.health_tx.clone(),
            cancel,
            next_request_id: 1,
        };
        let handle = tokio::spawn(worker.run(socket, streams));
        if let Some(session) = self.lock_session().as_mut() {
            session.handle = Some(handle);
        }

        Ok(())
    }

    /// Stop the connection and any pending reconnect. Idempotent; safe in any state.
    pub fn close(&self) {
        self.replace_session(None);

        let changed = self.state_tx.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                return false;
            }
            *state = ConnectionState::Closed;
            true
        });
        if changed {
            info!("Binance stream client closed");
        }
    }

    fn fail_initial_connect(&self, err: FeedError) -> FeedError {
        warn!(error = %err, "initial connect failed");
        self.replace_session(None);
        self.state_tx.send_if_modified(|state| {
            if *state != ConnectionState::Connecting {
                return false;
            }
            *state = ConnectionState::Failed { attempts: 0 };
            true
        });
        err
    }

    /// Swap the stored session; the previous one is always cancelled.
    fn replace_session(&self, session: Option<Session>) -> Option<Session> {
        let previous = std::mem::replace(&mut *self.lock_session(), session);
        if let Some(old) = &previous {
            old.cancel.cancel();
            if let Some(handle) = &old.handle
                && !handle.is_finished()
            {
                debug!("stopping previous stream worker");
            }
        }
        previous
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BinanceWebSocket {
    fn default() -> Self {
        Self::new(FeedConfig::default())
    }
}

impl Drop for BinanceWebSocket {
    fn drop(&mut self) {
        self.replace_session(None);
    }
}

async fn open_socket(url: &Url, timeout: Duration) -> Result<WsStream> {
    match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
        Err(_) => Err(FeedError::Timeout {
            millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
        Ok(Err(err)) => Err(FeedError::websocket(err)),
        Ok(Ok((socket, _response))) => Ok(socket),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamExit {
    Disconnected,
    Stale,
    Shutdown,
}

/// Background task owning the socket after the first successful connect.
struct ConnectionWorker {
    config: FeedConfig,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Dispatcher,
    state_tx: watch::Sender<ConnectionState>,
    health_tx: broadcast::Sender<StreamHealth>,
    cancel: CancellationToken,
    next_request_id: u64,
}

impl ConnectionWorker {
    async fn run(mut self, mut socket: WsStream, mut active: BTreeSet<String>) {
        loop {
            match self.stream_loop(socket, active).await {
                StreamExit::Shutdown => {
                    debug!("stream worker stopped");
                    return;
                }
                StreamExit::Disconnected | StreamExit::Stale => {}
            }

            match self.reconnect().await {
                Some((next_socket, next_active)) => {
                    socket = next_socket;
                    active = next_active;
                }
                None => return,
            }
        }
    }

    async fn stream_loop(&mut self, socket: WsStream, mut active: BTreeSet<String>) -> StreamExit {
        let (mut write, mut read): (WsSink, WsSource) = socket.split();

        let period = self.config.ping_interval.max(MIN_PING_INTERVAL);
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let live = self.config.live_subscriptions;
        let mut last_data = Instant::now();
        let mut stale = false;

        loop {
            let watchdog = self.config.stale_after.filter(|_| !stale);
            let deadline = last_data
                .checked_add(watchdog.unwrap_or(IDLE_WATCHDOG))
                .unwrap_or(last_data + IDLE_WATCHDOG);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return StreamExit::Shutdown;
                }
                incoming = read.next() => {
                    let text = match incoming {
                        Some(Ok(WsMessage::Text(text))) => text.to_string(),
                        Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => text,
                            Err(_) => {
                                debug!(bytes = bytes.len(), "non-utf8 binary frame dropped");
                                continue;
                            }
                        },
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(?frame, "server closed the stream");
                            return StreamExit::Disconnected;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => {
                            warn!(error = %err, "ws read error");
                            return StreamExit::Disconnected;
                        }
                        None => {
                            warn!("Binance stream ended");
                            return StreamExit::Disconnected;
                        }
                    };

                    // Acks and frames for unknown streams do not feed the watchdog.
                    if self.handle_frame(&text) {
                        last_data = Instant::now();
                        if stale {
                            stale = false;
                            info!("data flow resumed");
                            let _ = self.health_tx.send(StreamHealth::Recovered);
                        }
                    }
                }
                _ = keepalive.tick() => {
                    if let Err(err) = write.send(WsMessage::Ping(Vec::new().into())).await {
                        warn!(error = %err, "keepalive ping failed");
                        return StreamExit::Disconnected;
                    }
                    debug!("keepalive ping sent");
                }
                _ = self.registry.changed(), if live => {
                    if let Err(err) = self.sync_subscriptions(&mut write, &mut active).await {
                        warn!(error = %err, "live subscription update failed");
                        return StreamExit::Disconnected;
                    }
                }
                _ = tokio::time::sleep_until(deadline), if watchdog.is_some() => {
                    stale = true;
                    let idle = last_data.elapsed();
                    warn!(idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX), "no data received; stream is stale");
                    let _ = self.health_tx.send(StreamHealth::Stale { idle });
                    if self.config.reconnect_on_stale {
                        return StreamExit::Stale;
                    }
                }
            }
        }
    }

    /// Dispatch one frame; true when it carried data for a registered stream.
    fn handle_frame(&self, text: &str) -> bool {
        match self.dispatcher.dispatch(text) {
            DispatchOutcome::Delivered {
                stream_id,
                delivered,
                failed,
            } => {
                if failed > 0 {
                    debug!(%stream_id, delivered, failed, "frame delivered with callback failures");
                }
                true
            }
            DispatchOutcome::Dropped(reason) => {
                debug!(?reason, "frame dropped");
                false
            }
        }
    }

    /// Bring the open socket's stream set in line with the registry.
    async fn sync_subscriptions(
        &mut self,
        write: &mut WsSink,
        active: &mut BTreeSet<String>,
    ) -> Result<()> {
        let wanted = self.registry.current_stream_ids();

        let added: Vec<String> = wanted.difference(active).cloned().collect();
        if !added.is_empty() {
            self.send_control(write, ControlMethod::Subscribe, &added).await?;
        }

        let removed: Vec<String> = active.difference(&wanted).cloned().collect();
        if !removed.is_empty() {
            self.send_control(write, ControlMethod::Unsubscribe, &removed).await?;
        }

        *active = wanted;
        Ok(())
    }

    async fn send_control(
        &mut self,
        write: &mut WsSink,
        method: ControlMethod,
        streams: &[String],
    ) -> Result<()> {
        let id = self.next_request_id;
        self.next_request_id += 1;

        let frame = ControlFrame {
            method,
            params: streams.iter().map(String::as_str).collect(),
            id,
        };
        let text = serde_json::to_string(&frame)?;
        write
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(FeedError::websocket)?;

        info!(?method, id, streams = ?streams, "ws subscription sent");
        Ok(())
    }

    /// Backoff loop. Returns the new socket, or `None` when closed or out of attempts.
    async fn reconnect(&mut self) -> Option<(WsStream, BTreeSet<String>)> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let Some(delay) = self.config.reconnect.next_delay(attempt) else {
                let attempts = attempt - 1;
                error!(
                    attempts,
                    max_attempts = self.config.reconnect.max_attempts,
                    "reconnect attempts exhausted; giving up"
                );
                self.set_state(ConnectionState::Failed { attempts });
                let _ = self.health_tx.send(StreamHealth::GaveUp { attempts });
                return None;
            };

            self.set_state(ConnectionState::Disconnected { attempt, delay });
            warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "stream disconnected; reconnecting after backoff"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let streams = self.wait_for_streams().await?;
            let url = match self.config.stream_url(&streams) {
                Ok(url) => url,
                Err(err) => {
                    error!(error = %err, "cannot build stream URL; giving up");
                    self.set_state(ConnectionState::Failed { attempts: attempt });
                    let _ = self.health_tx.send(StreamHealth::GaveUp { attempts: attempt });
                    return None;
                }
            };

            self.set_state(ConnectionState::Connecting);
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                result = open_socket(&url, self.config.connect_timeout) => result,
            };

            match result {
                Ok(socket) => {
                    self.set_state(ConnectionState::Connected);
                    info!(attempt, stream_count = streams.len(), "Binance stream reconnected");
                    return Some((socket, streams));
                }
                Err(err) => {
                    warn!(attempt, error = %err, "reconnect attempt failed");
                }
            }
        }
    }

    /// Current stream set, waiting for a subscription if the registry is empty.
    async fn wait_for_streams(&self) -> Option<BTreeSet<String>> {
        loop {
            let streams = self.registry.current_stream_ids();
            if !streams.is_empty() {
                return Some(streams);
            }

            info!("no streams registered; waiting for a subscription before reconnecting");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = self.registry.changed() => {}
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.state_tx.send_if_modified(|state| {
            if *state == ConnectionState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
}
