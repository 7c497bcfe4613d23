/*
[INPUT]:  Caller-supplied environment, base URL and connection tuning
[OUTPUT]: FeedConfig ready for BinanceWebSocket plus combined-stream URL building
[POS]:    Configuration layer - connection options for the stream client
[UPDATE]: When adding connection options or changing endpoint defaults
*/

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FeedError, Result};
use crate::ws::backoff::ReconnectPolicy;

/// Base URLs for the Binance spot market streams
const PRODUCTION_STREAM_URL: &str = "wss://stream.binance.com:9443";
const TESTNET_STREAM_URL: &str = "wss://testnet.binance.vision";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Testnet,
}

impl Environment {
    pub fn stream_base_url(self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_STREAM_URL,
            Environment::Testnet => TESTNET_STREAM_URL,
        }
    }
}

/// Stream client configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Endpoint base, without the `/stream` path
    pub base_url: String,
    /// Transport ping period while connected
    pub ping_interval: Duration,
    /// Upper bound on one WebSocket handshake
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Emit a stale signal when no data frame arrives for this long
    pub stale_after: Option<Duration>,
    /// Drop the socket and reconnect when the stale signal fires
    pub reconnect_on_stale: bool,
    /// Send SUBSCRIBE/UNSUBSCRIBE frames for registry changes while connected
    pub live_subscriptions: bool,
    /// Log invariant violations of normalized events
    pub validate_events: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Production)
    }
}

impl FeedConfig {
    pub fn for_environment(environment: Environment) -> Self {
        Self::with_base_url(environment.stream_base_url())
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ping_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            stale_after: None,
            reconnect_on_stale: false,
            live_subscriptions: true,
            validate_events: false,
        }
    }

    /// Build the combined-stream URL: `<base>/stream?streams=a/b/c`
    pub fn stream_url(&self, streams: &BTreeSet<String>) -> Result<Url> {
        if streams.is_empty() {
            return Err(FeedError::NoStreams);
        }

        let joined = streams.iter().map(String::as_str).collect::<Vec<_>>().join("/");
        let raw = format!(
            "{}/stream?streams={}",
            self.base_url.trim_end_matches('/'),
            joined
        );
        let url = Url::parse(&raw)?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(FeedError::Config(format!(
                "stream URL scheme must be ws or wss, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streams(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn default_config_targets_production() {
        let config = FeedConfig::default();
        assert_eq!(config.base_url, PRODUCTION_STREAM_URL);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert!(config.live_subscriptions);
        assert!(config.stale_after.is_none());
    }

    #[test]
    fn testnet_environment_uses_testnet_host() {
        let config = FeedConfig::for_environment(Environment::Testnet);
        assert_eq!(config.base_url, TESTNET_STREAM_URL);
    }

    #[test]
    fn stream_url_joins_ids_with_slash() {
        let config = FeedConfig::with_base_url("wss://stream.binance.com:9443/");
        let url = config
            .stream_url(&streams(&["ethusdt@trade", "btcusdt@kline_1h"]))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@kline_1h/ethusdt@trade"
        );
    }

    #[test]
    fn stream_url_requires_streams() {
        let config = FeedConfig::default();
        assert!(matches!(
            config.stream_url(&BTreeSet::new()),
            Err(FeedError::NoStreams)
        ));
    }

    #[test]
    fn stream_url_rejects_http_scheme() {
        let config = FeedConfig::with_base_url("https://example.com");
        assert!(matches!(
            config.stream_url(&streams(&["btcusdt@trade"])),
            Err(FeedError::Config(_))
        ));
    }
}
