/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed monitor configuration and the adapter FeedConfig derived from it
[POS]:    Configuration layer - feed and subscription setup
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use anyhow::{Context, bail};
use binance_feed_adapter::{
    DepthLevels, Environment, FeedConfig, KlineInterval, ReconnectPolicy, StreamKind, UpdateSpeed,
    stream_id,
};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the feed monitor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Exchange environment: "production" or "testnet"
    #[serde(default)]
    pub environment: Environment,
    /// Overrides the environment's stream host (e.g. a local relay)
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Raise a stale signal after this many seconds without data
    #[serde(default)]
    pub stale_after_secs: Option<u64>,
    #[serde(default)]
    pub reconnect_on_stale: bool,
    #[serde(default = "default_true")]
    pub live_subscriptions: bool,
    #[serde(default)]
    pub validate_events: bool,
    /// Period of the per-stream summary log
    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,
    /// Streams to open
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// Reconnect backoff configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            jitter_ms: 0,
        }
    }
}

/// One stream to open, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubscriptionConfig {
    Kline {
        symbol: String,
        interval: KlineInterval,
    },
    Ticker {
        symbol: String,
    },
    Trade {
        symbol: String,
    },
    Depth {
        symbol: String,
        #[serde(default = "default_depth_levels")]
        levels: u16,
        #[serde(default = "default_depth_speed_ms")]
        speed_ms: u64,
    },
}

impl SubscriptionConfig {
    pub fn symbol(&self) -> &str {
        match self {
            SubscriptionConfig::Kline { symbol, .. }
            | SubscriptionConfig::Ticker { symbol }
            | SubscriptionConfig::Trade { symbol }
            | SubscriptionConfig::Depth { symbol, .. } => symbol,
        }
    }

    pub fn stream_kind(&self) -> anyhow::Result<StreamKind> {
        let kind = match self {
            SubscriptionConfig::Kline { interval, .. } => StreamKind::Kline(*interval),
            SubscriptionConfig::Ticker { .. } => StreamKind::Ticker,
            SubscriptionConfig::Trade { .. } => StreamKind::Trade,
            SubscriptionConfig::Depth {
                levels, speed_ms, ..
            } => StreamKind::Depth {
                levels: DepthLevels::try_from(*levels)?,
                speed: UpdateSpeed::try_from(*speed_ms)?,
            },
        };
        Ok(kind)
    }

    pub fn stream_id(&self) -> anyhow::Result<String> {
        Ok(stream_id(self.symbol(), &self.stream_kind()?))
    }
}

fn default_true() -> bool {
    true
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_summary_interval_secs() -> u64 {
    30
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_depth_levels() -> u16 {
    10
}

fn default_depth_speed_ms() -> u64 {
    1000
}

impl MonitorConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("read config file {path}"))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the adapter would refuse at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.subscriptions.is_empty() {
            bail!("at least one subscription is required");
        }
        if self.ping_interval_secs == 0 {
            bail!("ping_interval_secs must be greater than zero");
        }
        if self.connect_timeout_secs == 0 {
            bail!("connect_timeout_secs must be greater than zero");
        }
        if self.summary_interval_secs == 0 {
            bail!("summary_interval_secs must be greater than zero");
        }
        if self.stale_after_secs == Some(0) {
            bail!("stale_after_secs must be greater than zero when set");
        }
        for (index, subscription) in self.subscriptions.iter().enumerate() {
            if subscription.symbol().trim().is_empty() {
                bail!("subscription {index} has an empty symbol");
            }
            subscription
                .stream_kind()
                .with_context(|| format!("subscription {index} ({})", subscription.symbol()))?;
        }
        Ok(())
    }

    pub fn feed_config(&self) -> FeedConfig {
        let mut config = match &self.base_url {
            Some(base_url) => FeedConfig::with_base_url(base_url.clone()),
            None => FeedConfig::for_environment(self.environment),
        };
        config.ping_interval = Duration::from_secs(self.ping_interval_secs);
        config.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        config.reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            max_attempts: self.reconnect.max_attempts,
            jitter: Duration::from_millis(self.reconnect.jitter_ms),
        };
        config.stale_after = self.stale_after_secs.map(Duration::from_secs);
        config.reconnect_on_stale = self.reconnect_on_stale;
        config.live_subscriptions = self.live_subscriptions;
        config.validate_events = self.validate_events;
        config
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_secs)
    }
}
