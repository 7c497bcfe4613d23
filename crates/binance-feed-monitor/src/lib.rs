/*
[INPUT]:  Public API exports for binance-feed-monitor crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod metrics;
pub mod monitor;

// Re-export main types for convenience
pub use config::{MonitorConfig, SubscriptionConfig};
pub use metrics::FeedMetrics;
pub use monitor::FeedMonitor;
