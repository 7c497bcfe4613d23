/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Binance market-data adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod config;
pub mod error;
pub mod types;
pub mod ws;

pub use config::{Environment, FeedConfig};
pub use error::{FeedError, Result};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    BinanceWebSocket,
    ConnectionState,
    DispatchOutcome,
    Dispatcher,
    DropReason,
    ReconnectPolicy,
    StreamHealth,
    StreamKind,
    SubscriptionRegistry,
    stream_id,
};
