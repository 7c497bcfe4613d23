/*
[INPUT]:  FeedConfig and consumer subscriptions
[OUTPUT]: Normalized market events delivered to callbacks over one combined-stream socket
[POS]:    WebSocket layer - real-time market data streams
[UPDATE]: When adding stream kinds or changing connection logic
*/

pub mod backoff;
pub mod client;
pub mod dispatcher;
pub mod message;
pub mod normalize;
pub mod registry;

pub use backoff::ReconnectPolicy;
pub use client::{BinanceWebSocket, ConnectionState, StreamHealth};
pub use dispatcher::{DispatchOutcome, Dispatcher, DropReason};
pub use registry::{Callback, Handler, Route, StreamKind, SubscriptionRegistry, stream_id};
