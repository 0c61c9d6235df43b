//! Flurry Broker Core
//!
//! This crate provides the rendezvous core of the flurry broker. The broker
//! pairs censored clients with volunteer WebRTC proxies ("snowflakes") for a
//! single signaling exchange: a proxy long-polls for work, a client posts an
//! offer and blocks for the answer, and the proxy later posts the answer
//! against its session id. Nothing survives a restart; every exchange is a
//! short-lived in-memory rendezvous.
//!
//! # Architecture
//!
//! The broker keeps all signaling payloads opaque. Its responsibilities are:
//!
//! 1. **Availability tracking**: registry of polling proxies, ordered by load
//! 2. **Admission**: a single serialiser task registers polling proxies
//! 3. **Matching**: hand each client offer to the least-loaded proxy
//! 4. **Answer routing**: deliver answers back by proxy session id
//!
//! # Key Design Decisions
//!
//! ## One serialiser, one lock
//!
//! Proxy admission funnels through an unbounded channel drained by exactly
//! one serialiser task; pops and session lookups go through a single state
//! mutex that is never held across an await point. The registry and session
//! index therefore always mutate under one linearisation.
//!
//! ## Single-slot inboxes
//!
//! Each proxy record carries a capacity-1 offer inbox and a capacity-1
//! answer inbox. A record receives at most one offer and one answer in its
//! lifetime, so sends never block, and a payload sent after the receiver has
//! resigned sits in the buffer until the record is dropped. Timeouts are the
//! sole cancellation mechanism; tasks never interrupt each other.
//!
//! # Example
//!
//! ```no_run
//! use flurry_broker::{ops, BrokerConfig, BrokerContext};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let ctx = BrokerContext::new(BrokerConfig::default());
//! ctx.spawn();
//!
//! // A volunteer proxy polls for a client to serve:
//! let outcome = ops::proxy_poll(&ctx, "session-1").await;
//! # let _ = outcome;
//! # }
//! ```

pub mod config;
pub mod context;
pub mod heap;
pub mod ops;
pub mod snowflake;

pub use config::BrokerConfig;
pub use context::BrokerContext;
pub use heap::SnowflakeHeap;
pub use ops::{AnswerOutcome, ClientOutcome, PollOutcome};
pub use snowflake::{PendingProxy, Snowflake};
