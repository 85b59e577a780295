//! logwall agent: tails rotating log files, samples host and tunnel
//! metrics, and streams both to authenticated WebSocket subscribers.
//!
//! A single background [`poll::Poller`] drives everything: each tick it
//! resolves the current file per prefix, emits appended bytes as
//! `log_update` events, then publishes a `stats` sample and a `tables`
//! snapshot. The [`broadcast::Broadcaster`] fans those out; a new subscriber
//! first receives an `init` snapshot consistent with the stream that follows.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod http;
pub mod poll;
pub mod probe;
#[cfg(target_os = "linux")]
pub mod procnet;
pub mod router;
pub mod sampler;
pub mod selector;
pub mod server;
pub mod session;
pub mod state;
pub mod tables;
pub mod tail;
pub mod types;
pub mod ws;

pub use config::{AgentConfig, CliArgs, Settings};
pub use error::{AgentError, Result};
pub use router::build_router;
pub use state::AppState;
