//! Pooled async client for Skyhash key-value servers.
//!
//! The client multiplexes typed commands over a bounded pool of
//! persistent TCP (optionally TLS) connections, recovers from transient
//! network faults with jittered backoff, and batches commands into a
//! single round-trip through [`Pipeline`].
//!
//! ```ignore
//! use skyhash_client::{Client, Options};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), skyhash_client::Error> {
//!     let client = Client::new(Options {
//!         addr: "localhost:2003".into(),
//!         ..Options::default()
//!     });
//!
//!     client.set("key", "value").await?;
//!     assert_eq!(client.get("key").await?, "value");
//!
//!     match client.get("missing").await {
//!         Err(err) if err.is_nil() => {} // no such key
//!         other => panic!("unexpected: {other:?}"),
//!     }
//!     client.close()?;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod conn;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod options;
pub mod pipeline;
pub mod pool;

mod client;
mod commands;

#[cfg(test)]
mod tests;

pub use client::{Client, ConnClient};
pub use command::{first_command_error, Cmd};
pub use conn::Stream;
pub use error::Error;
pub use hooks::Hook;
pub use metrics::PoolMetrics;
pub use options::{CredentialsProvider, Dialer, Limiter, OnConnect, Options};
pub use pipeline::Pipeline;
pub use pool::PoolStats;

pub use skyhash_proto::{Arg, ProtocolError, ServerError, Value};
