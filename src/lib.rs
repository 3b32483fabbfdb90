//! Ingestion and race reconstruction for Forza Motorsport UDP telemetry.
//!
//! Forza's "Data Out" feature streams one fixed-layout datagram per physics
//! tick (about 60Hz) to a configured address. This crate listens for those
//! datagrams, keeps one session per sending endpoint and segments each
//! session's stream into races, persisting races and samples through a
//! pluggable [`Store`].
//!
//! # Features
//!
//! - **Non-blocking ingestion**: the receive loop never waits on a session,
//!   overloaded sessions drop samples instead
//! - **Race segmentation**: start, pause, resume and finish detected from the
//!   game's own clocks
//! - **Periodic checkpoints**: samples are buffered and flushed in batches
//! - **Graceful shutdown**: every open race is flushed and finished within a
//!   deadline
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use forza_telemetry::{Server, ServerConfig, storage::MemoryStore};
//! use futures::StreamExt;
//! use std::{sync::Arc, time::Duration};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new("0.0.0.0:8000", Duration::from_secs(5));
//!     let server = Arc::new(Server::new(config, Arc::new(MemoryStore::new())));
//!
//!     let mut events = Box::pin(server.race_events());
//!     let listener = server.clone();
//!     tokio::spawn(async move { listener.listen_and_process().await });
//!
//!     while let Some(event) = events.next().await {
//!         println!("{:?} race {}", event, event.race().id);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
mod error;
pub mod listener;
pub mod packet;
pub mod session;
pub mod storage;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub use config::{AppConfig, ServerConfig, StorageConfig};
pub use error::*;
pub use listener::Server;
pub use storage::Store;
pub use types::*;
