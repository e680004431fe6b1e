//! # Replica Sync Server
//!
//! Serves one coordinator's value to Replica peers.
//!
//! This crate provides:
//! - `SyncServer`, answering Control, Pull, Push and PushPull calls
//! - `TcpServer`, the accept loop exposing any `SyncTransport` over TCP
//! - `ServerConfig` and the advertised `SessionSettings`
//!
//! # Protocol
//!
//! - `Control(Ping)` replies `Ok`; `Control(Shutdown)` ends every active
//!   push-pull session while the server keeps accepting new ones.
//! - `Pull(Init)` resets the change tracker and streams the full state;
//!   `Pull(Changes)` streams what changed since the previous pull;
//!   `Pull(Settings)` streams the advertised session settings.
//! - `Push` applies every entry it receives, best-effort.
//! - `PushPull` runs a session with its own change tracker, so concurrent
//!   sessions do not steal each other's changes.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod server;
mod tcp;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use replica_sync_engine::SessionSettings;
pub use server::SyncServer;
pub use tcp::{ServerHandle, TcpServer};
