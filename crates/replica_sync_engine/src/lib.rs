//! # Replica Sync Engine
//!
//! Peer synchronization for Replica.
//!
//! This crate provides:
//! - The `SyncTransport` contract (control, pull, push, push-pull)
//! - `Streaming` entry streams
//! - A TCP transport with length-prefixed CBOR framing
//! - The client `Connection` with heartbeat supervision
//! - The push-pull session loops shared with the server
//!
//! ## Architecture
//!
//! A peer exposes four calls. `Control` carries pings and remote shutdown.
//! `Pull` streams either the peer's full state, its changes since the last
//! pull, or its session settings. `Push` streams local changes to the peer.
//! `PushPull` keeps both directions open: each side diffs its own state on a
//! poll interval and applies what the other side sends.
//!
//! No call is retried inside this crate. Callers decide what to do with an
//! unavailable peer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod session;
mod tcp;
mod transport;
pub mod wire;

pub use client::Connection;
pub use config::{SessionSettings, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use session::run_push_pull;
pub use tcp::TcpTransport;
pub use transport::{MockTransport, StreamSender, Streaming, SyncTransport};
