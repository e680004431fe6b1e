//! # Replica Testkit
//!
//! Test utilities for Replica.
//!
//! This crate provides:
//! - Fixture record types covering every reflected shape
//! - Property-based test generators using proptest
//! - A harness running a sync server with TCP and in-process clients
//! - `init_tracing()` for readable test logs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use replica_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn replicate() {
//!     init_tracing();
//!     let harness = SyncHarness::start(sample_inventory()).await;
//!     let (client, data) = harness.tcp_client(Inventory::default()).await;
//!     client.pull_init().await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::logging::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use logging::*;
