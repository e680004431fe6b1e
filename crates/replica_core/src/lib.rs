//! # Replica Core
//!
//! Structural diffing and patching for Replica.
//!
//! This crate provides:
//! - Shape-dispatch reflection (`Reflect`, `Shape`, `ShapeMut`)
//! - The diff-extraction engine (`Extractor`, `Diff`)
//! - The patch-injection engine (`Injector`, `BatchReport`)
//! - The `Coordinator` binding both to one shared value, with debounced
//!   change callbacks
//! - `Scope` for cooperative cancellation
//!
//! ## Round trip
//!
//! ```
//! use replica_core::{reflect_struct, Extractor, Injector};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Doc {
//!     title: String,
//!     items: Vec<i32>,
//! }
//!
//! reflect_struct!(Doc { title, items });
//!
//! let doc = Doc { title: "a".into(), items: vec![1, 0] };
//! let entries = Extractor::new().entries(&doc);
//!
//! let mut replica = Doc::default();
//! let report = Injector::new().apply_all(&mut replica, &entries);
//! assert!(report.is_clean());
//! assert_eq!(replica, doc);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod diff;
mod error;
mod extract;
mod inject;
pub mod reflect;
mod scope;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorGuard};
pub use diff::{Diff, DiffNode, Step};
pub use error::{ConvertError, CoreError, CoreResult};
pub use extract::{compute, compute_full, Extractor};
pub use inject::{BatchReport, Injector};
pub use reflect::{
    deep_eq, Dynamic, DynamicSlot, FloatKey, MapSlot, Opaque, OptionalSlot, Reflect, Scalar,
    ScalarSlot, SequenceSlot, Shape, ShapeMut,
};
pub use replica_sync_protocol::{Entry, Key, Op, Value};
pub use scope::Scope;
