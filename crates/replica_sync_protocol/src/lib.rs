//! # Replica Sync Protocol
//!
//! Wire data model for Replica synchronization.
//!
//! This crate provides:
//! - `Value` for scalar leaves
//! - `Key`, `Entry` and `PathCursor` for path-addressed change records
//! - Protocol messages (Control, Pull) and the `Frame` envelope
//! - CBOR encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entry;
mod messages;
mod path;
mod value;

pub use entry::{entries_equal, Entry, Op};
pub use messages::{
    CallKind, ControlAction, ControlMessage, ControlReply, Frame, PullMode, PullRequest,
    ReplyStatus, StatusCode,
};
pub use path::{Key, PathCursor};
pub use replica_codec::{CodecError, CodecResult, FromCbor, ToCbor};
pub use value::{Value, COMPLEX32_LEN, COMPLEX64_LEN};
