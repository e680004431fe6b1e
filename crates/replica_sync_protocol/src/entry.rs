//! Change records.

use crate::path::{Key, PathCursor};
use crate::value::Value;
use replica_codec::{Cbor, CodecError, CodecResult, FromCbor, ToCbor};
use std::fmt;

/// What a change record does to its leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Set the leaf to this value.
    Set(Value),
    /// Remove the leaf.
    ///
    /// On a sequence with an index this truncates to that index; on a map it
    /// deletes the key; without an index it clears the whole field.
    Remove,
}

/// One leaf-level mutation addressed by a root-to-leaf path.
///
/// The first key's name is the root type identifier. Receivers reject entries
/// whose root does not match the type they hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Keys from root to leaf.
    pub path: Vec<Key>,
    /// The mutation.
    pub op: Op,
}

impl Entry {
    /// Creates a set entry.
    pub fn set(path: Vec<Key>, value: impl Into<Value>) -> Self {
        Self {
            path,
            op: Op::Set(value.into()),
        }
    }

    /// Creates a remove entry.
    pub fn remove(path: Vec<Key>) -> Self {
        Self {
            path,
            op: Op::Remove,
        }
    }

    /// Returns the root type identifier.
    pub fn root_name(&self) -> Option<&str> {
        self.path.first().map(|key| key.name.as_str())
    }

    /// Returns true for remove entries.
    pub fn is_remove(&self) -> bool {
        matches!(self.op, Op::Remove)
    }

    /// Returns the value of a set entry.
    pub fn value(&self) -> Option<&Value> {
        match &self.op {
            Op::Set(value) => Some(value),
            Op::Remove => None,
        }
    }

    /// Returns a cursor positioned at the root key.
    pub fn cursor(&self) -> PathCursor<'_> {
        PathCursor::new(&self.path)
    }
}

/// Positional, structural equality of two entry lists.
pub fn entries_equal(a: &[Entry], b: &[Entry]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{key}")?;
        }
        match &self.op {
            Op::Set(value) => write!(f, " = {value}"),
            Op::Remove => f.write_str(" (remove)"),
        }
    }
}

impl ToCbor for Entry {
    fn to_cbor(&self) -> Cbor {
        let path = Cbor::Array(self.path.iter().map(ToCbor::to_cbor).collect());
        let mut pairs = vec![("path", path)];
        match &self.op {
            Op::Set(value) => pairs.push(("value", value.to_cbor())),
            Op::Remove => pairs.push(("remove", Cbor::Bool(true))),
        }
        Cbor::text_map(pairs)
    }
}

impl FromCbor for Entry {
    fn from_cbor(item: &Cbor) -> CodecResult<Self> {
        let path = item
            .get("path")
            .and_then(Cbor::as_array)
            .ok_or_else(|| CodecError::missing_field("path"))?
            .iter()
            .map(Key::from_cbor)
            .collect::<CodecResult<Vec<_>>>()?;
        if path.is_empty() {
            return Err(CodecError::invalid_structure("entry path is empty"));
        }

        let remove = item.get("remove").and_then(Cbor::as_bool).unwrap_or(false);
        let op = match (item.get("value"), remove) {
            (Some(value), false) => Op::Set(Value::from_cbor(value)?),
            (None, true) => Op::Remove,
            (Some(_), true) => {
                return Err(CodecError::invalid_structure(
                    "entry carries both a value and remove",
                ));
            }
            (None, false) => {
                return Err(CodecError::invalid_structure(
                    "entry carries neither a value nor remove",
                ));
            }
        };
        Ok(Self { path, op })
    }
}
