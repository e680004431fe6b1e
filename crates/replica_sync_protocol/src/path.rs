//! Path segments and incremental path consumption.

use crate::value::Value;
use replica_codec::{Cbor, CodecError, CodecResult, FromCbor, ToCbor};
use std::fmt;

/// One step in a change record's path.
///
/// A key names a field and carries zero or more container indices. Nested
/// containers under one field (a vector of vectors, a map of vectors) add
/// indices to the same key instead of starting a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Field name, or the root type identifier for the first key.
    pub name: String,
    /// Container indices, outermost first.
    pub indices: Vec<Value>,
}

impl Key {
    /// Creates a key without indices.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indices: Vec::new(),
        }
    }

    /// Adds an index to this key.
    #[must_use]
    pub fn with_index(mut self, index: impl Into<Value>) -> Self {
        self.indices.push(index.into());
        self
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for index in &self.indices {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

impl ToCbor for Key {
    fn to_cbor(&self) -> Cbor {
        let mut pairs = vec![("name", Cbor::Text(self.name.clone()))];
        if !self.indices.is_empty() {
            pairs.push((
                "index",
                Cbor::Array(self.indices.iter().map(ToCbor::to_cbor).collect()),
            ));
        }
        Cbor::text_map(pairs)
    }
}

impl FromCbor for Key {
    fn from_cbor(item: &Cbor) -> CodecResult<Self> {
        if item.as_map().is_none() {
            return Err(CodecError::invalid_structure("key must be a map"));
        }
        let name = item
            .get("name")
            .and_then(Cbor::as_text)
            .ok_or_else(|| CodecError::missing_field("name"))?
            .to_string();
        let indices = match item.get("index") {
            None => Vec::new(),
            Some(list) => list
                .as_array()
                .ok_or_else(|| CodecError::invalid_structure("index must be an array"))?
                .iter()
                .map(Value::from_cbor)
                .collect::<CodecResult<_>>()?,
        };
        Ok(Self { name, indices })
    }
}

/// A cursor consuming a path one key and one index at a time.
///
/// The cursor starts on the first key with no indices consumed. Receivers
/// always start at zero, so the cursor is never transmitted.
#[derive(Debug, Clone)]
pub struct PathCursor<'a> {
    path: &'a [Key],
    key: usize,
    index: usize,
}

impl<'a> PathCursor<'a> {
    /// Creates a cursor at the start of `path`.
    pub fn new(path: &'a [Key]) -> Self {
        Self {
            path,
            key: 0,
            index: 0,
        }
    }

    /// Returns the current key, if any.
    pub fn key(&self) -> Option<&'a Key> {
        self.path.get(self.key)
    }

    /// Consumes the next index of the current key.
    pub fn next_index(&mut self) -> Option<&'a Value> {
        let value = self.key()?.indices.get(self.index)?;
        self.index += 1;
        Some(value)
    }

    /// Returns true when the current key still has unconsumed indices.
    pub fn has_pending_index(&self) -> bool {
        self.key()
            .is_some_and(|key| self.index < key.indices.len())
    }

    /// Returns the unconsumed indices of the current key.
    pub fn pending_indices(&self) -> &'a [Value] {
        match self.key() {
            Some(key) => key.indices.get(self.index..).unwrap_or(&[]),
            None => &[],
        }
    }

    /// Moves to the next key and returns it.
    ///
    /// Unconsumed indices of the current key are skipped.
    pub fn advance(&mut self) -> Option<&'a Key> {
        if self.key < self.path.len() {
            self.key += 1;
        }
        self.index = 0;
        self.key()
    }

    /// Returns true when there is no further key and no pending index.
    pub fn is_exhausted(&self) -> bool {
        !self.has_pending_index() && self.key + 1 >= self.path.len()
    }

    /// Renders the consumed part of the path, for error messages.
    pub fn position(&self) -> String {
        let mut out = String::new();
        for (i, key) in self.path.iter().enumerate().take(self.key + 1) {
            if i > 0 {
                out.push('.');
            }
            out.push_str(&key.name);
            let consumed = if i == self.key {
                self.index
            } else {
                key.indices.len()
            };
            for index in key.indices.iter().take(consumed) {
                out.push_str(&format!("[{index}]"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Key> {
        vec![
            Key::new("Root"),
            Key::new("grid").with_index(1u64).with_index(2u64),
            Key::new("name"),
        ]
    }

    #[test]
    fn cursor_walks_keys_and_indices() {
        let path = sample();
        let mut cursor = PathCursor::new(&path);

        assert_eq!(cursor.key().unwrap().name, "Root");
        assert!(!cursor.has_pending_index());
        assert!(!cursor.is_exhausted());

        assert_eq!(cursor.advance().unwrap().name, "grid");
        assert_eq!(cursor.pending_indices().len(), 2);
        assert_eq!(cursor.next_index(), Some(&Value::U64(1)));
        assert!(cursor.has_pending_index());
        assert_eq!(cursor.next_index(), Some(&Value::U64(2)));
        assert_eq!(cursor.next_index(), None);
        assert_eq!(cursor.position(), "Root.grid[1u][2u]");

        assert_eq!(cursor.advance().unwrap().name, "name");
        assert!(cursor.is_exhausted());
        assert!(cursor.advance().is_none());
    }

    #[test]
    fn exhausted_waits_for_indices() {
        let path = vec![Key::new("Root").with_index(0u64)];
        let mut cursor = PathCursor::new(&path);
        assert!(!cursor.is_exhausted());
        cursor.next_index();
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn key_wire_form() {
        for key in sample() {
            assert_eq!(Key::decode(&key.encode()).unwrap(), key);
        }
        assert!(Key::from_cbor(&Cbor::Integer(1)).is_err());
    }

    #[test]
    fn key_display() {
        let key = Key::new("tags").with_index("a").with_index(3i64);
        assert_eq!(key.to_string(), "tags[\"a\"][3]");
    }
}
