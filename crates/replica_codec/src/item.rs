//! Dynamic CBOR item tree.

use crate::encoder::{key_order, to_canonical_cbor};
use std::cmp::Ordering;

/// A dynamic CBOR item.
///
/// Unlike a float-free canonical profile, replicated state routinely carries
/// floats and full-range unsigned integers, so both are representable here.
#[derive(Debug, Clone, PartialEq)]
pub enum Cbor {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Unsigned integer above `i64::MAX`.
    ///
    /// Smaller non-negative values always decode as [`Cbor::Integer`].
    Unsigned(u64),
    /// Single-precision float.
    Float32(f32),
    /// Double-precision float.
    Float64(f64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Array of items.
    Array(Vec<Cbor>),
    /// Key-value pairs, written in key order whatever order they are held in.
    Map(Vec<(Cbor, Cbor)>),
}

impl Cbor {
    /// Create a map item with sorted keys.
    ///
    /// Keys are sorted by their canonical CBOR encoding.
    pub fn map(mut pairs: Vec<(Cbor, Cbor)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp_canonical(&b.0));
        Cbor::Map(pairs)
    }

    /// Create a map item from text keys.
    pub fn text_map<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Cbor)>,
        K: Into<String>,
    {
        Self::map(
            pairs
                .into_iter()
                .map(|(k, v)| (Cbor::Text(k.into()), v))
                .collect(),
        )
    }

    /// Create an unsigned integer item, picking the integer variant when it fits.
    pub fn unsigned(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => Cbor::Integer(n),
            Err(_) => Cbor::Unsigned(n),
        }
    }

    /// Compare two items for canonical ordering.
    ///
    /// Canonical CBOR orders map keys by their encoded bytes, length first and
    /// then bytewise.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        key_order(&to_canonical_cbor(self), &to_canonical_cbor(other))
    }

    /// Check if this item is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Cbor::Null)
    }

    /// Get this item as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cbor::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this item as a signed integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Cbor::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this item as an unsigned integer, if it is a non-negative integer.
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Cbor::Integer(n) => u64::try_from(*n).ok(),
            Cbor::Unsigned(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this item as a single-precision float.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Cbor::Float32(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this item as a double-precision float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cbor::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this item as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Cbor::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this item as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cbor::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this item as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Cbor]> {
        match self {
            Cbor::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this item as a map, if it is one.
    pub fn as_map(&self) -> Option<&[(Cbor, Cbor)]> {
        match self {
            Cbor::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a text key in this map item.
    pub fn get(&self, key: &str) -> Option<&Cbor> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }
}

impl From<bool> for Cbor {
    fn from(b: bool) -> Self {
        Cbor::Bool(b)
    }
}

impl From<i64> for Cbor {
    fn from(n: i64) -> Self {
        Cbor::Integer(n)
    }
}

impl From<u64> for Cbor {
    fn from(n: u64) -> Self {
        Cbor::unsigned(n)
    }
}

impl From<u8> for Cbor {
    fn from(n: u8) -> Self {
        Cbor::Integer(i64::from(n))
    }
}

impl From<String> for Cbor {
    fn from(s: String) -> Self {
        Cbor::Text(s)
    }
}

impl From<&str> for Cbor {
    fn from(s: &str) -> Self {
        Cbor::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Cbor {
    fn from(b: Vec<u8>) -> Self {
        Cbor::Bytes(b)
    }
}

impl From<Vec<Cbor>> for Cbor {
    fn from(v: Vec<Cbor>) -> Self {
        Cbor::Array(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keys_are_sorted() {
        let map = Cbor::text_map([
            ("z", Cbor::Integer(1)),
            ("a", Cbor::Integer(2)),
            ("m", Cbor::Integer(3)),
        ]);

        let pairs = map.as_map().unwrap();
        assert_eq!(pairs[0].0, Cbor::from("a"));
        assert_eq!(pairs[1].0, Cbor::from("m"));
        assert_eq!(pairs[2].0, Cbor::from("z"));
    }

    #[test]
    fn map_key_length_ordering() {
        // "ab" encodes shorter than "abc"
        let map = Cbor::text_map([
            ("abc", Cbor::Integer(1)),
            ("a", Cbor::Integer(2)),
            ("ab", Cbor::Integer(3)),
        ]);

        let pairs = map.as_map().unwrap();
        assert_eq!(pairs[0].0, Cbor::from("a"));
        assert_eq!(pairs[1].0, Cbor::from("ab"));
        assert_eq!(pairs[2].0, Cbor::from("abc"));
    }

    #[test]
    fn integer_ordering() {
        let mut sorted = vec![
            Cbor::Integer(-1),
            Cbor::Integer(0),
            Cbor::Integer(300),
            Cbor::Integer(-2),
            Cbor::Integer(2),
        ];
        sorted.sort_by(Cbor::cmp_canonical);

        assert_eq!(
            sorted,
            vec![
                Cbor::Integer(0),
                Cbor::Integer(2),
                Cbor::Integer(-1),
                Cbor::Integer(-2),
                Cbor::Integer(300),
            ]
        );
    }

    #[test]
    fn unsigned_picks_integer_when_it_fits() {
        assert_eq!(Cbor::unsigned(7), Cbor::Integer(7));
        assert_eq!(Cbor::unsigned(u64::MAX), Cbor::Unsigned(u64::MAX));
        assert_eq!(Cbor::Integer(7).as_unsigned(), Some(7));
        assert_eq!(Cbor::Integer(-7).as_unsigned(), None);
    }

    #[test]
    fn map_get() {
        let map = Cbor::text_map([("name", Cbor::from("Alice")), ("age", Cbor::Integer(30))]);

        assert_eq!(map.get("name"), Some(&Cbor::from("Alice")));
        assert_eq!(map.get("age"), Some(&Cbor::Integer(30)));
        assert_eq!(map.get("missing"), None);
    }
}
