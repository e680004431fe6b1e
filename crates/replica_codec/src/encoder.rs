//! Deterministic CBOR writer.

use crate::item::Cbor;
use std::cmp::Ordering;

/// CBOR major types, as stored in the top three bits of an item head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Major {
    Unsigned = 0,
    Negative = 1,
    Bytes = 2,
    Text = 3,
    Array = 4,
    Map = 5,
    Tag = 6,
    Simple = 7,
}

impl Major {
    pub(crate) fn from_head(head: u8) -> Self {
        match head >> 5 {
            0 => Self::Unsigned,
            1 => Self::Negative,
            2 => Self::Bytes,
            3 => Self::Text,
            4 => Self::Array,
            5 => Self::Map,
            6 => Self::Tag,
            _ => Self::Simple,
        }
    }
}

const FALSE: u8 = 0xf4;
const TRUE: u8 = 0xf5;
const NULL: u8 = 0xf6;
const SINGLE: u8 = 0xfa;
const DOUBLE: u8 = 0xfb;

/// Order of two encoded map keys: shorter first, then bytewise.
pub(crate) fn key_order(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Encodes `item` into deterministic CBOR.
///
/// Heads always take the shortest argument width, map entries are written
/// in [`key_order`] of their encoded keys, and nothing is emitted with an
/// indefinite length. Floats are written at the width the item declares, so
/// a `Float32` stays single precision on the other side.
pub fn to_canonical_cbor(item: &Cbor) -> Vec<u8> {
    let mut writer = CborWriter::new();
    writer.push(item);
    writer.finish()
}

/// Appends CBOR items to a growing buffer.
#[derive(Debug, Default)]
pub struct CborWriter {
    out: Vec<u8>,
}

impl CborWriter {
    /// Starts an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one item after whatever was already written.
    pub fn push(&mut self, item: &Cbor) {
        match item {
            Cbor::Null => self.out.push(NULL),
            Cbor::Bool(flag) => self.out.push(if *flag { TRUE } else { FALSE }),
            Cbor::Integer(n) => match u64::try_from(*n) {
                Ok(n) => self.head(Major::Unsigned, n),
                // -1 - n never overflows for negative n and fits in u64
                Err(_) => self.head(Major::Negative, n.unsigned_abs() - 1),
            },
            Cbor::Unsigned(n) => self.head(Major::Unsigned, *n),
            Cbor::Float32(f) => {
                self.out.push(SINGLE);
                self.out.extend(f.to_bits().to_be_bytes());
            }
            Cbor::Float64(f) => {
                self.out.push(DOUBLE);
                self.out.extend(f.to_bits().to_be_bytes());
            }
            Cbor::Bytes(raw) => {
                self.head(Major::Bytes, raw.len() as u64);
                self.out.extend_from_slice(raw);
            }
            Cbor::Text(text) => {
                self.head(Major::Text, text.len() as u64);
                self.out.extend_from_slice(text.as_bytes());
            }
            Cbor::Array(elements) => {
                self.head(Major::Array, elements.len() as u64);
                elements.iter().for_each(|element| self.push(element));
            }
            Cbor::Map(pairs) => {
                let mut keyed: Vec<_> = pairs
                    .iter()
                    .map(|(key, value)| (to_canonical_cbor(key), value))
                    .collect();
                keyed.sort_by(|(a, _), (b, _)| key_order(a, b));

                self.head(Major::Map, keyed.len() as u64);
                for (key, value) in keyed {
                    self.out.extend_from_slice(&key);
                    self.push(value);
                }
            }
        }
    }

    /// Returns everything written so far.
    pub fn finish(self) -> Vec<u8> {
        self.out
    }

    /// Writes an item head with the narrowest argument that holds `arg`.
    fn head(&mut self, major: Major, arg: u64) {
        let top = (major as u8) << 5;
        let wide = arg.to_be_bytes();
        let width = match arg {
            0..=23 => 0,
            24..=0xff => 1,
            0x100..=0xffff => 2,
            0x1_0000..=0xffff_ffff => 4,
            _ => 8,
        };
        if width == 0 {
            // `arg` is below 24 here, so the cast is lossless
            #[allow(clippy::cast_possible_truncation)]
            self.out.push(top | arg as u8);
            return;
        }
        let info = match width {
            1 => 24,
            2 => 25,
            4 => 26,
            _ => 27,
        };
        self.out.push(top | info);
        self.out.extend_from_slice(&wide[8 - width..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(item: Cbor) -> Vec<u8> {
        to_canonical_cbor(&item)
    }

    #[test]
    fn simple_values() {
        assert_eq!(bytes(Cbor::Null), [0xf6]);
        assert_eq!(bytes(Cbor::Bool(false)), [0xf4]);
        assert_eq!(bytes(Cbor::Bool(true)), [0xf5]);
    }

    #[test]
    fn heads_use_the_narrowest_width() {
        assert_eq!(bytes(Cbor::Integer(0)), [0x00]);
        assert_eq!(bytes(Cbor::Integer(23)), [0x17]);
        assert_eq!(bytes(Cbor::Integer(24)), [0x18, 0x18]);
        assert_eq!(bytes(Cbor::Integer(255)), [0x18, 0xff]);
        assert_eq!(bytes(Cbor::Integer(256)), [0x19, 0x01, 0x00]);
        assert_eq!(bytes(Cbor::Integer(70_000)), [0x1a, 0x00, 0x01, 0x11, 0x70]);
        assert_eq!(
            bytes(Cbor::Integer(1 << 32)),
            [0x1b, 0, 0, 0, 1, 0, 0, 0, 0]
        );
    }

    #[test]
    fn negatives_store_minus_one_minus_n() {
        assert_eq!(bytes(Cbor::Integer(-1)), [0x20]);
        assert_eq!(bytes(Cbor::Integer(-24)), [0x37]);
        assert_eq!(bytes(Cbor::Integer(-25)), [0x38, 0x18]);
        let mut min = vec![0x3b];
        min.extend(i64::MAX.to_be_bytes());
        assert_eq!(bytes(Cbor::Integer(i64::MIN)), min);
    }

    #[test]
    fn unsigned_above_i64() {
        let mut max = vec![0x1b];
        max.extend(u64::MAX.to_be_bytes());
        assert_eq!(bytes(Cbor::Unsigned(u64::MAX)), max);
    }

    #[test]
    fn float_width_is_preserved() {
        assert_eq!(bytes(Cbor::Float32(1.5)), [0xfa, 0x3f, 0xc0, 0x00, 0x00]);
        assert_eq!(
            bytes(Cbor::Float64(1.5)),
            [0xfb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn byte_and_text_strings() {
        assert_eq!(bytes(Cbor::Bytes(vec![7, 8])), [0x42, 7, 8]);
        assert_eq!(bytes(Cbor::from("key")), [0x63, b'k', b'e', b'y']);
        assert_eq!(bytes(Cbor::Array(vec![])), [0x80]);
    }

    #[test]
    fn map_entries_follow_key_order() {
        let map = Cbor::Map(vec![
            (Cbor::from("bb"), Cbor::Integer(2)),
            (Cbor::Integer(-1), Cbor::Null),
            (Cbor::from("a"), Cbor::Integer(1)),
        ]);
        assert_eq!(
            bytes(map),
            [0xa3, 0x20, 0xf6, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]
        );
    }

    #[test]
    fn writer_appends_items() {
        let mut writer = CborWriter::new();
        writer.push(&Cbor::Integer(1));
        writer.push(&Cbor::Null);
        assert_eq!(writer.finish(), [0x01, 0xf6]);
    }
}
