//! # Replica Codec
//!
//! The byte format behind every Replica wire message: a deterministic
//! subset of CBOR (RFC 8949).
//!
//! Equal [`Cbor`] trees always encode to equal bytes. The writer picks the
//! narrowest head for every integer and length, orders map entries by their
//! encoded keys (shorter keys first, then bytewise) and never emits
//! indefinite lengths. The reader accepts exactly that subset and refuses
//! anything else, so a successful decode followed by an encode reproduces
//! the input.
//!
//! Floats are not narrowed: a single-precision item stays single precision
//! and a double stays double, bit for bit, NaN payloads included.
//!
//! ```
//! use replica_codec::{from_cbor, to_canonical_cbor, Cbor};
//!
//! let item = Cbor::text_map([("version", Cbor::Integer(1))]);
//! let bytes = to_canonical_cbor(&item);
//! assert_eq!(from_cbor(&bytes).unwrap(), item);
//! ```
//!
//! Message types implement [`ToCbor`] and [`FromCbor`] to move between
//! their Rust shape and the item tree.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod item;

pub use decoder::{from_cbor, CborReader, MAX_DEPTH};
pub use encoder::{to_canonical_cbor, CborWriter};
pub use error::{CodecError, CodecResult};
pub use item::Cbor;

/// A value with a CBOR item form.
pub trait ToCbor {
    /// The item tree for this value.
    fn to_cbor(&self) -> Cbor;

    /// The value as deterministic CBOR bytes.
    fn encode(&self) -> Vec<u8> {
        to_canonical_cbor(&self.to_cbor())
    }
}

/// A value that can be read back from its CBOR item form.
pub trait FromCbor: Sized {
    /// Rebuilds the value from an item tree.
    fn from_cbor(item: &Cbor) -> CodecResult<Self>;

    /// Decodes bytes and rebuilds the value from the single item they hold.
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes).and_then(|item| Self::from_cbor(&item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_item() -> impl Strategy<Value = Cbor> {
        let scalar = prop_oneof![
            Just(Cbor::Null),
            any::<bool>().prop_map(Cbor::Bool),
            any::<i64>().prop_map(Cbor::Integer),
            (1u64 << 63..=u64::MAX).prop_map(Cbor::Unsigned),
            any::<f32>()
                .prop_filter("NaN is not equal to itself", |f| !f.is_nan())
                .prop_map(Cbor::Float32),
            any::<f64>()
                .prop_filter("NaN is not equal to itself", |f| !f.is_nan())
                .prop_map(Cbor::Float64),
            prop::collection::vec(any::<u8>(), 0..12).prop_map(Cbor::Bytes),
            "[a-z0-9]{0,6}".prop_map(Cbor::Text),
        ];
        scalar.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Cbor::Array),
                prop::collection::vec((any::<i64>().prop_map(Cbor::Integer), inner), 0..4)
                    .prop_map(|pairs| {
                        let mut pairs = pairs;
                        pairs.sort_by(|a, b| a.0.cmp_canonical(&b.0));
                        pairs.dedup_by(|a, b| a.0 == b.0);
                        Cbor::Map(pairs)
                    }),
            ]
        })
    }

    proptest! {
        #[test]
        fn decoding_recovers_the_item(item in any_item()) {
            let bytes = to_canonical_cbor(&item);
            prop_assert_eq!(from_cbor(&bytes).unwrap(), item);
        }

        #[test]
        fn reencoding_reproduces_the_bytes(item in any_item()) {
            let bytes = to_canonical_cbor(&item);
            let again = to_canonical_cbor(&from_cbor(&bytes).unwrap());
            prop_assert_eq!(again, bytes);
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = from_cbor(&bytes);
        }

        #[test]
        fn nesting_past_the_limit_is_refused(depth in 0usize..4 * MAX_DEPTH) {
            let mut item = Cbor::Null;
            for _ in 0..depth {
                item = Cbor::Array(vec![item]);
            }
            let decoded = from_cbor(&to_canonical_cbor(&item));
            if depth <= MAX_DEPTH {
                prop_assert_eq!(decoded.unwrap(), item);
            } else {
                prop_assert_eq!(decoded, Err(CodecError::NestingTooDeep { max: MAX_DEPTH }));
            }
        }
    }
}
