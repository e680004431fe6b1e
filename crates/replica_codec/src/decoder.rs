//! Strict CBOR reader.
//!
//! Only the deterministic subset produced by the writer is accepted: heads
//! must use the narrowest width, map keys must arrive in key order, and
//! indefinite lengths are refused.

use crate::encoder::{key_order, Major};
use crate::error::{CodecError, CodecResult};
use crate::item::Cbor;
use std::cmp::Ordering;

/// Upper bound on the element count an array or map head may claim.
const MAX_ELEMENTS: u64 = 1 << 24;

/// Upper bound on the length a byte or text string head may claim.
const MAX_STRING_LEN: u64 = 1 << 28;

/// Deepest nesting of arrays, maps and tags accepted in one item.
pub const MAX_DEPTH: usize = 64;

/// Decodes exactly one item from `bytes`.
///
/// # Errors
///
/// Fails on anything outside the deterministic subset, on truncated input,
/// and when bytes remain after the item.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Cbor> {
    let mut reader = CborReader::new(bytes);
    let item = reader.next_item()?;
    match reader.rest().len() {
        0 => Ok(item),
        remaining => Err(CodecError::TrailingBytes { remaining }),
    }
}

/// Cursor over a CBOR byte slice.
#[derive(Debug)]
pub struct CborReader<'a> {
    input: &'a [u8],
    offset: usize,
    depth: usize,
}

impl<'a> CborReader<'a> {
    /// Starts reading at the beginning of `input`.
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            depth: 0,
        }
    }

    /// Bytes not yet consumed.
    pub fn rest(&self) -> &'a [u8] {
        &self.input[self.offset..]
    }

    /// Reads the next complete item.
    pub fn next_item(&mut self) -> CodecResult<Cbor> {
        let head = self.take(1)?[0];
        let info = head & 0x1f;

        match Major::from_head(head) {
            Major::Unsigned => self.argument(info).map(Cbor::unsigned),
            Major::Negative => {
                let n = i64::try_from(self.argument(info)?)
                    .map_err(|_| CodecError::IntegerOverflow)?;
                Ok(Cbor::Integer(-1 - n))
            }
            Major::Bytes => Ok(Cbor::Bytes(self.string(info)?.to_vec())),
            Major::Text => {
                let raw = self.string(info)?;
                let text = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Cbor::Text(text.to_owned()))
            }
            Major::Array => self.nested(|reader| reader.array(info)),
            Major::Map => self.nested(|reader| reader.map(info)),
            Major::Tag => {
                // Tags have no meaning here; the tagged content stands alone.
                self.argument(info)?;
                self.nested(Self::next_item)
            }
            Major::Simple => self.simple(info),
        }
    }

    /// Runs `read` one nesting level deeper, refusing to go past [`MAX_DEPTH`].
    fn nested(
        &mut self,
        read: impl FnOnce(&mut Self) -> CodecResult<Cbor>,
    ) -> CodecResult<Cbor> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::NestingTooDeep { max: MAX_DEPTH });
        }
        self.depth += 1;
        let item = read(self);
        self.depth -= 1;
        item
    }

    fn array(&mut self, info: u8) -> CodecResult<Cbor> {
        let count = self.count(info, MAX_ELEMENTS)?;
        let mut elements = Vec::with_capacity(count.min(self.rest().len()));
        for _ in 0..count {
            elements.push(self.next_item()?);
        }
        Ok(Cbor::Array(elements))
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let input = self.input;
        let start = self.offset;
        let slice = start
            .checked_add(len)
            .and_then(|end| input.get(start..end))
            .ok_or(CodecError::UnexpectedEof)?;
        self.offset += len;
        Ok(slice)
    }

    fn fixed<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads the head argument that follows `info`, enforcing the
    /// narrowest width.
    fn argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, floor) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.fixed::<1>()?[0]), 24),
            25 => (u64::from(u16::from_be_bytes(self.fixed()?)), 0x100),
            26 => (u64::from(u32::from_be_bytes(self.fixed()?)), 0x1_0000),
            27 => (u64::from_be_bytes(self.fixed()?), 0x1_0000_0000),
            28..=30 => return Err(CodecError::invalid_structure("reserved head argument")),
            _ => return Err(CodecError::IndefiniteLengthForbidden),
        };
        if value < floor {
            return Err(CodecError::invalid_structure(format!(
                "overlong head for argument {value}"
            )));
        }
        Ok(value)
    }

    fn count(&mut self, info: u8, limit: u64) -> CodecResult<usize> {
        let claimed = self.argument(info)?;
        if claimed > limit {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed: limit,
            });
        }
        usize::try_from(claimed).map_err(|_| CodecError::IntegerOverflow)
    }

    fn string(&mut self, info: u8) -> CodecResult<&'a [u8]> {
        let len = self.count(info, MAX_STRING_LEN)?;
        self.take(len)
    }

    fn map(&mut self, info: u8) -> CodecResult<Cbor> {
        let count = self.count(info, MAX_ELEMENTS)?;
        let mut pairs = Vec::with_capacity(count.min(self.rest().len()));
        let input = self.input;
        let mut last_key: Option<&'a [u8]> = None;

        for _ in 0..count {
            let start = self.offset;
            let key = self.next_item()?;
            let encoded = &input[start..self.offset];
            if let Some(last) = last_key {
                if key_order(last, encoded) != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "map keys out of order or repeated",
                    ));
                }
            }
            last_key = Some(encoded);
            pairs.push((key, self.next_item()?));
        }
        Ok(Cbor::Map(pairs))
    }

    fn simple(&mut self, info: u8) -> CodecResult<Cbor> {
        match info {
            20 => Ok(Cbor::Bool(false)),
            21 => Ok(Cbor::Bool(true)),
            // undefined reads as null
            22 | 23 => Ok(Cbor::Null),
            24 => {
                let value = self.fixed::<1>()?[0];
                Err(CodecError::unsupported_type(format!("simple({value})")))
            }
            25 => Ok(Cbor::Float32(widen_half(u16::from_be_bytes(self.fixed()?)))),
            26 => Ok(Cbor::Float32(f32::from_bits(u32::from_be_bytes(
                self.fixed()?,
            )))),
            27 => Ok(Cbor::Float64(f64::from_bits(u64::from_be_bytes(
                self.fixed()?,
            )))),
            28..=30 => Err(CodecError::invalid_structure("reserved head argument")),
            31 => Err(CodecError::IndefiniteLengthForbidden),
            other => Err(CodecError::unsupported_type(format!("simple({other})"))),
        }
    }
}

/// Converts an IEEE 754 half to single precision.
fn widen_half(half: u16) -> f32 {
    let negative = half & 0x8000 != 0;
    let exponent = u32::from((half >> 10) & 0x1f);
    let fraction = u32::from(half & 0x03ff);

    let magnitude = match exponent {
        // subnormal halves are fraction * 2^-24
        0 => fraction as f32 / 16_777_216.0,
        0x1f => f32::from_bits(0x7f80_0000 | (fraction << 13)),
        _ => f32::from_bits(((exponent + 112) << 23) | (fraction << 13)),
    };
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::to_canonical_cbor;

    #[test]
    fn integers() {
        assert_eq!(from_cbor(&[0x00]).unwrap(), Cbor::Integer(0));
        assert_eq!(from_cbor(&[0x18, 0x64]).unwrap(), Cbor::Integer(100));
        assert_eq!(from_cbor(&[0x39, 0x01, 0x00]).unwrap(), Cbor::Integer(-257));
        assert_eq!(
            from_cbor(&to_canonical_cbor(&Cbor::Integer(i64::MIN))).unwrap(),
            Cbor::Integer(i64::MIN)
        );
    }

    #[test]
    fn large_unsigned_stays_unsigned() {
        let encoded = to_canonical_cbor(&Cbor::Unsigned(u64::MAX - 1));
        assert_eq!(from_cbor(&encoded).unwrap(), Cbor::Unsigned(u64::MAX - 1));
    }

    #[test]
    fn negative_below_i64_min_overflows() {
        let mut encoded = vec![0x3b];
        encoded.extend(u64::MAX.to_be_bytes());
        assert_eq!(from_cbor(&encoded), Err(CodecError::IntegerOverflow));
    }

    #[test]
    fn floats_of_every_width() {
        assert_eq!(
            from_cbor(&[0xfa, 0x40, 0x20, 0x00, 0x00]).unwrap(),
            Cbor::Float32(2.5)
        );
        assert_eq!(
            from_cbor(&[0xfb, 0xc0, 0x04, 0, 0, 0, 0, 0, 0]).unwrap(),
            Cbor::Float64(-2.5)
        );
        assert_eq!(from_cbor(&[0xf9, 0x3e, 0x00]).unwrap(), Cbor::Float32(1.5));
        assert_eq!(from_cbor(&[0xf9, 0x80, 0x00]).unwrap(), Cbor::Float32(-0.0));
        assert_eq!(
            from_cbor(&[0xf9, 0x7c, 0x00]).unwrap(),
            Cbor::Float32(f32::INFINITY)
        );
        assert_eq!(
            from_cbor(&[0xf9, 0x00, 0x01]).unwrap(),
            Cbor::Float32(5.960_464_5e-8)
        );
    }

    #[test]
    fn nan_payload_is_kept() {
        let nan = f64::from_bits(0x7ff8_0000_0000_0abc);
        match from_cbor(&to_canonical_cbor(&Cbor::Float64(nan))).unwrap() {
            Cbor::Float64(f) => assert_eq!(f.to_bits(), nan.to_bits()),
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn tags_are_transparent() {
        assert_eq!(from_cbor(&[0xc1, 0x05]).unwrap(), Cbor::Integer(5));
    }

    #[test]
    fn nested_structures() {
        let item = Cbor::text_map([
            ("path", Cbor::Array(vec![Cbor::from("Doc"), Cbor::Integer(3)])),
            ("value", Cbor::Bytes(vec![0, 1])),
        ]);
        assert_eq!(from_cbor(&to_canonical_cbor(&item)).unwrap(), item);
    }

    #[test]
    fn indefinite_lengths_are_refused() {
        let inputs: [&[u8]; 4] = [&[0x5f, 0x41, 0x00, 0xff], &[0x9f, 0xff], &[0xbf, 0xff], &[0xff]];
        for input in inputs {
            assert_eq!(from_cbor(input), Err(CodecError::IndefiniteLengthForbidden));
        }
    }

    #[test]
    fn overlong_heads_are_refused() {
        let inputs: [&[u8]; 3] = [&[0x18, 0x17], &[0x19, 0x00, 0x80], &[0x3a, 0, 0, 0xff, 0xff]];
        for input in inputs {
            assert!(matches!(
                from_cbor(input),
                Err(CodecError::InvalidStructure { .. })
            ));
        }
    }

    #[test]
    fn map_keys_must_ascend() {
        let unordered = [0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02];
        let repeated = [0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02];
        for input in [&unordered, &repeated] {
            assert!(matches!(
                from_cbor(input),
                Err(CodecError::InvalidStructure { .. })
            ));
        }
    }

    #[test]
    fn trailing_bytes_are_counted() {
        assert_eq!(
            from_cbor(&[0xf6, 0x00, 0x00]),
            Err(CodecError::TrailingBytes { remaining: 2 })
        );
    }

    #[test]
    fn oversized_claims_fail_before_reading() {
        assert!(matches!(
            from_cbor(&[0x9b, 0, 0, 0, 1, 0, 0, 0, 0]),
            Err(CodecError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn truncated_input() {
        let inputs: [&[u8]; 4] = [&[], &[0x19, 0x01], &[0x62, b'a'], &[0x82, 0x01]];
        for input in inputs {
            assert_eq!(from_cbor(input), Err(CodecError::UnexpectedEof));
        }
    }

    #[test]
    fn nesting_is_bounded() {
        let mut at_limit = vec![0x81; MAX_DEPTH];
        at_limit.push(0x00);
        assert!(from_cbor(&at_limit).is_ok());

        let mut too_deep = vec![0x81; MAX_DEPTH + 1];
        too_deep.push(0x00);
        assert_eq!(
            from_cbor(&too_deep),
            Err(CodecError::NestingTooDeep { max: MAX_DEPTH })
        );
    }

    #[test]
    fn deeply_nested_frames_fail_without_exhausting_the_stack() {
        // Far more levels than a small thread stack could recurse through.
        let mut arrays = vec![0x81; 200_000];
        arrays.push(0x00);
        let mut maps = [0xa1, 0x00].repeat(100_000);
        maps.push(0x00);
        let mut tags = vec![0xc1; 200_000];
        tags.push(0x00);

        let handle = std::thread::Builder::new()
            .stack_size(1024 * 1024)
            .spawn(move || [arrays, maps, tags].map(|input| from_cbor(&input)))
            .unwrap();
        for result in handle.join().unwrap() {
            assert_eq!(result, Err(CodecError::NestingTooDeep { max: MAX_DEPTH }));
        }
    }

    #[test]
    fn text_must_be_utf8() {
        assert_eq!(from_cbor(&[0x61, 0xc3]), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn reader_walks_a_sequence() {
        let mut reader = CborReader::new(&[0x01, 0xf5]);
        assert_eq!(reader.next_item().unwrap(), Cbor::Integer(1));
        assert_eq!(reader.next_item().unwrap(), Cbor::Bool(true));
        assert!(reader.rest().is_empty());
    }
}
