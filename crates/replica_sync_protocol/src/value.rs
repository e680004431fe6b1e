//! Tagged scalar values carried at the leaves of change records.

use num_complex::{Complex32, Complex64};
use replica_codec::{Cbor, CodecError, CodecResult, FromCbor, ToCbor};
use std::cmp::Ordering;
use std::fmt;

/// A scalar leaf value.
///
/// Exactly one variant is populated. Narrower integer and float kinds are
/// widened to the 64-bit variants when extracted and narrowed back to the
/// declared width when injected.
#[derive(Debug, Clone)]
pub enum Value {
    /// UTF-8 string.
    String(String),
    /// Signed integer.
    I64(i64),
    /// Unsigned integer.
    U64(u64),
    /// Single-precision float.
    F32(f32),
    /// Double-precision float.
    F64(f64),
    /// Boolean.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// Byte length of an encoded [`Complex32`].
pub const COMPLEX32_LEN: usize = 8;

/// Byte length of an encoded [`Complex64`].
pub const COMPLEX64_LEN: usize = 16;

impl Value {
    /// Returns the wire tag of this value's variant.
    pub fn tag(&self) -> u8 {
        match self {
            Value::String(_) => 0,
            Value::I64(_) => 1,
            Value::U64(_) => 2,
            Value::F32(_) => 3,
            Value::F64(_) => 4,
            Value::Bool(_) => 5,
            Value::Bytes(_) => 6,
        }
    }

    /// Returns a short name of this value's variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Total order used for map keys: variant tag first, then payload.
    ///
    /// Floats order by `f64::total_cmp`.
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::I64(a), Value::I64(b)) => a.cmp(b),
            (Value::U64(a), Value::U64(b)) => a.cmp(b),
            (Value::F32(a), Value::F32(b)) => a.total_cmp(b),
            (Value::F64(a), Value::F64(b)) => a.total_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.tag().cmp(&other.tag()),
        }
    }

    /// Get this value as a signed integer, accepting either integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(n) => Some(*n),
            Value::U64(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Get this value as an unsigned integer, accepting either integer variant.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(n) => Some(*n),
            Value::I64(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Get this value as a double, accepting either float variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(f) => Some(*f),
            Value::F32(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    /// Get this value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Encode a single-precision complex number.
    ///
    /// Layout: 8 bytes, little-endian, real component first.
    pub fn from_complex32(c: Complex32) -> Self {
        let mut bytes = Vec::with_capacity(COMPLEX32_LEN);
        bytes.extend_from_slice(&c.re.to_le_bytes());
        bytes.extend_from_slice(&c.im.to_le_bytes());
        Value::Bytes(bytes)
    }

    /// Encode a double-precision complex number.
    ///
    /// Layout: 16 bytes, little-endian, real component first.
    pub fn from_complex64(c: Complex64) -> Self {
        let mut bytes = Vec::with_capacity(COMPLEX64_LEN);
        bytes.extend_from_slice(&c.re.to_le_bytes());
        bytes.extend_from_slice(&c.im.to_le_bytes());
        Value::Bytes(bytes)
    }

    /// Decode a single-precision complex number from an 8-byte payload.
    pub fn as_complex32(&self) -> Option<Complex32> {
        let bytes: &[u8; COMPLEX32_LEN] = self.as_bytes()?.try_into().ok()?;
        let (re, im) = bytes.split_at(4);
        Some(Complex32::new(
            f32::from_le_bytes(re.try_into().ok()?),
            f32::from_le_bytes(im.try_into().ok()?),
        ))
    }

    /// Decode a double-precision complex number from a 16-byte payload.
    pub fn as_complex64(&self) -> Option<Complex64> {
        let bytes: &[u8; COMPLEX64_LEN] = self.as_bytes()?.try_into().ok()?;
        let (re, im) = bytes.split_at(8);
        Some(Complex64::new(
            f64::from_le_bytes(re.try_into().ok()?),
            f64::from_le_bytes(im.try_into().ok()?),
        ))
    }
}

/// Floats compare by bit pattern so that a NaN leaf is equal to itself and an
/// unchanged NaN never shows up as a diff.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::I64(n) => write!(f, "{n}"),
            Value::U64(n) => write!(f, "{n}u"),
            Value::F32(v) => write!(f, "{v:?}f32"),
            Value::F64(v) => write!(f, "{v:?}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Bytes(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl ToCbor for Value {
    fn to_cbor(&self) -> Cbor {
        let payload = match self {
            Value::String(s) => Cbor::Text(s.clone()),
            Value::I64(n) => Cbor::Integer(*n),
            Value::U64(n) => Cbor::unsigned(*n),
            Value::F32(v) => Cbor::Float32(*v),
            Value::F64(v) => Cbor::Float64(*v),
            Value::Bool(b) => Cbor::Bool(*b),
            Value::Bytes(b) => Cbor::Bytes(b.clone()),
        };
        Cbor::Array(vec![Cbor::from(self.tag()), payload])
    }
}

impl FromCbor for Value {
    fn from_cbor(item: &Cbor) -> CodecResult<Self> {
        let [tag, payload] = item
            .as_array()
            .ok_or_else(|| CodecError::invalid_structure("value must be a [tag, payload] pair"))?
        else {
            return Err(CodecError::invalid_structure(
                "value must be a [tag, payload] pair",
            ));
        };
        let tag = tag
            .as_integer()
            .ok_or_else(|| CodecError::invalid_structure("value tag must be an integer"))?;
        let mismatch = || CodecError::invalid_structure(format!("payload does not match tag {tag}"));

        let value = match tag {
            0 => Value::String(payload.as_text().ok_or_else(mismatch)?.to_string()),
            1 => Value::I64(payload.as_integer().ok_or_else(mismatch)?),
            2 => Value::U64(payload.as_unsigned().ok_or_else(mismatch)?),
            3 => Value::F32(payload.as_f32().ok_or_else(mismatch)?),
            4 => Value::F64(payload.as_f64().ok_or_else(mismatch)?),
            5 => Value::Bool(payload.as_bool().ok_or_else(mismatch)?),
            6 => Value::Bytes(payload.as_bytes().ok_or_else(mismatch)?.to_vec()),
            other => {
                return Err(CodecError::unsupported_type(format!("value tag {other}")));
            }
        };
        Ok(value)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::I64(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::U64(n)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex32_is_eight_bytes_real_first() {
        let value = Value::from_complex32(Complex32::new(1.5, 2.5));
        let bytes = value.as_bytes().unwrap();
        assert_eq!(bytes.len(), COMPLEX32_LEN);
        assert_eq!(&bytes[..4], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[4..], &2.5f32.to_le_bytes());

        let decoded = value.as_complex32().unwrap();
        assert_eq!(decoded.re.to_bits(), 1.5f32.to_bits());
        assert_eq!(decoded.im.to_bits(), 2.5f32.to_bits());
    }

    #[test]
    fn complex64_is_sixteen_bytes_real_first() {
        let c = Complex64::new(-0.25, 1e300);
        let value = Value::from_complex64(c);
        let bytes = value.as_bytes().unwrap();
        assert_eq!(bytes.len(), COMPLEX64_LEN);
        assert_eq!(&bytes[..8], &(-0.25f64).to_le_bytes());
        assert_eq!(value.as_complex64(), Some(c));
    }

    #[test]
    fn complex_rejects_wrong_length() {
        assert_eq!(Value::Bytes(vec![0; 7]).as_complex32(), None);
        assert_eq!(Value::Bytes(vec![0; 8]).as_complex64(), None);
        assert_eq!(Value::I64(3).as_complex32(), None);
    }

    #[test]
    fn nan_equals_itself() {
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
        assert_ne!(Value::F64(0.0), Value::F64(-0.0));
    }

    #[test]
    fn variants_never_compare_equal_across_tags() {
        assert_ne!(Value::I64(1), Value::U64(1));
        assert_ne!(Value::F32(1.0), Value::F64(1.0));
    }

    #[test]
    fn integer_accessors_cross_variants() {
        assert_eq!(Value::U64(7).as_i64(), Some(7));
        assert_eq!(Value::U64(u64::MAX).as_i64(), None);
        assert_eq!(Value::I64(-1).as_u64(), None);
        assert_eq!(Value::F32(0.5).as_f64(), Some(0.5));
    }

    #[test]
    fn key_order_is_total() {
        let mut keys = vec![
            Value::from("b"),
            Value::I64(3),
            Value::from("a"),
            Value::I64(-1),
            Value::Bool(true),
        ];
        keys.sort_by(Value::cmp_key);
        assert_eq!(
            keys,
            vec![
                Value::from("a"),
                Value::from("b"),
                Value::I64(-1),
                Value::I64(3),
                Value::Bool(true),
            ]
        );
    }

    #[test]
    fn wire_form_keeps_tag() {
        for value in [
            Value::from("k"),
            Value::I64(-5),
            Value::U64(u64::MAX),
            Value::F32(0.1),
            Value::F64(f64::NAN),
            Value::Bool(false),
            Value::Bytes(vec![1, 2]),
        ] {
            assert_eq!(Value::decode(&value.encode()).unwrap(), value);
        }
    }

    #[test]
    fn wire_form_rejects_mismatched_payload() {
        let item = Cbor::Array(vec![Cbor::Integer(5), Cbor::Integer(1)]);
        assert!(Value::from_cbor(&item).is_err());
        let item = Cbor::Array(vec![Cbor::Integer(42), Cbor::Integer(1)]);
        assert!(matches!(
            Value::from_cbor(&item),
            Err(CodecError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn display_is_literal_like() {
        assert_eq!(Value::from("x").to_string(), "\"x\"");
        assert_eq!(Value::U64(4).to_string(), "4u");
        assert_eq!(Value::Bytes(vec![0x0a, 0xff]).to_string(), "0x0aff");
    }
}
