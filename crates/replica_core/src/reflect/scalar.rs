//! Leaf types.

use crate::error::ConvertError;
use bytes::Bytes;
use num_complex::{Complex32, Complex64};
use replica_sync_protocol::Value;

/// A type that maps to and from a single [`Value`].
///
/// Integers widen to `I64`/`U64` and floats to `F64`. Conversion back
/// accepts either variant of the same family and narrows with a range check.
pub trait Scalar: Sized {
    /// Converts to the wire value.
    fn to_value(&self) -> Value;

    /// Converts from a wire value.
    fn from_value(value: &Value) -> Result<Self, ConvertError>;
}

macro_rules! integer_scalar {
    ($variant:ident: $($ty:ty),*) => {$(
        impl Scalar for $ty {
            fn to_value(&self) -> Value {
                Value::$variant(*self as _)
            }

            fn from_value(value: &Value) -> Result<Self, ConvertError> {
                match value {
                    Value::I64(n) => {
                        <$ty>::try_from(*n).map_err(|_| ConvertError::overflow(stringify!($ty), n))
                    }
                    Value::U64(n) => {
                        <$ty>::try_from(*n).map_err(|_| ConvertError::overflow(stringify!($ty), n))
                    }
                    other => Err(ConvertError::mismatch(stringify!($ty), other.kind())),
                }
            }
        }
    )*};
}

integer_scalar!(I64: i8, i16, i32, i64, isize);
integer_scalar!(U64: u8, u16, u32, u64, usize);

impl Scalar for f64 {
    fn to_value(&self) -> Value {
        Value::F64(*self)
    }

    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        match value {
            Value::F64(v) => Ok(*v),
            Value::F32(v) => Ok(f64::from(*v)),
            other => Err(ConvertError::mismatch("f64", other.kind())),
        }
    }
}

impl Scalar for f32 {
    fn to_value(&self) -> Value {
        Value::F64(f64::from(*self))
    }

    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        match value {
            Value::F32(v) => Ok(*v),
            Value::F64(v) => {
                let narrowed = *v as f32;
                if v.is_finite() && narrowed.is_infinite() {
                    Err(ConvertError::overflow("f32", v))
                } else {
                    Ok(narrowed)
                }
            }
            other => Err(ConvertError::mismatch("f32", other.kind())),
        }
    }
}

impl Scalar for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        value
            .as_bool()
            .ok_or_else(|| ConvertError::mismatch("bool", value.kind()))
    }
}

impl Scalar for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ConvertError::mismatch("string", value.kind()))
    }
}

impl Scalar for Bytes {
    fn to_value(&self) -> Value {
        Value::Bytes(self.to_vec())
    }

    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        value
            .as_bytes()
            .map(Bytes::copy_from_slice)
            .ok_or_else(|| ConvertError::mismatch("bytes", value.kind()))
    }
}

impl Scalar for Complex32 {
    fn to_value(&self) -> Value {
        Value::from_complex32(*self)
    }

    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        value
            .as_complex32()
            .ok_or_else(|| ConvertError::mismatch("complex32", value.kind()))
    }
}

impl Scalar for Complex64 {
    fn to_value(&self) -> Value {
        Value::from_complex64(*self)
    }

    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        value
            .as_complex64()
            .ok_or_else(|| ConvertError::mismatch("complex64", value.kind()))
    }
}

crate::reflect_scalar!(
    i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, String, Bytes, Complex32,
    Complex64,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_widen_and_narrow() {
        assert_eq!(7i8.to_value(), Value::I64(7));
        assert_eq!(7u16.to_value(), Value::U64(7));
        assert_eq!(i8::from_value(&Value::U64(12)).unwrap(), 12);
        assert_eq!(u32::from_value(&Value::I64(12)).unwrap(), 12);
    }

    #[test]
    fn narrowing_reports_overflow() {
        assert_eq!(
            u8::from_value(&Value::U64(300)),
            Err(ConvertError::overflow("u8", 300))
        );
        assert!(matches!(
            u64::from_value(&Value::I64(-1)),
            Err(ConvertError::Overflow { .. })
        ));
        assert!(matches!(
            f32::from_value(&Value::F64(1e300)),
            Err(ConvertError::Overflow { .. })
        ));
    }

    #[test]
    fn wrong_family_is_a_mismatch() {
        assert_eq!(
            i32::from_value(&Value::from("x")),
            Err(ConvertError::mismatch("i32", Value::from("x").kind()))
        );
        assert!(bool::from_value(&Value::I64(1)).is_err());
    }

    #[test]
    fn floats_accept_both_widths() {
        assert_eq!(f64::from_value(&Value::F32(1.5)).unwrap(), 1.5);
        assert_eq!(f32::from_value(&Value::F64(1.5)).unwrap(), 1.5);
        assert_eq!(2.5f32.to_value(), Value::F64(2.5));
        assert!(f32::from_value(&Value::F64(f64::NAN)).unwrap().is_nan());
    }

    #[test]
    fn complex_round_trips_through_bytes() {
        let c = Complex32::new(1.5, 2.5);
        let value = c.to_value();
        assert_eq!(value.as_bytes().map(<[u8]>::len), Some(8));
        assert_eq!(Complex32::from_value(&value).unwrap(), c);
        assert!(Complex64::from_value(&value).is_err());
    }

    #[test]
    fn bytes_copy_content() {
        let b = Bytes::from_static(b"\x01\x02");
        assert_eq!(b.to_value(), Value::Bytes(vec![1, 2]));
        assert_eq!(Bytes::from_value(&Value::Bytes(vec![1, 2])).unwrap(), b);
    }
}
