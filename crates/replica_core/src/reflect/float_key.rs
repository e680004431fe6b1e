//! Float map keys.

use super::Scalar;
use crate::error::ConvertError;
use replica_sync_protocol::Value;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A float usable as a `HashMap` or `BTreeMap` key.
///
/// Identity is the bit pattern: `0.0` and `-0.0` are different keys, and a
/// NaN key equals itself. Ordering follows [`f64::total_cmp`], which agrees
/// with that identity.
///
/// ```
/// use replica_core::reflect::FloatKey;
/// use std::collections::BTreeMap;
///
/// let mut weights = BTreeMap::new();
/// weights.insert(FloatKey(0.5f64), "half");
/// weights.insert(FloatKey(-2.0), "minus two");
/// assert_eq!(weights.keys().next(), Some(&FloatKey(-2.0)));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatKey<F>(pub F);

impl<F> FloatKey<F> {
    /// Returns the wrapped float.
    pub fn get(self) -> F {
        self.0
    }
}

macro_rules! float_key {
    ($($float:ty),*) => {$(
        impl PartialEq for FloatKey<$float> {
            fn eq(&self, other: &Self) -> bool {
                self.0.to_bits() == other.0.to_bits()
            }
        }

        impl Eq for FloatKey<$float> {}

        impl Hash for FloatKey<$float> {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.to_bits().hash(state);
            }
        }

        impl PartialOrd for FloatKey<$float> {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for FloatKey<$float> {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl From<$float> for FloatKey<$float> {
            fn from(value: $float) -> Self {
                Self(value)
            }
        }

        impl Scalar for FloatKey<$float> {
            fn to_value(&self) -> Value {
                self.0.to_value()
            }

            fn from_value(value: &Value) -> Result<Self, ConvertError> {
                <$float>::from_value(value).map(Self)
            }
        }
    )*};
}

float_key!(f32, f64);

crate::reflect_scalar!(FloatKey<f32>, FloatKey<f64>);
