//! Shape-dispatch reflection.
//!
//! Rust has no runtime reflection, so every synchronized type describes
//! itself through [`Reflect`]: a read-only [`Shape`] for diffing and a
//! mutable [`ShapeMut`] for patching. The extraction and injection engines
//! dispatch on the shape tag and never see concrete types.
//!
//! Primitives, strings, bytes, complex numbers and the std containers are
//! covered here. Structs opt in with [`reflect_struct!`](crate::reflect_struct),
//! listing the fields that take part in synchronization; user scalar types
//! (for example map key newtypes) implement [`Scalar`] and opt in with
//! [`reflect_scalar!`](crate::reflect_scalar). Floats become map keys
//! through [`FloatKey`].

mod containers;
mod dynamic;
mod float_key;
mod scalar;

pub use dynamic::{Dynamic, Opaque};
pub use float_key::FloatKey;
pub use scalar::Scalar;

use crate::error::ConvertError;
use replica_sync_protocol::Value;
use std::any::Any;

/// A type whose structure can be diffed and patched.
pub trait Reflect: Any + Send + Sync {
    /// Type identifier; used as the root key of change records.
    fn type_name(&self) -> &'static str;

    /// Read-only view of this value's shape.
    fn shape(&self) -> Shape<'_>;

    /// Mutable view of this value's shape.
    fn shape_mut(&mut self) -> ShapeMut<'_>;

    /// Deep copy behind a trait object.
    fn clone_reflect(&self) -> Box<dyn Reflect>;

    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Read-only shape of a value.
pub enum Shape<'a> {
    /// A leaf value.
    Scalar(Value),
    /// An optional value.
    Optional(Option<&'a dyn Reflect>),
    /// A value whose concrete type is only known at run time.
    Dynamic(Option<&'a dyn Reflect>),
    /// A growable sequence.
    Sequence(Vec<&'a dyn Reflect>),
    /// A fixed-length array.
    Array(Vec<&'a dyn Reflect>),
    /// A keyed map, sorted by [`Value::cmp_key`].
    Map(Vec<(Value, &'a dyn Reflect)>),
    /// Named fields in declaration order.
    Struct(Vec<(&'static str, &'a dyn Reflect)>),
    /// A value that cannot be diffed.
    Unsupported(&'static str),
}

/// Mutable shape of a value.
pub enum ShapeMut<'a> {
    /// A leaf value.
    Scalar(&'a mut dyn ScalarSlot),
    /// An optional value.
    Optional(&'a mut dyn OptionalSlot),
    /// A value whose concrete type is only known at run time.
    Dynamic(&'a mut dyn DynamicSlot),
    /// A growable sequence.
    Sequence(&'a mut dyn SequenceSlot),
    /// A fixed-length array.
    Array(Vec<&'a mut dyn Reflect>),
    /// A keyed map.
    Map(&'a mut dyn MapSlot),
    /// Named fields in declaration order.
    Struct(Vec<(&'static str, &'a mut dyn Reflect)>),
    /// A value that cannot be patched.
    Unsupported(&'static str),
}

/// A leaf that can be overwritten from a [`Value`].
pub trait ScalarSlot {
    /// Converts and stores `value`.
    fn set(&mut self, value: &Value) -> Result<(), ConvertError>;
}

impl<T: Scalar> ScalarSlot for T {
    fn set(&mut self, value: &Value) -> Result<(), ConvertError> {
        *self = T::from_value(value)?;
        Ok(())
    }
}

/// An optional slot.
pub trait OptionalSlot {
    /// Empties the slot.
    fn clear(&mut self);
    /// Returns the referent, inserting a default one first if empty.
    fn get_or_insert(&mut self) -> &mut dyn Reflect;
}

/// A slot holding a run-time typed value.
pub trait DynamicSlot {
    /// Empties the slot.
    fn clear(&mut self);
    /// Returns the held value.
    fn get_mut(&mut self) -> Option<&mut dyn Reflect>;
}

/// A growable sequence.
pub trait SequenceSlot {
    /// Number of elements.
    fn len(&self) -> usize;
    /// Returns true when there are no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Removes every element.
    fn clear(&mut self);
    /// Shortens the sequence to `len` elements.
    fn truncate(&mut self, len: usize);
    /// Returns the element at `index`, growing with default elements to reach it.
    fn element(&mut self, index: usize) -> &mut dyn Reflect;
}

/// A keyed map.
pub trait MapSlot {
    /// Removes every entry.
    fn clear(&mut self);
    /// Deletes `key` if present.
    fn remove(&mut self, key: &Value) -> Result<(), ConvertError>;
    /// Returns the value under `key`, inserting a default one first if absent.
    fn entry(&mut self, key: &Value) -> Result<&mut dyn Reflect, ConvertError>;
}

/// Structural equality over shapes.
///
/// Dynamic values are equal only when they hold the same concrete type.
/// Unsupported values are never compared and count as equal.
pub fn deep_eq(a: &dyn Reflect, b: &dyn Reflect) -> bool {
    match (a.shape(), b.shape()) {
        (Shape::Scalar(x), Shape::Scalar(y)) => x == y,
        (Shape::Optional(x), Shape::Optional(y)) => match (x, y) {
            (Some(x), Some(y)) => deep_eq(x, y),
            (None, None) => true,
            _ => false,
        },
        (Shape::Dynamic(x), Shape::Dynamic(y)) => match (x, y) {
            (Some(x), Some(y)) => same_type(x, y) && deep_eq(x, y),
            (None, None) => true,
            _ => false,
        },
        (Shape::Sequence(x), Shape::Sequence(y)) | (Shape::Array(x), Shape::Array(y)) => {
            x.len() == y.len() && x.iter().zip(&y).all(|(x, y)| deep_eq(*x, *y))
        }
        (Shape::Map(x), Shape::Map(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(&y)
                    .all(|((kx, vx), (ky, vy))| kx == ky && deep_eq(*vx, *vy))
        }
        (Shape::Struct(x), Shape::Struct(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(&y)
                    .all(|((nx, vx), (ny, vy))| nx == ny && deep_eq(*vx, *vy))
        }
        (Shape::Unsupported(_), Shape::Unsupported(_)) => true,
        _ => false,
    }
}

/// Returns true when both values have the same concrete type.
pub fn same_type(a: &dyn Reflect, b: &dyn Reflect) -> bool {
    a.as_any().type_id() == b.as_any().type_id()
}

/// Implements [`Reflect`] for a struct by listing its synchronized fields.
///
/// Fields not listed are invisible to extraction and injection. Every listed
/// field must itself implement [`Reflect`], and the struct must be `Clone`.
///
/// ```
/// use replica_core::reflect_struct;
///
/// #[derive(Debug, Clone, Default)]
/// struct Point {
///     x: i32,
///     y: i32,
///     label_cache: String,
/// }
///
/// reflect_struct!(Point { x, y });
/// ```
#[macro_export]
macro_rules! reflect_struct {
    ($name:ident { $($field:ident),* $(,)? }) => {
        impl $crate::Reflect for $name {
            fn type_name(&self) -> &'static str {
                stringify!($name)
            }

            fn shape(&self) -> $crate::Shape<'_> {
                $crate::Shape::Struct(vec![
                    $((stringify!($field), &self.$field as &dyn $crate::Reflect)),*
                ])
            }

            fn shape_mut(&mut self) -> $crate::ShapeMut<'_> {
                $crate::ShapeMut::Struct(vec![
                    $((stringify!($field), &mut self.$field as &mut dyn $crate::Reflect)),*
                ])
            }

            fn clone_reflect(&self) -> ::std::boxed::Box<dyn $crate::Reflect> {
                ::std::boxed::Box::new(::std::clone::Clone::clone(self))
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}

/// Implements [`Reflect`] for types that implement [`Scalar`] and `Clone`.
///
/// ```
/// use replica_core::{reflect_scalar, ConvertError, Scalar, Value};
///
/// #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// struct UserId(String);
///
/// impl Scalar for UserId {
///     fn to_value(&self) -> Value {
///         Value::String(self.0.clone())
///     }
///
///     fn from_value(value: &Value) -> Result<Self, ConvertError> {
///         String::from_value(value).map(UserId)
///     }
/// }
///
/// reflect_scalar!(UserId);
/// ```
#[macro_export]
macro_rules! reflect_scalar {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::Reflect for $ty {
            fn type_name(&self) -> &'static str {
                stringify!($ty)
            }

            fn shape(&self) -> $crate::Shape<'_> {
                $crate::Shape::Scalar($crate::Scalar::to_value(self))
            }

            fn shape_mut(&mut self) -> $crate::ShapeMut<'_> {
                $crate::ShapeMut::Scalar(self)
            }

            fn clone_reflect(&self) -> ::std::boxed::Box<dyn $crate::Reflect> {
                ::std::boxed::Box::new(::std::clone::Clone::clone(self))
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    )*};
}
