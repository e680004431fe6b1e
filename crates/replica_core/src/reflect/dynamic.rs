//! Run-time typed and opaque slots.

use super::{deep_eq, DynamicSlot, Reflect, Shape, ShapeMut};
use std::any::Any;
use std::fmt;

/// A field whose concrete type is chosen at run time.
///
/// Stands in for interface-typed fields. Injection descends into the held
/// value but cannot construct one, so receivers must seed the slot with a
/// value of the expected type before applying entries below it.
#[derive(Default)]
pub struct Dynamic(Option<Box<dyn Reflect>>);

impl Dynamic {
    /// Creates a slot holding `value`.
    pub fn new<T: Reflect>(value: T) -> Self {
        Self(Some(Box::new(value)))
    }

    /// Creates an empty slot.
    pub fn empty() -> Self {
        Self(None)
    }

    /// Returns true when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the held value.
    pub fn get(&self) -> Option<&dyn Reflect> {
        self.0.as_deref()
    }

    /// Replaces the held value.
    pub fn set<T: Reflect>(&mut self, value: T) {
        self.0 = Some(Box::new(value));
    }

    /// Returns the held value if it is a `T`.
    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.0.as_ref()?.as_any().downcast_ref()
    }

    /// Returns the held value mutably if it is a `T`.
    pub fn downcast_mut<T: Reflect>(&mut self) -> Option<&mut T> {
        self.0.as_mut()?.as_any_mut().downcast_mut()
    }
}

impl Clone for Dynamic {
    fn clone(&self) -> Self {
        Self(self.0.as_ref().map(|value| value.clone_reflect()))
    }
}

impl PartialEq for Dynamic {
    fn eq(&self, other: &Self) -> bool {
        deep_eq(self, other)
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => write!(f, "Dynamic({})", value.type_name()),
            None => f.write_str("Dynamic(empty)"),
        }
    }
}

impl Reflect for Dynamic {
    fn type_name(&self) -> &'static str {
        "Dynamic"
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Dynamic(self.get())
    }

    fn shape_mut(&mut self) -> ShapeMut<'_> {
        ShapeMut::Dynamic(self)
    }

    fn clone_reflect(&self) -> Box<dyn Reflect> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl DynamicSlot for Dynamic {
    fn clear(&mut self) {
        self.0 = None;
    }

    fn get_mut(&mut self) -> Option<&mut dyn Reflect> {
        match &mut self.0 {
            Some(value) => Some(&mut **value),
            None => None,
        }
    }
}

/// Wraps a value that synchronization must not look into.
///
/// Extraction reports the field as unsupported and moves on; injection
/// rejects entries addressed to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Opaque<T>(pub T);

impl<T: Clone + Send + Sync + 'static> Reflect for Opaque<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Unsupported(std::any::type_name::<T>())
    }

    fn shape_mut(&mut self) -> ShapeMut<'_> {
        ShapeMut::Unsupported(std::any::type_name::<T>())
    }

    fn clone_reflect(&self) -> Box<dyn Reflect> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
