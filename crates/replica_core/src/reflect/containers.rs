//! Reflection for std containers.

use super::{MapSlot, OptionalSlot, Reflect, Scalar, SequenceSlot, Shape, ShapeMut};
use crate::error::ConvertError;
use replica_sync_protocol::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

impl<T: Reflect + Clone + Default> Reflect for Option<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Optional(self.as_ref().map(|value| value as &dyn Reflect))
    }

    fn shape_mut(&mut self) -> ShapeMut<'_> {
        ShapeMut::Optional(self)
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

impl<T: Reflect + Default> OptionalSlot for Option<T> {
    fn clear(&mut self) {
        *self = None;
    }

    fn get_or_insert(&mut self) -> &mut dyn Reflect {
        self.get_or_insert_with(T::default)
    }
}

/// Boxes are transparent: they take the shape of their content.
impl<T: Reflect + Clone> Reflect for Box<T> {
    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }

    fn shape(&self) -> Shape<'_> {
        (**self).shape()
    }

    fn shape_mut(&mut self) -> ShapeMut<'_> {
        (**self).shape_mut()
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

impl<T: Reflect + Clone + Default> Reflect for Vec<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Sequence(self.iter().map(|item| item as &dyn Reflect).collect())
    }

    fn shape_mut(&mut self) -> ShapeMut<'_> {
        ShapeMut::Sequence(self)
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

impl<T: Reflect + Default> SequenceSlot for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn truncate(&mut self, len: usize) {
        Vec::truncate(self, len);
    }

    fn element(&mut self, index: usize) -> &mut dyn Reflect {
        if index >= Vec::len(self) {
            self.resize_with(index + 1, T::default);
        }
        &mut self[index]
    }
}

impl<T: Reflect + Clone, const N: usize> Reflect for [T; N] {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Array(self.iter().map(|item| item as &dyn Reflect).collect())
    }

    fn shape_mut(&mut self) -> ShapeMut<'_> {
        ShapeMut::Array(self.iter_mut().map(|item| item as &mut dyn Reflect).collect())
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

fn sorted_pairs<'a, K, V, I>(iter: I) -> Vec<(Value, &'a dyn Reflect)>
where
    K: Scalar + 'a,
    V: Reflect,
    I: Iterator<Item = (&'a K, &'a V)>,
{
    let mut pairs: Vec<_> = iter
        .map(|(key, value)| (key.to_value(), value as &dyn Reflect))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp_key(&b.0));
    pairs
}

impl<K, V> Reflect for HashMap<K, V>
where
    K: Scalar + Eq + Hash + Clone + Send + Sync + 'static,
    V: Reflect + Clone + Default,
{
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Map(sorted_pairs(self.iter()))
    }

    fn shape_mut(&mut self) -> ShapeMut<'_> {
        ShapeMut::Map(self)
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

impl<K, V> MapSlot for HashMap<K, V>
where
    K: Scalar + Eq + Hash,
    V: Reflect + Default,
{
    fn clear(&mut self) {
        HashMap::clear(self);
    }

    fn remove(&mut self, key: &Value) -> Result<(), ConvertError> {
        HashMap::remove(self, &K::from_value(key)?);
        Ok(())
    }

    fn entry(&mut self, key: &Value) -> Result<&mut dyn Reflect, ConvertError> {
        let key = K::from_value(key)?;
        Ok(HashMap::entry(self, key).or_default())
    }
}

impl<K, V> Reflect for BTreeMap<K, V>
where
    K: Scalar + Ord + Clone + Send + Sync + 'static,
    V: Reflect + Clone + Default,
{
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Map(sorted_pairs(self.iter()))
    }

    fn shape_mut(&mut self) -> ShapeMut<'_> {
        ShapeMut::Map(self)
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

impl<K, V> MapSlot for BTreeMap<K, V>
where
    K: Scalar + Ord,
    V: Reflect + Default,
{
    fn clear(&mut self) {
        BTreeMap::clear(self);
    }

    fn remove(&mut self, key: &Value) -> Result<(), ConvertError> {
        BTreeMap::remove(self, &K::from_value(key)?);
        Ok(())
    }

    fn entry(&mut self, key: &Value) -> Result<&mut dyn Reflect, ConvertError> {
        let key = K::from_value(key)?;
        Ok(BTreeMap::entry(self, key).or_default())
    }
}
