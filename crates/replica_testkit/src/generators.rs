//! Property-based test generators using proptest.
//!
//! Floats are drawn from finite ranges so generated values compare equal to
//! themselves.

use crate::fixtures::{Inventory, Item, Owner};
use bytes::Bytes;
use num_complex::Complex64;
use proptest::prelude::*;
use replica_sync_protocol::{Entry, Key, Value};

/// Strategy for finite floats.
pub fn finite_f64() -> impl Strategy<Value = f64> {
    -1.0e6..1.0e6f64
}

/// Strategy for short identifiers.
pub fn ident_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("Invalid regex")
}

/// Strategy for items.
pub fn item_strategy() -> impl Strategy<Value = Item> {
    (
        ident_strategy(),
        any::<i32>(),
        finite_f64(),
        prop::collection::vec(ident_strategy(), 0..3),
    )
        .prop_map(|(sku, qty, price, labels)| Item {
            sku,
            qty,
            price,
            labels,
        })
}

/// Strategy for owners.
pub fn owner_strategy() -> impl Strategy<Value = Owner> {
    (any::<u16>(), ident_strategy()).prop_map(|(id, email)| Owner { id, email })
}

/// Strategy for whole inventories.
pub fn inventory_strategy() -> impl Strategy<Value = Inventory> {
    let lists = (
        prop::collection::vec(item_strategy(), 0..4),
        prop::collection::btree_map(ident_strategy(), any::<u32>(), 0..4),
        prop::collection::hash_map(any::<i32>(), ident_strategy(), 0..4),
        prop::collection::btree_map(any::<bool>(), any::<u8>(), 0..2),
    );
    let scalars = (
        ident_strategy(),
        any::<u64>(),
        prop::option::of(owner_strategy()),
        prop::array::uniform3(-1.0e3..1.0e3f32),
        prop::collection::vec(any::<u8>(), 0..8),
        (finite_f64(), finite_f64()),
    );
    (lists, scalars).prop_map(
        |((items, stock, tags, flags), (name, revision, owner, dims, checksum, (re, im)))| {
            Inventory {
                name,
                revision,
                items,
                stock,
                tags,
                flags,
                owner,
                dims,
                checksum: Bytes::from(checksum),
                signal: Complex64::new(re, im),
            }
        },
    )
}

/// Strategy for scalar values of every kind.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        ".{0,8}".prop_map(Value::String),
        any::<i64>().prop_map(Value::I64),
        any::<u64>().prop_map(Value::U64),
        finite_f64().prop_map(Value::F64),
        any::<bool>().prop_map(Value::Bool),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
    ]
}

/// Strategy for entries addressed under `root`.
pub fn entry_strategy(root: &'static str) -> impl Strategy<Value = Entry> {
    (
        prop::collection::vec(
            (ident_strategy(), prop::option::of(any::<u64>())),
            1..4,
        ),
        prop::option::of(value_strategy()),
    )
        .prop_map(move |(keys, value)| {
            let mut path = vec![Key::new(root)];
            path.extend(keys.into_iter().map(|(name, index)| match index {
                Some(index) => Key::new(name).with_index(index),
                None => Key::new(name),
            }));
            match value {
                Some(value) => Entry::set(path, value),
                None => Entry::remove(path),
            }
        })
}
