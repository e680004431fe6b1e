//! Record types used across tests.
//!
//! `Inventory` touches every shape the reflection layer supports: scalars of
//! each family, nested structs, sequences, a fixed array, maps with string,
//! integer and boolean keys, an optional, bytes and complex numbers.

use bytes::Bytes;
use num_complex::Complex64;
use replica_core::reflect_struct;
use std::collections::{BTreeMap, HashMap};

/// One line of an inventory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    /// Stock keeping unit.
    pub sku: String,
    /// Quantity on hand; negative when back-ordered.
    pub qty: i32,
    /// Unit price.
    pub price: f64,
    /// Free-form labels.
    pub labels: Vec<String>,
}

reflect_struct!(Item {
    sku,
    qty,
    price,
    labels
});

/// Who owns an inventory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Owner {
    /// Numeric id.
    pub id: u16,
    /// Contact address.
    pub email: String,
}

reflect_struct!(Owner { id, email });

/// The root record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    /// Display name.
    pub name: String,
    /// Monotonic revision.
    pub revision: u64,
    /// Lines in display order.
    pub items: Vec<Item>,
    /// Stock by warehouse.
    pub stock: BTreeMap<String, u32>,
    /// Tags by numeric id.
    pub tags: HashMap<i32, String>,
    /// Per-flag counters.
    pub flags: BTreeMap<bool, u8>,
    /// Owner, if assigned.
    pub owner: Option<Owner>,
    /// Shelf dimensions.
    pub dims: [f32; 3],
    /// Opaque checksum.
    pub checksum: Bytes,
    /// Calibration signal.
    pub signal: Complex64,
}

reflect_struct!(Inventory {
    name,
    revision,
    items,
    stock,
    tags,
    flags,
    owner,
    dims,
    checksum,
    signal,
});

/// A small, fully populated inventory.
pub fn sample_inventory() -> Inventory {
    Inventory {
        name: "main".into(),
        revision: 3,
        items: vec![
            Item {
                sku: "A-1".into(),
                qty: 4,
                price: 2.5,
                labels: vec!["fragile".into()],
            },
            Item {
                sku: "B-2".into(),
                qty: -1,
                price: 0.0,
                labels: Vec::new(),
            },
        ],
        stock: BTreeMap::from([("north".to_string(), 10), ("south".to_string(), 0)]),
        tags: HashMap::from([(1, "new".to_string()), (-7, "legacy".to_string())]),
        flags: BTreeMap::from([(true, 2)]),
        owner: Some(Owner {
            id: 42,
            email: "ops@example.com".into(),
        }),
        dims: [1.0, 0.5, 0.0],
        checksum: Bytes::from_static(&[0xde, 0xad]),
        signal: Complex64::new(1.5, -2.0),
    }
}

/// A flat counter, handy for timing tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    /// The count.
    pub value: i64,
}

reflect_struct!(Counter { value });
