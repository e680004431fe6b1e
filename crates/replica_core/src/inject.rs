//! Patch injection.

use crate::error::{CoreError, CoreResult};
use crate::reflect::{Reflect, ShapeMut};
use replica_sync_protocol::{Entry, Op, PathCursor, Value};
use tracing::{debug, warn};

/// Outcome of applying a batch of entries.
///
/// Application is best-effort: one failing entry never stops the rest, and
/// nothing is rolled back.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Number of entries applied.
    pub applied: usize,
    /// Failed entries by position in the batch.
    pub failures: Vec<(usize, CoreError)>,
}

impl BatchReport {
    /// Returns true when every entry applied.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of entries seen.
    pub fn total(&self) -> usize {
        self.applied + self.failures.len()
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: BatchReport) {
        let offset = self.total();
        self.applied += other.applied;
        self.failures.extend(
            other
                .failures
                .into_iter()
                .map(|(index, err)| (index + offset, err)),
        );
    }
}

/// Applies change records to values. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct Injector;

impl Injector {
    /// Creates an injector.
    pub fn new() -> Self {
        Self
    }

    /// Applies one entry to `target`.
    ///
    /// The entry's root name must match `target.type_name()`.
    pub fn apply(&self, target: &mut dyn Reflect, entry: &Entry) -> CoreResult<()> {
        let root = entry.root_name().ok_or(CoreError::EmptyPath)?;
        if root != target.type_name() {
            return Err(CoreError::type_mismatch(target.type_name(), root));
        }
        let mut cursor = entry.cursor();
        walk(target, &mut cursor, &entry.op)
    }

    /// Applies every entry in order, collecting failures.
    pub fn apply_all(&self, target: &mut dyn Reflect, entries: &[Entry]) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, entry) in entries.iter().enumerate() {
            match self.apply(target, entry) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    warn!(%entry, error = %err, "failed to apply entry");
                    report.failures.push((index, err));
                }
            }
        }
        debug!(
            applied = report.applied,
            failed = report.failures.len(),
            "applied batch"
        );
        report
    }
}

/// Largest number of default elements one entry may append to a sequence.
const MAX_SEQUENCE_GAP: usize = 1 << 16;

fn walk(target: &mut dyn Reflect, cursor: &mut PathCursor<'_>, op: &Op) -> CoreResult<()> {
    let removing = matches!(op, Op::Remove);
    match target.shape_mut() {
        ShapeMut::Scalar(slot) => {
            if cursor.has_pending_index() {
                return Err(CoreError::UnexpectedIndex {
                    path: cursor.position(),
                });
            }
            if !cursor.is_exhausted() {
                return Err(CoreError::TrailingPath {
                    path: cursor.position(),
                });
            }
            match op {
                Op::Set(value) => slot.set(value).map_err(|source| CoreError::Convert {
                    path: cursor.position(),
                    source,
                }),
                Op::Remove => Err(CoreError::InvalidRemove {
                    path: cursor.position(),
                }),
            }
        }

        ShapeMut::Optional(slot) => {
            if removing && cursor.is_exhausted() {
                slot.clear();
                return Ok(());
            }
            walk(slot.get_or_insert(), cursor, op)
        }

        ShapeMut::Dynamic(slot) => {
            if removing && cursor.is_exhausted() {
                slot.clear();
                return Ok(());
            }
            let path = cursor.position();
            match slot.get_mut() {
                Some(held) => walk(held, cursor, op),
                None => Err(CoreError::EmptyDynamic { path }),
            }
        }

        ShapeMut::Sequence(slot) => {
            let Some(index) = cursor.next_index() else {
                if removing && cursor.is_exhausted() {
                    slot.clear();
                    return Ok(());
                }
                return Err(CoreError::MissingIndex {
                    path: cursor.position(),
                });
            };
            let index = to_usize(index, cursor)?;
            if removing && cursor.is_exhausted() {
                slot.truncate(index);
                return Ok(());
            }
            let len = slot.len();
            if index > len.saturating_add(MAX_SEQUENCE_GAP) {
                return Err(CoreError::IndexOutOfBounds {
                    path: cursor.position(),
                    index,
                    len,
                });
            }
            walk(slot.element(index), cursor, op)
        }

        ShapeMut::Array(mut items) => {
            let index = cursor.next_index().ok_or_else(|| CoreError::MissingIndex {
                path: cursor.position(),
            })?;
            let index = to_usize(index, cursor)?;
            let len = items.len();
            if index >= len {
                return Err(CoreError::IndexOutOfBounds {
                    path: cursor.position(),
                    index,
                    len,
                });
            }
            walk(items.swap_remove(index), cursor, op)
        }

        ShapeMut::Map(slot) => {
            let Some(key) = cursor.next_index() else {
                if removing && cursor.is_exhausted() {
                    slot.clear();
                    return Ok(());
                }
                return Err(CoreError::MissingIndex {
                    path: cursor.position(),
                });
            };
            let invalid = |source| CoreError::InvalidKey {
                path: cursor.position(),
                source,
            };
            if removing && cursor.is_exhausted() {
                return slot.remove(key).map_err(invalid);
            }
            let value = slot.entry(key).map_err(invalid)?;
            walk(value, cursor, op)
        }

        ShapeMut::Struct(fields) => {
            if cursor.has_pending_index() {
                return Err(CoreError::UnexpectedIndex {
                    path: cursor.position(),
                });
            }
            let Some(key) = cursor.advance() else {
                return Err(CoreError::IncompletePath {
                    path: cursor.position(),
                });
            };
            let field = fields
                .into_iter()
                .find(|(name, _)| *name == key.name)
                .map(|(_, field)| field)
                .ok_or_else(|| CoreError::FieldNotFound {
                    path: cursor.position(),
                    field: key.name.clone(),
                })?;
            walk(field, cursor, op)
        }

        ShapeMut::Unsupported(type_name) => Err(CoreError::Unsupported {
            path: cursor.position(),
            type_name,
        }),
    }
}

fn to_usize(index: &Value, cursor: &PathCursor<'_>) -> CoreResult<usize> {
    let converted = match index {
        Value::I64(n) => usize::try_from(*n).ok(),
        Value::U64(n) => usize::try_from(*n).ok(),
        _ => None,
    };
    converted.ok_or_else(|| CoreError::InvalidIndex {
        path: cursor.position(),
        index: index.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{Dynamic, Opaque};
    use replica_sync_protocol::Key;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Inner {
        x: i16,
    }

    crate::reflect_struct!(Inner { x });

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Doc {
        count: u8,
        items: Vec<Inner>,
        grid: [[i32; 2]; 2],
        tags: HashMap<String, i64>,
        note: Option<String>,
        any: Dynamic,
        handle: Opaque<u32>,
    }

    crate::reflect_struct!(Doc {
        count,
        items,
        grid,
        tags,
        note,
        any,
        handle
    });

    fn path(keys: &[Key]) -> Vec<Key> {
        let mut path = vec![Key::new("Doc")];
        path.extend_from_slice(keys);
        path
    }

    fn apply(doc: &mut Doc, entry: Entry) -> CoreResult<()> {
        Injector::new().apply(doc, &entry)
    }

    #[test]
    fn sets_nested_values() {
        let mut doc = Doc::default();
        let entries = [
            Entry::set(path(&[Key::new("count")]), 9u64),
            Entry::set(
                path(&[Key::new("items").with_index(1u64), Key::new("x")]),
                -4i64,
            ),
            Entry::set(path(&[Key::new("grid").with_index(1u64).with_index(0u64)]), 7i64),
            Entry::set(path(&[Key::new("tags").with_index("a")]), 3i64),
            Entry::set(path(&[Key::new("note")]), "hi"),
        ];
        let report = Injector::new().apply_all(&mut doc, &entries);
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(doc.count, 9);
        assert_eq!(doc.items, [Inner { x: 0 }, Inner { x: -4 }]);
        assert_eq!(doc.grid, [[0, 0], [7, 0]]);
        assert_eq!(doc.tags.get("a"), Some(&3));
        assert_eq!(doc.note.as_deref(), Some("hi"));
    }

    #[test]
    fn removes_truncate_delete_and_clear() {
        let mut doc = Doc {
            items: vec![Inner { x: 1 }, Inner { x: 2 }, Inner { x: 3 }],
            tags: HashMap::from([("k".to_string(), 1), ("j".to_string(), 2)]),
            note: Some("x".into()),
            ..Doc::default()
        };
        apply(&mut doc, Entry::remove(path(&[Key::new("items").with_index(1u64)]))).unwrap();
        apply(&mut doc, Entry::remove(path(&[Key::new("tags").with_index("k")]))).unwrap();
        apply(&mut doc, Entry::remove(path(&[Key::new("note")]))).unwrap();
        assert_eq!(doc.items, [Inner { x: 1 }]);
        assert_eq!(doc.tags.len(), 1);
        assert_eq!(doc.note, None);

        apply(&mut doc, Entry::remove(path(&[Key::new("items")]))).unwrap();
        assert!(doc.items.is_empty());
    }

    #[test]
    fn root_name_must_match() {
        let mut doc = Doc::default();
        let entry = Entry::set(vec![Key::new("Other"), Key::new("count")], 1u64);
        assert!(matches!(
            Injector::new().apply(&mut doc, &entry),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn structural_errors() {
        let mut doc = Doc::default();
        let cases = [
            Entry::set(path(&[Key::new("missing")]), 1i64),
            Entry::set(path(&[Key::new("items"), Key::new("x")]), 1i64),
            Entry::set(path(&[Key::new("grid").with_index(5u64).with_index(0u64)]), 1i64),
            Entry::set(path(&[Key::new("count")]), 300u64),
            Entry::set(path(&[Key::new("count")]), "nine"),
            Entry::remove(path(&[Key::new("count")])),
            Entry::set(path(&[Key::new("tags").with_index(1i64)]), 1i64),
            Entry::set(path(&[Key::new("items").with_index(-1i64), Key::new("x")]), 1i64),
            Entry::set(path(&[Key::new("count"), Key::new("deeper")]), 1i64),
            Entry::set(path(&[Key::new("handle")]), 1u64),
        ];
        let report = Injector::new().apply_all(&mut doc, &cases);
        assert_eq!(report.applied, 0);
        let kinds: Vec<_> = report
            .failures
            .iter()
            .map(|(_, err)| std::mem::discriminant(err))
            .collect();
        let expected = [
            CoreError::FieldNotFound {
                path: String::new(),
                field: String::new(),
            },
            CoreError::MissingIndex {
                path: String::new(),
            },
            CoreError::IndexOutOfBounds {
                path: String::new(),
                index: 0,
                len: 0,
            },
            CoreError::Convert {
                path: String::new(),
                source: crate::ConvertError::overflow("u8", 0),
            },
            CoreError::Convert {
                path: String::new(),
                source: crate::ConvertError::overflow("u8", 0),
            },
            CoreError::InvalidRemove {
                path: String::new(),
            },
            CoreError::InvalidKey {
                path: String::new(),
                source: crate::ConvertError::overflow("u8", 0),
            },
            CoreError::InvalidIndex {
                path: String::new(),
                index: String::new(),
            },
            CoreError::TrailingPath {
                path: String::new(),
            },
            CoreError::Unsupported {
                path: String::new(),
                type_name: "",
            },
        ];
        let expected: Vec<_> = expected.iter().map(std::mem::discriminant).collect();
        assert_eq!(kinds, expected);
    }

    #[test]
    fn runaway_sequence_index_is_rejected() {
        let mut doc = Doc::default();
        let entry = Entry::set(
            path(&[Key::new("items").with_index(u64::MAX >> 8), Key::new("x")]),
            1i64,
        );
        assert!(matches!(
            apply(&mut doc, entry),
            Err(CoreError::IndexOutOfBounds { len: 0, .. })
        ));
        assert!(doc.items.is_empty());
    }

    #[test]
    fn dynamic_must_be_seeded() {
        let mut doc = Doc::default();
        let entry = Entry::set(path(&[Key::new("any"), Key::new("x")]), 5i64);
        assert!(matches!(
            apply(&mut doc, entry.clone()),
            Err(CoreError::EmptyDynamic { .. })
        ));

        doc.any = Dynamic::new(Inner::default());
        apply(&mut doc, entry).unwrap();
        assert_eq!(doc.any.downcast_ref::<Inner>(), Some(&Inner { x: 5 }));

        apply(&mut doc, Entry::remove(path(&[Key::new("any")]))).unwrap();
        assert!(doc.any.is_empty());
    }

    #[test]
    fn batch_continues_past_failures() {
        let mut doc = Doc::default();
        let entries = [
            Entry::set(path(&[Key::new("count")]), 1u64),
            Entry::set(path(&[Key::new("nope")]), 1u64),
            Entry::set(path(&[Key::new("note")]), "kept"),
        ];
        let report = Injector::new().apply_all(&mut doc, &entries);
        assert_eq!(report.applied, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 1);
        assert_eq!(doc.count, 1);
        assert_eq!(doc.note.as_deref(), Some("kept"));
    }

    #[test]
    fn reports_merge_with_offsets() {
        let mut first = BatchReport {
            applied: 2,
            failures: vec![(1, CoreError::EmptyPath)],
        };
        let second = BatchReport {
            applied: 0,
            failures: vec![(0, CoreError::EmptyPath)],
        };
        first.merge(second);
        assert_eq!(first.total(), 4);
        assert_eq!(first.failures[1].0, 3);
    }
}
