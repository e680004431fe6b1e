//! Diff extraction.
//!
//! An [`Extractor`] keeps a private deep copy of the last state it reported
//! and compares every new state against it. Each call advances the snapshot,
//! so unchanged state never produces the same records twice.
//!
//! Leaves under a container slot that did not exist on the old side (a grown
//! sequence, a new map key, an optional that became set) are always emitted,
//! even when they hold their zero value. Replaying the records onto a default
//! value therefore rebuilds the exact state.

use crate::diff::{render_steps, Diff, DiffNode, Step};
use crate::reflect::{same_type, Reflect, Shape};
use parking_lot::Mutex;
use replica_sync_protocol::{Entry, Value};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Computes change records for successive states of one value.
#[derive(Debug)]
pub struct Extractor<T> {
    snapshot: Mutex<T>,
}

impl<T: Reflect + Clone + Default> Default for Extractor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reflect + Clone + Default> Extractor<T> {
    /// Creates an extractor whose baseline is `T::default()`.
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(T::default()),
        }
    }

    /// Creates an extractor whose baseline is a copy of `baseline`.
    pub fn with_baseline(baseline: &T) -> Self {
        Self {
            snapshot: Mutex::new(baseline.clone()),
        }
    }

    /// Diffs `current` against the snapshot and advances the snapshot.
    pub fn diff(&self, current: &T) -> Diff {
        let mut snapshot = self.snapshot.lock();
        let diff = compute(&*snapshot, current);
        *snapshot = current.clone();
        diff
    }

    /// Diffs `current` against the snapshot, advances it, and flattens.
    pub fn entries(&self, current: &T) -> Vec<Entry> {
        let diff = self.diff(current);
        let entries = diff.entries();
        debug!(
            root = diff.root_name,
            entries = entries.len(),
            unsupported = diff.unsupported.len(),
            "extracted changes"
        );
        entries
    }

    /// Advances the snapshot to `current` without reporting anything.
    pub fn absorb(&self, current: &T) {
        *self.snapshot.lock() = current.clone();
    }

    /// Resets the snapshot to `T::default()`, so the next diff reports
    /// the full state.
    pub fn reset(&self) {
        *self.snapshot.lock() = T::default();
    }
}

/// Diffs two values of the same type without any snapshot bookkeeping.
pub fn compute(old: &dyn Reflect, new: &dyn Reflect) -> Diff {
    let mut walk = Walk::default();
    let root = walk.node(Some(old), new, Step::Root(new.type_name().to_string()));
    Diff {
        root_name: new.type_name(),
        generated_at: SystemTime::now(),
        root,
        unsupported: walk.unsupported,
    }
}

/// Diffs a value against an absent baseline: every leaf is reported.
pub fn compute_full(new: &dyn Reflect) -> Diff {
    let mut walk = Walk::default();
    let root = walk.node(None, new, Step::Root(new.type_name().to_string()));
    Diff {
        root_name: new.type_name(),
        generated_at: SystemTime::now(),
        root,
        unsupported: walk.unsupported,
    }
}

enum Change {
    Set(Value),
    Remove,
    Children(Vec<DiffNode>),
}

#[derive(Default)]
struct Walk {
    trail: Vec<Step>,
    unsupported: Vec<String>,
}

impl Walk {
    /// `old == None` is the absent baseline.
    fn node(&mut self, old: Option<&dyn Reflect>, new: &dyn Reflect, step: Step) -> Option<DiffNode> {
        self.trail.push(step);
        let change = self.change(old, new);
        let step = self.trail.pop()?;
        Some(match change? {
            Change::Set(value) => DiffNode::set(step, value),
            Change::Remove => DiffNode::remove(step),
            Change::Children(children) => DiffNode::branch(step, children),
        })
    }

    fn change(&mut self, old: Option<&dyn Reflect>, new: &dyn Reflect) -> Option<Change> {
        let prev = old.map(|old| old.shape());
        match new.shape() {
            Shape::Scalar(value) => match prev {
                Some(Shape::Scalar(prev)) if prev == value => None,
                _ => Some(Change::Set(value)),
            },

            Shape::Optional(held) => {
                let prev = match prev {
                    Some(Shape::Optional(prev)) => Some(prev),
                    _ => None,
                };
                match (prev, held) {
                    (prev, Some(held)) => self.change(prev.flatten(), held),
                    (Some(Some(_)), None) => Some(Change::Remove),
                    _ => None,
                }
            }

            Shape::Dynamic(held) => {
                let prev = match prev {
                    Some(Shape::Dynamic(prev)) => Some(prev),
                    _ => None,
                };
                match (prev, held) {
                    (prev, Some(held)) => {
                        let baseline = prev.flatten().filter(|prev| same_type(*prev, held));
                        self.change(baseline, held)
                    }
                    (Some(Some(_)), None) => Some(Change::Remove),
                    _ => None,
                }
            }

            Shape::Struct(fields) => {
                let prev = match prev {
                    Some(Shape::Struct(prev)) => prev,
                    _ => Vec::new(),
                };
                let children: Vec<_> = fields
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, (name, field))| {
                        let old_field = prev.get(i).map(|(_, field)| *field);
                        self.node(old_field, field, Step::Field(name))
                    })
                    .collect();
                (!children.is_empty()).then_some(Change::Children(children))
            }

            Shape::Sequence(items) => {
                let prev = match prev {
                    Some(Shape::Sequence(prev)) => prev,
                    _ => Vec::new(),
                };
                let mut children = self.indexed(&prev, &items);
                if items.len() < prev.len() {
                    children.push(DiffNode::remove(Step::Index(index_value(items.len()))));
                }
                (!children.is_empty()).then_some(Change::Children(children))
            }

            Shape::Array(items) => {
                let prev = match prev {
                    Some(Shape::Array(prev)) => prev,
                    _ => Vec::new(),
                };
                let children = self.indexed(&prev, &items);
                (!children.is_empty()).then_some(Change::Children(children))
            }

            Shape::Map(pairs) => {
                let prev = match prev {
                    Some(Shape::Map(prev)) => prev,
                    _ => Vec::new(),
                };
                let mut children: Vec<_> = prev
                    .iter()
                    .filter(|(key, _)| pairs.binary_search_by(|(k, _)| k.cmp_key(key)).is_err())
                    .map(|(key, _)| DiffNode::remove(Step::Index(key.clone())))
                    .collect();
                for (key, value) in pairs {
                    let old_value = prev
                        .binary_search_by(|(k, _)| k.cmp_key(&key))
                        .ok()
                        .map(|i| prev[i].1);
                    children.extend(self.node(old_value, value, Step::Index(key)));
                }
                (!children.is_empty()).then_some(Change::Children(children))
            }

            Shape::Unsupported(type_name) => {
                let path = render_steps(&self.trail);
                warn!(path = %path, type_name, "skipping unsupported value");
                self.unsupported.push(path);
                None
            }
        }
    }

    fn indexed(&mut self, prev: &[&dyn Reflect], items: &[&dyn Reflect]) -> Vec<DiffNode> {
        items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| self.node(prev.get(i).copied(), *item, Step::Index(index_value(i))))
            .collect()
    }
}

fn index_value(index: usize) -> Value {
    Value::U64(index as u64)
}
