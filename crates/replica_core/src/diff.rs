//! Intermediate diff tree.

use replica_sync_protocol::{Entry, Key, Value};
use std::time::SystemTime;

/// How a node is reached from its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The root value, named by its type.
    Root(String),
    /// A struct field. Starts a new path key.
    Field(&'static str),
    /// A container index. Extends the current path key.
    Index(Value),
}

/// One changed position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffNode {
    /// How this node is reached.
    pub step: Step,
    /// New leaf value, for changed scalars.
    pub value: Option<Value>,
    /// Whether the value at this position was removed.
    pub remove: bool,
    /// Changed descendants, in emission order.
    pub children: Vec<DiffNode>,
}

impl DiffNode {
    /// A changed leaf.
    pub fn set(step: Step, value: Value) -> Self {
        Self {
            step,
            value: Some(value),
            remove: false,
            children: Vec::new(),
        }
    }

    /// A removed position.
    pub fn remove(step: Step) -> Self {
        Self {
            step,
            value: None,
            remove: true,
            children: Vec::new(),
        }
    }

    /// An interior node.
    pub fn branch(step: Step, children: Vec<DiffNode>) -> Self {
        Self {
            step,
            value: None,
            remove: false,
            children,
        }
    }

    fn flatten_into(&self, parent: &[Key], out: &mut Vec<Entry>) {
        let mut path = parent.to_vec();
        push_step(&mut path, &self.step);
        if self.remove {
            out.push(Entry::remove(path.clone()));
        } else if let Some(value) = &self.value {
            out.push(Entry::set(path.clone(), value.clone()));
        }
        for child in &self.children {
            child.flatten_into(&path, out);
        }
    }
}

/// Applies one step to a path under construction.
pub(crate) fn push_step(path: &mut Vec<Key>, step: &Step) {
    match step {
        Step::Root(name) => path.push(Key::new(name.as_str())),
        Step::Field(name) => path.push(Key::new(*name)),
        Step::Index(index) => match path.last_mut() {
            Some(key) => key.indices.push(index.clone()),
            None => path.push(Key::new("").with_index(index.clone())),
        },
    }
}

/// Renders a chain of steps the way an entry path displays.
pub(crate) fn render_steps(steps: &[Step]) -> String {
    let mut path = Vec::new();
    for step in steps {
        push_step(&mut path, step);
    }
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Result of comparing a snapshot with a new state.
#[derive(Debug, Clone)]
pub struct Diff {
    /// Root type name.
    pub root_name: &'static str,
    /// When the diff was computed.
    pub generated_at: SystemTime,
    /// Changed positions, `None` when nothing changed.
    pub root: Option<DiffNode>,
    /// Paths of values that could not be diffed.
    pub unsupported: Vec<String>,
}

impl Diff {
    /// Returns true when nothing changed.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Flattens the tree into ordered change records.
    pub fn entries(&self) -> Vec<Entry> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.flatten_into(&[], &mut out);
        }
        out
    }
}
