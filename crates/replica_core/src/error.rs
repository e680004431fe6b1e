//! Error types for Replica core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// A scalar value that could not be converted to a declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// The value's variant does not fit the declared type at all.
    #[error("expected {expected}, found {found}")]
    Mismatch {
        /// Declared type.
        expected: &'static str,
        /// Variant that arrived.
        found: &'static str,
    },

    /// The value is of the right family but out of range.
    #[error("{value} does not fit in {target}")]
    Overflow {
        /// Declared type.
        target: &'static str,
        /// Rendered value.
        value: String,
    },
}

impl ConvertError {
    /// Creates a mismatch error.
    pub fn mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::Mismatch { expected, found }
    }

    /// Creates an overflow error.
    pub fn overflow(target: &'static str, value: impl ToString) -> Self {
        Self::Overflow {
            target,
            value: value.to_string(),
        }
    }
}

/// Errors that can occur in Replica core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The entry's root type does not match the target.
    #[error("root type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type held by the receiver.
        expected: String,
        /// Root name carried by the entry.
        found: String,
    },

    /// The entry has no path at all.
    #[error("entry path is empty")]
    EmptyPath,

    /// A struct has no field with the requested name.
    #[error("no field {field} at {path}")]
    FieldNotFound {
        /// Position of the struct.
        path: String,
        /// Requested field.
        field: String,
    },

    /// A sequence, array or map was reached without an index.
    #[error("missing index at {path}")]
    MissingIndex {
        /// Position of the container.
        path: String,
    },

    /// An index was supplied where no container expects one.
    #[error("unexpected index at {path}")]
    UnexpectedIndex {
        /// Position of the value.
        path: String,
    },

    /// A sequence or array index is not a non-negative integer.
    #[error("invalid index {index} at {path}")]
    InvalidIndex {
        /// Position of the container.
        path: String,
        /// Rendered index.
        index: String,
    },

    /// An array index lies outside the fixed length.
    #[error("index {index} out of bounds for length {len} at {path}")]
    IndexOutOfBounds {
        /// Position of the array.
        path: String,
        /// Requested index.
        index: usize,
        /// Array length.
        len: usize,
    },

    /// A map key could not be converted to the declared key type.
    #[error("invalid key at {path}: {source}")]
    InvalidKey {
        /// Position of the map.
        path: String,
        /// Conversion failure.
        source: ConvertError,
    },

    /// A leaf value could not be converted to the declared type.
    #[error("cannot set {path}: {source}")]
    Convert {
        /// Position of the leaf.
        path: String,
        /// Conversion failure.
        source: ConvertError,
    },

    /// A remove was aimed at a plain scalar.
    #[error("cannot remove scalar at {path}")]
    InvalidRemove {
        /// Position of the scalar.
        path: String,
    },

    /// The path ends on a container instead of a leaf.
    #[error("path ends at a container at {path}")]
    IncompletePath {
        /// Position of the container.
        path: String,
    },

    /// The path continues past a scalar.
    #[error("path continues past scalar at {path}")]
    TrailingPath {
        /// Position of the scalar.
        path: String,
    },

    /// A dynamic slot holds no value to descend into.
    #[error("dynamic value at {path} is empty; seed it before injecting")]
    EmptyDynamic {
        /// Position of the slot.
        path: String,
    },

    /// The value at this position has no supported shape.
    #[error("unsupported type {type_name} at {path}")]
    Unsupported {
        /// Position of the value.
        path: String,
        /// Rust type name.
        type_name: &'static str,
    },

    /// The coordinator was closed.
    #[error("coordinator is closed")]
    Closed,
}

impl CoreError {
    /// Creates a root type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Returns true if the error stems from the entry rather than the target.
    ///
    /// Such entries will fail the same way on every retry.
    pub fn is_malformed_entry(&self) -> bool {
        !matches!(self, CoreError::Closed | CoreError::EmptyDynamic { .. })
    }
}
