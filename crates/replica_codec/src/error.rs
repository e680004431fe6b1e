//! Codec failures.

use thiserror::Error;

/// Shorthand for results carrying a [`CodecError`].
pub type CodecResult<T> = Result<T, CodecError>;

/// Why bytes could not be turned into an item or an item into a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended in the middle of an item.
    #[error("input ended inside an item")]
    UnexpectedEof,

    /// A complete item was followed by more bytes.
    #[error("{remaining} bytes left after the item")]
    TrailingBytes {
        /// How many bytes were not consumed.
        remaining: usize,
    },

    /// A head used the indefinite-length form or a stray break.
    #[error("indefinite lengths are not accepted")]
    IndefiniteLengthForbidden,

    /// A text string held bytes that are not UTF-8.
    #[error("text string is not UTF-8")]
    InvalidUtf8,

    /// A head claimed a length above the accepted bound.
    #[error("claimed length {claimed} exceeds {max_allowed}")]
    SizeLimitExceeded {
        /// Length found in the head.
        claimed: u64,
        /// Largest accepted length.
        max_allowed: u64,
    },

    /// Arrays, maps or tags nested deeper than the reader accepts.
    #[error("nesting deeper than {max} levels")]
    NestingTooDeep {
        /// Deepest accepted nesting.
        max: usize,
    },

    /// A negative integer does not fit in an `i64`.
    #[error("integer out of range")]
    IntegerOverflow,

    /// Well-formed CBOR that breaks the deterministic rules or the expected
    /// message shape.
    #[error("malformed item: {message}")]
    InvalidStructure {
        /// What was wrong.
        message: String,
    },

    /// A CBOR type or tag this codec has no representation for.
    #[error("unsupported item: {type_name}")]
    UnsupportedType {
        /// The offending type.
        type_name: String,
    },
}

impl CodecError {
    /// A [`CodecError::InvalidStructure`] with the given message.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// A [`CodecError::InvalidStructure`] naming a required map field that
    /// was absent.
    pub fn missing_field(name: &str) -> Self {
        Self::invalid_structure(format!("missing {name}"))
    }

    /// A [`CodecError::UnsupportedType`] for `type_name`.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }
}
