// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
The error type reported by the low-level field codecs.

Every decode failure in this crate is a local, typed error: a short read is
never zero-filled and an unknown enumeration literal is never mapped to a
default. Higher layers wrap these values to say which field or record was
being processed when the failure occurred.

*/

use std::{io, str};
use thiserror::Error;

/// An error arising while encoding or decoding a single field value.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Fewer bytes were available than the field width demands.
    #[error(
        "truncated read at byte offset {offset}: needed {needed} bytes but only {available} were available"
    )]
    TruncatedRead {
        offset: u64,
        needed: usize,
        available: usize,
    },

    /// A string read from a stream does not name any literal of the target
    /// enumeration.
    #[error("`{literal}` is not a literal of the enumeration {enumeration}")]
    UnknownEnumLiteral {
        enumeration: &'static str,
        literal: String,
    },

    /// A length or dimension prefix was negative or otherwise unusable.
    #[error("illegal length prefix {0}")]
    InvalidLength(i64),

    /// Some text could not be parsed as a value of the expected type.
    #[error("cannot parse `{text}` as {what}")]
    InvalidText { what: &'static str, text: String },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Utf8(#[from] str::Utf8Error),
}

impl CodecError {
    /// Convenience constructor for text parse failures.
    pub fn invalid_text<S: Into<String>>(what: &'static str, text: S) -> Self {
        CodecError::InvalidText {
            what,
            text: text.into(),
        }
    }
}

/// A result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
