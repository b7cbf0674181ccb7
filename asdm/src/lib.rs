// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
Access to ALMA Science Data Model (ASDM) tables.

An ASDM dataset is a directory of tables. Each table is stored either as an
XML document or as a MIME multipart message that pairs a short XML header
with a binary payload. This crate implements both representations on top of
a single schema-driven row type:

- a [`schema::Schema`] describes a table's fields statically;
- a [`row::Row`] holds one record's values and knows how to encode and
  decode itself;
- a [`table::Table`] owns its rows, enforces key uniqueness, and reads and
  writes whole tables.

The binary payload of a MIME table lists its fields in an order announced by
the XML header, which need not match the order in the schema; see the
[`order`] module.

*/

use std::io;
use thiserror::Error;

pub mod enums;
pub mod mime;
pub mod order;
pub mod row;
pub mod schema;
pub mod schemas;
pub mod table;
pub mod types;
pub mod xml;

pub use row::Row;
pub use schema::{FieldType, Schema, Value};
pub use table::Table;

use rubbl_core::errors::CodecError;

/// An error arising while manipulating ASDM rows and tables.
#[derive(Error, Debug)]
pub enum SdmError {
    /// A key or extrinsic field was modified on a row that already belongs
    /// to a table.
    #[error("illegal access to field `{field}` of a row already added to the {table} table")]
    IllegalAccess {
        /// The field that was modified.
        field: String,
        /// The table that owns the row.
        table: &'static str,
    },

    /// An optional field was read while absent.
    #[error("optional field `{field}` of the {table} table is absent")]
    FieldAbsent {
        /// The field that was read.
        field: String,
        /// The table the row belongs to.
        table: &'static str,
    },

    /// A mandatory field cannot be cleared.
    #[error("field `{field}` of the {table} table is not optional")]
    NotOptional {
        /// The field that was cleared.
        field: String,
        /// The table the row belongs to.
        table: &'static str,
    },

    /// A field name is not part of the table's schema.
    #[error("the {table} table has no field `{field}`")]
    NoSuchField {
        /// The unrecognized field name.
        field: String,
        /// The table that was consulted.
        table: &'static str,
    },

    /// A value of the wrong type or shape was supplied for a field.
    #[error("value {value} is not suitable for field `{field}` of the {table} table")]
    TypeMismatch {
        /// The field concerned.
        field: String,
        /// The table the row belongs to.
        table: &'static str,
        /// A rendering of the offending value.
        value: String,
    },

    /// A row whose key duplicates that of an existing row was added.
    #[error("duplicate key ({key}) in the {table} table")]
    DuplicateKey {
        /// A rendering of the key tuple.
        key: String,
        /// The table concerned.
        table: &'static str,
    },

    /// A row rendered to XML contains a reference that does not point to
    /// the table its schema requires.
    #[error("field `{field}` of the {table} table refers to `{tag}`, which is not a row of the {expected} table")]
    DanglingReference {
        /// The field holding the reference.
        field: String,
        /// The table the row belongs to.
        table: &'static str,
        /// The offending reference.
        tag: String,
        /// The table the reference should point to.
        expected: &'static str,
    },

    /// A binary stream names a field that neither the schema nor the
    /// table's unknown-attribute registry knows about.
    #[error("unknown attribute `{field}` in binary data for the {table} table")]
    UnknownAttribute {
        /// The unrecognized attribute name.
        field: String,
        /// The table being read.
        table: &'static str,
    },

    /// The XML header of a binary table does not have the expected
    /// structure.
    #[error("malformed binary table header: {0}")]
    MalformedHeader(String),

    /// An XML table document does not have the expected structure.
    #[error("malformed XML table document: {0}")]
    MalformedDocument(String),

    /// A MIME message lacks one of its expected part delimiters.
    #[error("malformed MIME message: {0}")]
    MalformedMime(String),

    /// Data could not be converted into a row or table.
    #[error("cannot convert {table} data: {message}")]
    Conversion {
        /// The table concerned.
        table: &'static str,
        /// A description of the problem.
        message: String,
    },

    /// A single field failed to decode from a binary stream.
    #[error("failed to decode field `{field}` of the {table} table")]
    FieldDecode {
        /// The field that failed.
        field: String,
        /// The table being read.
        table: &'static str,
        /// The underlying codec failure.
        #[source]
        source: CodecError,
    },

    /// Neither the XML nor the binary file of a table exists.
    #[error("no file found for the {table} table in `{dir}`")]
    NoFileFound {
        /// The table that was sought.
        table: &'static str,
        /// The directory that was searched.
        dir: String,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SdmError {
    /// Wrap any displayable problem as a conversion error.
    pub fn conversion<D: std::fmt::Display>(table: &'static str, problem: D) -> Self {
        SdmError::Conversion {
            table,
            message: problem.to_string(),
        }
    }
}

/// A result type for ASDM operations.
pub type Result<T> = std::result::Result<T, SdmError>;
