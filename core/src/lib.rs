// Copyright 2017-2023 Peter Williams and collaborators
// Licensed under the MIT License.

/*!
Core types and traits for Rubbl.

This crate provides the leaf layer shared by the Rubbl format crates:
endian-aware binary streams ([`io`]), per-field binary and XML text codecs
([`codec`]), the error types they report ([`errors`]), and the framework for
telling the user what is going on ([`notify`]).

*/

pub mod codec;
pub mod errors;
pub mod io;
#[macro_use]
pub mod notify;

// convenience re-exports; these help ensure that downstream crates agree on
// the versions of these types that appear in our public APIs.
pub use anyhow::{Error, Result};
pub use ndarray::{self, Array2};
pub use num_complex::{self, Complex};
