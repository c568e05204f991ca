// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured access to testshard's machine-readable output.
//!
//! `testshard list --message-format json` emits a serialized inventory of test
//! binaries and the tests they contain. This crate defines the document's
//! types, along with [`ListCommand`] for invoking testshard from other
//! programs and decoding its output.
//!
//! The minimum supported Rust version is lower than for the rest of the
//! workspace so that downstream tooling can depend on this crate without
//! tracking testshard's own toolchain.

#![warn(missing_docs)]

mod errors;
mod exit_codes;
mod test_list;

pub use errors::*;
pub use exit_codes::*;
pub use test_list::*;
