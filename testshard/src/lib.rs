// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A shard-aware test lister and selector for pre-built test binaries.
//!
//! For documentation and usage, see the `testshard` README and the
//! [`testshard-runner`](https://crates.io/crates/testshard-runner) crate,
//! which contains the underlying library API.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputWriter;
