// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [testshard](https://crates.io/crates/testshard). For a
//! higher-level overview, see that documentation.
//!
//! This crate discovers tests within compiled test binaries, assembles them
//! into an ordered [test list](crate::list::TestList), and deterministically
//! assigns them to shards so that independently-invoked processes agree on who
//! runs what without coordinating.

pub mod discovery;
pub mod errors;
mod helpers;
pub mod list;
pub mod partition;
pub mod reporter;
pub mod test_filter;
