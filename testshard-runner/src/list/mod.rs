// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for building and querying lists of tests and test binaries.
//!
//! The main data structure in this module is [`TestList`], built from
//! [`TestBinary`] inputs by running a discovery capability over them.

mod output_format;
mod test_list;

pub use output_format::*;
pub use test_list::*;
