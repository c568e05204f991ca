// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `testshard` failures.
///
/// `testshard` invocations may fail for a variety of reasons. This structure
/// documents the exit codes that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum TestshardExitCode {}

impl TestshardExitCode {
    /// No errors occurred and testshard exited normally.
    pub const OK: i32 = 0;

    /// A user issue happened while setting up a testshard invocation.
    pub const SETUP_ERROR: i32 = 96;

    /// Creating a test list produced an error.
    pub const TEST_LIST_CREATION_FAILED: i32 = 104;

    /// A test list was produced, but discovery failed for one or more
    /// binaries within it.
    pub const INCOMPLETE_TEST_LIST: i32 = 106;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
