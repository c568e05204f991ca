// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use owo_colors::OwoColorize;
use std::error::Error;
use testshard_metadata::TestshardExitCode;
use testshard_runner::errors::{
    CreateTestListError, TestFilterBuilderError, WriteEventError, WriteTestListError,
};
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error expected to occur during normal operation, with a documented exit
/// code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: camino::FromPathBufError,
    },
    #[error("test filter build error")]
    TestFilterBuilderError {
        #[from]
        err: TestFilterBuilderError,
    },
    #[error("create test list error")]
    CreateTestListError {
        #[source]
        err: CreateTestListError,
    },
    #[error("test discovery failed for some binaries")]
    ListBinariesFailed { failed: usize },
    #[error("writing test list to output failed")]
    WriteTestListError {
        #[from]
        err: WriteTestListError,
    },
    #[error("writing event failed")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::TestFilterBuilderError { .. } => TestshardExitCode::SETUP_ERROR,
            Self::CreateTestListError { .. } => TestshardExitCode::TEST_LIST_CREATION_FAILED,
            Self::ListBinariesFailed { .. } => TestshardExitCode::INCOMPLETE_TEST_LIST,
            Self::WriteTestListError { .. } | Self::WriteEventError { .. } => {
                TestshardExitCode::WRITE_OUTPUT_ERROR
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!("the current directory is not valid UTF-8");
                Some(err as &dyn Error)
            }
            Self::TestFilterBuilderError { err } => {
                error!("{err}");
                err.source()
            }
            Self::CreateTestListError { err } => {
                error!("creating the test list failed");
                Some(err as &dyn Error)
            }
            Self::ListBinariesFailed { failed } => {
                error!(
                    "test discovery failed for {} binaries, so the list is incomplete",
                    failed.style(styles.bold),
                );
                None
            }
            Self::WriteTestListError { err } => {
                error!("failed to write the test list");
                Some(err as &dyn Error)
            }
            Self::WriteEventError { err } => {
                error!("failed to report the test selection");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: "testshard::no_heading", "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

/// An error that occurred while parsing a `--bin` spec on the command line.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BinarySpecParseError {
    /// The path component of the spec is empty.
    #[error("binary spec `{input}` has an empty path")]
    EmptyPath {
        /// The spec as passed in.
        input: String,
    },

    /// The name component of the spec is empty.
    #[error("binary spec `{input}` has an empty name")]
    EmptyName {
        /// The spec as passed in.
        input: String,
    },
}
