// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testshard-runner.

use crate::test_filter::RunIgnored;
use camino::Utf8PathBuf;
use std::{borrow::Cow, process::ExitStatus, time::Duration};
use testshard_metadata::BinaryId;
use thiserror::Error;

/// An error that occurs while parsing a [`RunIgnored`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for run-ignored: {input}\n(known values: {})",
    RunIgnored::variants().join(", "),
)]
pub struct RunIgnoredParseError {
    input: String,
}

impl RunIgnoredParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while parsing a
/// [`PartitionerBuilder`](crate::partition::PartitionerBuilder) input.
#[derive(Clone, Debug, Error)]
pub struct PartitionerBuilderParseError {
    expected_format: Option<&'static str>,
    message: Cow<'static, str>,
}

impl PartitionerBuilderParseError {
    pub(crate) fn new(
        expected_format: Option<&'static str>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            expected_format,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PartitionerBuilderParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.expected_format {
            Some(format) => {
                write!(
                    f,
                    "partition must be in the format \"{}\":\n{}",
                    format, self.message
                )
            }
            None => write!(f, "{}", self.message),
        }
    }
}

/// An error that occurs while building a
/// [`TestFilterBuilder`](crate::test_filter::TestFilterBuilder).
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum TestFilterBuilderError {
    /// An error occurred while constructing the name pattern matcher.
    #[error("error constructing name pattern matcher")]
    Construct {
        /// The underlying error.
        #[from]
        error: aho_corasick::BuildError,
    },
}

/// An error that occurs while discovering the tests in one binary.
///
/// Discovery errors are scoped to a single binary: they are recorded in that
/// binary's slot in the [`TestList`](crate::list::TestList) and do not abort
/// list construction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The proposed cwd for the binary is not a directory.
    #[error(
        "for `{binary_id}`, current directory `{cwd}` is not a directory\n\
         (hint: ensure project source is available at this location)"
    )]
    CwdIsNotDir {
        /// The binary ID for which the current directory wasn't found.
        binary_id: BinaryId,

        /// The current directory that wasn't found.
        cwd: Utf8PathBuf,
    },

    /// Running the binary's list command failed.
    #[error(
        "for `{binary_id}`, running command `{}` failed",
        shell_words::join(command)
    )]
    CommandExecFail {
        /// The binary ID for which gathering the list of tests failed.
        binary_id: BinaryId,

        /// The command that was run.
        command: Vec<String>,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The binary's list command exited with a non-zero code.
    #[error(
        "for `{binary_id}`, command `{}` exited with {exit_status}\n--- stderr:\n{}",
        shell_words::join(command),
        String::from_utf8_lossy(stderr)
    )]
    CommandFail {
        /// The binary ID for which gathering the list of tests failed.
        binary_id: BinaryId,

        /// The command that was run.
        command: Vec<String>,

        /// The exit status the command finished with.
        exit_status: ExitStatus,

        /// Standard output for the command.
        stdout: Vec<u8>,

        /// Standard error for the command.
        stderr: Vec<u8>,
    },

    /// The binary's list command produced output that isn't UTF-8.
    #[error(
        "for `{binary_id}`, command `{}` produced non-UTF-8 output",
        shell_words::join(command)
    )]
    CommandNonUtf8 {
        /// The binary ID for which gathering the list of tests failed.
        binary_id: BinaryId,

        /// The command that was run.
        command: Vec<String>,

        /// Standard output for the command.
        stdout: Vec<u8>,

        /// Standard error for the command.
        stderr: Vec<u8>,
    },

    /// A line in the binary's listing output could not be parsed.
    #[error("for `{binary_id}`, {message}\nfull output:\n{full_output}")]
    ParseLine {
        /// The binary ID for which parsing the list of tests failed.
        binary_id: BinaryId,

        /// A descriptive message.
        message: Cow<'static, str>,

        /// The full output.
        full_output: String,
    },

    /// Discovery did not complete within the configured per-call timeout.
    #[error("for `{binary_id}`, test discovery timed out after {timeout:?}")]
    Timeout {
        /// The binary ID for which discovery timed out.
        binary_id: BinaryId,

        /// The configured timeout.
        timeout: Duration,
    },

    /// Discovery for this binary was cancelled by the caller.
    ///
    /// A cancelled binary is treated exactly like a failed one: its suite is
    /// recorded with this error and contributes no tests.
    #[error("for `{binary_id}`, test discovery was cancelled")]
    Cancelled {
        /// The binary ID for which discovery was cancelled.
        binary_id: BinaryId,
    },
}

impl DiscoveryError {
    pub(crate) fn command_exec_fail(
        binary_id: BinaryId,
        command: impl IntoIterator<Item = impl Into<String>>,
        error: std::io::Error,
    ) -> Self {
        Self::CommandExecFail {
            binary_id,
            command: command.into_iter().map(|s| s.into()).collect(),
            error,
        }
    }

    pub(crate) fn parse_line(
        binary_id: BinaryId,
        message: impl Into<Cow<'static, str>>,
        full_output: impl Into<String>,
    ) -> Self {
        Self::ParseLine {
            binary_id,
            message: message.into(),
            full_output: full_output.into(),
        }
    }
}

/// A binary reported the same test name more than once.
///
/// Test names must be unique within their binary. A collision makes the
/// offending binary a failed suite; the rest of the run proceeds.
#[derive(Clone, Debug, Error)]
#[error("duplicate test name `{test_name}` reported by binary `{binary_id}`")]
pub struct NameCollisionError {
    /// The binary whose listing collided.
    pub binary_id: BinaryId,

    /// The duplicated test name.
    pub test_name: String,
}

/// The error recorded for a binary that could not contribute tests to a
/// [`TestList`](crate::list::TestList).
#[derive(Debug, Error)]
pub enum ListBinaryError {
    /// Discovery failed for this binary.
    #[error("error discovering tests")]
    Discovery(
        /// The underlying error.
        #[from]
        #[source]
        DiscoveryError,
    ),

    /// The binary's listing reported a duplicate test name.
    #[error(transparent)]
    NameCollision(#[from] NameCollisionError),
}

/// A fatal error that occurs while creating a test list.
///
/// Per-binary failures are not fatal; see
/// [`ListBinaryError`] for those.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CreateTestListError {
    /// The Tokio runtime for discovery could not be created.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// Two artifacts carried the same binary ID.
    #[error("duplicate binary ID `{binary_id}` among provided artifacts")]
    DuplicateBinaryId {
        /// The ID that appeared more than once.
        binary_id: BinaryId,
    },
}

/// An error that occurs while writing list output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteTestListError {
    /// An error occurred while writing the list to the provided output.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),

    /// An error occurred while serializing JSON, or while writing it to the provided output.
    #[error("error serializing to JSON")]
    Json(#[source] serde_json::Error),
}

/// An error that occurs while reporting a selection event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),
}
