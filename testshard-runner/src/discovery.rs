// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovering the tests inside compiled test binaries.
//!
//! Discovery is a capability injected into [`TestList::new`](crate::list::TestList::new): the
//! core drives one [`TestDiscovery::list_tests`] call per binary and folds the results into
//! suites. [`ProcessDiscovery`] is the standard implementation, which runs each binary with its
//! listing instruction and parses the output.

use crate::{errors::DiscoveryError, list::TestBinary};
use futures::future::BoxFuture;
use std::{collections::BTreeMap, process::Output, time::Duration};
use testshard_metadata::{ListCapabilities, NativeTestInfo};
use tracing::debug;

/// One test as reported by a binary's own listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListedTest {
    /// The fully qualified test name.
    pub name: String,

    /// Attributes the binary reported for this test.
    pub info: NativeTestInfo,
}

/// Everything discovery learned about one binary.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BinaryListing {
    /// The tests reported by the binary, in listing order.
    ///
    /// Duplicate names are preserved here; they are rejected when the listing
    /// is folded into a suite.
    pub tests: Vec<ListedTest>,

    /// Capabilities the binary reported.
    pub capabilities: ListCapabilities,
}

/// A capability that enumerates the tests inside a test binary.
///
/// An error from `list_tests` is scoped to its binary: the corresponding suite
/// is recorded as failed and the rest of the run proceeds.
pub trait TestDiscovery: Send + Sync {
    /// Lists the tests in the given binary.
    fn list_tests<'a>(
        &'a self,
        binary: &'a TestBinary,
    ) -> BoxFuture<'a, Result<BinaryListing, DiscoveryError>>;
}

/// The standard discovery capability: runs the binary with `--list --format terse`, and again
/// with `--ignored` for the ignored set.
///
/// A test that shows up in both listings is recorded as ignored. Names are
/// sorted, so ordinal positions don't depend on how the two listings
/// interleave.
#[derive(Clone, Debug, Default)]
pub struct ProcessDiscovery {
    timeout: Option<Duration>,
}

impl ProcessDiscovery {
    /// Creates a new `ProcessDiscovery` with no time limit on listing calls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `ProcessDiscovery` that fails any single listing call
    /// taking longer than `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    async fn exec_listings(&self, binary: &TestBinary) -> Result<BinaryListing, DiscoveryError> {
        let non_ignored = Self::exec_single(binary, false).await?;
        let ignored = Self::exec_single(binary, true).await?;

        let mut test_names: BTreeMap<String, NativeTestInfo> = BTreeMap::new();
        for test_name in Self::parse(binary, &non_ignored)? {
            test_names.insert(
                test_name.to_owned(),
                NativeTestInfo {
                    ignored: false,
                    required_capabilities: Vec::new(),
                },
            );
        }
        for test_name in Self::parse(binary, &ignored)? {
            // A test that shows up in both listings is ignored.
            test_names.insert(
                test_name.to_owned(),
                NativeTestInfo {
                    ignored: true,
                    required_capabilities: Vec::new(),
                },
            );
        }

        Ok(BinaryListing {
            tests: test_names
                .into_iter()
                .map(|(name, info)| ListedTest { name, info })
                .collect(),
            capabilities: ListCapabilities {
                supports_ignored_filter: true,
                supports_json_output: false,
            },
        })
    }

    async fn exec_single(binary: &TestBinary, ignored: bool) -> Result<String, DiscoveryError> {
        let mut argv = vec![
            binary.binary_path.to_string(),
            "--list".to_owned(),
            "--format".to_owned(),
            "terse".to_owned(),
        ];
        if ignored {
            argv.push("--ignored".to_owned());
        }

        if !binary.cwd.is_dir() {
            return Err(DiscoveryError::CwdIsNotDir {
                binary_id: binary.binary_id.clone(),
                cwd: binary.cwd.clone(),
            });
        }

        debug!(
            "for `{}`, running listing command `{}` in `{}`",
            binary.binary_id,
            shell_words::join(&argv),
            binary.cwd,
        );

        let mut cmd = tokio::process::Command::new(&binary.binary_path);
        cmd.args(&argv[1..]).current_dir(&binary.cwd);
        // A timeout drops the output future mid-flight; take the child down
        // with it.
        cmd.kill_on_drop(true);

        let output = cmd.output().await.map_err(|error| {
            DiscoveryError::command_exec_fail(binary.binary_id.clone(), &argv, error)
        })?;
        let Output {
            status,
            stdout,
            stderr,
        } = output;

        if !status.success() {
            return Err(DiscoveryError::CommandFail {
                binary_id: binary.binary_id.clone(),
                command: argv,
                exit_status: status,
                stdout,
                stderr,
            });
        }

        String::from_utf8(stdout).map_err(|err| DiscoveryError::CommandNonUtf8 {
            binary_id: binary.binary_id.clone(),
            command: argv,
            stdout: err.into_bytes(),
            stderr,
        })
    }

    /// Parses the output of `--list --format terse` and returns the test names.
    fn parse<'a>(
        binary: &TestBinary,
        list_output: &'a str,
    ) -> Result<Vec<&'a str>, DiscoveryError> {
        // The output is in the form:
        // <test name>: test
        // ...
        list_output
            .lines()
            .map(|line| {
                line.strip_suffix(": test").ok_or_else(|| {
                    DiscoveryError::parse_line(
                        binary.binary_id.clone(),
                        format!("line '{line}' did not end with the string ': test'"),
                        list_output,
                    )
                })
            })
            .collect()
    }
}

impl TestDiscovery for ProcessDiscovery {
    fn list_tests<'a>(
        &'a self,
        binary: &'a TestBinary,
    ) -> BoxFuture<'a, Result<BinaryListing, DiscoveryError>> {
        Box::pin(async move {
            match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.exec_listings(binary))
                    .await
                    .map_err(|_elapsed| DiscoveryError::Timeout {
                        binary_id: binary.binary_id.clone(),
                        timeout,
                    })?,
                None => self.exec_listings(binary).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use indoc::indoc;
    use testshard_metadata::{BinaryId, BinaryKind};

    fn test_binary() -> TestBinary {
        TestBinary {
            binary_id: BinaryId::new("my-package::my-binary"),
            package_name: "my-package".to_owned(),
            binary_name: "my-binary".to_owned(),
            kind: BinaryKind::TEST,
            binary_path: Utf8PathBuf::from("/fake/my-binary"),
            cwd: Utf8PathBuf::from("/fake"),
            platform: "x86_64-unknown-linux-gnu".to_owned(),
            profile: "debug".to_owned(),
        }
    }

    #[test]
    fn parse_terse_output() {
        let list_output = indoc! {"
            tests::baz::test_quux: test
            tests::foo::test_bar: test
        "};
        let parsed = ProcessDiscovery::parse(&test_binary(), list_output).expect("valid output");
        assert_eq!(parsed, ["tests::baz::test_quux", "tests::foo::test_bar"]);
    }

    #[test]
    fn parse_empty_output() {
        let parsed = ProcessDiscovery::parse(&test_binary(), "").expect("valid output");
        assert_eq!(parsed, Vec::<&str>::new());
    }

    #[test]
    fn parse_rejects_unknown_line() {
        let list_output = indoc! {"
            tests::foo::test_bar: test
            running 1 test
        "};
        let err = ProcessDiscovery::parse(&test_binary(), list_output)
            .expect_err("unknown line rejected");
        match err {
            DiscoveryError::ParseLine {
                binary_id,
                message,
                full_output,
            } => {
                assert_eq!(binary_id.as_str(), "my-package::my-binary");
                assert_eq!(
                    message,
                    "line 'running 1 test' did not end with the string ': test'"
                );
                assert_eq!(full_output, list_output);
            }
            other => panic!("expected ParseLine error, got {other:?}"),
        }
    }
}
