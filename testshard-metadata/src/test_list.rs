// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt, process::Command};

use crate::CommandError;

/// Command builder for `testshard list` invocations.
///
/// Runs `testshard list --message-format json` and decodes the output into a
/// [`TestListSummary`], so that external tooling never needs to parse the
/// document by hand.
#[derive(Clone, Debug, Default)]
pub struct ListCommand {
    bin_path: Option<Utf8PathBuf>,
    args: Vec<String>,
}

impl ListCommand {
    /// Creates a new `ListCommand`.
    ///
    /// The command resolves `testshard` through `PATH` unless a path is set
    /// with [`bin_path`](Self::bin_path).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path to the `testshard` executable.
    pub fn bin_path(&mut self, path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.bin_path = Some(path.into());
        self
    }

    /// Adds arguments to pass through to `testshard list`.
    pub fn add_args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(args.into_iter().map(|arg| arg.into()));
        self
    }

    /// Builds the command that would be executed.
    pub fn command(&self) -> Command {
        let mut command = match &self.bin_path {
            Some(path) => Command::new(path),
            None => Command::new("testshard"),
        };
        command.arg("list");
        command.args(["--message-format", "json"]);
        command.args(&self.args);
        command
    }

    /// Executes the command and parses its standard output.
    pub fn exec(&self) -> Result<TestListSummary, CommandError> {
        let output = self.command().output().map_err(CommandError::Exec)?;
        if !output.status.success() {
            return Err(CommandError::CommandFailed {
                exit_code: output.status.code(),
                stderr: output.stderr,
            });
        }
        serde_json::from_slice(&output.stdout).map_err(CommandError::Json)
    }
}

/// Uniquely identifies a test binary within a test list.
///
/// Typically of the form `<package-name>::<binary-name>`, as produced by
/// [`from_parts`](Self::from_parts), but any string that is unique within one
/// list is accepted.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinaryId(SmolStr);

impl BinaryId {
    /// Creates a new `BinaryId`.
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    /// Creates a `BinaryId` from its constituent parts:
    ///
    /// * if `kind` is [`BinaryKind::LIB`], the ID is the package name;
    /// * if `kind` is [`BinaryKind::TEST`], the ID is `package-name::binary-name`;
    /// * otherwise, the ID is `package-name::kind/binary-name`.
    pub fn from_parts(package_name: &str, kind: &BinaryKind, binary_name: &str) -> Self {
        if *kind == BinaryKind::LIB {
            Self(package_name.into())
        } else if *kind == BinaryKind::TEST {
            Self(format!("{package_name}::{binary_name}").into())
        } else {
            Self(format!("{package_name}::{kind}/{binary_name}").into())
        }
    }

    /// Returns the ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BinaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BinaryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BinaryId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// The kind of a test binary: where in the build it came from.
///
/// Open-ended: consumers should compare against the known constants but
/// tolerate kinds they do not recognize.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinaryKind(pub SmolStr);

impl BinaryKind {
    /// The binary is a library test (unit tests compiled into the library).
    pub const LIB: Self = Self(SmolStr::new_inline("lib"));

    /// The binary is a standalone integration test.
    pub const TEST: Self = Self(SmolStr::new_inline("test"));

    /// The binary is a benchmark.
    pub const BENCH: Self = Self(SmolStr::new_inline("bench"));

    /// The binary holds compiled documentation tests.
    pub const DOC_TEST: Self = Self(SmolStr::new_inline("doc-test"));

    /// Creates a new `BinaryKind`.
    pub fn new(kind: impl Into<SmolStr>) -> Self {
        Self(kind.into())
    }
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The serialized form of a test list.
///
/// This is the document emitted by `testshard list --message-format json`. It
/// round-trips losslessly: decoding and re-encoding preserves every field and
/// the order of every suite and test.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestListSummary {
    /// The total number of tests across all listed binaries.
    pub test_count: usize,

    /// The suites in this list, keyed by binary ID, in input order.
    pub suites: IndexMap<BinaryId, TestSuiteSummary>,
}

impl TestListSummary {
    /// Creates a new, empty `TestListSummary`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document into a `TestListSummary`.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }
}

/// The serialized form of one suite: a test binary together with the tests
/// discovered inside it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestSuiteSummary {
    /// The name of the package the binary belongs to.
    pub package_name: String,

    /// The binary within the package.
    #[serde(flatten)]
    pub binary: TestBinarySummary,

    /// The working directory that discovery was performed in.
    pub cwd: Utf8PathBuf,

    /// Per-binary metadata gathered at discovery time.
    pub binary_info: TestBinInfo,

    /// Whether discovery succeeded for this binary.
    pub status: TestSuiteStatusSummary,

    /// The rendered discovery error, present if `status` is
    /// [`FAILED`](TestSuiteStatusSummary::FAILED).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The tests discovered in this binary, in listing order. Empty if
    /// discovery failed.
    pub tests: IndexMap<String, NativeTestInfo>,
}

/// The serialized form of a test binary.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestBinarySummary {
    /// A unique ID for this binary.
    pub binary_id: BinaryId,

    /// The name of the binary.
    pub binary_name: String,

    /// The kind of binary this is.
    pub kind: BinaryKind,

    /// The path to the binary artifact.
    pub binary_path: Utf8PathBuf,

    /// The platform triple the binary was built for.
    pub platform: String,
}

/// Per-binary metadata: what discovery learned about the binary, plus the
/// build configuration that produced it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestBinInfo {
    /// The number of tests discovered in this binary.
    pub test_count: usize,

    /// Capabilities the binary reported during discovery.
    #[serde(flatten)]
    pub capabilities: ListCapabilities,

    /// The build profile the binary was produced with.
    pub profile: String,
}

/// Capability flags reported for a test binary during discovery.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListCapabilities {
    /// The binary can list and run just its ignored tests.
    pub supports_ignored_filter: bool,

    /// The binary can emit its listing as JSON.
    pub supports_json_output: bool,
}

/// The status of a suite within a test list.
///
/// More variants may be added in the future, so consumers should treat unknown
/// values as "not listed".
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestSuiteStatusSummary(pub SmolStr);

impl TestSuiteStatusSummary {
    /// Discovery ran and the tests within the binary were obtained.
    pub const LISTED: Self = Self(SmolStr::new_inline("listed"));

    /// Discovery failed for this binary; the suite contains no tests, and the
    /// error is recorded alongside.
    pub const FAILED: Self = Self(SmolStr::new_inline("failed"));

    /// Creates a new `TestSuiteStatusSummary`.
    pub fn new(status: impl Into<SmolStr>) -> Self {
        Self(status.into())
    }
}

/// Serialized information about a single test.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NativeTestInfo {
    /// Whether this test is marked ignored.
    ///
    /// Ignored tests, if run, are executed with the binary's ignored-tests
    /// instruction.
    pub ignored: bool,

    /// Capability tags the test declared as required, e.g. a platform it only
    /// runs on. Informational; testshard records but does not interpret them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_capabilities: Vec<String>,
}

/// The outcome of evaluating one test against a test filter.
///
/// Produced fresh for every (test, filter) evaluation and reported outward;
/// never stored in the test list itself.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum FilterMatch {
    /// This test matches the filter and should be run.
    #[serde(rename_all = "kebab-case")]
    Matches {
        /// Whether the binary must be invoked with its ignored-tests
        /// instruction for this test to actually execute.
        needs_ignored_invocation: bool,
    },

    /// This test does not match the filter and should not be run.
    Mismatch {
        /// Why the test was excluded.
        reason: MismatchReason,
    },
}

impl FilterMatch {
    /// Returns true if the test matches the filter.
    pub fn is_match(&self) -> bool {
        matches!(self, FilterMatch::Matches { .. })
    }
}

/// The reason a test was excluded by a filter.
///
/// Exactly one reason is reported per excluded test: the first rule, in
/// evaluation order, that rejected it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchReason {
    /// The test is in a different partition.
    Partition,

    /// The name predicate did not accept the test's name.
    NameFilter,

    /// The test is marked ignored and the run-ignored policy excludes
    /// ignored tests.
    Ignored,

    /// The test is not marked ignored and the run-ignored policy only runs
    /// ignored tests.
    NotIgnored,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchReason::Partition => write!(f, "is in a different partition"),
            MismatchReason::NameFilter => write!(f, "does not match the name filter"),
            MismatchReason::Ignored => write!(f, "is ignored"),
            MismatchReason::NotIgnored => write!(f, "is not ignored"),
        }
    }
}
