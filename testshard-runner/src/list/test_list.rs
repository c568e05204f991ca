// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    discovery::{BinaryListing, ListedTest, TestDiscovery},
    errors::{CreateTestListError, DiscoveryError, ListBinaryError, NameCollisionError,
        WriteTestListError},
    helpers::{render_error_chain, write_error_chain, write_test_name},
    list::{OutputFormat, Styles},
    test_filter::TestFilter,
};
use camino::Utf8PathBuf;
use futures::prelude::*;
use indexmap::{IndexMap, map::Entry};
use owo_colors::OwoColorize;
use std::io::{self, Write};
use testshard_metadata::{
    BinaryId, BinaryKind, FilterMatch, ListCapabilities, NativeTestInfo, TestBinInfo,
    TestBinarySummary, TestListSummary, TestSuiteStatusSummary, TestSuiteSummary,
};
use tokio::runtime::Runtime;
use tracing::warn;

/// A compiled test binary. This artifact hasn't been queried yet so there's no information about
/// the tests within it.
///
/// Accepted as input to [`TestList::new`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestBinary {
    /// A unique identifier for this binary.
    pub binary_id: BinaryId,

    /// The name of the package this binary belongs to.
    pub package_name: String,

    /// The name of the binary.
    pub binary_name: String,

    /// The kind of test binary this is.
    pub kind: BinaryKind,

    /// The path to the binary artifact.
    pub binary_path: Utf8PathBuf,

    /// The working directory that discovery for this binary is performed in.
    pub cwd: Utf8PathBuf,

    /// The platform triple the binary was built for.
    pub platform: String,

    /// The build profile the binary was produced with.
    pub profile: String,
}

/// List of tests, obtained by running a discovery capability over a set of [`TestBinary`]
/// instances.
///
/// Read-only once constructed: suites stay in input order, and the list can be
/// shared across threads while partitioners and filters are evaluated against
/// it.
#[derive(Debug)]
pub struct TestList {
    test_count: usize,
    suites: IndexMap<BinaryId, TestSuite>,
}

impl TestList {
    /// Creates a new test list by running the given discovery capability over every binary.
    ///
    /// At most `list_threads` discovery calls are in flight at once. A
    /// per-binary failure is recorded in that binary's suite; it does not fail
    /// the list as a whole.
    pub fn new<I>(
        discovery: &dyn TestDiscovery,
        test_binaries: I,
        list_threads: usize,
    ) -> Result<Self, CreateTestListError>
    where
        I: IntoIterator<Item = TestBinary>,
        I::IntoIter: Send,
    {
        let runtime = Runtime::new().map_err(CreateTestListError::TokioRuntimeCreate)?;

        let stream = futures::stream::iter(test_binaries.into_iter()).map(|binary| async move {
            let listing = discovery.list_tests(&binary).await;
            (binary, listing)
        });
        // `buffered`, not `buffer_unordered`: results land in input order no
        // matter which listing finishes first.
        let fut = stream.buffered(list_threads.max(1)).collect::<Vec<_>>();

        let listings = runtime.block_on(fut);

        // Ensure that the runtime doesn't stay hanging even if a test binary
        // misbehaves (can be an issue on Windows).
        runtime.shutdown_background();

        Self::new_with_listings(listings)
    }

    /// Creates a new test list from per-binary listing results obtained elsewhere.
    ///
    /// This is the synchronous core of [`new`](Self::new), for callers that
    /// drive their own discovery.
    pub fn new_with_listings(
        listings: impl IntoIterator<Item = (TestBinary, Result<BinaryListing, DiscoveryError>)>,
    ) -> Result<Self, CreateTestListError> {
        let mut suites = IndexMap::new();
        for (binary, listing) in listings {
            match suites.entry(binary.binary_id.clone()) {
                Entry::Occupied(entry) => {
                    return Err(CreateTestListError::DuplicateBinaryId {
                        binary_id: entry.key().clone(),
                    });
                }
                Entry::Vacant(entry) => {
                    entry.insert(Self::build_suite(binary, listing));
                }
            }
        }

        let test_count = suites
            .values()
            .map(|suite| suite.status.test_count())
            .sum();

        Ok(Self { test_count, suites })
    }

    /// Returns the total number of tests across all listed binaries.
    pub fn test_count(&self) -> usize {
        self.test_count
    }

    /// Returns the total number of binaries in the list.
    pub fn binary_count(&self) -> usize {
        self.suites.len()
    }

    /// Returns the number of binaries whose tests were obtained.
    pub fn listed_binary_count(&self) -> usize {
        self.suites
            .values()
            .filter(|suite| matches!(suite.status, TestSuiteStatus::Listed { .. }))
            .count()
    }

    /// Returns the number of binaries for which discovery failed.
    pub fn failed_binary_count(&self) -> usize {
        self.suites
            .values()
            .filter(|suite| matches!(suite.status, TestSuiteStatus::Failed { .. }))
            .count()
    }

    /// Returns the suite for a given binary ID, or `None` if the ID isn't in the list.
    pub fn get(&self, binary_id: &BinaryId) -> Option<&TestSuite> {
        self.suites.get(binary_id)
    }

    /// Iterates over all the suites, in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&BinaryId, &TestSuite)> + '_ {
        self.suites.iter()
    }

    /// Iterates over the list of tests, in input order of their binaries and
    /// listing order within each binary.
    pub fn iter_tests(&self) -> impl Iterator<Item = TestInstance<'_>> + '_ {
        self.suites.values().flat_map(|suite| {
            suite
                .status
                .test_cases()
                .enumerate()
                .map(move |(ordinal, (name, test_info))| {
                    TestInstance::new(name, suite, test_info, ordinal)
                })
        })
    }

    /// Constructs a serializable summary for this test list.
    pub fn to_summary(&self) -> TestListSummary {
        let suites = self
            .suites
            .iter()
            .map(|(binary_id, suite)| {
                let (status, error, tests) = suite.status.to_summary();
                let testsuite = TestSuiteSummary {
                    package_name: suite.binary.package_name.clone(),
                    binary: TestBinarySummary {
                        binary_id: binary_id.clone(),
                        binary_name: suite.binary.binary_name.clone(),
                        kind: suite.binary.kind.clone(),
                        binary_path: suite.binary.binary_path.clone(),
                        platform: suite.binary.platform.clone(),
                    },
                    cwd: suite.binary.cwd.clone(),
                    binary_info: TestBinInfo {
                        test_count: suite.status.test_count(),
                        capabilities: suite.status.capabilities(),
                        profile: suite.binary.profile.clone(),
                    },
                    status,
                    error,
                    tests,
                };
                (binary_id.clone(), testsuite)
            })
            .collect();

        let mut summary = TestListSummary::new();
        summary.test_count = self.test_count;
        summary.suites = suites;
        summary
    }

    /// Outputs this list to the given writer.
    pub fn write(
        &self,
        output_format: OutputFormat,
        writer: impl Write,
        colorize: bool,
    ) -> Result<(), WriteTestListError> {
        match output_format {
            OutputFormat::Human { verbose } => self
                .write_human(writer, verbose, colorize)
                .map_err(WriteTestListError::Io),
            OutputFormat::Serializable(format) => format
                .to_writer(&self.to_summary(), writer)
                .map_err(WriteTestListError::Json),
        }
    }

    /// Outputs this list as a string with the given format.
    pub fn to_string(&self, output_format: OutputFormat) -> Result<String, WriteTestListError> {
        let mut buf = Vec::with_capacity(1024);
        self.write(output_format, &mut buf, false)?;
        Ok(String::from_utf8(buf).expect("buffer is valid UTF-8"))
    }

    // ---
    // Helper methods
    // ---

    fn build_suite(binary: TestBinary, listing: Result<BinaryListing, DiscoveryError>) -> TestSuite {
        let status = match listing {
            Ok(listing) => Self::fold_listing(&binary.binary_id, listing),
            Err(error) => TestSuiteStatus::Failed {
                error: error.into(),
            },
        };
        if let TestSuiteStatus::Failed { error } = &status {
            warn!("for `{}`, test discovery failed: {error}", binary.binary_id);
        }
        TestSuite { binary, status }
    }

    fn fold_listing(binary_id: &BinaryId, listing: BinaryListing) -> TestSuiteStatus {
        let BinaryListing {
            tests,
            capabilities,
        } = listing;

        let mut test_cases = IndexMap::with_capacity(tests.len());
        for ListedTest { name, info } in tests {
            if test_cases.insert(name.clone(), info).is_some() {
                let error = NameCollisionError {
                    binary_id: binary_id.clone(),
                    test_name: name,
                };
                return TestSuiteStatus::Failed {
                    error: error.into(),
                };
            }
        }

        TestSuiteStatus::Listed {
            capabilities,
            test_cases,
        }
    }

    fn write_human(&self, mut writer: impl Write, verbose: bool, colorize: bool) -> io::Result<()> {
        let mut styles = Styles::default();
        if colorize {
            styles.colorize();
        }

        for (binary_id, suite) in &self.suites {
            writeln!(writer, "{}:", binary_id.style(styles.binary_id))?;
            if verbose {
                writeln!(
                    writer,
                    "  {} {}",
                    "bin:".style(styles.field),
                    suite.binary.binary_path,
                )?;
                writeln!(writer, "  {} {}", "cwd:".style(styles.field), suite.binary.cwd)?;
                writeln!(
                    writer,
                    "  {} {}",
                    "platform:".style(styles.field),
                    suite.binary.platform,
                )?;
            }

            match &suite.status {
                TestSuiteStatus::Listed { test_cases, .. } => {
                    if test_cases.is_empty() {
                        writeln!(writer, "    (no tests)")?;
                    } else {
                        for (name, info) in test_cases {
                            write!(writer, "    ")?;
                            write_test_name(name, &styles, &mut writer)?;
                            if info.ignored {
                                write!(writer, " (ignored)")?;
                            }
                            writeln!(writer)?;
                        }
                    }
                }
                TestSuiteStatus::Failed { error } => {
                    writeln!(writer, "    (discovery failed: {error})")?;
                    write_error_chain(&mut writer, error, "      ")?;
                }
            }
        }
        Ok(())
    }
}

/// A suite of tests within a single test binary.
#[derive(Debug)]
pub struct TestSuite {
    /// The binary the suite belongs to.
    pub binary: TestBinary,

    /// The tests discovered within the binary, or the error that scoped this
    /// binary out of the run.
    pub status: TestSuiteStatus,
}

/// Information about the status of and tests within a test suite.
///
/// Part of a [`TestSuite`].
#[derive(Debug)]
pub enum TestSuiteStatus {
    /// The binary was queried and the tests within it were obtained.
    Listed {
        /// Capabilities the binary reported during discovery.
        capabilities: ListCapabilities,

        /// The tests contained within this suite, in listing order.
        test_cases: IndexMap<String, NativeTestInfo>,
    },

    /// Discovery failed; the suite contributes no tests.
    Failed {
        /// The recorded error.
        error: ListBinaryError,
    },
}

impl TestSuiteStatus {
    /// Returns the number of tests within this suite.
    pub fn test_count(&self) -> usize {
        match self {
            TestSuiteStatus::Listed { test_cases, .. } => test_cases.len(),
            TestSuiteStatus::Failed { .. } => 0,
        }
    }

    /// Returns the tests within this suite, in listing order.
    pub fn test_cases(&self) -> impl Iterator<Item = (&str, &NativeTestInfo)> + '_ {
        match self {
            TestSuiteStatus::Listed { test_cases, .. } => Some(test_cases.iter()),
            TestSuiteStatus::Failed { .. } => None,
        }
        .into_iter()
        .flatten()
        .map(|(name, info)| (name.as_str(), info))
    }

    /// Returns the capabilities reported for this suite's binary.
    pub fn capabilities(&self) -> ListCapabilities {
        match self {
            TestSuiteStatus::Listed { capabilities, .. } => *capabilities,
            TestSuiteStatus::Failed { .. } => ListCapabilities::default(),
        }
    }

    /// Converts this status to its serializable form.
    pub fn to_summary(
        &self,
    ) -> (
        TestSuiteStatusSummary,
        Option<String>,
        IndexMap<String, NativeTestInfo>,
    ) {
        match self {
            Self::Listed { test_cases, .. } => {
                (TestSuiteStatusSummary::LISTED, None, test_cases.clone())
            }
            Self::Failed { error } => (
                TestSuiteStatusSummary::FAILED,
                Some(render_error_chain(error)),
                IndexMap::new(),
            ),
        }
    }
}

/// Represents a single test with its associated suite.
#[derive(Clone, Copy, Debug)]
pub struct TestInstance<'a> {
    /// The name of the test.
    pub name: &'a str,

    /// Information about the suite the test belongs to.
    pub suite: &'a TestSuite,

    /// Information about the test.
    pub test_info: &'a NativeTestInfo,

    /// The test's position within its suite's listing, counting up from 0.
    pub ordinal: usize,
}

impl<'a> TestInstance<'a> {
    pub(crate) fn new(
        name: &'a (impl AsRef<str> + ?Sized),
        suite: &'a TestSuite,
        test_info: &'a NativeTestInfo,
        ordinal: usize,
    ) -> Self {
        Self {
            name: name.as_ref(),
            suite,
            test_info,
            ordinal,
        }
    }

    /// Evaluates the given filter against this test.
    pub fn filter_match(&self, filter: &TestFilter<'_>) -> FilterMatch {
        filter.filter_match(
            &self.suite.binary.binary_id,
            self.name,
            self.ordinal,
            self.test_info.ignored,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::SerializableFormat;
    use futures::future::BoxFuture;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn basic_binary() -> TestBinary {
        TestBinary {
            binary_id: BinaryId::from_parts("basic", &BinaryKind::LIB, "basic"),
            package_name: "basic".to_owned(),
            binary_name: "basic".to_owned(),
            kind: BinaryKind::LIB,
            binary_path: "/fake/target/debug/deps/basic-0194dc6f".into(),
            cwd: "/fake".into(),
            platform: "x86_64-unknown-linux-gnu".to_owned(),
            profile: "debug".to_owned(),
        }
    }

    fn broken_binary() -> TestBinary {
        TestBinary {
            binary_id: BinaryId::from_parts("fixture", &BinaryKind::TEST, "broken"),
            package_name: "fixture".to_owned(),
            binary_name: "broken".to_owned(),
            kind: BinaryKind::TEST,
            binary_path: "/fake/target/debug/deps/broken-804a56cd".into(),
            cwd: "/fake".into(),
            platform: "x86_64-unknown-linux-gnu".to_owned(),
            profile: "debug".to_owned(),
        }
    }

    fn unlistable_binary() -> TestBinary {
        TestBinary {
            binary_id: BinaryId::from_parts("fixture", &BinaryKind::TEST, "unlistable"),
            package_name: "fixture".to_owned(),
            binary_name: "unlistable".to_owned(),
            kind: BinaryKind::TEST,
            binary_path: "/fake/target/debug/deps/unlistable-29c9cd7b".into(),
            cwd: "/fake".into(),
            platform: "x86_64-unknown-linux-gnu".to_owned(),
            profile: "debug".to_owned(),
        }
    }

    fn basic_listing() -> BinaryListing {
        BinaryListing {
            tests: vec![
                ListedTest {
                    name: "tests::alpha".to_owned(),
                    info: NativeTestInfo {
                        ignored: false,
                        required_capabilities: vec![],
                    },
                },
                ListedTest {
                    name: "tests::bravo".to_owned(),
                    info: NativeTestInfo {
                        ignored: true,
                        required_capabilities: vec!["unix-only".to_owned()],
                    },
                },
            ],
            capabilities: ListCapabilities {
                supports_ignored_filter: true,
                supports_json_output: false,
            },
        }
    }

    fn colliding_listing() -> BinaryListing {
        BinaryListing {
            tests: vec![
                ListedTest {
                    name: "tests::dup".to_owned(),
                    info: NativeTestInfo::default(),
                },
                ListedTest {
                    name: "tests::dup".to_owned(),
                    info: NativeTestInfo::default(),
                },
            ],
            capabilities: ListCapabilities {
                supports_ignored_filter: true,
                supports_json_output: false,
            },
        }
    }

    fn fixture_listings() -> Vec<(TestBinary, Result<BinaryListing, DiscoveryError>)> {
        vec![
            (basic_binary(), Ok(basic_listing())),
            (broken_binary(), Ok(colliding_listing())),
            (
                unlistable_binary(),
                Err(DiscoveryError::Timeout {
                    binary_id: unlistable_binary().binary_id,
                    timeout: Duration::from_secs(5),
                }),
            ),
        ]
    }

    #[test]
    fn test_new_with_listings() {
        let test_list = TestList::new_with_listings(fixture_listings()).expect("valid listings");

        assert_eq!(test_list.test_count(), 2);
        assert_eq!(test_list.binary_count(), 3);
        assert_eq!(test_list.listed_binary_count(), 1);
        assert_eq!(test_list.failed_binary_count(), 2);

        let basic = test_list
            .get(&BinaryId::new("basic"))
            .expect("basic suite is present");
        assert!(matches!(basic.status, TestSuiteStatus::Listed { .. }));

        let broken = test_list
            .get(&BinaryId::new("fixture::broken"))
            .expect("broken suite is present");
        assert!(matches!(
            broken.status,
            TestSuiteStatus::Failed {
                error: ListBinaryError::NameCollision(_),
            }
        ));

        let unlistable = test_list
            .get(&BinaryId::new("fixture::unlistable"))
            .expect("unlistable suite is present");
        assert!(matches!(
            unlistable.status,
            TestSuiteStatus::Failed {
                error: ListBinaryError::Discovery(DiscoveryError::Timeout { .. }),
            }
        ));

        // Only the listed suite contributes test instances, with per-suite
        // ordinals in listing order.
        let instances: Vec<_> = test_list
            .iter_tests()
            .map(|instance| {
                (
                    instance.suite.binary.binary_id.as_str(),
                    instance.name,
                    instance.ordinal,
                    instance.test_info.ignored,
                )
            })
            .collect();
        assert_eq!(
            instances,
            [
                ("basic", "tests::alpha", 0, false),
                ("basic", "tests::bravo", 1, true),
            ],
        );
    }

    #[test]
    fn test_write_human() {
        let test_list = TestList::new_with_listings(fixture_listings()).expect("valid listings");

        static EXPECTED_PLAIN: &str = indoc! {"
            basic:
                tests::alpha
                tests::bravo (ignored)
            fixture::broken:
                (discovery failed: duplicate test name `tests::dup` reported by binary `fixture::broken`)
            fixture::unlistable:
                (discovery failed: error discovering tests)
                  caused by: for `fixture::unlistable`, test discovery timed out after 5s
        "};
        static EXPECTED_VERBOSE: &str = indoc! {"
            basic:
              bin: /fake/target/debug/deps/basic-0194dc6f
              cwd: /fake
              platform: x86_64-unknown-linux-gnu
                tests::alpha
                tests::bravo (ignored)
            fixture::broken:
              bin: /fake/target/debug/deps/broken-804a56cd
              cwd: /fake
              platform: x86_64-unknown-linux-gnu
                (discovery failed: duplicate test name `tests::dup` reported by binary `fixture::broken`)
            fixture::unlistable:
              bin: /fake/target/debug/deps/unlistable-29c9cd7b
              cwd: /fake
              platform: x86_64-unknown-linux-gnu
                (discovery failed: error discovering tests)
                  caused by: for `fixture::unlistable`, test discovery timed out after 5s
        "};

        assert_eq!(
            test_list
                .to_string(OutputFormat::Human { verbose: false })
                .expect("human succeeded"),
            EXPECTED_PLAIN,
        );
        assert_eq!(
            test_list
                .to_string(OutputFormat::Human { verbose: true })
                .expect("verbose human succeeded"),
            EXPECTED_VERBOSE,
        );
    }

    #[test]
    fn test_write_json_and_roundtrip() {
        let test_list = TestList::new_with_listings(fixture_listings()).expect("valid listings");

        static EXPECTED_JSON_PRETTY: &str = indoc! {r#"
            {
              "test-count": 2,
              "suites": {
                "basic": {
                  "package-name": "basic",
                  "binary-id": "basic",
                  "binary-name": "basic",
                  "kind": "lib",
                  "binary-path": "/fake/target/debug/deps/basic-0194dc6f",
                  "platform": "x86_64-unknown-linux-gnu",
                  "cwd": "/fake",
                  "binary-info": {
                    "test-count": 2,
                    "supports-ignored-filter": true,
                    "supports-json-output": false,
                    "profile": "debug"
                  },
                  "status": "listed",
                  "tests": {
                    "tests::alpha": {
                      "ignored": false
                    },
                    "tests::bravo": {
                      "ignored": true,
                      "required-capabilities": [
                        "unix-only"
                      ]
                    }
                  }
                },
                "fixture::broken": {
                  "package-name": "fixture",
                  "binary-id": "fixture::broken",
                  "binary-name": "broken",
                  "kind": "test",
                  "binary-path": "/fake/target/debug/deps/broken-804a56cd",
                  "platform": "x86_64-unknown-linux-gnu",
                  "cwd": "/fake",
                  "binary-info": {
                    "test-count": 0,
                    "supports-ignored-filter": false,
                    "supports-json-output": false,
                    "profile": "debug"
                  },
                  "status": "failed",
                  "error": "duplicate test name `tests::dup` reported by binary `fixture::broken`",
                  "tests": {}
                },
                "fixture::unlistable": {
                  "package-name": "fixture",
                  "binary-id": "fixture::unlistable",
                  "binary-name": "unlistable",
                  "kind": "test",
                  "binary-path": "/fake/target/debug/deps/unlistable-29c9cd7b",
                  "platform": "x86_64-unknown-linux-gnu",
                  "cwd": "/fake",
                  "binary-info": {
                    "test-count": 0,
                    "supports-ignored-filter": false,
                    "supports-json-output": false,
                    "profile": "debug"
                  },
                  "status": "failed",
                  "error": "error discovering tests\n  caused by: for `fixture::unlistable`, test discovery timed out after 5s",
                  "tests": {}
                }
              }
            }"#};

        let json_pretty = test_list
            .to_string(OutputFormat::Serializable(SerializableFormat::JsonPretty))
            .expect("json-pretty succeeded");
        assert_eq!(json_pretty, EXPECTED_JSON_PRETTY);

        // Decoding and re-encoding loses nothing.
        let roundtrip = TestListSummary::parse_json(&json_pretty).expect("valid summary JSON");
        assert_eq!(roundtrip, test_list.to_summary());
    }

    #[test]
    fn test_duplicate_binary_id_is_fatal() {
        let listings = vec![
            (basic_binary(), Ok(BinaryListing::default())),
            (basic_binary(), Ok(BinaryListing::default())),
        ];
        let err = TestList::new_with_listings(listings).expect_err("duplicate IDs rejected");
        assert!(matches!(
            err,
            CreateTestListError::DuplicateBinaryId { binary_id } if binary_id.as_str() == "basic"
        ));
    }

    struct FakeDiscovery;

    impl TestDiscovery for FakeDiscovery {
        fn list_tests<'a>(
            &'a self,
            binary: &'a TestBinary,
        ) -> BoxFuture<'a, Result<BinaryListing, DiscoveryError>> {
            Box::pin(async move {
                match binary.binary_id.as_str() {
                    "basic" => {
                        // Finish after the other binary to prove completion
                        // order doesn't reorder the list.
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(basic_listing())
                    }
                    "fixture::unlistable" => Err(DiscoveryError::Timeout {
                        binary_id: binary.binary_id.clone(),
                        timeout: Duration::from_secs(5),
                    }),
                    other => panic!("unexpected binary queried: {other}"),
                }
            })
        }
    }

    #[test]
    fn test_new_runs_discovery_in_input_order() {
        let test_list = TestList::new(
            &FakeDiscovery,
            [basic_binary(), unlistable_binary()],
            4,
        )
        .expect("list built");

        assert_eq!(test_list.test_count(), 2);
        assert_eq!(test_list.failed_binary_count(), 1);

        let ids: Vec<_> = test_list.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["basic", "fixture::unlistable"]);
    }
}
