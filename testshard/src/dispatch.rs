// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{BinarySpecParseError, ExpectedError, Result},
    output::{OutputContext, OutputOpts, OutputWriter, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::{io::Write, str::FromStr, time::Duration};
use testshard_metadata::{BinaryId, BinaryKind};
use testshard_runner::{
    discovery::ProcessDiscovery,
    errors::WriteTestListError,
    list::{OutputFormat, SerializableFormat, TestBinary, TestList},
    partition::PartitionerBuilder,
    reporter::{HumanReporter, report_selection},
    test_filter::{RunIgnored, TestFilterBuilder},
};
use tracing::warn;

/// A shard-aware test lister and selector for pre-built test binaries.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = clap_styles::style(),
    max_term_width = 100,
)]
pub struct TestshardApp {
    #[clap(subcommand)]
    command: Command,

    #[clap(flatten)]
    output: OutputOpts,
}

impl TestshardApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        match self.command {
            Command::List(list_opts) => list_opts.exec(output, output_writer),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List tests in the given binaries, or preview a selection of them
    ///
    /// By default every discovered test is printed. Passing any of the filter
    /// options switches the human-readable output to a selection preview that
    /// also explains, per test, why it was skipped.
    List(ListOpts),
}

#[derive(Debug, Args)]
struct ListOpts {
    /// Output format
    #[arg(
        short = 'T',
        long,
        value_enum,
        default_value_t,
        help_heading = "Output options",
        value_name = "FMT"
    )]
    message_format: MessageFormatOpts,

    #[clap(flatten)]
    binaries: BinaryOpts,

    #[clap(flatten)]
    build_filter: TestBuildFilter,
}

impl ListOpts {
    fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let cwd = current_dir_utf8()?;
        let test_binaries: Vec<_> = self
            .binaries
            .bins
            .iter()
            .map(|spec| spec.to_test_binary(&self.binaries, &cwd))
            .collect();

        let discovery = match self.binaries.discovery_timeout {
            Some(timeout) => ProcessDiscovery::with_timeout(timeout),
            None => ProcessDiscovery::new(),
        };
        let list_threads = self
            .binaries
            .list_threads
            .unwrap_or_else(default_list_threads);

        let test_list = TestList::new(&discovery, test_binaries, list_threads)
            .map_err(|err| ExpectedError::CreateTestListError { err })?;

        let should_colorize = output
            .color
            .should_colorize(supports_color::Stream::Stdout);
        let mut writer = output_writer.stdout_writer();

        if self.build_filter.is_selection() && !self.message_format.is_serializable() {
            let filter_builder = self.build_filter.make_test_filter_builder()?;
            let filter = filter_builder.build();
            let mut reporter = HumanReporter::new(&mut writer);
            if should_colorize {
                reporter.colorize();
            }
            report_selection(&test_list, &filter, &mut reporter)?;
        } else {
            if self.build_filter.is_selection() {
                warn!(
                    "filter options only apply to human-readable output; \
                     serializable formats always contain the full list"
                );
            }
            test_list.write(
                self.message_format.to_output_format(output.verbose),
                &mut writer,
                should_colorize,
            )?;
        }
        writer
            .flush()
            .map_err(|err| ExpectedError::from(WriteTestListError::Io(err)))?;

        let failed = test_list.failed_binary_count();
        if failed > 0 {
            return Err(ExpectedError::ListBinariesFailed { failed });
        }
        Ok(0)
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum MessageFormatOpts {
    #[default]
    Human,
    Json,
    JsonPretty,
}

impl MessageFormatOpts {
    fn to_output_format(self, verbose: bool) -> OutputFormat {
        match self {
            Self::Human => OutputFormat::Human { verbose },
            Self::Json => OutputFormat::Serializable(SerializableFormat::Json),
            Self::JsonPretty => OutputFormat::Serializable(SerializableFormat::JsonPretty),
        }
    }

    fn is_serializable(self) -> bool {
        !matches!(self, Self::Human)
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Binary options")]
struct BinaryOpts {
    /// Test binary to list, as [PACKAGE::]NAME=PATH or a bare PATH
    #[arg(long = "bin", required = true, value_name = "SPEC")]
    bins: Vec<BinarySpec>,

    /// Kind recorded for the given binaries (lib, test, bench, ...)
    #[arg(long, value_name = "KIND", default_value = "test")]
    kind: String,

    /// Platform recorded for the given binaries
    #[arg(
        long,
        value_name = "TRIPLE",
        default_value = env!("TESTSHARD_HOST_PLATFORM")
    )]
    platform: String,

    /// Build profile recorded for the given binaries
    #[arg(long, value_name = "PROFILE", default_value = "test")]
    profile: String,

    /// Number of binaries to list simultaneously [default: logical CPU count]
    #[arg(long, value_name = "THREADS")]
    list_threads: Option<usize>,

    /// Time limit for each listing invocation, e.g. 30s or 2m
    #[arg(long, value_name = "DURATION", value_parser = non_zero_duration)]
    discovery_timeout: Option<Duration>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Filter options")]
struct TestBuildFilter {
    /// Select ignored tests
    #[arg(long, value_enum, value_name = "WHICH")]
    run_ignored: Option<RunIgnoredOpt>,

    /// Test partition, e.g. hash:1/2 or count:2/3
    #[arg(long, value_name = "PARTITION")]
    partition: Option<PartitionerBuilder>,

    /// Test name filters
    #[arg(value_name = "FILTERS", help_heading = None)]
    filter: Vec<String>,
}

impl TestBuildFilter {
    /// Returns true if any filter option was passed, i.e. the user asked for a
    /// selection rather than the plain inventory.
    fn is_selection(&self) -> bool {
        self.run_ignored.is_some() || self.partition.is_some() || !self.filter.is_empty()
    }

    fn make_test_filter_builder(&self) -> Result<TestFilterBuilder> {
        let run_ignored = self.run_ignored.unwrap_or_default().into();
        Ok(TestFilterBuilder::new(
            run_ignored,
            self.partition.clone(),
            self.filter.clone(),
        )?)
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum RunIgnoredOpt {
    #[default]
    Default,
    IgnoredOnly,
    All,
}

impl From<RunIgnoredOpt> for RunIgnored {
    fn from(opt: RunIgnoredOpt) -> Self {
        match opt {
            RunIgnoredOpt::Default => RunIgnored::Default,
            RunIgnoredOpt::IgnoredOnly => RunIgnored::IgnoredOnly,
            RunIgnoredOpt::All => RunIgnored::All,
        }
    }
}

/// A test binary passed in with `--bin`.
///
/// Specs take the form `[PACKAGE::]NAME=PATH`. With a bare `PATH`, the file
/// stem serves as the binary name. The binary ID is derived with
/// [`BinaryId::from_parts`] when a package name is present, and is the binary
/// name alone otherwise.
#[derive(Clone, Debug, Eq, PartialEq)]
struct BinarySpec {
    package_name: Option<String>,
    binary_name: Option<String>,
    path: Utf8PathBuf,
}

impl BinarySpec {
    fn to_test_binary(&self, opts: &BinaryOpts, cwd: &Utf8Path) -> TestBinary {
        let binary_name = match &self.binary_name {
            Some(name) => name.clone(),
            None => self
                .path
                .file_stem()
                .unwrap_or(self.path.as_str())
                .to_owned(),
        };
        let kind = BinaryKind::new(opts.kind.as_str());
        let (package_name, binary_id) = match &self.package_name {
            Some(package) => (
                package.clone(),
                BinaryId::from_parts(package, &kind, &binary_name),
            ),
            None => (binary_name.clone(), BinaryId::new(binary_name.as_str())),
        };

        TestBinary {
            binary_id,
            package_name,
            binary_name,
            kind,
            binary_path: cwd.join(&self.path),
            cwd: cwd.to_owned(),
            platform: opts.platform.clone(),
            profile: opts.profile.clone(),
        }
    }
}

impl FromStr for BinarySpec {
    type Err = BinarySpecParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let Some((name_part, path)) = input.split_once('=') else {
            if input.is_empty() {
                return Err(BinarySpecParseError::EmptyPath {
                    input: input.to_owned(),
                });
            }
            return Ok(Self {
                package_name: None,
                binary_name: None,
                path: input.into(),
            });
        };
        if path.is_empty() {
            return Err(BinarySpecParseError::EmptyPath {
                input: input.to_owned(),
            });
        }

        let (package_name, binary_name) = match name_part.split_once("::") {
            Some((package, name)) => (Some(package), name),
            None => (None, name_part),
        };
        if binary_name.is_empty() || package_name.is_some_and(str::is_empty) {
            return Err(BinarySpecParseError::EmptyName {
                input: input.to_owned(),
            });
        }

        Ok(Self {
            package_name: package_name.map(str::to_owned),
            binary_name: Some(binary_name.to_owned()),
            path: path.into(),
        })
    }
}

fn current_dir_utf8() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::try_from(cwd).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })
}

fn default_list_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |threads| threads.get())
}

fn non_zero_duration(input: &str) -> std::result::Result<Duration, String> {
    let duration = humantime::parse_duration(input).map_err(|error| error.to_string())?;
    if duration.is_zero() {
        Err("duration must be non-zero".to_string())
    } else {
        Ok(duration)
    }
}
