// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report events that occur while selecting tests against a filter.
//!
//! The driver in this module walks a [`TestList`] in input order, evaluates a
//! [`TestFilter`] against every test, and hands lifecycle events to a
//! [`StatusReporter`]. Reporters only render; none of the selection semantics
//! live here.

use crate::{
    errors::WriteEventError,
    helpers::{write_error_chain, write_test_name},
    list::{Styles, TestInstance, TestList, TestSuite, TestSuiteStatus},
    test_filter::TestFilter,
};
use owo_colors::OwoColorize;
use std::io::{self, Write};
use testshard_metadata::{FilterMatch, MismatchReason};

/// An event that occurs while tests are selected against a filter.
#[derive(Clone, Debug)]
pub enum SelectionEvent<'a> {
    /// Selection started.
    SelectionStarted {
        /// The list of tests that selection runs over.
        test_list: &'a TestList,
    },

    /// Selection moved on to the next suite.
    SuiteStarted {
        /// The suite selection moved on to.
        suite: &'a TestSuite,
    },

    /// A test matched the filter.
    TestIncluded {
        /// The test that matched.
        test_instance: TestInstance<'a>,

        /// Whether the test's binary must be invoked with its ignored-tests
        /// instruction for this test to actually execute.
        needs_ignored_invocation: bool,
    },

    /// A test did not match the filter.
    TestExcluded {
        /// The test that did not match.
        test_instance: TestInstance<'a>,

        /// The reason the test was excluded.
        reason: MismatchReason,
    },

    /// Selection finished.
    SelectionFinished {
        /// Statistics for the selection pass.
        stats: SelectionStats,
    },
}

/// Statistics for a selection pass.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SelectionStats {
    /// The number of tests that matched the filter.
    pub included: usize,

    /// The number of matched tests that need their binary's ignored-tests
    /// instruction. A subset of `included`.
    pub included_ignored: usize,

    /// The number of tests that did not match the filter.
    pub excluded: usize,

    /// The number of suites that contributed no tests because discovery
    /// failed.
    pub failed_suites: usize,
}

/// Functionality to report selection events.
pub trait StatusReporter<'a> {
    /// Report a selection event.
    fn report_event(&mut self, event: SelectionEvent<'a>) -> Result<(), WriteEventError>;
}

/// Evaluates the given filter against every test in the list, reporting events
/// as it goes.
///
/// Suites are visited in input order and tests in listing order, so two passes
/// over the same list with the same filter report identical event streams.
pub fn report_selection<'a>(
    test_list: &'a TestList,
    filter: &TestFilter<'_>,
    reporter: &mut dyn StatusReporter<'a>,
) -> Result<SelectionStats, WriteEventError> {
    let mut stats = SelectionStats::default();

    reporter.report_event(SelectionEvent::SelectionStarted { test_list })?;
    for (_, suite) in test_list.iter() {
        reporter.report_event(SelectionEvent::SuiteStarted { suite })?;
        if matches!(suite.status, TestSuiteStatus::Failed { .. }) {
            stats.failed_suites += 1;
            continue;
        }
        for (ordinal, (name, test_info)) in suite.status.test_cases().enumerate() {
            let test_instance = TestInstance::new(name, suite, test_info, ordinal);
            match test_instance.filter_match(filter) {
                FilterMatch::Matches {
                    needs_ignored_invocation,
                } => {
                    stats.included += 1;
                    if needs_ignored_invocation {
                        stats.included_ignored += 1;
                    }
                    reporter.report_event(SelectionEvent::TestIncluded {
                        test_instance,
                        needs_ignored_invocation,
                    })?;
                }
                FilterMatch::Mismatch { reason } => {
                    stats.excluded += 1;
                    reporter.report_event(SelectionEvent::TestExcluded {
                        test_instance,
                        reason,
                    })?;
                }
            }
        }
    }
    reporter.report_event(SelectionEvent::SelectionFinished { stats })?;

    Ok(stats)
}

/// A [`StatusReporter`] that renders events as an indented human-readable
/// listing.
#[derive(Debug)]
pub struct HumanReporter<W> {
    writer: W,
    styles: Styles,
}

impl<W: Write> HumanReporter<W> {
    /// Creates a new `HumanReporter` that writes to the given writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            styles: Styles::default(),
        }
    }

    /// Colorizes output written from here on.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    fn write_event(&mut self, event: SelectionEvent<'_>) -> io::Result<()> {
        match event {
            SelectionEvent::SelectionStarted { test_list } => {
                write!(
                    self.writer,
                    "{:>12} ",
                    "Selecting".style(self.styles.verb)
                )?;
                write!(
                    self.writer,
                    "{}",
                    test_list.test_count().style(self.styles.count)
                )?;
                write!(self.writer, " tests across ")?;
                write!(
                    self.writer,
                    "{}",
                    test_list.binary_count().style(self.styles.count)
                )?;
                write!(self.writer, " binaries")?;

                let failed = test_list.failed_binary_count();
                if failed > 0 {
                    write!(self.writer, " (")?;
                    write!(self.writer, "{}", failed.style(self.styles.count))?;
                    write!(self.writer, " failed to list)")?;
                }
                writeln!(self.writer)?;
            }
            SelectionEvent::SuiteStarted { suite } => {
                writeln!(
                    self.writer,
                    "{}:",
                    suite.binary.binary_id.style(self.styles.binary_id)
                )?;
                if let TestSuiteStatus::Failed { error } = &suite.status {
                    writeln!(self.writer, "    (discovery failed: {error})")?;
                    write_error_chain(&mut self.writer, error, "      ")?;
                }
            }
            SelectionEvent::TestIncluded {
                test_instance,
                needs_ignored_invocation,
            } => {
                write!(self.writer, "    ")?;
                write_test_name(test_instance.name, &self.styles, &mut self.writer)?;
                if needs_ignored_invocation {
                    write!(self.writer, " (ignored)")?;
                }
                writeln!(self.writer)?;
            }
            SelectionEvent::TestExcluded {
                test_instance,
                reason,
            } => {
                write!(self.writer, "    ")?;
                write_test_name(test_instance.name, &self.styles, &mut self.writer)?;
                write!(self.writer, " (")?;
                write!(
                    self.writer,
                    "{}",
                    format_args!("skipped: {reason}").style(self.styles.skip)
                )?;
                writeln!(self.writer, ")")?;
            }
            SelectionEvent::SelectionFinished { stats } => {
                let verb_style = if stats.failed_suites > 0 {
                    self.styles.fail
                } else {
                    self.styles.verb
                };
                write!(self.writer, "{:>12} ", "Selected".style(verb_style))?;
                write!(self.writer, "{}", stats.included.style(self.styles.count))?;
                write!(self.writer, " tests to run")?;
                if stats.included_ignored > 0 {
                    write!(self.writer, " (")?;
                    write!(
                        self.writer,
                        "{}",
                        stats.included_ignored.style(self.styles.count)
                    )?;
                    write!(self.writer, " with the ignored instruction)")?;
                }
                write!(self.writer, ", ")?;
                write!(self.writer, "{}", stats.excluded.style(self.styles.count))?;
                write!(self.writer, " skipped")?;
                if stats.failed_suites > 0 {
                    write!(self.writer, ", ")?;
                    write!(
                        self.writer,
                        "{}",
                        stats.failed_suites.style(self.styles.count)
                    )?;
                    write!(self.writer, " binaries failed to list")?;
                }
                writeln!(self.writer)?;
            }
        }
        Ok(())
    }
}

impl<'a, W: Write> StatusReporter<'a> for HumanReporter<W> {
    fn report_event(&mut self, event: SelectionEvent<'a>) -> Result<(), WriteEventError> {
        self.write_event(event).map_err(WriteEventError::Io)
    }
}
