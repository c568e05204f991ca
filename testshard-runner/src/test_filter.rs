// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering tests based on user-specified parameters.
//!
//! The main structure in this module is [`TestFilter`], which is created by a
//! [`TestFilterBuilder`].

use crate::{
    errors::{RunIgnoredParseError, TestFilterBuilderError},
    partition::{Partitioner, PartitionerBuilder},
};
use aho_corasick::AhoCorasick;
use debug_ignore::DebugIgnore;
use std::{fmt, str::FromStr};
use testshard_metadata::{BinaryId, FilterMatch, MismatchReason};

/// Whether to run ignored tests.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum RunIgnored {
    /// Only run tests that aren't ignored.
    ///
    /// This is the default.
    #[default]
    Default,

    /// Only run tests that are ignored.
    IgnoredOnly,

    /// Run both ignored and non-ignored tests.
    All,
}

impl RunIgnored {
    /// Returns string representations of all known variants.
    pub fn variants() -> [&'static str; 3] {
        ["default", "ignored-only", "all"]
    }
}

impl FromStr for RunIgnored {
    type Err = RunIgnoredParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "ignored-only" => Ok(Self::IgnoredOnly),
            "all" => Ok(Self::All),
            other => Err(RunIgnoredParseError::new(other)),
        }
    }
}

impl fmt::Display for RunIgnored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::IgnoredOnly => write!(f, "ignored-only"),
            Self::All => write!(f, "all"),
        }
    }
}

/// A predicate over test names.
///
/// The filter treats the predicate as opaque: it sees only the yes/no answer
/// for a given name. The bundled implementation is [`SubstringPredicate`];
/// callers with their own matching language implement this trait and pass the
/// result to [`TestFilterBuilder::with_predicate`].
pub trait TestNamePredicate: Send + Sync + fmt::Debug {
    /// Returns true if the given test name is accepted.
    fn is_match(&self, test_name: &str) -> bool;
}

/// The bundled name predicate: a test matches if its name contains any of the
/// provided patterns as a substring.
#[derive(Clone, Debug)]
pub struct SubstringPredicate {
    patterns: Vec<String>,
    matcher: DebugIgnore<Box<AhoCorasick>>,
}

impl SubstringPredicate {
    /// Creates a new `SubstringPredicate` from the given patterns.
    ///
    /// An empty pattern set accepts every name.
    pub fn new(
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, TestFilterBuilderError> {
        let patterns: Vec<String> = patterns.into_iter().map(|pattern| pattern.into()).collect();
        let matcher = DebugIgnore(Box::new(AhoCorasick::new(&patterns)?));
        Ok(Self { patterns, matcher })
    }
}

impl TestNamePredicate for SubstringPredicate {
    fn is_match(&self, test_name: &str) -> bool {
        self.patterns.is_empty() || self.matcher.is_match(test_name)
    }
}

/// A builder for `TestFilter` instances.
#[derive(Debug)]
pub struct TestFilterBuilder {
    run_ignored: RunIgnored,
    partitioner_builder: Option<PartitionerBuilder>,
    predicate: Option<Box<dyn TestNamePredicate>>,
}

impl TestFilterBuilder {
    /// Creates a new `TestFilterBuilder` from the given substring patterns.
    ///
    /// If an empty slice is passed, the test filter matches all possible test names.
    pub fn new(
        run_ignored: RunIgnored,
        partitioner_builder: Option<PartitionerBuilder>,
        patterns: Vec<String>,
    ) -> Result<Self, TestFilterBuilderError> {
        let predicate = if patterns.is_empty() {
            None
        } else {
            Some(Box::new(SubstringPredicate::new(patterns)?) as Box<dyn TestNamePredicate>)
        };

        Ok(Self {
            run_ignored,
            partitioner_builder,
            predicate,
        })
    }

    /// Creates a new `TestFilterBuilder` with a caller-supplied name predicate.
    pub fn with_predicate(
        run_ignored: RunIgnored,
        partitioner_builder: Option<PartitionerBuilder>,
        predicate: Box<dyn TestNamePredicate>,
    ) -> Self {
        Self {
            run_ignored,
            partitioner_builder,
            predicate: Some(predicate),
        }
    }

    /// Creates a new `TestFilterBuilder` that matches any test name.
    pub fn any(run_ignored: RunIgnored) -> Self {
        Self {
            run_ignored,
            partitioner_builder: None,
            predicate: None,
        }
    }

    /// Returns the run-ignored policy this builder was created with.
    pub fn run_ignored(&self) -> RunIgnored {
        self.run_ignored
    }

    /// Creates a new test filter from this builder.
    pub fn build(&self) -> TestFilter<'_> {
        let partitioner = self
            .partitioner_builder
            .as_ref()
            .map(|partitioner_builder| partitioner_builder.build());
        TestFilter {
            builder: self,
            partitioner,
        }
    }
}

/// Test filter: classifies tests as included or excluded, with a reason.
///
/// Evaluation is pure: the same inputs always produce the same answer, and a
/// filter may be consulted from several threads at once.
#[derive(Debug)]
pub struct TestFilter<'builder> {
    builder: &'builder TestFilterBuilder,
    partitioner: Option<Box<dyn Partitioner>>,
}

impl TestFilter<'_> {
    /// Returns an enum describing the match status of this filter.
    ///
    /// `index` is the test's position within its binary's listing, counting up
    /// from 0; `ignored` is the test's ignored marker.
    pub fn filter_match(
        &self,
        binary_id: &BinaryId,
        test_name: &str,
        index: usize,
        ignored: bool,
    ) -> FilterMatch {
        // Partition-based filtering MUST come first: the first applicable
        // reason wins, and every shard has to agree on which tests were
        // partitioned away regardless of the other rules.
        if let Some(mismatch) = self.filter_partition_mismatch(binary_id, test_name, index) {
            return mismatch;
        }

        if let Some(mismatch) = self.filter_name_mismatch(test_name) {
            return mismatch;
        }

        if let Some(mismatch) = self.filter_ignored_mismatch(ignored) {
            return mismatch;
        }

        FilterMatch::Matches {
            needs_ignored_invocation: ignored,
        }
    }

    fn filter_partition_mismatch(
        &self,
        binary_id: &BinaryId,
        test_name: &str,
        index: usize,
    ) -> Option<FilterMatch> {
        let partition_match = match &self.partitioner {
            Some(partitioner) => partitioner.test_matches(binary_id, test_name, index),
            None => true,
        };
        if partition_match {
            None
        } else {
            Some(FilterMatch::Mismatch {
                reason: MismatchReason::Partition,
            })
        }
    }

    fn filter_name_mismatch(&self, test_name: &str) -> Option<FilterMatch> {
        let name_match = match &self.builder.predicate {
            Some(predicate) => predicate.is_match(test_name),
            None => true,
        };
        if name_match {
            None
        } else {
            Some(FilterMatch::Mismatch {
                reason: MismatchReason::NameFilter,
            })
        }
    }

    fn filter_ignored_mismatch(&self, ignored: bool) -> Option<FilterMatch> {
        match self.builder.run_ignored {
            RunIgnored::IgnoredOnly => {
                if !ignored {
                    return Some(FilterMatch::Mismatch {
                        reason: MismatchReason::NotIgnored,
                    });
                }
            }
            RunIgnored::Default => {
                if ignored {
                    return Some(FilterMatch::Mismatch {
                        reason: MismatchReason::Ignored,
                    });
                }
            }
            RunIgnored::All => {}
        }
        None
    }
}
