// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for partitioning test runs across several machines.
//!
//! At the moment this only supports simple hash-based and count-based sharding. In the future it
//! could potentially be made smarter: e.g. using timing data to pick different sets of binaries
//! and tests to run, with an aim to minimize total run times.
//!
//! Partitioners are pure functions of their inputs: the same shard configuration applied to the
//! same test list always selects the same tests, on any machine and in any order of evaluation.

use crate::errors::PartitionerBuilderParseError;
use std::{fmt, str::FromStr};
use testshard_metadata::BinaryId;
use xxhash_rust::xxh64::Xxh64;

/// A builder for creating `Partitioner` instances.
///
/// The relationship between `PartitionerBuilder` and `Partitioner` is similar to that between
/// `std`'s `BuildHasher` and `Hasher`.
///
/// Parsed from strings of the form `count:<shard>/<total>` or `hash:<shard>/<total>`, with
/// `1 <= shard <= total`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum PartitionerBuilder {
    /// Partition by round-robin over listing positions: a test belongs to the shard equal to its
    /// position within its binary, modulo the total shard count.
    Count {
        /// The shard this is in, counting up from 1.
        shard: u64,

        /// The total number of shards.
        total_shards: u64,
    },

    /// Partition by hashing the binary ID and test name. Assignment is independent of listing
    /// positions, so it is stable when tests are added or removed around it.
    Hash {
        /// The shard this is in, counting up from 1.
        shard: u64,

        /// The total number of shards.
        total_shards: u64,
    },
}

/// Represents an individual partitioner.
///
/// For any test exactly one shard in `1..=total_shards` returns true.
pub trait Partitioner: fmt::Debug {
    /// Returns true if the given test belongs to this partition.
    ///
    /// `index` is the test's position within its binary's listing, counting up from 0.
    fn test_matches(&self, binary_id: &BinaryId, test_name: &str, index: usize) -> bool;
}

impl PartitionerBuilder {
    /// Creates a new `Partitioner` from this `PartitionerBuilder`.
    pub fn build(&self) -> Box<dyn Partitioner> {
        match self {
            PartitionerBuilder::Count {
                shard,
                total_shards,
            } => Box::new(CountPartitioner::new(*shard, *total_shards)),
            PartitionerBuilder::Hash {
                shard,
                total_shards,
            } => Box::new(HashPartitioner::new(*shard, *total_shards)),
        }
    }
}

impl FromStr for PartitionerBuilder {
    type Err = PartitionerBuilderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Parse the string: it looks like "hash:<shard>/<total_shards>".
        if let Some(input) = s.strip_prefix("hash:") {
            let (shard, total_shards) = parse_shards(input, "hash:M/N")?;

            Ok(PartitionerBuilder::Hash {
                shard,
                total_shards,
            })
        } else if let Some(input) = s.strip_prefix("count:") {
            let (shard, total_shards) = parse_shards(input, "count:M/N")?;

            Ok(PartitionerBuilder::Count {
                shard,
                total_shards,
            })
        } else {
            Err(PartitionerBuilderParseError::new(
                None,
                format!("partition input '{s}' must begin with \"hash:\" or \"count:\""),
            ))
        }
    }
}

fn parse_shards(
    input: &str,
    expected_format: &'static str,
) -> Result<(u64, u64), PartitionerBuilderParseError> {
    let Some((shard_str, total_shards_str)) = input.split_once('/') else {
        return Err(PartitionerBuilderParseError::new(
            Some(expected_format),
            format!("expected input '{input}' to be in the format M/N"),
        ));
    };

    let shard: u64 = shard_str.parse().map_err(|err| {
        PartitionerBuilderParseError::new(
            Some(expected_format),
            format!("failed to parse shard '{shard_str}' as u64: {err}"),
        )
    })?;

    let total_shards: u64 = total_shards_str.parse().map_err(|err| {
        PartitionerBuilderParseError::new(
            Some(expected_format),
            format!("failed to parse total_shards '{total_shards_str}' as u64: {err}"),
        )
    })?;

    // Check that shard > 0 and <= total_shards.
    if !(1..=total_shards).contains(&shard) {
        return Err(PartitionerBuilderParseError::new(
            Some(expected_format),
            format!(
                "shard {shard} must be a number between 1 and total shards {total_shards}, inclusive"
            ),
        ));
    }

    Ok((shard, total_shards))
}

#[derive(Clone, Debug)]
struct CountPartitioner {
    shard_minus_one: u64,
    total_shards: u64,
}

impl CountPartitioner {
    fn new(shard: u64, total_shards: u64) -> Self {
        let shard_minus_one = shard - 1;
        Self {
            shard_minus_one,
            total_shards,
        }
    }
}

impl Partitioner for CountPartitioner {
    fn test_matches(&self, _binary_id: &BinaryId, _test_name: &str, index: usize) -> bool {
        (index as u64) % self.total_shards == self.shard_minus_one
    }
}

#[derive(Clone, Debug)]
struct HashPartitioner {
    shard_minus_one: u64,
    total_shards: u64,
}

impl HashPartitioner {
    fn new(shard: u64, total_shards: u64) -> Self {
        let shard_minus_one = shard - 1;
        Self {
            shard_minus_one,
            total_shards,
        }
    }
}

impl Partitioner for HashPartitioner {
    fn test_matches(&self, binary_id: &BinaryId, test_name: &str, _index: usize) -> bool {
        // NOTE: this is fixed to be xxHash64 with seed 0 for the entire testshard 0.1 series.
        let mut hasher = Xxh64::new(0);
        hasher.update(binary_id.as_str().as_bytes());
        // NUL keeps the two fields from running together: ("ab", "c") and ("a", "bc") must hash
        // differently.
        hasher.update(&[0]);
        hasher.update(test_name.as_bytes());
        hasher.digest() % self.total_shards == self.shard_minus_one
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use test_strategy::proptest;

    #[test]
    fn partitioner_builder_from_str() {
        let successes = vec![
            (
                "hash:1/2",
                PartitionerBuilder::Hash {
                    shard: 1,
                    total_shards: 2,
                },
            ),
            (
                "hash:1/1",
                PartitionerBuilder::Hash {
                    shard: 1,
                    total_shards: 1,
                },
            ),
            (
                "hash:99/200",
                PartitionerBuilder::Hash {
                    shard: 99,
                    total_shards: 200,
                },
            ),
            (
                "count:1/2",
                PartitionerBuilder::Count {
                    shard: 1,
                    total_shards: 2,
                },
            ),
            (
                "count:42/100",
                PartitionerBuilder::Count {
                    shard: 42,
                    total_shards: 100,
                },
            ),
        ];

        let failures = vec![
            "foo",
            "hash",
            "hash:",
            "hash:1",
            "hash:1/",
            "hash:0/2",
            "hash:3/2",
            "hash:m/2",
            "hash:1/n",
            "hash:1/2/3",
            "count:0/1",
            "count:2/1",
        ];

        for (input, output) in successes {
            assert_eq!(
                PartitionerBuilder::from_str(input).unwrap_or_else(|err| panic!(
                    "expected input '{input}' to succeed, failed with: {err}"
                )),
                output,
                "success case '{input}' matches",
            );
        }

        for input in failures {
            PartitionerBuilder::from_str(input)
                .expect_err(&format!("expected input '{input}' to fail"));
        }
    }

    #[test]
    fn count_partitioner_follows_listing_position() {
        let binary_id = BinaryId::new("my-package::bin/my-binary");

        for total_shards in 1..=5u64 {
            for index in 0..20usize {
                let expected_shard = (index as u64) % total_shards + 1;
                for shard in 1..=total_shards {
                    let partitioner = PartitionerBuilder::Count {
                        shard,
                        total_shards,
                    }
                    .build();
                    assert_eq!(
                        partitioner.test_matches(&binary_id, "test_name", index),
                        shard == expected_shard,
                        "count:{shard}/{total_shards} at index {index}",
                    );
                }
            }
        }
    }

    #[test]
    fn partitioners_are_stateless() {
        let binary_id = BinaryId::new("my-package::bin/my-binary");
        let builders = [
            PartitionerBuilder::Count {
                shard: 2,
                total_shards: 3,
            },
            PartitionerBuilder::Hash {
                shard: 2,
                total_shards: 3,
            },
        ];

        for builder in builders {
            let partitioner = builder.build();
            let forward: Vec<_> = (0..16)
                .map(|index| partitioner.test_matches(&binary_id, "test_name", index))
                .collect();
            // Querying in reverse, against a fresh instance, must reproduce the same answers.
            let partitioner = builder.build();
            let backward: Vec<_> = (0..16)
                .rev()
                .map(|index| partitioner.test_matches(&binary_id, "test_name", index))
                .collect();

            let reversed: Vec<_> = backward.into_iter().rev().collect();
            assert_eq!(forward, reversed, "order of evaluation is immaterial");
        }
    }

    #[proptest]
    fn proptest_exactly_one_shard_matches(
        #[strategy(1..=8u64)] total_shards: u64,
        #[strategy(vec("[a-z_:]{1,40}", 1..8))] test_names: Vec<String>,
        #[strategy("[a-z-]{1,20}")] binary_name: String,
    ) {
        let binary_id = BinaryId::new(binary_name);
        let make_builders = |shard| {
            [
                PartitionerBuilder::Count {
                    shard,
                    total_shards,
                },
                PartitionerBuilder::Hash {
                    shard,
                    total_shards,
                },
            ]
        };

        for (index, test_name) in test_names.iter().enumerate() {
            for strategy in 0..2 {
                let matching: Vec<u64> = (1..=total_shards)
                    .filter(|&shard| {
                        make_builders(shard)[strategy].build().test_matches(
                            &binary_id,
                            test_name,
                            index,
                        )
                    })
                    .collect();
                assert_eq!(
                    matching.len(),
                    1,
                    "exactly one shard claims {test_name} (strategy {strategy})",
                );
            }
        }
    }
}
