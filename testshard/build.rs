// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

fn main() {
    // The triple testshard itself is built for doubles as the default value
    // for `--platform`, since test binaries are typically built on the same
    // host that lists them.
    let target = std::env::var("TARGET").expect("TARGET is set for build scripts");
    println!("cargo:rustc-env=TESTSHARD_HOST_PLATFORM={target}");
    println!("cargo:rerun-if-changed=build.rs");
}
