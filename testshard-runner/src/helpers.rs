// Copyright (c) The testshard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::list::Styles;
use owo_colors::OwoColorize;
use std::{
    error,
    io::{self, Write},
};

/// Write out a test name.
pub(crate) fn write_test_name(
    name: &str,
    styles: &Styles,
    mut writer: impl Write,
) -> io::Result<()> {
    // Look for the part of the test after the last ::, if any.
    let mut splits = name.rsplitn(2, "::");
    let trailing = splits.next().expect("test should have at least 1 element");
    if let Some(rest) = splits.next() {
        write!(
            writer,
            "{}{}",
            rest.style(styles.module_path),
            "::".style(styles.module_path),
        )?;
    }
    write!(writer, "{}", trailing.style(styles.test_name))?;

    Ok(())
}

/// Writes out `error`'s chain of sources, one `caused by` line per source.
pub(crate) fn write_error_chain(
    mut writer: impl Write,
    error: &dyn error::Error,
    indent: &str,
) -> io::Result<()> {
    let mut source = error.source();
    while let Some(err) = source {
        writeln!(writer, "{indent}caused by: {err}")?;
        source = err.source();
    }
    Ok(())
}

/// Renders `error` and its chain of sources to a single string.
pub(crate) fn render_error_chain(error: &dyn error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(err) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&err.to_string());
        source = err.source();
    }
    out
}
