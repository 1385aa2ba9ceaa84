//! Formatted output helpers for CLI commands.

use std::fmt::Write;

use podtables_runtime::version::ToolVersion;
use podtables_runtime::xtables::XTablesPlan;

/// Prints a block of text to stdout.
#[allow(clippy::print_stdout)]
pub fn print(text: &str) {
    println!("{text}");
}

/// Renders a boolean capability.
#[must_use]
pub const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Renders an [`XTablesPlan`] for humans.
#[must_use]
pub fn format_plan(program: &str, version: ToolVersion, plan: &XTablesPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "version:  {version}");
    let _ = writeln!(out, "mode:     {}", plan.mode);
    let _ = write!(out, "command:  {program}");
    for arg in &plan.args {
        let _ = write!(out, " {arg}");
    }
    out.push('\n');
    for (key, value) in &plan.env {
        let _ = writeln!(out, "env:      {key}={value}");
    }
    match &plan.sandbox {
        None => out.push_str("sandbox:  none"),
        Some(request) => match &request.lock_file {
            Some(lock) => {
                let _ = write!(out, "sandbox:  lock file {}", lock.display());
            }
            None => out.push_str("sandbox:  nss only"),
        },
    }
    out
}
