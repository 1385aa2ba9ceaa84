//! Rewrites raw xtables stderr into actionable diagnostics.
//!
//! xtables tools exit with a small set of codes and print
//! `<prog> v<version>: <message>` followed by a usage hint. The message is
//! reshaped to `<exit kind>: <message>` and common failure signatures get a
//! hint appended. Output is for logs only.

use std::fmt;

use crate::error::ExecError;

/// Exit codes defined by libxtables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XTablesExitKind {
    /// `OTHER_PROBLEM` (1).
    OtherProblem,
    /// `PARAMETER_PROBLEM` (2).
    ParameterProblem,
    /// `VERSION_PROBLEM` (3).
    VersionProblem,
    /// `RESOURCE_PROBLEM` (4).
    ResourceProblem,
}

impl XTablesExitKind {
    /// Maps an exit code to its kind.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::OtherProblem),
            2 => Some(Self::ParameterProblem),
            3 => Some(Self::VersionProblem),
            4 => Some(Self::ResourceProblem),
            _ => None,
        }
    }
}

impl fmt::Display for XTablesExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::OtherProblem => "xtables other problem",
            Self::ParameterProblem => "xtables parameter problem",
            Self::VersionProblem => "xtables version problem",
            Self::ResourceProblem => "xtables resource problem",
        };
        f.write_str(text)
    }
}

const PERMISSION_HINT: &str = "the process may lack the NET_ADMIN and NET_RAW capabilities or is not running as root";
const KERNEL_HINT: &str = "the required kernel module may be missing, or iptables uses a different backend (legacy vs nft) than the rules were written with";
const LOCK_HINT: &str = "another process is holding the xtables lock; retry or check for stuck iptables processes";
const RESOURCE_HINT: &str = "the kernel rejected the request; check available memory and netfilter limits";

fn hint_for(message: &str, kind: XTablesExitKind) -> Option<&'static str> {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission denied") || lower.contains("you must be root") {
        Some(PERMISSION_HINT)
    } else if lower.contains("can't initialize")
        || lower.contains("table does not exist")
        || lower.contains("could not fetch rule set generation id")
        || lower.contains("no chain/target/match by that name")
    {
        Some(KERNEL_HINT)
    } else if lower.contains("resource temporarily unavailable") || lower.contains("xtables lock") {
        Some(LOCK_HINT)
    } else if kind == XTablesExitKind::ResourceProblem {
        Some(RESOURCE_HINT)
    } else {
        None
    }
}

/// Reshapes `stderr` for the failure `error`.
///
/// Returns `stderr` unchanged when the failure is not a known xtables exit code.
#[must_use]
pub fn transform_to_xtables_error_message(stderr: &str, error: &ExecError) -> String {
    let Some(kind) = error.exit_code().and_then(XTablesExitKind::from_code) else {
        return stderr.to_owned();
    };
    let first = stderr.trim().lines().next().unwrap_or_default();
    let message = first
        .split_once(':')
        .map_or(first, |(_, rest)| rest)
        .trim();

    let mut text = if message.is_empty() {
        kind.to_string()
    } else {
        format!("{kind}: {message}")
    };
    if let Some(hint) = hint_for(message, kind) {
        text.push_str("\nhint: ");
        text.push_str(hint);
    }
    text
}
