//! Tool version parsing and capability gates.
//!
//! The installed iptables version is resolved once at startup and decides
//! how locking is handled for the rest of the process:
//! - before 1.6.2 there is no `--wait` flag and no lock at all;
//! - from 1.8.6 the lock file location can be moved with `XTABLES_LOCKFILE`;
//! - in between, the lock file can only be moved with a bind mount.

use std::fmt;
use std::str::FromStr;

use nom::{
    IResult, Parser,
    bytes::complete::{take_till1, take_while1},
    character::complete::{char, digit1, space1},
    combinator::{all_consuming, map_res, opt},
    sequence::{delimited, preceded},
};
use podtables_common::constants::{LOCKFILE_ENV_SUPPORTED_SINCE, LOCKING_SUPPORTED_SINCE};
use podtables_common::error::{PodtablesError, Result};

use crate::exec::CommandExecutor;

/// A `major.minor.patch` version, ordered numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl ToolVersion {
    /// First version supporting `--wait` and lock coordination.
    pub const LOCKING_SUPPORTED_SINCE: Self = Self::from_triple(LOCKING_SUPPORTED_SINCE);

    /// First version honoring `XTABLES_LOCKFILE`.
    pub const LOCKFILE_ENV_SUPPORTED_SINCE: Self = Self::from_triple(LOCKFILE_ENV_SUPPORTED_SINCE);

    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    const fn from_triple((major, minor, patch): (u32, u32, u32)) -> Self {
        Self::new(major, minor, patch)
    }

    /// Parses `1.8.7`, `v1.8.7`, or `1.8` (patch defaults to 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not two or three dot-separated integers.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        all_consuming(version)
            .parse(trimmed)
            .map(|(_, v)| v)
            .map_err(|e| PodtablesError::Version {
                input: input.to_owned(),
                message: e.to_string(),
            })
    }

    /// True when the tool predates locking, so it never needs lock coordination.
    #[must_use]
    pub fn no_locks(&self) -> bool {
        *self < Self::LOCKING_SUPPORTED_SINCE
    }

    /// True when the lock file can be moved through `XTABLES_LOCKFILE`.
    #[must_use]
    pub fn supports_lockfile_env(&self) -> bool {
        *self >= Self::LOCKFILE_ENV_SUPPORTED_SINCE
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ToolVersion {
    type Err = PodtablesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Rule backend reported by `iptables --version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XTablesBackend {
    /// Classic `ip_tables` kernel backend.
    Legacy,
    /// `nf_tables` backend (`iptables-nft`).
    NfTables,
    /// Not reported (releases before 1.8) or unrecognized.
    Unknown,
}

impl XTablesBackend {
    fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("legacy") => Self::Legacy,
            Some("nf_tables") => Self::NfTables,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for XTablesBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::NfTables => write!(f, "nf_tables"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Detected xtables installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XTablesVersion {
    /// Tool version.
    pub version: ToolVersion,
    /// Rule backend.
    pub backend: XTablesBackend,
}

impl XTablesVersion {
    /// Parses the first line of `<tool> --version`, e.g. `iptables v1.8.7 (nf_tables)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the line does not match `<name> v<version> [(<backend>)]`.
    pub fn parse_output(output: &str) -> Result<Self> {
        let line = output.lines().next().unwrap_or_default().trim();
        let (_, (version, backend)) =
            all_consuming(version_line)
                .parse(line)
                .map_err(|e| PodtablesError::Version {
                    input: line.to_owned(),
                    message: e.to_string(),
                })?;
        Ok(Self {
            version,
            backend: XTablesBackend::from_label(backend),
        })
    }
}

impl fmt::Display for XTablesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version, self.backend)
    }
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |digits: &str| digits.parse::<u32>()).parse(input)
}

fn version(input: &str) -> IResult<&str, ToolVersion> {
    let (input, _) = opt(char('v')).parse(input)?;
    let (input, major) = number(input)?;
    let (input, minor) = preceded(char('.'), number).parse(input)?;
    let (input, patch) = opt(preceded(char('.'), number)).parse(input)?;
    Ok((input, ToolVersion::new(major, minor, patch.unwrap_or(0))))
}

fn version_line(input: &str) -> IResult<&str, (ToolVersion, Option<&str>)> {
    let (input, _name) = take_while1(|c: char| !c.is_whitespace())(input)?;
    let (input, _) = space1(input)?;
    let (input, version) = version(input)?;
    let (input, backend) = opt(preceded(
        space1,
        delimited(char('('), take_till1(|c: char| c == ')'), char(')')),
    ))
    .parse(input)?;
    Ok((input, (version, backend)))
}

/// Queries `<tool> --version` once and parses the result.
///
/// # Errors
///
/// Returns an error if the tool is not on `PATH`, fails to run, or prints
/// an unparseable version.
pub fn detect_version(executor: &CommandExecutor, tool: &str) -> Result<XTablesVersion> {
    let path = which::which(tool).map_err(|e| PodtablesError::Config {
        message: format!("{tool} not found: {e}"),
    })?;
    let outcome = executor.run(tool, true, None, &["--version".to_owned()]);
    if let Err(e) = outcome.result {
        return Err(PodtablesError::Version {
            input: tool.to_owned(),
            message: e.to_string(),
        });
    }
    // Some builds print the banner on stderr.
    let text = if outcome.stdout.trim().is_empty() {
        &outcome.stderr
    } else {
        &outcome.stdout
    };
    let detected = XTablesVersion::parse_output(text)?;
    tracing::info!(
        tool,
        path = %path.display(),
        version = %detected.version,
        backend = %detected.backend,
        "detected xtables version"
    );
    Ok(detected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> ToolVersion {
        ToolVersion::parse(s).expect("should parse version")
    }

    #[test]
    fn parses_plain_and_prefixed_versions() {
        assert_eq!(v("1.8.7"), ToolVersion::new(1, 8, 7));
        assert_eq!(v("v1.6.2"), ToolVersion::new(1, 6, 2));
        assert_eq!(v(" 1.4 "), ToolVersion::new(1, 4, 0));
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["", "1", "1.x.3", "1.8.7.1", "v", "one.two"] {
            assert!(ToolVersion::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("1.8.10") > v("1.8.9"));
        assert!(v("2.0.0") > v("1.99.99"));
    }

    #[test]
    fn no_locks_threshold() {
        for old in ["1.4.21", "1.6.0", "1.6.1"] {
            assert!(v(old).no_locks(), "{old} predates locking");
        }
        for new in ["1.6.2", "1.6.3", "1.8.4", "2.0.0"] {
            assert!(!v(new).no_locks(), "{new} supports locking");
        }
    }

    #[test]
    fn lockfile_env_threshold() {
        for old in ["1.6.2", "1.8.4", "1.8.5"] {
            assert!(!v(old).supports_lockfile_env(), "{old} lacks XTABLES_LOCKFILE");
        }
        for new in ["1.8.6", "1.8.7", "1.8.10", "1.9.0"] {
            assert!(v(new).supports_lockfile_env(), "{new} supports XTABLES_LOCKFILE");
        }
    }

    #[test]
    fn parses_version_output_with_backend() {
        let detected = XTablesVersion::parse_output("iptables v1.8.7 (nf_tables)\n").unwrap();
        assert_eq!(detected.version, ToolVersion::new(1, 8, 7));
        assert_eq!(detected.backend, XTablesBackend::NfTables);

        let detected = XTablesVersion::parse_output("iptables-restore v1.8.4 (legacy)").unwrap();
        assert_eq!(detected.backend, XTablesBackend::Legacy);
    }

    #[test]
    fn parses_version_output_without_backend() {
        let detected = XTablesVersion::parse_output("iptables v1.6.1").unwrap();
        assert_eq!(detected.version, ToolVersion::new(1, 6, 1));
        assert_eq!(detected.backend, XTablesBackend::Unknown);
    }

    #[test]
    fn rejects_garbage_version_output() {
        assert!(XTablesVersion::parse_output("command not found").is_err());
        assert!(XTablesVersion::parse_output("").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let version = ToolVersion::new(1, 8, 6);
        assert_eq!(version.to_string().parse::<ToolVersion>().unwrap(), version);
    }
}
