//! Domain primitive types used across the podtables workspace.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::XTABLES_WRITE_COMMANDS;

/// Where firewall commands take effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ExecutionMode {
    /// Plain host execution: host filesystem, current network namespace.
    Host,
    /// CNI execution: host filesystem, pod network namespace.
    Cni {
        /// Path-like handle of the pod network namespace
        /// (e.g. `/var/run/netns/cni-1234`).
        network_namespace: PathBuf,
    },
}

impl ExecutionMode {
    /// Returns `true` in CNI mode.
    #[must_use]
    pub const fn is_cni(&self) -> bool {
        matches!(self, Self::Cni { .. })
    }

    /// Returns the pod network namespace handle, if any.
    #[must_use]
    pub fn network_namespace(&self) -> Option<&Path> {
        match self {
            Self::Host => None,
            Self::Cni { network_namespace } => Some(network_namespace),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Cni { network_namespace } => write!(f, "cni({})", network_namespace.display()),
        }
    }
}

/// Per-invocation descriptor consulted by the xtables runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Host or CNI execution.
    pub mode: ExecutionMode,
    /// Command names classified as mutating firewall state.
    pub write_commands: BTreeSet<String>,
}

impl ExecutionContext {
    /// Creates a host-mode context with the default write command set.
    #[must_use]
    pub fn host() -> Self {
        Self::new(ExecutionMode::Host)
    }

    /// Creates a CNI-mode context targeting the given network namespace.
    #[must_use]
    pub fn cni(network_namespace: impl Into<PathBuf>) -> Self {
        Self::new(ExecutionMode::Cni {
            network_namespace: network_namespace.into(),
        })
    }

    /// Creates a context for `mode` with the default write command set.
    #[must_use]
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            write_commands: XTABLES_WRITE_COMMANDS
                .iter()
                .map(|c| (*c).to_owned())
                .collect(),
        }
    }

    /// Replaces the write command set.
    #[must_use]
    pub fn with_write_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Returns `true` if `command` mutates firewall state.
    ///
    /// Only the file name is considered, so `/usr/sbin/iptables` matches `iptables`.
    #[must_use]
    pub fn is_write_command(&self, command: &str) -> bool {
        let name = Path::new(command)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(command);
        self.write_commands.contains(name)
    }
}
