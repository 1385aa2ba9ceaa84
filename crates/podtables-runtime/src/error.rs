//! Subprocess failure type.

use thiserror::Error;

/// Why an external command did not succeed.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The binary could not be started.
    #[error("failed to start {command}: {source}")]
    Spawn {
        /// Command name.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Collecting the child's output failed.
    #[error("I/O error while running {command}: {source}")]
    Io {
        /// Command name.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The command ran and did not exit successfully.
    #[error("{command} {}", describe_exit(.code))]
    Exit {
        /// Command name.
        command: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
    },
}

impl ExecError {
    /// Exit code of a command that ran to completion unsuccessfully.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => *code,
            Self::Spawn { .. } | Self::Io { .. } => None,
        }
    }
}

#[allow(clippy::ref_option)]
fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(
        || "was terminated by a signal".to_owned(),
        |c| format!("exited with status {c}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_error_displays_code() {
        let err = ExecError::Exit {
            command: "iptables".into(),
            code: Some(4),
        };
        assert_eq!(err.to_string(), "iptables exited with status 4");
        assert_eq!(err.exit_code(), Some(4));
    }

    #[test]
    fn signal_exit_has_no_code() {
        let err = ExecError::Exit {
            command: "iptables-restore".into(),
            code: None,
        };
        assert_eq!(err.to_string(), "iptables-restore was terminated by a signal");
        assert_eq!(err.exit_code(), None);
    }
}
