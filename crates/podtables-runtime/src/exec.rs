//! External command execution with captured output.
//!
//! Output is always buffered, never streamed to our own stdout/stderr, and
//! a failing command is a normal [`CommandOutcome`], not a panic.

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use podtables_common::config::ConfigSnapshot;

use crate::error::ExecError;

/// Result of one subprocess invocation.
#[derive(Debug)]
pub struct CommandOutcome {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// `Ok` when the command exited successfully.
    pub result: Result<(), ExecError>,
}

impl CommandOutcome {
    fn failed(error: ExecError) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            result: Err(error),
        }
    }

    /// Returns `true` when the command exited successfully.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs commands with the ambient configuration exported as environment variables.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    config: ConfigSnapshot,
}

impl CommandExecutor {
    /// Creates an executor exporting `config` to every child.
    #[must_use]
    pub const fn new(config: ConfigSnapshot) -> Self {
        Self { config }
    }

    /// Configuration exported to children.
    #[must_use]
    pub const fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    /// Runs `command` and returns only its success or failure.
    ///
    /// # Errors
    ///
    /// Returns the raw [`ExecError`] if the command cannot start or exits
    /// unsuccessfully.
    pub fn execute(
        &self,
        command: &str,
        ignore_errors: bool,
        stdin: Option<&[u8]>,
        args: &[String],
    ) -> Result<(), ExecError> {
        self.run(command, ignore_errors, stdin, args).result
    }

    /// Runs `command` and returns the full captured outcome.
    ///
    /// The command line and any stdout are always logged. Stderr is logged
    /// only when `ignore_errors` is false.
    pub fn run(
        &self,
        command: &str,
        ignore_errors: bool,
        stdin: Option<&[u8]>,
        args: &[String],
    ) -> CommandOutcome {
        tracing::info!(command = %command_line(command, args), "running command");

        let mut cmd = Command::new(command);
        let _ = cmd.args(args).envs(self.config.to_env_vars());
        let outcome = run_captured(cmd, command, stdin);

        log_stdout(&outcome);
        if !ignore_errors && !outcome.stderr.is_empty() {
            tracing::error!("command error output: \n{}", outcome.stderr);
        }
        outcome
    }
}

/// Joins a command and its arguments for logging.
pub(crate) fn command_line(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_owned()
    } else {
        format!("{command} {}", args.join(" "))
    }
}

pub(crate) fn log_stdout(outcome: &CommandOutcome) {
    if !outcome.stdout.is_empty() {
        tracing::info!("command output: \n{}", outcome.stdout);
    }
}

/// Spawns `cmd`, feeds `stdin`, and collects both output streams.
pub(crate) fn run_captured(mut cmd: Command, name: &str, stdin: Option<&[u8]>) -> CommandOutcome {
    let _ = cmd
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return CommandOutcome::failed(ExecError::Spawn {
                command: name.to_owned(),
                source: e,
            });
        }
    };

    let output = thread::scope(|scope| {
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // Written from a separate thread so a chatty child cannot
            // deadlock on a full stdout pipe while we are still writing.
            let _ = scope.spawn(move || {
                if let Err(e) = pipe.write_all(input) {
                    tracing::debug!(error = %e, "child closed stdin early");
                }
            });
        }
        child.wait_with_output()
    });

    match output {
        Ok(output) => CommandOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            result: if output.status.success() {
                Ok(())
            } else {
                Err(ExecError::Exit {
                    command: name.to_owned(),
                    code: output.status.code(),
                })
            },
        },
        Err(e) => CommandOutcome::failed(ExecError::Io {
            command: name.to_owned(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_owned(), script.to_owned()]
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let outcome = CommandExecutor::default().run(
            "sh",
            false,
            None,
            &sh("echo out; echo err >&2"),
        );
        assert!(outcome.success());
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
    }

    #[test]
    fn nonzero_exit_is_reported_not_raised() {
        let err = CommandExecutor::default()
            .execute("sh", true, None, &sh("exit 3"))
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let err = CommandExecutor::default()
            .execute("podtables-test-no-such-binary", false, None, &[])
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[test]
    fn stdin_is_forwarded() {
        let outcome = CommandExecutor::default().run(
            "sh",
            false,
            Some(b"*nat\nCOMMIT\n"),
            &sh("cat"),
        );
        assert!(outcome.success());
        assert_eq!(outcome.stdout, "*nat\nCOMMIT\n");
    }

    #[test]
    fn missing_stdin_reads_as_empty() {
        let outcome = CommandExecutor::default().run("sh", false, None, &sh("wc -c < /dev/stdin"));
        assert_eq!(outcome.stdout.trim(), "0");
    }

    #[test]
    fn config_is_exported_as_environment() {
        let mut config = ConfigSnapshot::new();
        config.set("log-level", "debug");
        config.set("redirect.port", 15001);
        config.set("unset", "");
        let executor = CommandExecutor::new(config);

        let outcome = executor.run(
            "sh",
            false,
            None,
            &sh("printf '%s|%s|%s' \"$LOG_LEVEL\" \"$REDIRECT_PORT\" \"${UNSET-absent}\""),
        );
        assert_eq!(outcome.stdout, "debug|15001|absent");
    }

    #[test]
    fn command_line_joins_arguments() {
        assert_eq!(command_line("iptables", &[]), "iptables");
        assert_eq!(
            command_line("iptables", &["-t".into(), "nat".into(), "-L".into()]),
            "iptables -t nat -L"
        );
    }
}
