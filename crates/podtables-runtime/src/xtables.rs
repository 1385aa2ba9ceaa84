//! Lock- and sandbox-aware execution of iptables-family tools.
//!
//! The runner picks one of five modes from the execution context, the tool
//! version, and whether the command writes rules:
//!
//! | context | lock needed | `XTABLES_LOCKFILE` | mode |
//! |---|---|---|---|
//! | CNI | yes | supported | sandbox, lock file moved via env |
//! | CNI | yes | unsupported | sandbox, netns bind-mounted over the lock file |
//! | CNI | no | - | sandbox, NSS masked only |
//! | host | yes | - | direct, `--wait=30` appended |
//! | host | no | - | direct |
//!
//! In CNI mode the host lock is useless (the rules land in the pod's
//! namespace) and risks contention with node agents such as kube-proxy.
//! The pod's network namespace path is unique per pod, so it stands in
//! for the lock file.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use podtables_common::constants::{WAIT_FLAG, XTABLES_LOCKFILE_ENV};
use podtables_common::types::{ExecutionContext, ExecutionMode};
use podtables_core::sandbox::{IsolationOps, LinuxIsolation, NamespaceSandbox};

use crate::error::ExecError;
use crate::exec::{CommandOutcome, command_line, log_stdout, run_captured};
use crate::translate::transform_to_xtables_error_message;
use crate::version::ToolVersion;

/// How an xtables invocation is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Host mode, lock needed: `--wait=30` appended.
    WithWaitLock,
    /// Host mode, no lock needed.
    WithoutLock,
    /// CNI mode, lock redirected through `XTABLES_LOCKFILE`, NSS masked.
    LockByEnvAndNss,
    /// CNI mode, lock file bind-mounted away, NSS masked.
    LockByMountAndNss,
    /// CNI mode, no lock needed, NSS masked.
    NssOnly,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::WithWaitLock => "with wait lock",
            Self::WithoutLock => "without lock",
            Self::LockByEnvAndNss => "without lock by env and nss",
            Self::LockByMountAndNss => "without lock by mount and nss",
            Self::NssOnly => "without nss",
        };
        f.write_str(text)
    }
}

/// Sandbox parameters for a CNI-mode invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRequest {
    /// File bind-mounted over `/run/xtables.lock`, if any.
    pub lock_file: Option<PathBuf>,
}

/// Fully resolved invocation, computed before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XTablesPlan {
    /// Chosen mode.
    pub mode: LockMode,
    /// Final argument list.
    pub args: Vec<String>,
    /// Environment variables added to the child.
    pub env: Vec<(String, String)>,
    /// `Some` when the command runs in a namespace sandbox.
    pub sandbox: Option<SandboxRequest>,
}

/// Runs xtables commands for one execution context and tool version.
#[derive(Debug, Clone)]
pub struct XTablesRunner<O = LinuxIsolation> {
    context: ExecutionContext,
    version: ToolVersion,
    sandbox: NamespaceSandbox<O>,
}

impl XTablesRunner<LinuxIsolation> {
    /// Creates a runner using the real namespace sandbox.
    #[must_use]
    pub const fn new(context: ExecutionContext, version: ToolVersion) -> Self {
        Self::with_sandbox(context, version, NamespaceSandbox::new())
    }
}

impl<O: IsolationOps> XTablesRunner<O> {
    /// Creates a runner with a custom sandbox.
    pub const fn with_sandbox(
        context: ExecutionContext,
        version: ToolVersion,
        sandbox: NamespaceSandbox<O>,
    ) -> Self {
        Self {
            context,
            version,
            sandbox,
        }
    }

    /// Execution context in use.
    pub const fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Tool version in use.
    pub const fn version(&self) -> ToolVersion {
        self.version
    }

    /// Sandbox used in CNI mode.
    pub const fn sandbox(&self) -> &NamespaceSandbox<O> {
        &self.sandbox
    }

    /// Decides how `command args` would run, without running it.
    pub fn plan(&self, command: &str, args: &[String]) -> XTablesPlan {
        let need_lock = self.context.is_write_command(command) && !self.version.no_locks();
        let mut args = args.to_vec();
        let mut env = Vec::new();

        let (mode, sandbox) = match &self.context.mode {
            ExecutionMode::Cni { network_namespace } => {
                let (mode, lock_file) = if !need_lock {
                    (LockMode::NssOnly, None)
                } else if self.version.supports_lockfile_env() {
                    env.push((
                        XTABLES_LOCKFILE_ENV.to_owned(),
                        network_namespace.display().to_string(),
                    ));
                    (LockMode::LockByEnvAndNss, None)
                } else {
                    (LockMode::LockByMountAndNss, Some(network_namespace.clone()))
                };
                (mode, Some(SandboxRequest { lock_file }))
            }
            ExecutionMode::Host if need_lock => {
                args.push(WAIT_FLAG.to_owned());
                (LockMode::WithWaitLock, None)
            }
            ExecutionMode::Host => (LockMode::WithoutLock, None),
        };

        XTablesPlan {
            mode,
            args,
            env,
            sandbox,
        }
    }

    /// Runs an xtables command and returns only success or failure.
    ///
    /// # Errors
    ///
    /// Returns the raw [`ExecError`] of the tool; translated diagnostics go
    /// to the log only.
    pub fn execute_xtables(
        &self,
        command: &str,
        ignore_errors: bool,
        stdin: Option<&[u8]>,
        args: &[String],
    ) -> Result<(), ExecError> {
        self.run_xtables(command, ignore_errors, stdin, args).result
    }

    /// Runs an xtables command and returns the full captured outcome.
    pub fn run_xtables(
        &self,
        command: &str,
        ignore_errors: bool,
        stdin: Option<&[u8]>,
        args: &[String],
    ) -> CommandOutcome {
        let plan = self.plan(command, args);
        tracing::info!(
            mode = %plan.mode,
            command = %command_line(command, &plan.args),
            "running xtables command"
        );

        let mut cmd = Command::new(command);
        let _ = cmd.args(&plan.args).envs(plan.env.iter().cloned());

        let outcome = match &plan.sandbox {
            Some(request) => {
                let result = self
                    .sandbox
                    .run(request.lock_file.as_deref(), move || {
                        run_captured(cmd, command, stdin)
                    });
                tracing::debug!(path = ?result.path, "sandboxed command finished");
                result.into_inner()
            }
            None => run_captured(cmd, command, stdin),
        };

        log_stdout(&outcome);
        if !ignore_errors && (outcome.result.is_err() || !outcome.stderr.is_empty()) {
            let text = match &outcome.result {
                Err(e) => transform_to_xtables_error_message(&outcome.stderr, e),
                Ok(()) => outcome.stderr.clone(),
            };
            tracing::error!("command error output: {text}");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use podtables_common::constants::{IPTABLES, IPTABLES_RESTORE, IPTABLES_SAVE};

    use super::*;

    const NETNS: &str = "/var/run/netns/cni-0a1b";

    fn runner(context: ExecutionContext, version: &str) -> XTablesRunner {
        XTablesRunner::new(context, ToolVersion::parse(version).expect("valid version"))
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn host_write_with_locking_appends_wait() {
        let plan = runner(ExecutionContext::host(), "1.6.2")
            .plan(IPTABLES, &args(&["-t", "nat", "-A", "OUTPUT"]));
        assert_eq!(plan.mode, LockMode::WithWaitLock);
        assert_eq!(plan.args, args(&["-t", "nat", "-A", "OUTPUT", "--wait=30"]));
        assert!(plan.env.is_empty());
        assert_eq!(plan.sandbox, None);
    }

    #[test]
    fn host_write_before_locking_is_unmodified() {
        let plan = runner(ExecutionContext::host(), "1.6.1").plan(IPTABLES_RESTORE, &args(&["--noflush"]));
        assert_eq!(plan.mode, LockMode::WithoutLock);
        assert_eq!(plan.args, args(&["--noflush"]));
        assert_eq!(plan.sandbox, None);
    }

    #[test]
    fn cni_write_with_env_support_sets_lockfile_env() {
        let plan = runner(ExecutionContext::cni(NETNS), "1.8.6").plan(IPTABLES_RESTORE, &[]);
        assert_eq!(plan.mode, LockMode::LockByEnvAndNss);
        assert_eq!(plan.env, vec![("XTABLES_LOCKFILE".to_owned(), NETNS.to_owned())]);
        assert_eq!(plan.sandbox, Some(SandboxRequest { lock_file: None }));
        assert!(plan.args.is_empty());
    }

    #[test]
    fn cni_write_without_env_support_mounts_lock_file() {
        let plan = runner(ExecutionContext::cni(NETNS), "1.8.5").plan(IPTABLES, &args(&["-L"]));
        assert_eq!(plan.mode, LockMode::LockByMountAndNss);
        assert!(plan.env.is_empty());
        assert_eq!(
            plan.sandbox,
            Some(SandboxRequest {
                lock_file: Some(Path::new(NETNS).to_path_buf())
            })
        );
        assert_eq!(plan.args, args(&["-L"]));
    }

    #[test]
    fn cni_without_locking_only_masks_nss() {
        let plan = runner(ExecutionContext::cni(NETNS), "1.4.21").plan(IPTABLES, &[]);
        assert_eq!(plan.mode, LockMode::NssOnly);
        assert!(plan.env.is_empty());
        assert_eq!(plan.sandbox, Some(SandboxRequest { lock_file: None }));
    }

    #[test]
    fn read_only_commands_never_lock() {
        for version in ["1.4.0", "1.6.2", "1.8.5", "1.8.9"] {
            let host = runner(ExecutionContext::host(), version).plan(IPTABLES_SAVE, &[]);
            assert_eq!(host.mode, LockMode::WithoutLock, "{version}");
            assert!(host.args.is_empty(), "{version}");

            let cni = runner(ExecutionContext::cni(NETNS), version).plan(IPTABLES_SAVE, &[]);
            assert_eq!(cni.mode, LockMode::NssOnly, "{version}");
            assert!(cni.env.is_empty(), "{version}");
            assert_eq!(cni.sandbox, Some(SandboxRequest { lock_file: None }), "{version}");
        }
    }

    #[test]
    fn mode_descriptions() {
        assert_eq!(LockMode::WithWaitLock.to_string(), "with wait lock");
        assert_eq!(LockMode::LockByMountAndNss.to_string(), "without lock by mount and nss");
        assert_eq!(LockMode::NssOnly.to_string(), "without nss");
    }

    #[test]
    fn host_mode_runs_with_wait_flag() {
        let runner = XTablesRunner::new(
            ExecutionContext::host().with_write_commands(["sh"]),
            ToolVersion::new(1, 8, 7),
        );
        let outcome = runner.run_xtables("sh", false, None, &args(&["-c", "printf %s \"$0\""]));
        assert!(outcome.success());
        assert_eq!(outcome.stdout, "--wait=30");
    }

    #[test]
    fn failure_returns_raw_exit_error() {
        let runner = runner(ExecutionContext::host(), "1.8.7");
        let err = runner
            .execute_xtables(
                "sh",
                false,
                None,
                &args(&["-c", "echo 'iptables v1.8.7 (legacy): bad' >&2; exit 2"]),
            )
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
    }
}
