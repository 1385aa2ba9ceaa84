//! Single-use namespace sandbox for running xtables tools from the host
//! filesystem inside a pod network namespace.
//!
//! Each call to [`NamespaceSandbox::run`] spawns a fresh OS thread that
//! unshares its mount namespace, re-enters the caller's network namespace,
//! makes `/` private, and masks `/run/xtables.lock` (optionally) and
//! `/etc/nsswitch.conf` with read-only bind mounts before running the
//! operation. `unshare(2)` cannot be reverted, so the thread is never
//! reused: it exits when the call returns and the mounts go with it.
//!
//! If any setup step fails before the operation starts, the operation runs
//! directly on the calling thread instead. This keeps restrictive hosts
//! (SELinux policies denying `unshare` or `mount`) working at the cost of
//! possible lock contention and NSS lookups.

use std::path::Path;
use std::thread;

use podtables_common::constants::{DEV_NULL_PATH, NSSWITCH_CONF_PATH, XTABLES_LOCK_PATH};
use podtables_common::error::Result;

use crate::filesystem::mount as fs_mount;
use crate::namespace::{mount as ns_mount, network};

/// Kernel primitives the sandbox is assembled from.
///
/// Every method except [`IsolationOps::capture_network_namespace`] runs on
/// the sandbox thread and affects only that thread.
pub trait IsolationOps: Sync {
    /// Handle to a captured network namespace.
    type NetNs: Send;

    /// Captures the calling thread's network namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be resolved.
    fn capture_network_namespace(&self) -> Result<Self::NetNs>;

    /// Moves the calling thread into a new mount namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if `unshare(2)` fails.
    fn unshare_mount_namespace(&self) -> Result<()>;

    /// Moves the calling thread into `netns`.
    ///
    /// # Errors
    ///
    /// Returns an error if `setns(2)` fails.
    fn enter_network_namespace(&self, netns: &Self::NetNs) -> Result<()>;

    /// Remounts `/` recursively private.
    ///
    /// # Errors
    ///
    /// Returns an error if `mount(2)` fails.
    fn make_root_private(&self) -> Result<()>;

    /// Bind-mounts `source` read-only over `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `mount(2)` fails.
    fn bind_mount_readonly(&self, source: &Path, target: &Path) -> Result<()>;
}

/// [`IsolationOps`] backed by the real syscalls.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxIsolation;

impl IsolationOps for LinuxIsolation {
    type NetNs = network::NetNsHandle;

    fn capture_network_namespace(&self) -> Result<Self::NetNs> {
        network::current_network_namespace()
    }

    fn unshare_mount_namespace(&self) -> Result<()> {
        ns_mount::create_mount_namespace()
    }

    fn enter_network_namespace(&self, netns: &Self::NetNs) -> Result<()> {
        network::enter_network_namespace(netns)
    }

    fn make_root_private(&self) -> Result<()> {
        fs_mount::make_root_private()
    }

    fn bind_mount_readonly(&self, source: &Path, target: &Path) -> Result<()> {
        fs_mount::bind_mount_readonly(source, target)
    }
}

/// Which path produced a [`SandboxResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// Setup succeeded and the operation ran on the sandbox thread.
    Sandboxed,
    /// Setup failed and the operation ran directly on the caller's thread.
    Fallback,
}

/// Value returned by the operation, tagged with how it ran.
///
/// The tag is for diagnostics; the value is always what the operation returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxResult<T> {
    /// The operation's return value.
    pub value: T,
    /// How the operation ran.
    pub path: ExecutionPath,
}

impl<T> SandboxResult<T> {
    /// Returns `true` if the operation ran inside the sandbox.
    #[must_use]
    pub fn is_sandboxed(&self) -> bool {
        self.path == ExecutionPath::Sandboxed
    }

    /// Discards the path tag.
    pub fn into_inner(self) -> T {
        self.value
    }
}

enum Outcome<T, F> {
    Ran(T),
    SetupFailed(podtables_common::error::PodtablesError, F),
}

/// Builds a throwaway mount + network namespace context per call.
#[derive(Debug, Clone, Default)]
pub struct NamespaceSandbox<O = LinuxIsolation> {
    ops: O,
}

impl NamespaceSandbox<LinuxIsolation> {
    /// Creates a sandbox using the real kernel primitives.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ops: LinuxIsolation,
        }
    }
}

impl<O: IsolationOps> NamespaceSandbox<O> {
    /// Creates a sandbox over custom isolation primitives.
    pub const fn with_ops(ops: O) -> Self {
        Self { ops }
    }

    /// Returns the isolation primitives.
    pub const fn ops(&self) -> &O {
        &self.ops
    }

    /// Runs `op` inside a freshly built sandbox.
    ///
    /// `lock_file`, when set and non-empty, is bind-mounted read-only over
    /// `/run/xtables.lock`. `/dev/null` is always bind-mounted over
    /// `/etc/nsswitch.conf`.
    ///
    /// `op` runs exactly once. If setup fails before `op` starts, a warning
    /// is logged and `op` runs unsandboxed on the calling thread. A panic
    /// inside `op` is propagated to the caller.
    pub fn run<T, F>(&self, lock_file: Option<&Path>, op: F) -> SandboxResult<T>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        let lock_file = lock_file.filter(|p| !p.as_os_str().is_empty());

        // Captured here, before the new thread touches any namespace.
        let outcome = match self.ops.capture_network_namespace() {
            Ok(netns) => self.run_on_worker(netns, lock_file, op),
            Err(e) => Outcome::SetupFailed(e, op),
        };

        match outcome {
            Outcome::Ran(value) => SandboxResult {
                value,
                path: ExecutionPath::Sandboxed,
            },
            Outcome::SetupFailed(e, op) => {
                tracing::warn!(
                    error = %e,
                    "failed to set up execution environment, attempting to continue anyway"
                );
                SandboxResult {
                    value: op(),
                    path: ExecutionPath::Fallback,
                }
            }
        }
    }

    fn run_on_worker<T, F>(&self, netns: O::NetNs, lock_file: Option<&Path>, op: F) -> Outcome<T, F>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        thread::scope(|scope| {
            let worker = scope.spawn(move || match self.prepare(&netns, lock_file) {
                Ok(()) => Outcome::Ran(op()),
                Err(e) => Outcome::SetupFailed(e, op),
            });
            match worker.join() {
                Ok(outcome) => outcome,
                Err(payload) => std::panic::resume_unwind(payload),
            }
        })
    }

    fn prepare(&self, netns: &O::NetNs, lock_file: Option<&Path>) -> Result<()> {
        self.ops.unshare_mount_namespace()?;
        // A new thread does not reliably keep the namespace the caller had entered.
        self.ops.enter_network_namespace(netns)?;
        self.ops.make_root_private()?;
        if let Some(lock_file) = lock_file {
            self.ops
                .bind_mount_readonly(lock_file, Path::new(XTABLES_LOCK_PATH))?;
        }
        // xt_owner resolves users through NSS, which may go over the network.
        self.ops
            .bind_mount_readonly(Path::new(DEV_NULL_PATH), Path::new(NSSWITCH_CONF_PATH))?;
        tracing::debug!(
            lock_file = ?lock_file.map(Path::display),
            "sandbox ready"
        );
        Ok(())
    }
}
