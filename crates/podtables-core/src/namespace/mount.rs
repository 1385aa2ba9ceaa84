//! Mount namespace isolation.
//!
//! Gives the calling thread its own mount table so bind mounts stay private.

use podtables_common::error::{PodtablesError, Result};

/// Moves the calling thread into a new mount namespace.
///
/// `CLONE_NEWNS` implies `CLONE_FS`, so only the calling thread is affected.
///
/// # Errors
///
/// Returns an error if the `unshare(CLONE_NEWNS)` syscall fails.
#[cfg(target_os = "linux")]
pub fn create_mount_namespace() -> Result<()> {
    use nix::sched::{CloneFlags, unshare};

    unshare(CloneFlags::CLONE_NEWNS).map_err(|e| PodtablesError::Namespace {
        message: format!("failed to unshare to new mount namespace: {e}"),
    })?;
    tracing::debug!("mount namespace created");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error — mount namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn create_mount_namespace() -> Result<()> {
    Err(PodtablesError::Unsupported {
        message: "mount namespaces require Linux".into(),
    })
}
