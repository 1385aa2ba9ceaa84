//! Mount utilities for the sandbox.
//!
//! Only ever called after the thread has its own mount namespace; on the
//! host mount table these calls would leak.

use std::path::Path;

use podtables_common::error::{PodtablesError, Result};

/// Remounts `/` recursively as `MS_PRIVATE` so later mounts do not propagate.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn make_root_private() -> Result<()> {
    use nix::mount::{MsFlags, mount};

    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| PodtablesError::Mount {
        source_path: String::new(),
        target: "/".into(),
        message: format!("failed to remount / as private: {e}"),
    })?;
    tracing::debug!("remounted / as private");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: mount propagation requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn make_root_private() -> Result<()> {
    Err(PodtablesError::Unsupported {
        message: "mount propagation requires Linux".into(),
    })
}

/// Bind-mounts `source` read-only over `target`.
///
/// # Errors
///
/// Returns an error if either the bind or the read-only remount fails.
#[cfg(target_os = "linux")]
pub fn bind_mount_readonly(source: &Path, target: &Path) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    let mount_error = |step: &str, e: nix::Error| PodtablesError::Mount {
        source_path: source.display().to_string(),
        target: target.to_path_buf(),
        message: format!("{step}: {e}"),
    };

    // MS_RDONLY is ignored on the initial bind; it only applies on remount.
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(|e| mount_error("bind", e))?;
    mount(
        None::<&str>,
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
        None::<&str>,
    )
    .map_err(|e| mount_error("remount read-only", e))?;
    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        "created read-only bind mount"
    );
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: bind mounts require Linux.
#[cfg(not(target_os = "linux"))]
pub fn bind_mount_readonly(_source: &Path, _target: &Path) -> Result<()> {
    Err(PodtablesError::Unsupported {
        message: "bind mounts require Linux".into(),
    })
}
