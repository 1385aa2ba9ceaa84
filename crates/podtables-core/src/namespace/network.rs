//! Network namespace capture and re-entry.
//!
//! A handle is an open file descriptor on an `nsfs` entry, either the
//! calling thread's own (`/proc/thread-self/ns/net`) or a named pod
//! namespace such as `/var/run/netns/cni-1234`.

use std::fs::File;
use std::path::{Path, PathBuf};

use podtables_common::error::{PodtablesError, Result};

/// Namespace file of the calling thread.
pub const THREAD_SELF_NETNS: &str = "/proc/thread-self/ns/net";

/// Open handle to a network namespace.
#[derive(Debug)]
pub struct NetNsHandle {
    path: PathBuf,
    file: File,
}

impl NetNsHandle {
    /// Opens the network namespace at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PodtablesError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path the handle was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Captures the network namespace of the calling thread.
///
/// # Errors
///
/// Returns an error if the thread's namespace file cannot be opened.
pub fn current_network_namespace() -> Result<NetNsHandle> {
    let handle = NetNsHandle::open(Path::new(THREAD_SELF_NETNS)).map_err(|e| {
        PodtablesError::Namespace {
            message: format!("failed to get current namespace: {e}"),
        }
    })?;
    tracing::debug!(path = %handle.path.display(), "captured current network namespace");
    Ok(handle)
}

/// Moves the calling thread into the network namespace behind `handle`.
///
/// # Errors
///
/// Returns an error if the `setns(CLONE_NEWNET)` syscall fails.
#[cfg(target_os = "linux")]
pub fn enter_network_namespace(handle: &NetNsHandle) -> Result<()> {
    use nix::sched::{CloneFlags, setns};

    setns(&handle.file, CloneFlags::CLONE_NEWNET).map_err(|e| PodtablesError::Namespace {
        message: format!(
            "failed to reset network namespace {}: {e}",
            handle.path.display()
        ),
    })?;
    tracing::debug!(path = %handle.path.display(), "entered network namespace");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error — network namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn enter_network_namespace(_handle: &NetNsHandle) -> Result<()> {
    Err(PodtablesError::Unsupported {
        message: "network namespaces require Linux".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_namespace_fails_with_path() {
        let err = NetNsHandle::open(Path::new("/nonexistent/netns/pod")).unwrap_err();
        assert!(matches!(
            err,
            PodtablesError::Io { ref path, .. } if path == Path::new("/nonexistent/netns/pod")
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn captures_current_namespace() {
        let handle = current_network_namespace().unwrap();
        assert_eq!(handle.path(), Path::new(THREAD_SELF_NETNS));
    }
}
