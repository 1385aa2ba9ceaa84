//! # podtables-core
//!
//! Low-level Linux isolation primitives and the namespace sandbox used to
//! run xtables tools from the host filesystem inside a pod network namespace.
//!
//! This crate provides:
//! - **Namespaces**: mount namespace unsharing, network namespace capture and re-entry.
//! - **Filesystem**: private remount of `/` and read-only bind mounts.
//! - **Sandbox**: a single-use thread that applies the above before running an operation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod namespace;
pub mod sandbox;

pub use sandbox::{ExecutionPath, IsolationOps, LinuxIsolation, NamespaceSandbox, SandboxResult};
