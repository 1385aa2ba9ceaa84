//! Execution of iptables-family tools for the podtables runtime.
//!
//! - [`version`]: tool version parsing, detection, and capability gates.
//! - [`exec`]: generic command execution with captured output.
//! - [`xtables`]: lock- and sandbox-aware execution of xtables tools.
//! - [`translate`]: rewriting of xtables stderr into actionable hints.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod exec;
pub mod translate;
pub mod version;
pub mod xtables;
