//! Linux namespace management for the sandbox.
//!
//! Provides safe wrappers around `unshare(2)` and `setns(2)` for the two
//! namespace types the sandbox touches. Both calls act on the calling
//! thread only and cannot be undone for the rest of its lifetime.

pub mod mount;
pub mod network;
