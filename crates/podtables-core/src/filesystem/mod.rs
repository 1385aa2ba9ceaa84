//! Filesystem operations applied inside the sandbox's mount namespace.

pub mod mount;
