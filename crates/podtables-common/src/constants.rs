//! System-wide constants: well-known paths, tool names, and version thresholds.

/// Lock file used by the xtables family of tools to serialize rule changes.
pub const XTABLES_LOCK_PATH: &str = "/run/xtables.lock";

/// Environment variable (iptables >= 1.8.6) overriding the lock file location.
pub const XTABLES_LOCKFILE_ENV: &str = "XTABLES_LOCKFILE";

/// Name service switch configuration masked inside the sandbox.
pub const NSSWITCH_CONF_PATH: &str = "/etc/nsswitch.conf";

/// Empty source bind-mounted over [`NSSWITCH_CONF_PATH`].
pub const DEV_NULL_PATH: &str = "/dev/null";

/// First iptables release where `--wait` and locking exist (including `iptables-restore`).
pub const LOCKING_SUPPORTED_SINCE: (u32, u32, u32) = (1, 6, 2);

/// First iptables release honoring [`XTABLES_LOCKFILE_ENV`].
pub const LOCKFILE_ENV_SUPPORTED_SINCE: (u32, u32, u32) = (1, 8, 6);

/// Wait flag appended to write commands in host mode.
pub const WAIT_FLAG: &str = "--wait=30";

/// `iptables` binary name.
pub const IPTABLES: &str = "iptables";
/// `ip6tables` binary name.
pub const IP6TABLES: &str = "ip6tables";
/// `iptables-restore` binary name.
pub const IPTABLES_RESTORE: &str = "iptables-restore";
/// `ip6tables-restore` binary name.
pub const IP6TABLES_RESTORE: &str = "ip6tables-restore";
/// `iptables-save` binary name.
pub const IPTABLES_SAVE: &str = "iptables-save";

/// Commands that mutate firewall state and may contend for the xtables lock.
///
/// The `-legacy` and `-nft` suffixed variants shipped by distributions that
/// install both backends side by side are included.
pub const XTABLES_WRITE_COMMANDS: &[&str] = &[
    IPTABLES,
    IP6TABLES,
    IPTABLES_RESTORE,
    IP6TABLES_RESTORE,
    "iptables-legacy",
    "ip6tables-legacy",
    "iptables-legacy-restore",
    "ip6tables-legacy-restore",
    "iptables-nft",
    "ip6tables-nft",
    "iptables-nft-restore",
    "ip6tables-nft-restore",
];
