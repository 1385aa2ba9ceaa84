//! `podtables version` — Print the detected xtables version.

use clap::Args;
use podtables_common::config::ConfigSnapshot;
use podtables_common::constants::IPTABLES;
use podtables_runtime::exec::CommandExecutor;
use podtables_runtime::version::detect_version;

use crate::output;

/// Arguments for the `version` command.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Tool to query.
    #[arg(long, default_value = IPTABLES)]
    pub tool: String,
}

/// Executes the `version` command.
///
/// # Errors
///
/// Returns an error if the tool is missing or prints an unparseable version.
pub fn execute(args: &VersionArgs, snapshot: ConfigSnapshot) -> anyhow::Result<()> {
    let detected = detect_version(&CommandExecutor::new(snapshot), &args.tool)?;
    output::print(&format!(
        "{} {}\nlocking: {}\nlockfile env: {}",
        args.tool,
        detected,
        output::yes_no(!detected.version.no_locks()),
        output::yes_no(detected.version.supports_lockfile_env()),
    ));
    Ok(())
}
