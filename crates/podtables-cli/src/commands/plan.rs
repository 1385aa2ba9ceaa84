//! `podtables plan` — Show how an xtables command would run.

use anyhow::bail;
use clap::Args;
use podtables_common::config::ConfigSnapshot;
use podtables_runtime::exec::CommandExecutor;
use podtables_runtime::xtables::XTablesRunner;

use super::{TargetArgs, resolve_context, resolve_version};
use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Execution target.
    #[command(flatten)]
    pub target: TargetArgs,

    /// Command and arguments to plan.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `plan` command.
///
/// # Errors
///
/// Returns an error if the context is invalid or the version cannot be determined.
pub fn execute(args: PlanArgs, snapshot: &ConfigSnapshot) -> anyhow::Result<()> {
    let (context, fixed_version) = resolve_context(&args.target, snapshot)?;
    let Some((program, rest)) = args.command.split_first() else {
        bail!("no command given");
    };
    let version = resolve_version(
        fixed_version,
        &CommandExecutor::new(snapshot.clone()),
        program,
    )?;

    let runner = XTablesRunner::new(context, version);
    let plan = runner.plan(program, rest);
    output::print(&output::format_plan(program, version, &plan));
    Ok(())
}
