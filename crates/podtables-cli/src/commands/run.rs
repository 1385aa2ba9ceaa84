//! `podtables run` — Execute an xtables command.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Args;
use podtables_common::config::ConfigSnapshot;
use podtables_core::namespace::network::{NetNsHandle, enter_network_namespace};
use podtables_runtime::exec::CommandExecutor;
use podtables_runtime::xtables::XTablesRunner;

use super::{TargetArgs, resolve_context, resolve_version};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Execution target.
    #[command(flatten)]
    pub target: TargetArgs,

    /// Do not log the command's stderr.
    #[arg(long)]
    pub ignore_errors: bool,

    /// File fed to the command's stdin; `-` reads our own stdin.
    #[arg(long)]
    pub stdin: Option<PathBuf>,

    /// Command and arguments, e.g. `iptables-restore --noflush`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `run` command.
///
/// The command's stdout is forwarded to ours so `iptables-save` style
/// commands stay usable in pipelines.
///
/// # Errors
///
/// Returns an error if the version cannot be determined, the stdin file
/// cannot be read, or the command fails.
pub fn execute(args: RunArgs, snapshot: ConfigSnapshot) -> anyhow::Result<()> {
    let (context, fixed_version) = resolve_context(&args.target, &snapshot)?;
    let Some((program, rest)) = args.command.split_first() else {
        bail!("no command given");
    };

    // The sandbox re-enters the caller's namespace, so the caller has to be
    // in the pod's namespace already, as a CNI plugin would be.
    if let Some(netns) = context.mode.network_namespace() {
        let handle = NetNsHandle::open(netns)?;
        enter_network_namespace(&handle)
            .with_context(|| format!("cannot enter pod network namespace {}", netns.display()))?;
    }

    let executor = CommandExecutor::new(snapshot);
    let version = resolve_version(fixed_version, &executor, program)?;
    let input = read_input(args.stdin.as_deref())?;

    tracing::debug!(mode = %context.mode, %version, "resolved execution context");
    let runner = XTablesRunner::new(context, version);
    let outcome = runner.run_xtables(program, args.ignore_errors, input.as_deref(), rest);

    if !outcome.stdout.is_empty() {
        std::io::stdout()
            .write_all(outcome.stdout.as_bytes())
            .context("failed to write command output")?;
    }
    outcome
        .result
        .with_context(|| format!("{program} failed"))
}

fn read_input(path: Option<&Path>) -> anyhow::Result<Option<Vec<u8>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let mut buf = Vec::new();
    if path == Path::new("-") {
        let _ = std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read stdin")?;
    } else {
        buf = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    }
    Ok(Some(buf))
}
