//! CLI command definitions and dispatch.

pub mod plan;
pub mod run;
pub mod version;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use podtables_common::config::{ConfigSnapshot, RunnerSettings};
use podtables_common::types::ExecutionContext;
use podtables_runtime::exec::CommandExecutor;
use podtables_runtime::version::{ToolVersion, detect_version};

/// podtables — run xtables commands on the host or inside a pod network namespace.
#[derive(Parser, Debug)]
#[command(name = "podtables", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON or YAML configuration exported to child processes.
    #[arg(long, global = true, env = "PODTABLES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an xtables command with the appropriate locking and sandboxing.
    Run(run::RunArgs),
    /// Show how a command would be run, without running it.
    Plan(plan::PlanArgs),
    /// Print the detected version of an xtables tool.
    Version(version::VersionArgs),
}

/// Execution target shared by `run` and `plan`.
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Run from the host filesystem inside a pod network namespace.
    #[arg(long, requires = "netns")]
    pub cni: bool,

    /// Pod network namespace handle, e.g. /var/run/netns/cni-1234.
    #[arg(long)]
    pub netns: Option<PathBuf>,

    /// Use this tool version instead of querying `<command> --version`.
    #[arg(long, value_parser = parse_tool_version)]
    pub tool_version: Option<ToolVersion>,
}

fn parse_tool_version(s: &str) -> Result<ToolVersion, String> {
    ToolVersion::parse(s).map_err(|e| e.to_string())
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let snapshot = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Run(args) => run::execute(args, snapshot),
        Command::Plan(args) => plan::execute(args, &snapshot),
        Command::Version(args) => version::execute(&args, snapshot),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ConfigSnapshot> {
    path.map_or_else(
        || Ok(ConfigSnapshot::new()),
        |p| {
            ConfigSnapshot::from_file(p)
                .with_context(|| format!("failed to load configuration {}", p.display()))
        },
    )
}

/// Merges command-line flags over file settings into an execution context.
pub(crate) fn resolve_context(
    target: &TargetArgs,
    snapshot: &ConfigSnapshot,
) -> anyhow::Result<(ExecutionContext, Option<ToolVersion>)> {
    let mut settings = RunnerSettings::from_snapshot(snapshot)?;
    if target.cni {
        settings.cni_mode = true;
    }
    if let Some(netns) = &target.netns {
        settings.network_namespace = Some(netns.clone());
    }
    settings.validate()?;

    let context = match (settings.cni_mode, settings.network_namespace) {
        (true, Some(netns)) => ExecutionContext::cni(netns),
        _ => ExecutionContext::host(),
    };
    let version = match (target.tool_version, settings.iptables_version) {
        (Some(v), _) => Some(v),
        (None, Some(raw)) => Some(ToolVersion::parse(&raw)?),
        (None, None) => None,
    };
    Ok((context, version))
}

/// Returns the fixed version, or detects it from `tool` once.
pub(crate) fn resolve_version(
    fixed: Option<ToolVersion>,
    executor: &CommandExecutor,
    tool: &str,
) -> anyhow::Result<ToolVersion> {
    match fixed {
        Some(v) => Ok(v),
        None => Ok(detect_version(executor, tool)
            .with_context(|| format!("cannot determine {tool} version"))?
            .version),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn cli_flags_enable_cni_mode() {
        let target = TargetArgs {
            cni: true,
            netns: Some("/var/run/netns/pod".into()),
            tool_version: None,
        };
        let (context, version) = resolve_context(&target, &ConfigSnapshot::new()).unwrap();
        assert!(context.mode.is_cni());
        assert_eq!(version, None);
    }

    #[test]
    fn config_file_settings_apply_without_flags() {
        let mut snapshot = ConfigSnapshot::new();
        snapshot.set(RunnerSettings::CNI_MODE_KEY, true);
        snapshot.set(RunnerSettings::NETWORK_NAMESPACE_KEY, "/var/run/netns/pod");
        snapshot.set(RunnerSettings::IPTABLES_VERSION_KEY, "1.8.5");
        let (context, version) = resolve_context(&TargetArgs::default(), &snapshot).unwrap();
        assert!(context.mode.is_cni());
        assert_eq!(version, Some(ToolVersion::new(1, 8, 5)));
    }

    #[test]
    fn flag_version_overrides_config() {
        let mut snapshot = ConfigSnapshot::new();
        snapshot.set(RunnerSettings::IPTABLES_VERSION_KEY, "1.8.5");
        let target = TargetArgs {
            tool_version: Some(ToolVersion::new(1, 6, 1)),
            ..TargetArgs::default()
        };
        let (context, version) = resolve_context(&target, &snapshot).unwrap();
        assert!(!context.mode.is_cni());
        assert_eq!(version, Some(ToolVersion::new(1, 6, 1)));
    }

    #[test]
    fn cli_parses_trailing_command() {
        let cli = Cli::try_parse_from([
            "podtables",
            "run",
            "--cni",
            "--netns",
            "/var/run/netns/pod",
            "--",
            "iptables-restore",
            "--noflush",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            unreachable!("parsed a different subcommand");
        };
        assert_eq!(args.command, ["iptables-restore", "--noflush"]);
    }
}
