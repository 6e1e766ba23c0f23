use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicyArg {
    Drain,
    Abort,
    Continue,
}

#[derive(Parser, Debug)]
#[command(name = "flowpilot", version, about = "Run dependency-ordered task flows")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to ~/.flowpilot/config.toml, then ./flowpilot.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ExecArgs {
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Per-task deadline in milliseconds; 0 disables it.
    #[arg(long)]
    pub task_timeout_ms: Option<u64>,

    #[arg(long, value_enum)]
    pub failure_policy: Option<FailurePolicyArg>,

    /// Write the final snapshot JSON here as well as to stdout.
    #[arg(long)]
    pub snapshot_out: Option<PathBuf>,

    #[arg(long)]
    pub no_progress: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub project: Option<String>,

    #[arg(long, group = "input")]
    pub requirements: Option<String>,

    #[arg(long, group = "input")]
    pub requirements_file: Option<PathBuf>,

    /// Use this plan file instead of the configured planner.
    #[arg(long)]
    pub plan: Option<PathBuf>,

    #[command(flatten)]
    pub exec: ExecArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ResumeArgs {
    #[arg(long)]
    pub snapshot: PathBuf,

    #[command(flatten)]
    pub exec: ExecArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long)]
    pub plan: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan and run a flow to completion.
    Run(RunArgs),
    /// Continue a flow from a snapshot file.
    Resume(ResumeArgs),
    /// Check a plan file and print its execution stages.
    Validate(ValidateArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = Args::parse_from([
            "flowpilot",
            "run",
            "--requirements",
            "ship it",
            "--max-concurrency",
            "2",
            "--failure-policy",
            "abort",
            "--no-progress",
        ]);
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.requirements.as_deref(), Some("ship it"));
        assert_eq!(run.exec.max_concurrency, Some(2));
        assert_eq!(run.exec.failure_policy, Some(FailurePolicyArg::Abort));
        assert!(run.exec.no_progress);
    }

    #[test]
    fn test_requirements_sources_conflict() {
        let parsed = Args::try_parse_from([
            "flowpilot",
            "run",
            "--requirements",
            "a",
            "--requirements-file",
            "b.txt",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_resume_with_global_config() {
        let args = Args::parse_from([
            "flowpilot",
            "resume",
            "--snapshot",
            "snap.json",
            "--config",
            "fp.toml",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("fp.toml")));
        assert!(matches!(args.command, Commands::Resume(_)));
    }
}
