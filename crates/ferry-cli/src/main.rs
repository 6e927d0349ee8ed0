mod args;
mod cmd_info;
mod cmd_migrate;
mod cmd_validate;
mod exit;

use args::{MainArguments, Subcommand};
use clap::Parser;
use exit::{CliError, ExitCode};
use ferry_config::Options;
use ferry_core::{Console, LogConsole};
use ferry_store::StorePaths;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ferry",
    version,
    about = "Move code changes between repositories",
    after_help = "\
subcommand: Optional, defaults to 'migrate'. One of:
  - migrate: Executes the migration for the given config.
  - validate: Validates that the configuration is correct.
  - info: Reads the last migrated reference in the origin and destination.

config_path: Required. Relative or absolute path to the YAML config file.
workflow_name: Optional, defaults to 'default'.
source_ref: Optional. The reference to be resolved in the origin."
)]
struct Cli {
    /// [subcommand] config_path [workflow_name [source_ref]]
    #[arg(value_name = "ARGS")]
    unnamed: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where transformations run. Defaults to a per-workflow directory in the store
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Root the config path is taken relative to when read from the origin
    #[arg(long)]
    config_root: Option<PathBuf>,

    /// Origin revision to treat as the last migrated one
    #[arg(long)]
    last_rev: Option<String>,

    /// Destination revision to use as baseline in change_request mode
    #[arg(long)]
    change_request_parent: Option<String>,

    /// Run everything but do not write to the destination
    #[arg(long)]
    dry_run: bool,

    /// Migrate even if the last migrated revision is unrelated to the source ref
    #[arg(long)]
    force: bool,

    /// Treat transformations that do nothing as success
    #[arg(long)]
    ignore_noop: bool,

    /// Output directory for folder destinations
    #[arg(long)]
    folder_dir: Option<PathBuf>,

    /// Copy the content of symlinks that point outside the origin folder
    #[arg(long)]
    folder_materialize_outside_symlinks: bool,

    /// Committer name for git destinations
    #[arg(long)]
    git_committer_name: Option<String>,

    /// Committer email for git destinations
    #[arg(long)]
    git_committer_email: Option<String>,

    /// Push even though the destination fetch ref does not exist yet
    #[arg(long)]
    git_first_commit: bool,

    /// Print `info` output as JSON
    #[arg(long)]
    json: bool,

    /// Re-read the workflow from the origin at every migrated change
    #[arg(long)]
    read_config_from_change: bool,
}

impl Cli {
    fn options(&self, store: StorePaths, cwd: PathBuf) -> Options {
        let mut options = Options::new(store, cwd);
        options.general.work_dir = self.work_dir.clone();
        options.general.config_root = self.config_root.clone();

        options.workflow.last_revision = self.last_rev.clone();
        options.workflow.change_request_parent = self.change_request_parent.clone();
        options.workflow.dry_run = self.dry_run;
        options.workflow.force = self.force;
        options.workflow.ignore_noop = self.ignore_noop;

        options.git.committer_name = self.git_committer_name.clone();
        options.git.committer_email = self.git_committer_email.clone();
        options.git.first_commit = self.git_first_commit;

        options.folder.folder_dir = self
            .folder_dir
            .as_ref()
            .map(|dir| options.general.cwd.join(dir));
        options.folder.materialize_outside_symlinks = self.folder_materialize_outside_symlinks;
        options
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ferry=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ferry=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::CommandLineError.into()
            } else {
                ExitCode::Success.into()
            };
        }
    };
    init_tracing(cli.verbose);

    let console = LogConsole::new(std::io::stdin().is_terminal());
    match run(&cli, &console) {
        Ok(()) => ExitCode::Success.into(),
        Err(e) => {
            let code = ExitCode::for_error(&e);
            if code == ExitCode::NoOp {
                console.warn(&format!("{e:#}"));
            } else {
                console.error(&format!("{e:#}"));
            }
            code.into()
        }
    }
}

fn run(cli: &Cli, console: &dyn Console) -> anyhow::Result<()> {
    let args = MainArguments::parse(&cli.unnamed)?;
    let cwd = std::env::current_dir()?;
    let store = StorePaths::user();
    store
        .ensure_layout()
        .map_err(|e| CliError::Environment(format!("cannot create store at {}: {e:#}", store.root.display())))?;
    let options = cli.options(store, cwd);

    match args.subcommand {
        Subcommand::Migrate => cmd_migrate::execute(&args, &options, cli.read_config_from_change, console),
        Subcommand::Validate => cmd_validate::execute(&args, &options, console),
        Subcommand::Info => cmd_info::execute(&args, &options, cli.json, console),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_fill_options() {
        let cli = Cli::try_parse_from([
            "ferry",
            "migrate",
            "ferry.yaml",
            "--last-rev",
            "abc",
            "--dry-run",
            "--folder-dir",
            "out",
            "--git-first-commit",
            "--git-committer-email",
            "bot@example.com",
        ])
        .unwrap();
        assert_eq!(cli.unnamed, ["migrate", "ferry.yaml"]);
        let options = cli.options(StorePaths::discover("/store"), PathBuf::from("/work"));
        assert_eq!(options.workflow.last_revision(), Some("abc"));
        assert!(options.workflow.dry_run);
        assert!(!options.workflow.force);
        assert_eq!(options.folder.folder_dir, Some(PathBuf::from("/work/out")));
        assert!(options.git.first_commit);
        assert_eq!(options.git.committer_email.as_deref(), Some("bot@example.com"));
    }

    #[test]
    fn unknown_flag_is_a_command_line_error() {
        let err = Cli::try_parse_from(["ferry", "--frobnicate"]).err().unwrap();
        assert!(err.use_stderr());
    }
}
