use crate::args::{base_workdir, MainArguments};
use crate::cmd_validate;
use crate::exit::CliError;
use ferry_config::{relative_config_path, FileConfigLoader, MigrationValidator, Options, OriginConfigLoader};
use ferry_core::Console;
use ferry_store::DestinationLock;
use ferry_workflow::{ConfigLoader, JsonlEventMonitor, Migration};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub fn execute(
    args: &MainArguments,
    options: &Options,
    read_config_from_change: bool,
    console: &dyn Console,
) -> anyhow::Result<()> {
    let general = &options.general;
    let config_path = args.config_file(&general.cwd)?;
    let name = args.workflow_name.as_str();

    let loader = FileConfigLoader::new(&config_path, options.clone());
    let config = loader.load(console)?;
    cmd_validate::check(&config, name, console)?;

    let migration = match config.migration(name)?.clone() {
        Migration::Workflow(workflow) if read_config_from_change => {
            let root = match &general.config_root {
                Some(root) => general.cwd.join(root),
                None => config_path.parent().unwrap_or(Path::new("/")).to_path_buf(),
            };
            let path_in_origin = relative_config_path(&config_path, &root)?;
            let origin_loader =
                OriginConfigLoader::new(workflow.shared_origin(), path_in_origin, loader)?;
            Migration::Workflow(
                workflow.with_config_reloading(Arc::new(origin_loader), Arc::new(MigrationValidator)),
            )
        }
        Migration::Mirror(_) if read_config_from_change => {
            return Err(CliError::CommandLine(
                "--read-config-from-change only applies to workflows".into(),
            )
            .into());
        }
        other => other,
    };

    let destination = match &migration {
        Migration::Workflow(w) => w.destination().describe(),
        Migration::Mirror(m) => m.describe(),
    };
    let _lock = DestinationLock::acquire(&general.store.destination_lock(&destination))
        .map_err(|e| CliError::Environment(format!("{e:#}")))?;

    let base = base_workdir(
        general.work_dir.as_deref(),
        &general.cwd,
        general.store.workdir(&config_path, name),
        console,
    )?;
    let monitor = JsonlEventMonitor::new(&general.store.run_dir(&config_path, name));
    info!(
        migration = name,
        kind = migration.kind(),
        destination = %destination,
        workdir = %base.display(),
        "running migration"
    );

    migration.run(&base.join("run"), args.source_ref.as_deref(), console, &monitor)?;
    console.info(&format!("Migration '{name}' finished"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::TestingConsole;
    use ferry_store::StorePaths;
    use std::fs;

    const YAML: &str = r#"
workflows:
  - origin: { folder: ~ }
    destination: { folder: { path: out } }
    authoring: { default: "Bot <bot@example.com>" }
    transformations:
      - replace: { before: alpha, after: beta }
"#;

    fn setup(root: &Path) -> Options {
        fs::write(root.join("ferry.yaml"), YAML).unwrap();
        fs::create_dir_all(root.join("input")).unwrap();
        fs::write(root.join("input/a.txt"), "alpha\n").unwrap();
        Options::new(StorePaths::discover(root.join("store")), root.to_path_buf())
    }

    fn args(list: &[&str]) -> MainArguments {
        let owned: Vec<String> = list.iter().map(|s| s.to_string()).collect();
        MainArguments::parse(&owned).unwrap()
    }

    #[test]
    fn migrates_folder_and_records_events() {
        let tmp = tempfile::tempdir().unwrap();
        let options = setup(tmp.path());
        let console = TestingConsole::new();
        execute(&args(&["ferry.yaml", "default", "input"]), &options, false, &console).unwrap();

        assert_eq!(
            fs::read_to_string(tmp.path().join("out/a.txt")).unwrap(),
            "beta\n"
        );
        let run_dir = options
            .general
            .store
            .run_dir(&tmp.path().join("ferry.yaml"), "default");
        let events = fs::read_to_string(run_dir.join("events.jsonl")).unwrap();
        assert!(events.lines().count() >= 2, "{events}");
        assert!(run_dir.join("last-run.json").is_file());
    }

    #[test]
    fn second_identical_run_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let options = setup(tmp.path());
        let console = TestingConsole::new();
        let a = args(&["ferry.yaml", "default", "input"]);
        execute(&a, &options, false, &console).unwrap();
        let err = execute(&a, &options, false, &console).unwrap_err();
        assert_eq!(crate::exit::ExitCode::for_error(&err).code(), 4);
    }

    #[test]
    fn concurrent_run_on_same_destination_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let options = setup(tmp.path());
        let dest = format!("folder.destination({})", tmp.path().join("out").display());
        let _held = DestinationLock::acquire(&options.general.store.destination_lock(&dest)).unwrap();

        let err = execute(
            &args(&["ferry.yaml", "default", "input"]),
            &options,
            false,
            &TestingConsole::new(),
        )
        .unwrap_err();
        assert_eq!(crate::exit::ExitCode::for_error(&err).code(), 30);
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn unknown_workflow_fails_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let options = setup(tmp.path());
        let err = execute(
            &args(&["ferry.yaml", "nope", "input"]),
            &options,
            false,
            &TestingConsole::new(),
        )
        .unwrap_err();
        assert_eq!(crate::exit::ExitCode::for_error(&err).code(), 2);
    }
}
