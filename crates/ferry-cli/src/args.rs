use crate::exit::CliError;
use ferry_core::Console;
use std::fmt;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_WORKFLOW: &str = "default";
const CONFIG_EXTENSIONS: &[&str] = &["yaml", "yml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    Migrate,
    Validate,
    Info,
}

impl Subcommand {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "migrate" => Some(Subcommand::Migrate),
            "validate" => Some(Subcommand::Validate),
            "info" => Some(Subcommand::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Subcommand::Migrate => "migrate",
            Subcommand::Validate => "validate",
            Subcommand::Info => "info",
        })
    }
}

/// Positional arguments: `[subcommand] config_path [workflow_name [source_ref]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainArguments {
    pub subcommand: Subcommand,
    pub config_path: String,
    pub workflow_name: String,
    pub source_ref: Option<String>,
}

impl MainArguments {
    pub fn parse(unnamed: &[String]) -> Result<Self, CliError> {
        if unnamed.is_empty() {
            return Err(CliError::CommandLine(
                "Expected at least a configuration file.".into(),
            ));
        }
        if unnamed.len() > 4 {
            return Err(CliError::CommandLine(
                "Expected at most four arguments.".into(),
            ));
        }

        let mut rest = unnamed.iter();
        let mut subcommand = Subcommand::Migrate;
        let first = &unnamed[0];
        if !is_config_file(first) {
            subcommand = Subcommand::parse(first).ok_or_else(|| {
                CliError::CommandLine(format!("Invalid subcommand '{first}'"))
            })?;
            rest.next();
        }

        let config_path = rest.next().cloned().ok_or_else(|| {
            CliError::CommandLine(format!(
                "Configuration file missing for '{subcommand}' subcommand."
            ))
        })?;
        let workflow_name = rest
            .next()
            .cloned()
            .unwrap_or_else(|| DEFAULT_WORKFLOW.to_string());
        let source_ref = rest.next().cloned();
        if source_ref.is_some() && subcommand != Subcommand::Migrate {
            return Err(CliError::CommandLine(format!(
                "Too many arguments for subcommand '{subcommand}'"
            )));
        }

        Ok(Self {
            subcommand,
            config_path,
            workflow_name,
            source_ref,
        })
    }

    /// Absolute path of the configuration file, which must exist.
    pub fn config_file(&self, cwd: &Path) -> Result<PathBuf, CliError> {
        let path = normalize(&cwd.join(&self.config_path));
        if !path.is_file() {
            return Err(CliError::CommandLine(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

fn is_config_file(arg: &str) -> bool {
    Path::new(arg)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| CONFIG_EXTENSIONS.contains(&e))
}

/// Lexically resolve `.` and `..` segments.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Base directory transformations run in: `--work-dir` when given,
/// otherwise the per-workflow directory in the store.
pub fn base_workdir(
    work_dir: Option<&Path>,
    cwd: &Path,
    default: PathBuf,
    console: &dyn Console,
) -> Result<PathBuf, CliError> {
    let Some(dir) = work_dir else {
        return Ok(default);
    };
    let dir = normalize(&cwd.join(dir));
    if dir.exists() && !dir.is_dir() {
        return Err(CliError::Environment(format!(
            "'{}' exists and is not a directory",
            dir.display()
        )));
    }
    let non_empty = std::fs::read_dir(&dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    if non_empty {
        console.warn(&format!("{} is not empty", dir.display()));
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::console::MessageType;
    use ferry_core::TestingConsole;

    fn parse(args: &[&str]) -> Result<MainArguments, CliError> {
        let owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        MainArguments::parse(&owned)
    }

    #[test]
    fn config_only_defaults_to_migrate_default() {
        let args = parse(&["ferry.yaml"]).unwrap();
        assert_eq!(args.subcommand, Subcommand::Migrate);
        assert_eq!(args.config_path, "ferry.yaml");
        assert_eq!(args.workflow_name, "default");
        assert_eq!(args.source_ref, None);
    }

    #[test]
    fn full_migrate_form() {
        let args = parse(&["migrate", "cfg/ferry.yml", "export", "abc123"]).unwrap();
        assert_eq!(args.subcommand, Subcommand::Migrate);
        assert_eq!(args.workflow_name, "export");
        assert_eq!(args.source_ref.as_deref(), Some("abc123"));

        let implicit = parse(&["ferry.yaml", "export", "abc123"]).unwrap();
        assert_eq!(implicit.subcommand, Subcommand::Migrate);
        assert_eq!(implicit.source_ref.as_deref(), Some("abc123"));
    }

    #[test]
    fn invalid_subcommand() {
        let err = parse(&["frobnicate", "ferry.yaml"]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid subcommand 'frobnicate'");
    }

    #[test]
    fn info_and_validate_reject_source_ref() {
        let err = parse(&["info", "ferry.yaml", "default", "HEAD"]).unwrap_err();
        assert_eq!(err.to_string(), "Too many arguments for subcommand 'info'");
        let err = parse(&["validate", "ferry.yaml", "default", "HEAD"]).unwrap_err();
        assert_eq!(err.to_string(), "Too many arguments for subcommand 'validate'");
        assert_eq!(
            parse(&["VALIDATE", "ferry.yaml", "export"]).unwrap().subcommand,
            Subcommand::Validate
        );
    }

    #[test]
    fn argument_count_limits() {
        assert!(parse(&[]).unwrap_err().to_string().contains("at least"));
        assert!(parse(&["migrate", "a.yaml", "b", "c", "d"])
            .unwrap_err()
            .to_string()
            .contains("at most four"));
        assert_eq!(
            parse(&["info"]).unwrap_err().to_string(),
            "Configuration file missing for 'info' subcommand."
        );
    }

    #[test]
    fn config_file_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("ferry.yaml"), "").unwrap();
        let args = parse(&["./sub/../ferry.yaml"]).unwrap();
        assert_eq!(args.config_file(tmp.path()).unwrap(), tmp.path().join("ferry.yaml"));

        let missing = parse(&["other.yaml"]).unwrap();
        assert!(matches!(
            missing.config_file(tmp.path()),
            Err(CliError::CommandLine(m)) if m.contains("not found")
        ));
    }

    #[test]
    fn workdir_is_normalized() {
        let console = TestingConsole::new();
        let dir = base_workdir(
            Some(Path::new("/some/../path/..")),
            Path::new("/"),
            PathBuf::from("/store/default"),
            &console,
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/"));
        assert_eq!(
            base_workdir(None, Path::new("/"), PathBuf::from("/store/default"), &console).unwrap(),
            PathBuf::from("/store/default")
        );
    }

    #[test]
    fn workdir_must_be_a_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("file"), "hello").unwrap();
        let console = TestingConsole::new();
        let err = base_workdir(Some(Path::new("file")), tmp.path(), PathBuf::new(), &console)
            .unwrap_err();
        assert!(err.to_string().contains("exists and is not a directory"), "{err}");

        std::fs::create_dir(tmp.path().join("busy")).unwrap();
        std::fs::write(tmp.path().join("busy/x"), "").unwrap();
        base_workdir(Some(Path::new("busy")), tmp.path(), PathBuf::new(), &console).unwrap();
        assert_eq!(console.texts(MessageType::Warning).len(), 1);
    }
}
