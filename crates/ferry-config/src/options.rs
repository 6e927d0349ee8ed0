use ferry_backends::GitOptions;
use ferry_store::StorePaths;
use ferry_workflow::WorkflowOptions;
use std::path::PathBuf;

/// Options that apply to every migration.
#[derive(Debug, Clone)]
pub struct GeneralOptions {
    pub store: StorePaths,
    /// Directory relative paths in the configuration are resolved against.
    pub cwd: PathBuf,
    /// Overrides the per-workflow work directory in the store.
    pub work_dir: Option<PathBuf>,
    /// Root the configuration file path is taken relative to when the
    /// configuration is read back from the origin.
    pub config_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct FolderOptions {
    /// Output directory for folder destinations, overriding `path`.
    pub folder_dir: Option<PathBuf>,
    pub materialize_outside_symlinks: bool,
}

/// Every command-line knob that shapes how migrations are built.
#[derive(Debug, Clone)]
pub struct Options {
    pub general: GeneralOptions,
    pub workflow: WorkflowOptions,
    pub git: GitOptions,
    pub folder: FolderOptions,
}

impl Options {
    pub fn new(store: StorePaths, cwd: PathBuf) -> Self {
        Self {
            general: GeneralOptions {
                store,
                cwd,
                work_dir: None,
                config_root: None,
            },
            workflow: WorkflowOptions::default(),
            git: GitOptions::default(),
            folder: FolderOptions::default(),
        }
    }

    /// Resolve `path` against the working directory unless absolute.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            self.general.cwd.join(p)
        }
    }
}
