use std::path::{Path, PathBuf};

/// Well-known paths under the per-user store.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub root: PathBuf,
    pub repos_dir: PathBuf,
    pub workdirs_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub locks_dir: PathBuf,
}

impl StorePaths {
    /// Derive all paths from a store root. Pure computation, no I/O.
    pub fn discover(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            repos_dir: root.join("repos"),
            workdirs_dir: root.join("workdirs"),
            runs_dir: root.join("runs"),
            locks_dir: root.join("locks"),
            root,
        }
    }

    /// Paths under the default per-user store root.
    pub fn user() -> Self {
        Self::discover(crate::store_root())
    }

    /// Create all required directories. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        for dir in [
            &self.repos_dir,
            &self.workdirs_dir,
            &self.runs_dir,
            &self.locks_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Cached clone of a remote repository.
    pub fn repo_cache(&self, url: &str) -> PathBuf {
        self.repos_dir.join(crate::store_id(url))
    }

    /// Lock serializing fetches into a cached clone.
    pub fn repo_cache_lock(&self, url: &str) -> PathBuf {
        self.locks_dir
            .join(format!("repo-{}.lock", crate::store_id(url)))
    }

    /// Scratch directory for one workflow of one config file.
    pub fn workdir(&self, config: &Path, workflow: &str) -> PathBuf {
        self.workdirs_dir.join(run_key(config, workflow))
    }

    /// Event log and status files for one workflow of one config file.
    /// Long-lived scratch space for a workflow's destination, kept across runs.
    pub fn scratch_dir(&self, config: &Path, workflow: &str) -> PathBuf {
        self.workdirs_dir
            .join(format!("{}.scratch", run_key(config, workflow)))
    }

    pub fn run_dir(&self, config: &Path, workflow: &str) -> PathBuf {
        self.runs_dir.join(run_key(config, workflow))
    }

    /// Lock guarding writes to one destination.
    pub fn destination_lock(&self, destination: &str) -> PathBuf {
        self.locks_dir
            .join(format!("dest-{}.lock", crate::store_id(destination)))
    }
}

fn run_key(config: &Path, workflow: &str) -> String {
    format!("{}-{}", crate::path_id(config), sanitize(workflow))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
