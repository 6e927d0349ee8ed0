//! Thin wrapper over the `git` binary.

use ferry_core::{FerryError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Output of a git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// A repository driven through the git CLI. `work_tree` is optional so a
/// bare cache can be checked out into arbitrary directories.
#[derive(Debug, Clone)]
pub struct GitRepo {
    git_dir: PathBuf,
    work_tree: Option<PathBuf>,
    index_file: Option<PathBuf>,
}

impl GitRepo {
    /// Open (initializing if needed) a bare repository at `path`.
    pub fn init_bare(path: &Path) -> Result<Self> {
        let repo = Self {
            git_dir: path.to_path_buf(),
            work_tree: None,
            index_file: None,
        };
        if !path.join("HEAD").exists() {
            std::fs::create_dir_all(path)?;
            run_git(None, &["init", "--bare", "-q", &path.to_string_lossy()])?;
        }
        Ok(repo)
    }

    /// Initialize a non-bare repository at `path`.
    pub fn init(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        run_git(None, &["init", "-q", &path.to_string_lossy()])?;
        Ok(Self::open(path))
    }

    /// Non-bare repository already present at `path`.
    pub fn open(path: &Path) -> Self {
        Self {
            git_dir: path.join(".git"),
            work_tree: Some(path.to_path_buf()),
            index_file: None,
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn work_tree(&self) -> Option<&Path> {
        self.work_tree.as_deref()
    }

    /// Same repository, different work tree.
    pub fn with_work_tree(&self, work_tree: &Path) -> Self {
        Self {
            work_tree: Some(work_tree.to_path_buf()),
            ..self.clone()
        }
    }

    /// Same repository using a private index file.
    pub fn with_index_file(&self, index_file: &Path) -> Self {
        Self {
            index_file: Some(index_file.to_path_buf()),
            ..self.clone()
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("--git-dir").arg(&self.git_dir);
        if let Some(wt) = &self.work_tree {
            cmd.arg("--work-tree").arg(wt);
        }
        if let Some(index) = &self.index_file {
            cmd.env("GIT_INDEX_FILE", index);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(args);
        cmd
    }

    /// Run git and return its output whatever the exit status.
    pub fn try_command(&self, args: &[&str]) -> Result<GitOutput> {
        debug!(git_dir = %self.git_dir.display(), "git {}", args.join(" "));
        let output = self
            .command(args)
            .output()
            .map_err(|e| FerryError::repo(format!("git not available: {e}")))?;
        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run git, failing with a repository error on a non-zero exit.
    pub fn simple_command(&self, args: &[&str]) -> Result<GitOutput> {
        let out = self.try_command(args)?;
        if !out.success {
            return Err(FerryError::repo(format!(
                "'git {}' failed: {}",
                args.join(" "),
                out.stderr.trim()
            )));
        }
        Ok(out)
    }

    /// Resolve a reference to a full commit sha.
    pub fn rev_parse(&self, reference: &str) -> Result<Option<String>> {
        let spec = format!("{reference}^{{commit}}");
        let out = self.try_command(&["rev-parse", "-q", "--verify", &spec])?;
        Ok(out.success.then(|| out.stdout.trim().to_string()))
    }

    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let out = self.try_command(&["merge-base", "--is-ancestor", ancestor, descendant])?;
        Ok(out.success)
    }

    /// Fetch `refspecs` from `url`. `Ok(false)` when the remote ref is missing.
    pub fn fetch(&self, url: &str, refspecs: &[&str]) -> Result<bool> {
        let mut args = vec!["fetch", "-q", "-f", url];
        args.extend_from_slice(refspecs);
        let out = self.try_command(&args)?;
        if out.success {
            return Ok(true);
        }
        if out.stderr.contains("couldn't find remote ref") {
            return Ok(false);
        }
        Err(FerryError::repo(format!(
            "cannot fetch from '{url}': {}",
            out.stderr.trim()
        )))
    }

    /// Commit timestamp in seconds.
    pub fn commit_time(&self, sha: &str) -> Result<i64> {
        let out = self.simple_command(&["log", "-1", "--format=%ct", sha])?;
        out.stdout
            .trim()
            .parse()
            .map_err(|_| FerryError::repo(format!("cannot read commit time of {sha}")))
    }

    /// Parent shas of `sha`.
    pub fn parents(&self, sha: &str) -> Result<Vec<String>> {
        let out = self.simple_command(&["log", "-1", "--no-color", "--format=%P", sha])?;
        Ok(out.stdout.split_whitespace().map(str::to_string).collect())
    }

    /// Full raw message of `sha`.
    pub fn message(&self, sha: &str) -> Result<String> {
        Ok(self
            .simple_command(&["log", "-1", "--no-color", "--format=%B", sha])?
            .stdout)
    }
}

fn run_git(cwd: Option<&Path>, args: &[&str]) -> Result<()> {
    let mut cmd = Command::new("git");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd
        .args(args)
        .output()
        .map_err(|e| FerryError::repo(format!("git not available: {e}")))?;
    if !output.status.success() {
        return Err(FerryError::repo(format!(
            "'git {}' failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
