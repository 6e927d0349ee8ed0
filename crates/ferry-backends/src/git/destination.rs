use super::origin::GIT_ORIGIN_REV_ID;
use super::repository::GitRepo;
use super::GitOptions;
use ferry_core::fsutil::{clear_dir, copy_tree, delete_matching};
use ferry_core::{
    ChangeMessage, Console, Destination, DestinationEffect, EffectKind, FerryError, Result,
    TransformResult, Writer, WriterContext, WriterResult, WriterState,
};
use std::path::PathBuf;
use tracing::info;

const FIRST_COMMIT_FLAG: &str = "--git-first-commit";

/// Commits to a branch of a git repository and pushes the result.
#[derive(Debug, Clone)]
pub struct GitDestination {
    url: String,
    fetch: String,
    push: String,
    scratch_root: PathBuf,
    options: GitOptions,
    allow_empty_diff: bool,
}

impl GitDestination {
    /// `scratch_root` holds the local clone commits are prepared in.
    pub fn new(
        url: impl Into<String>,
        fetch: impl Into<String>,
        push: impl Into<String>,
        scratch_root: PathBuf,
        options: GitOptions,
    ) -> Self {
        Self {
            url: url.into(),
            fetch: fetch.into(),
            push: push.into(),
            scratch_root,
            options,
            allow_empty_diff: false,
        }
    }

    pub fn with_allow_empty_diff(mut self, allow: bool) -> Self {
        self.allow_empty_diff = allow;
        self
    }

    fn missing_fetch_ref(&self) -> FerryError {
        FerryError::repo(format!(
            "'{}' doesn't exist in '{}'. Use {FIRST_COMMIT_FLAG} flag if you want to push anyway",
            self.fetch, self.url
        ))
    }

    /// Fresh local clone positioned at `baseline` or the fetched ref.
    fn init_scratch(&self, baseline: Option<&str>, console: &dyn Console) -> Result<GitRepo> {
        let dir = self.scratch_root.join("git-destination");
        clear_dir(&dir)?;
        let repo = GitRepo::init(&dir)?;

        console.progress(&format!("Git Destination: Fetching {}", self.url));
        let found = repo.fetch(&self.url, &[&self.fetch])?;
        if self.options.first_commit {
            if found {
                return Err(FerryError::repo(format!(
                    "'{}' already exists in '{}'.",
                    self.fetch, self.url
                )));
            }
            if let Some(baseline) = baseline {
                return Err(FerryError::repo(format!(
                    "Cannot use {FIRST_COMMIT_FLAG} and a previous baseline ({baseline}). \
                     Migrate some code to {} first.",
                    self.url
                )));
            }
        } else {
            if !found {
                return Err(self.missing_fetch_ref());
            }
            console.progress(&format!("Git Destination: Checking out {}", self.fetch));
            repo.simple_command(&["checkout", "-q", baseline.unwrap_or("FETCH_HEAD")])?;
        }

        if let Some(name) = self.options.committer_name.as_deref().filter(|s| !s.is_empty()) {
            repo.simple_command(&["config", "user.name", name])?;
        }
        if let Some(email) = self.options.committer_email.as_deref().filter(|s| !s.is_empty()) {
            repo.simple_command(&["config", "user.email", email])?;
        }
        verify_user_info(&repo)?;
        Ok(repo)
    }
}

fn verify_user_info(repo: &GitRepo) -> Result<()> {
    let out = repo.simple_command(&["config", "-l"])?;
    let name = out.stdout.lines().any(|l| l.starts_with("user.name="));
    let email = out.stdout.lines().any(|l| l.starts_with("user.email="));
    if !name || !email {
        return Err(FerryError::repo(
            "'user.name' and/or 'user.email' are not configured. Please run \
             `git config --global SETTING VALUE` to set them",
        ));
    }
    Ok(())
}

impl Destination for GitDestination {
    fn new_writer(&self, ctx: WriterContext) -> Result<Box<dyn Writer>> {
        let state = ctx.previous_state.clone().unwrap_or_default();
        let scratch = state
            .scratch
            .as_ref()
            .filter(|p| p.join(".git").is_dir())
            .map(|p| GitRepo::open(p));
        Ok(Box::new(GitWriter {
            destination: self.clone(),
            dry_run: ctx.dry_run,
            state,
            scratch,
        }))
    }

    fn previous_ref(&self, label_name: &str) -> Result<Option<String>> {
        if self.options.first_commit {
            return Ok(None);
        }
        let tmp = tempfile::tempdir()?;
        let repo = GitRepo::init(tmp.path())?;
        if !repo.fetch(&self.url, &[&self.fetch])? {
            return Err(self.missing_fetch_ref());
        }
        let mut commit = repo.rev_parse("FETCH_HEAD")?.unwrap_or_default();
        while !commit.is_empty() {
            let message = repo.message(&commit)?;
            if let Some(value) = ChangeMessage::parse_all_as_labels(&message)
                .label_values(label_name)
                .pop()
            {
                return Ok(Some(value));
            }
            let mut parents = repo.parents(&commit)?;
            if parents.len() > 1 {
                return Err(FerryError::repo(format!(
                    "Found commit with multiple parents (merge commit) when looking for \
                     {label_name}. Please invoke ferry with the --last-rev flag."
                )));
            }
            commit = parents.pop().unwrap_or_default();
        }
        Ok(None)
    }

    fn label_name_when_origin(&self) -> &str {
        GIT_ORIGIN_REV_ID
    }

    fn describe(&self) -> String {
        format!(
            "git.destination(url = {}, fetch = {}, push = {})",
            self.url, self.fetch, self.push
        )
    }
}

struct GitWriter {
    destination: GitDestination,
    dry_run: bool,
    state: WriterState,
    scratch: Option<GitRepo>,
}

impl Writer for GitWriter {
    fn write(&mut self, result: &TransformResult, console: &dyn Console) -> Result<WriterResult> {
        self.state.check_not_written(&result.origin_ref)?;
        let dest = &self.destination;
        info!(path = %result.path.display(), url = %dest.url, "exporting to git destination");

        let repo = match &self.scratch {
            Some(repo) => repo.clone(),
            None => {
                let repo = dest.init_scratch(result.baseline.as_deref(), console)?;
                self.state.scratch = repo.work_tree().map(|p| p.to_path_buf());
                self.scratch = Some(repo.clone());
                repo
            }
        };
        let Some(work_tree) = repo.work_tree() else {
            return Err(FerryError::repo("scratch clone has no work tree"));
        };

        console.progress("Git Destination: Adding files for push");
        delete_matching(work_tree, &result.destination_files, &[".git"])?;
        copy_tree(&result.path, work_tree, &result.destination_files)?;
        repo.simple_command(&["add", "--all"])?;

        let empty = repo.try_command(&["diff", "--cached", "--quiet"])?.success;
        if empty && !dest.allow_empty_diff {
            return Err(FerryError::empty_change(
                "Migration of the revision resulted in an empty change. \
                 Is the change already migrated?",
            ));
        }

        if result.ask_for_confirmation && !self.dry_run {
            let diff = repo.simple_command(&["diff", "--staged"])?;
            console.info(&diff.stdout);
            let question = format!("Proceed with push to {} {}?", dest.url, dest.push);
            if !console.prompt_confirmation(&question)? {
                console.warn("Migration aborted by user.");
                return Err(FerryError::ChangeRejected(
                    "User aborted execution: did not confirm diff changes.".into(),
                ));
            }
        }

        let message = ChangeMessage::parse(&result.summary)
            .with_new_or_replaced_label(&result.label_name, ": ", result.origin_ref.as_str())
            .to_string();
        let author = result.author.to_string();
        let date = format!("{} +0000", result.timestamp);
        let mut commit = vec!["commit", "-q", "--author", &author, "--date", &date, "-m", &message];
        if empty {
            commit.push("--allow-empty");
        }
        repo.simple_command(&commit)?;

        if result.baseline.is_some() {
            repo.simple_command(&["rebase", "-q", "FETCH_HEAD"])?;
        }

        let refspec = if dest.push.starts_with("refs/") {
            format!("HEAD:{}", dest.push)
        } else {
            format!("HEAD:refs/heads/{}", dest.push)
        };
        if self.dry_run {
            console.info(&format!(
                "Git Destination: dry run, not pushing to {} {}",
                dest.url, dest.push
            ));
        } else {
            console.progress(&format!("Git Destination: Pushing to {} {}", dest.url, dest.push));
            repo.simple_command(&["push", "-q", &dest.url, &refspec])?;
        }

        let sha = repo.rev_parse("HEAD")?.unwrap_or_default();
        self.state.record(&result.origin_ref);
        Ok(WriterResult::with_effect(
            DestinationEffect::new(
                EffectKind::Created,
                format!("Created revision {sha}"),
                &result.origin_ref,
            )
            .with_destination_ref(sha),
        ))
    }

    fn state(&self) -> WriterState {
        self.state.clone()
    }
}
