use super::repository::GitRepo;
use ferry_core::fsutil::{clear_dir, retain_matching};
use ferry_core::{
    Author, Authoring, Change, ChangesResponse, EmptyReason, FerryError, Glob, Origin, Reader,
    Result, Revision, VisitResult,
};
use ferry_store::StorePaths;
use std::path::{Path, PathBuf};
use tracing::info;

/// Label recording the git origin revision a destination change came from.
pub const GIT_ORIGIN_REV_ID: &str = "GitOrigin-RevId";

const VISIT_PAGE_SIZE: usize = 200;
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%an%x1f%ae%x1f%ct%x1f%P%x1f%B%x1f";

/// Reads changes from a git repository through a cached bare clone.
#[derive(Debug, Clone)]
pub struct GitOrigin {
    url: String,
    reference: Option<String>,
    cache_dir: PathBuf,
    cache_lock: PathBuf,
    first_parent: bool,
}

impl GitOrigin {
    pub fn new(url: impl Into<String>, reference: Option<String>, store: &StorePaths) -> Self {
        let url = url.into();
        Self {
            cache_dir: store.repo_cache(&url),
            cache_lock: store.repo_cache_lock(&url),
            url,
            reference,
            first_parent: true,
        }
    }

    pub fn with_first_parent(mut self, first_parent: bool) -> Self {
        self.first_parent = first_parent;
        self
    }

    /// Update the cache with every branch and tag of the remote.
    fn fetch_all(&self) -> Result<GitRepo> {
        let _guard = ferry_store::lock_file(&self.cache_lock)
            .map_err(|e| FerryError::repo(format!("cannot lock git cache: {e:#}")))?;
        let repo = GitRepo::init_bare(&self.cache_dir)?;
        info!(url = %self.url, "fetching git origin");
        repo.fetch(
            &self.url,
            &["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"],
        )?;
        Ok(repo)
    }
}

impl Origin for GitOrigin {
    fn resolve(&self, reference: Option<&str>) -> Result<Revision> {
        let reference = reference.or(self.reference.as_deref()).ok_or_else(|| {
            FerryError::CannotResolveRevision(format!(
                "No reference was passed as a command line argument for {} and no default \
                 reference was configured in the config file",
                self.url
            ))
        })?;
        let repo = self.fetch_all()?;
        let sha = repo.rev_parse(reference)?.ok_or_else(|| {
            FerryError::CannotResolveRevision(format!(
                "Cannot find reference '{reference}' in '{}'",
                self.url
            ))
        })?;
        let timestamp = repo.commit_time(&sha)?;
        Ok(Revision::new(sha)
            .with_context_ref(reference)
            .with_timestamp(timestamp))
    }

    fn new_reader(&self, origin_files: &Glob, authoring: &Authoring) -> Result<Box<dyn Reader>> {
        Ok(Box::new(GitReader {
            repo: GitRepo::init_bare(&self.cache_dir)?,
            origin_files: origin_files.clone(),
            authoring: authoring.clone(),
            first_parent: self.first_parent,
        }))
    }

    fn label_name(&self) -> &str {
        GIT_ORIGIN_REV_ID
    }

    fn describe(&self) -> String {
        match &self.reference {
            Some(r) => format!("git.origin(url = {}, ref = {r})", self.url),
            None => format!("git.origin(url = {})", self.url),
        }
    }
}

struct GitReader {
    repo: GitRepo,
    origin_files: Glob,
    authoring: Authoring,
    first_parent: bool,
}

struct LogPage {
    changes: Vec<Change>,
    raw_count: usize,
}

impl GitReader {
    /// Newest-first changes for `revs`, filtered to the origin files.
    fn log(&self, revs: &[&str], use_pathspec: bool) -> Result<LogPage> {
        let mut args = vec!["log", "--no-color", LOG_FORMAT, "--name-only", "--no-renames"];
        if self.first_parent {
            args.extend(["--first-parent", "-m"]);
        }
        args.extend_from_slice(revs);
        let roots = self.origin_files.roots();
        if use_pathspec && !roots.contains("") {
            args.push("--");
            args.extend(roots.iter().map(String::as_str));
        }
        let out = self.repo.simple_command(&args)?;
        let mut changes = Vec::new();
        let mut raw_count = 0;
        for record in out.stdout.split('\x1e').skip(1) {
            raw_count += 1;
            if let Some(change) = self.parse_record(record)? {
                changes.push(change);
            }
        }
        Ok(LogPage { changes, raw_count })
    }

    fn parse_record(&self, record: &str) -> Result<Option<Change>> {
        let fields: Vec<&str> = record.splitn(7, '\x1f').collect();
        let [sha, name, email, ct, parents, body, files] = fields[..] else {
            return Err(FerryError::repo(format!("unexpected git log output: {record:?}")));
        };
        let files: Vec<&str> = files
            .lines()
            .map(str::trim)
            .filter(|f| !f.is_empty() && self.origin_files.matches(f))
            .collect();
        if files.is_empty() {
            return Ok(None);
        }
        let timestamp: i64 = ct
            .parse()
            .map_err(|_| FerryError::repo(format!("bad commit time '{ct}' for {sha}")))?;
        let author = self.authoring.resolve(&Author::new(name, email));
        let mut change = Change::new(
            Revision::new(sha).with_timestamp(timestamp),
            author,
            body,
            timestamp,
        )
        .with_files(files);
        change.merge = parents.split_whitespace().count() > 1;
        Ok(Some(change))
    }
}

impl Reader for GitReader {
    fn checkout(&self, revision: &Revision, workdir: &Path) -> Result<()> {
        clear_dir(workdir)?;
        let index_dir = tempfile::tempdir()?;
        self.repo
            .with_work_tree(workdir)
            .with_index_file(&index_dir.path().join("index"))
            .simple_command(&["checkout", "-q", "-f", revision.as_str(), "--", "."])?;
        retain_matching(workdir, &self.origin_files)?;
        Ok(())
    }

    fn changes(&self, from: Option<&Revision>, to: &Revision) -> Result<ChangesResponse> {
        let range = match from {
            Some(from) => format!("{}..{}", from.as_str(), to.as_str()),
            None => to.as_str().to_string(),
        };
        let mut page = self.log(&[&range], true)?;
        if !page.changes.is_empty() {
            page.changes.reverse();
            return Ok(ChangesResponse::Changes(page.changes));
        }
        let Some(from) = from else {
            return Ok(ChangesResponse::Empty(EmptyReason::NoChanges));
        };
        if from.as_str() == to.as_str() || self.repo.is_ancestor(to.as_str(), from.as_str())? {
            return Ok(ChangesResponse::Empty(EmptyReason::ToIsAncestor));
        }
        if self.repo.is_ancestor(from.as_str(), to.as_str())? {
            return Ok(ChangesResponse::Empty(EmptyReason::NoChanges));
        }
        Ok(ChangesResponse::Empty(EmptyReason::UnrelatedRevisions))
    }

    fn change(&self, revision: &Revision) -> Result<Change> {
        let page = self.log(&["-1", revision.as_str()], false)?;
        let Some(found) = page.changes.into_iter().next() else {
            return Err(FerryError::empty_change(format!(
                "'{revision}' revision cannot be found in the origin or it didn't affect the \
                 origin paths."
            )));
        };
        Ok(Change {
            revision: revision.clone(),
            ..found
        })
    }

    fn visit_changes(
        &self,
        start: &Revision,
        visitor: &mut dyn FnMut(&Change) -> VisitResult,
    ) -> Result<()> {
        let page_size = VISIT_PAGE_SIZE.to_string();
        let mut skip = 0usize;
        loop {
            let skip_arg = format!("--skip={skip}");
            let page = self.log(&["-n", &page_size, &skip_arg, start.as_str()], true)?;
            for change in &page.changes {
                if visitor(change) == VisitResult::Terminate {
                    return Ok(());
                }
            }
            if page.raw_count < VISIT_PAGE_SIZE {
                return Ok(());
            }
            skip += VISIT_PAGE_SIZE;
        }
    }
}
