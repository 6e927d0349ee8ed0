//! In-memory origin and recording destination for exercising workflows.

use ferry_core::fsutil::{clear_dir, list_files};
use ferry_core::{
    Author, Authoring, Change, ChangesResponse, Console, Destination, DestinationEffect,
    EffectKind, EmptyReason, FerryError, Glob, Origin, Reader, Result, Revision, TransformResult,
    VisitResult, Writer, WriterContext, WriterResult, WriterState,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const DUMMY_ORIGIN_REV_ID: &str = "DummyOrigin-RevId";
const BASE_TIMESTAMP: i64 = 1_600_000_000;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── DummyOrigin ──

#[derive(Debug, Clone)]
struct DummyCommit {
    id: String,
    author: Author,
    message: String,
    timestamp: i64,
    /// Full tree after the commit.
    tree: BTreeMap<String, String>,
    /// Paths added, modified or deleted by the commit.
    touched: Vec<String>,
}

/// Linear in-memory history. Revision ids are `1`, `2`, ... in commit
/// order. Clones share the same history.
#[derive(Debug, Clone)]
pub struct DummyOrigin {
    commits: Arc<Mutex<Vec<DummyCommit>>>,
    default_author: Author,
}

impl Default for DummyOrigin {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyOrigin {
    pub fn new() -> Self {
        Self {
            commits: Arc::default(),
            default_author: Author::new("Dummy Author", "dummy@example.com"),
        }
    }

    /// Commit `files` on top of the current tree. Returns the revision id.
    pub fn add_commit(&self, message: &str, files: &[(&str, &str)]) -> String {
        self.add_commit_by(self.default_author.clone(), message, files, &[])
    }

    /// Commit writing `files` and deleting `deleted`, authored by `author`.
    pub fn add_commit_by(
        &self,
        author: Author,
        message: &str,
        files: &[(&str, &str)],
        deleted: &[&str],
    ) -> String {
        let mut commits = lock(&self.commits);
        let mut tree = commits.last().map(|c| c.tree.clone()).unwrap_or_default();
        let mut touched = Vec::new();
        for (path, content) in files {
            if tree.insert(path.to_string(), content.to_string()).as_deref() != Some(*content) {
                touched.push(path.to_string());
            }
        }
        for path in deleted {
            if tree.remove(*path).is_some() {
                touched.push(path.to_string());
            }
        }
        touched.sort();
        let id = (commits.len() + 1).to_string();
        let timestamp = BASE_TIMESTAMP + commits.len() as i64 * 60;
        commits.push(DummyCommit {
            id: id.clone(),
            author,
            message: message.to_string(),
            timestamp,
            tree,
            touched,
        });
        id
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        lock(&self.commits).iter().position(|c| c.id == id)
    }

    fn revision(commit: &DummyCommit) -> Revision {
        Revision::new(&commit.id).with_timestamp(commit.timestamp)
    }
}

impl Origin for DummyOrigin {
    fn resolve(&self, reference: Option<&str>) -> Result<Revision> {
        let commits = lock(&self.commits);
        let commit = match reference {
            None | Some("HEAD") => commits.last(),
            Some(r) => commits.iter().find(|c| c.id == r),
        };
        let commit = commit.ok_or_else(|| {
            FerryError::CannotResolveRevision(format!(
                "Cannot find '{}' in the dummy origin",
                reference.unwrap_or("HEAD")
            ))
        })?;
        let rev = Self::revision(commit);
        Ok(match reference {
            Some(r) => rev.with_context_ref(r),
            None => rev,
        })
    }

    fn new_reader(&self, origin_files: &Glob, authoring: &Authoring) -> Result<Box<dyn Reader>> {
        Ok(Box::new(DummyReader {
            origin: self.clone(),
            files: origin_files.clone(),
            authoring: authoring.clone(),
        }))
    }

    fn label_name(&self) -> &str {
        DUMMY_ORIGIN_REV_ID
    }

    fn describe(&self) -> String {
        "dummy.origin".to_string()
    }
}

struct DummyReader {
    origin: DummyOrigin,
    files: Glob,
    authoring: Authoring,
}

impl DummyReader {
    fn to_change(&self, commit: &DummyCommit) -> Option<Change> {
        let files: Vec<&String> = commit.touched.iter().filter(|p| self.files.matches(p)).collect();
        if files.is_empty() {
            return None;
        }
        Some(
            Change::new(
                DummyOrigin::revision(commit),
                self.authoring.resolve(&commit.author),
                commit.message.clone(),
                commit.timestamp,
            )
            .with_files(files),
        )
    }

    fn position(&self, rev: &Revision) -> Result<usize> {
        self.origin.index_of(rev.as_str()).ok_or_else(|| {
            FerryError::CannotResolveRevision(format!("Unknown dummy revision '{rev}'"))
        })
    }
}

impl Reader for DummyReader {
    fn checkout(&self, revision: &Revision, workdir: &Path) -> Result<()> {
        let idx = self.position(revision)?;
        let tree = lock(&self.origin.commits)[idx].tree.clone();
        clear_dir(workdir)?;
        for (path, content) in tree.iter().filter(|(p, _)| self.files.matches(p)) {
            let dest = workdir.join(path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(dest, content)?;
        }
        Ok(())
    }

    fn changes(&self, from: Option<&Revision>, to: &Revision) -> Result<ChangesResponse> {
        let to_idx = self.position(to)?;
        let start = match from {
            None => 0,
            Some(from) => match self.origin.index_of(from.as_str()) {
                None => return Ok(ChangesResponse::Empty(EmptyReason::UnrelatedRevisions)),
                Some(f) if f >= to_idx => {
                    return Ok(ChangesResponse::Empty(EmptyReason::ToIsAncestor))
                }
                Some(f) => f + 1,
            },
        };
        let commits = lock(&self.origin.commits);
        let changes = commits[start..=to_idx]
            .iter()
            .filter_map(|c| self.to_change(c))
            .collect();
        Ok(ChangesResponse::for_changes(changes))
    }

    fn change(&self, revision: &Revision) -> Result<Change> {
        let idx = self.position(revision)?;
        let commit = lock(&self.origin.commits)[idx].clone();
        self.to_change(&commit).ok_or_else(|| {
            FerryError::empty_change(format!(
                "'{revision}' revision didn't affect the origin paths."
            ))
        })
    }

    fn visit_changes(
        &self,
        start: &Revision,
        visitor: &mut dyn FnMut(&Change) -> VisitResult,
    ) -> Result<()> {
        let idx = self.position(start)?;
        let commits: Vec<DummyCommit> = lock(&self.origin.commits)[..=idx].to_vec();
        for commit in commits.iter().rev() {
            if let Some(change) = self.to_change(commit) {
                if visitor(&change) == VisitResult::Terminate {
                    break;
                }
            }
        }
        Ok(())
    }
}

// ── RecordingDestination ──

/// One call to a recording writer.
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub origin_ref: Revision,
    pub label_name: String,
    pub author: Author,
    pub summary: String,
    pub timestamp: i64,
    pub baseline: Option<String>,
    pub files: BTreeMap<String, String>,
    pub dry_run: bool,
}

/// Destination that keeps every write in memory. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingDestination {
    writes: Arc<Mutex<Vec<RecordedWrite>>>,
    allow_empty_diff: bool,
}

impl RecordingDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allow_empty_diff(mut self, allow: bool) -> Self {
        self.allow_empty_diff = allow;
        self
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock(&self.writes).clone()
    }

    fn last_committed(&self) -> Option<RecordedWrite> {
        lock(&self.writes).iter().rev().find(|w| !w.dry_run).cloned()
    }
}

impl Destination for RecordingDestination {
    fn new_writer(&self, ctx: WriterContext) -> Result<Box<dyn Writer>> {
        Ok(Box::new(RecordingWriter {
            destination: self.clone(),
            dry_run: ctx.dry_run,
            state: ctx.previous_state.unwrap_or_default(),
        }))
    }

    fn previous_ref(&self, label_name: &str) -> Result<Option<String>> {
        Ok(lock(&self.writes)
            .iter()
            .rev()
            .filter(|w| !w.dry_run)
            .find(|w| w.label_name == label_name)
            .map(|w| w.origin_ref.as_str().to_string()))
    }

    fn label_name_when_origin(&self) -> &str {
        DUMMY_ORIGIN_REV_ID
    }

    fn describe(&self) -> String {
        "recording.destination".to_string()
    }
}

struct RecordingWriter {
    destination: RecordingDestination,
    dry_run: bool,
    state: WriterState,
}

impl Writer for RecordingWriter {
    fn write(&mut self, result: &TransformResult, console: &dyn Console) -> Result<WriterResult> {
        self.state.check_not_written(&result.origin_ref)?;
        let mut files = BTreeMap::new();
        for rel in list_files(&result.path, &result.destination_files, &[])? {
            let content = fs::read(result.path.join(&rel))?;
            files.insert(rel, String::from_utf8_lossy(&content).into_owned());
        }

        let previous = self.destination.last_committed();
        if previous.as_ref().map(|w| &w.files) == Some(&files) && !self.destination.allow_empty_diff
        {
            return Err(FerryError::empty_change(
                "Migration of the revision resulted in an empty change",
            ));
        }
        if result.ask_for_confirmation && !console.prompt_confirmation("Proceed with the write?")? {
            return Err(FerryError::ChangeRejected(
                "User aborted execution: did not confirm diff changes.".into(),
            ));
        }

        lock(&self.destination.writes).push(RecordedWrite {
            origin_ref: result.origin_ref.clone(),
            label_name: result.label_name.clone(),
            author: result.author.clone(),
            summary: result.summary.clone(),
            timestamp: result.timestamp,
            baseline: result.baseline.clone(),
            files,
            dry_run: self.dry_run,
        });
        self.state.record(&result.origin_ref);
        let kind = if previous.is_some() {
            EffectKind::Updated
        } else {
            EffectKind::Created
        };
        Ok(WriterResult::with_effect(DestinationEffect::new(
            kind,
            format!("Recorded {}", result.origin_ref),
            &result.origin_ref,
        )))
    }

    fn state(&self) -> WriterState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(origin: &DummyOrigin, include: &[&str]) -> Box<dyn Reader> {
        let authoring = Authoring::pass_thru(Author::new("Default", "default@example.com"));
        origin
            .new_reader(&Glob::new(include.iter().copied(), None).unwrap(), &authoring)
            .unwrap()
    }

    #[test]
    fn changes_between_revisions() {
        let origin = DummyOrigin::new();
        origin.add_commit("one", &[("a", "1")]);
        origin.add_commit("two", &[("b", "2")]);
        origin.add_commit("three", &[("a", "3")]);
        let r = reader(&origin, &["**"]);
        let head = origin.resolve(None).unwrap();
        assert_eq!(head.as_str(), "3");

        let ChangesResponse::Changes(all) = r.changes(None, &head).unwrap() else {
            panic!("expected changes");
        };
        let messages: Vec<_> = all.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, ["one", "two", "three"]);

        let only_a = reader(&origin, &["a"]);
        let from = Revision::new("1");
        let ChangesResponse::Changes(since) = only_a.changes(Some(&from), &head).unwrap() else {
            panic!("expected changes");
        };
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].revision.as_str(), "3");

        assert_eq!(
            r.changes(Some(&head), &head).unwrap().empty_reason(),
            Some(EmptyReason::ToIsAncestor)
        );
        assert_eq!(
            r.changes(Some(&Revision::new("zzz")), &head).unwrap().empty_reason(),
            Some(EmptyReason::UnrelatedRevisions)
        );
        assert!(only_a.change(&Revision::new("2")).unwrap_err().is_empty_change());
    }

    #[test]
    fn checkout_writes_full_tree() {
        let origin = DummyOrigin::new();
        origin.add_commit("one", &[("a", "1"), ("dir/b", "2")]);
        origin.add_commit_by(Author::new("X", "x@x"), "two", &[], &["a"]);
        let tmp = tempfile::tempdir().unwrap();
        reader(&origin, &["**"])
            .checkout(&Revision::new("2"), tmp.path())
            .unwrap();
        assert!(!tmp.path().join("a").exists());
        assert_eq!(fs::read_to_string(tmp.path().join("dir/b")).unwrap(), "2");
    }

    #[test]
    fn recording_destination_tracks_previous_ref() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("f"), "x").unwrap();
        let dest = RecordingDestination::new();
        let ctx = WriterContext {
            workflow_name: "default".into(),
            destination_files: Glob::all_files(),
            dry_run: false,
            previous_state: None,
        };
        let result = TransformResult::new(
            tmp.path().to_path_buf(),
            Revision::new("7"),
            DUMMY_ORIGIN_REV_ID,
            Author::new("A", "a@x"),
            "summary",
            Glob::all_files(),
        );
        let console = ferry_core::TestingConsole::new();
        dest.new_writer(ctx.clone())
            .unwrap()
            .write(&result, &console)
            .unwrap();
        assert_eq!(dest.previous_ref(DUMMY_ORIGIN_REV_ID).unwrap().as_deref(), Some("7"));
        assert_eq!(dest.writes()[0].files["f"], "x");

        let err = dest
            .new_writer(ctx)
            .unwrap()
            .write(&result, &console)
            .unwrap_err();
        assert!(err.is_empty_change());
    }
}
