//! Per-unit context threaded through the transformation pipeline.
//!
//! [`TransformWork`] is an immutable value: every step receives one and
//! returns a new one. The checkout, the changes being migrated and the
//! resolved revision are borrowed from the run and fixed at creation; the
//! metadata and the tree state are the only parts that move forward.

use crate::transformation::Transformation;
use crate::treestate::TreeState;
use ferry_core::{Author, Change, ChangeMessage, Console, FerryError, Glob, Result, Revision};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub const CONTEXT_REFERENCE_LABEL: &str = "FERRY_CONTEXT_REFERENCE";
pub const LAST_REV_LABEL: &str = "FERRY_LAST_REV";
pub const CURRENT_REV_LABEL: &str = "FERRY_CURRENT_REV";
pub const CURRENT_MESSAGE_LABEL: &str = "FERRY_CURRENT_MESSAGE";
pub const AUTHOR_LABEL: &str = "FERRY_AUTHOR";
pub const CURRENT_MESSAGE_TITLE_LABEL: &str = "FERRY_CURRENT_MESSAGE_TITLE";

/// Message, author and labels that travel with the migrated change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub message: String,
    pub author: Author,
    /// Labels kept internally, never rendered into the message.
    pub hidden_labels: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new(message: impl Into<String>, author: Author) -> Self {
        Self {
            message: message.into(),
            author,
            hidden_labels: BTreeMap::new(),
        }
    }
}

/// Something `TransformWork::run` can execute.
pub enum Runnable<'r> {
    /// List the checkout files a glob selects.
    Glob(&'r Glob),
    /// Run a nested transformation.
    Transform(&'r dyn Transformation),
}

#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Files(Vec<String>),
    /// `changed` is false when the nested transformation left the tree as
    /// it found it.
    Transformed { changed: bool },
}

#[derive(Debug, Clone)]
pub struct TransformWork<'a> {
    checkout_dir: &'a Path,
    changes: &'a [Change],
    resolved: &'a Revision,
    metadata: Metadata,
    tree_state: TreeState,
    last_rev: Option<Revision>,
    current_rev: Option<Revision>,
    ignore_noop: bool,
}

impl<'a> TransformWork<'a> {
    pub fn new(
        checkout_dir: &'a Path,
        metadata: Metadata,
        changes: &'a [Change],
        resolved: &'a Revision,
        ignore_noop: bool,
    ) -> Self {
        Self {
            checkout_dir,
            changes,
            resolved,
            metadata,
            tree_state: TreeState::new(checkout_dir),
            last_rev: None,
            current_rev: None,
            ignore_noop,
        }
    }

    // ── Accessors ──

    pub fn checkout_dir(&self) -> &'a Path {
        self.checkout_dir
    }

    pub fn message(&self) -> &str {
        &self.metadata.message
    }

    pub fn author(&self) -> &Author {
        &self.metadata.author
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn into_metadata(self) -> Metadata {
        self.metadata
    }

    pub fn changes(&self) -> &'a [Change] {
        self.changes
    }

    pub fn resolved_reference(&self) -> &'a Revision {
        self.resolved
    }

    pub fn last_rev(&self) -> Option<&Revision> {
        self.last_rev.as_ref()
    }

    pub fn current_rev(&self) -> Option<&Revision> {
        self.current_rev.as_ref()
    }

    pub fn tree_state(&self) -> &TreeState {
        &self.tree_state
    }

    pub fn ignore_noop(&self) -> bool {
        self.ignore_noop
    }

    // ── Derived contexts ──

    pub fn with_last_rev(mut self, last_rev: Option<Revision>) -> Self {
        self.last_rev = last_rev;
        self
    }

    pub fn with_current_rev(mut self, current_rev: Revision) -> Self {
        self.current_rev = Some(current_rev);
        self
    }

    /// Same context with a fresh, not yet computed tree state.
    pub fn with_updated_tree_state(mut self) -> Self {
        self.tree_state = self.tree_state.rebuild();
        self
    }

    // ── Metadata edits ──

    pub fn set_message(mut self, message: impl Into<String>) -> Self {
        self.metadata.message = message.into();
        self
    }

    pub fn set_author(mut self, author: Author) -> Self {
        self.metadata.author = author;
        self
    }

    /// Append a label to the message, or keep it internally when `hidden`.
    pub fn add_label(mut self, name: &str, value: &str, separator: &str, hidden: bool) -> Self {
        if hidden {
            self.metadata
                .hidden_labels
                .entry(name.to_string())
                .or_default()
                .push(value.to_string());
            return self;
        }
        let msg = ChangeMessage::parse(self.message()).with_label(name, separator, value);
        self.set_message(msg.to_string())
    }

    pub fn add_or_replace_label(self, name: &str, value: &str, separator: &str) -> Self {
        let msg =
            ChangeMessage::parse(self.message()).with_new_or_replaced_label(name, separator, value);
        self.set_message(msg.to_string())
    }

    /// Replace a label if present. `whole_message` also looks outside the
    /// trailing label block.
    pub fn replace_label(self, name: &str, value: &str, separator: &str, whole_message: bool) -> Self {
        if whole_message {
            let message = replace_label_lines(self.message(), name, |_| {
                Some(format!("{name}{separator}{value}"))
            });
            return self.set_message(message);
        }
        let msg = ChangeMessage::parse(self.message()).with_replaced_label(name, separator, value);
        self.set_message(msg.to_string())
    }

    pub fn remove_label(self, name: &str, whole_message: bool) -> Self {
        if whole_message {
            let message = replace_label_lines(self.message(), name, |_| None);
            return self.set_message(message);
        }
        let msg = ChangeMessage::parse(self.message()).with_removed_label_by_name(name);
        self.set_message(msg.to_string())
    }

    pub fn remove_label_with_value(self, name: &str, value: &str) -> Self {
        let msg =
            ChangeMessage::parse(self.message()).with_removed_label_by_name_and_value(name, value);
        self.set_message(msg.to_string())
    }

    /// Insert text at the end of the description, above the label block.
    pub fn add_text_before_labels(self, text: &str) -> Self {
        let msg = ChangeMessage::parse(self.message());
        let new_text = format!("{}\n{text}", msg.text());
        let msg = msg.with_text(new_text);
        self.set_message(msg.to_string())
    }

    // ── Label lookup ──

    /// Last value of `name`, searching core labels, the message, hidden
    /// labels, the changes being migrated and the resolved revision, in
    /// that order. The first source with a value wins.
    pub fn find_label(&self, name: &str) -> Option<String> {
        self.find_label_values(name, false).pop()
    }

    /// Every value of `name` across all sources.
    pub fn find_all_labels(&self, name: &str) -> Vec<String> {
        self.find_label_values(name, true)
    }

    fn find_label_values(&self, name: &str, all: bool) -> Vec<String> {
        let core = self.core_labels();
        if let Some(values) = core.get(name) {
            return values.clone();
        }
        let mut result = ChangeMessage::parse_all_as_labels(self.message()).label_values(name);
        if !result.is_empty() && !all {
            return result;
        }
        if let Some(hidden) = self.metadata.hidden_labels.get(name) {
            if !all {
                return hidden.last().cloned().into_iter().collect();
            }
            result.extend(hidden.iter().cloned());
        }
        for change in self.changes {
            if let Some(values) = change.labels().get(name) {
                result.extend(values.iter().cloned());
                if !all {
                    return result;
                }
            }
            let rev_values = change.revision.label_values(name);
            if !rev_values.is_empty() {
                result.extend(rev_values.iter().cloned());
                if !all {
                    return result;
                }
            }
        }
        result.extend(self.resolved.label_values(name).iter().cloned());
        result
    }

    fn core_labels(&self) -> BTreeMap<&'static str, Vec<String>> {
        let rev_id = |r: &Revision| r.as_str().split(' ').next().unwrap_or("").to_string();
        BTreeMap::from([
            (
                CONTEXT_REFERENCE_LABEL,
                self.resolved.context_ref().map(str::to_string).into_iter().collect(),
            ),
            (LAST_REV_LABEL, self.last_rev.iter().map(rev_id).collect()),
            (CURRENT_REV_LABEL, self.current_rev.iter().map(rev_id).collect()),
            (CURRENT_MESSAGE_LABEL, vec![self.message().to_string()]),
            (AUTHOR_LABEL, vec![self.author().to_string()]),
            (
                CURRENT_MESSAGE_TITLE_LABEL,
                vec![ferry_core::change::first_line(self.message()).to_string()],
            ),
        ])
    }

    // ── Tree access ──

    /// Run a glob (list files) or a nested transformation.
    ///
    /// Nested transformations see a fresh tree state and leave one behind.
    pub fn run(self, runnable: Runnable<'_>, console: &dyn Console) -> Result<(Self, RunOutcome)> {
        match runnable {
            Runnable::Glob(glob) => {
                let files = self.tree_state.find(glob)?;
                Ok((self, RunOutcome::Files(files)))
            }
            Runnable::Transform(transformation) => {
                let work = self.with_updated_tree_state();
                let before = work.tree_state.fingerprint()?;
                let work = transformation
                    .transform(work, console)?
                    .with_updated_tree_state();
                let changed = work.tree_state.fingerprint()? != before;
                if !changed {
                    debug!(
                        transformation = %transformation.describe(),
                        "nested transformation left the tree unchanged"
                    );
                }
                Ok((work, RunOutcome::Transformed { changed }))
            }
        }
    }

    /// Resolve `rel` inside the checkout, refusing paths that escape it.
    pub fn checkout_path(&self, rel: &str) -> Result<PathBuf> {
        resolve_inside(self.checkout_dir, rel)
    }

    pub fn read_path(&self, rel: &str) -> Result<String> {
        Ok(fs::read_to_string(self.checkout_path(rel)?)?)
    }

    pub fn write_path(&self, rel: &str, content: &str) -> Result<()> {
        let full = self.checkout_path(rel)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, content)?;
        Ok(())
    }

    /// Create `link` pointing at `target`, both relative to the checkout.
    #[cfg(unix)]
    pub fn create_symlink(&self, link: &str, target: &str) -> Result<()> {
        let link_full = self.checkout_path(link)?;
        let target_full = self.checkout_path(target)?;
        if fs::symlink_metadata(&link_full).is_ok() {
            return Err(FerryError::validation(format!("'{link}' already exists")));
        }
        let link_parent = link_full.parent().unwrap_or(self.checkout_dir);
        fs::create_dir_all(link_parent)?;
        let relative = relative_path(link_parent, &target_full);
        std::os::unix::fs::symlink(relative, &link_full)?;
        Ok(())
    }

    /// Current UTC time rendered with a `time` format description such as
    /// `[year]-[month]-[day]`.
    pub fn now_as_string(&self, format: &str) -> Result<String> {
        let fmt = time::format_description::parse_owned::<2>(format)
            .map_err(|e| FerryError::validation(format!("invalid date format '{format}': {e}")))?;
        time::OffsetDateTime::now_utc()
            .format(&fmt)
            .map_err(|e| FerryError::validation(format!("cannot format date: {e}")))
    }
}

fn replace_label_lines<F>(message: &str, name: &str, mut f: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::new();
    for line in message.lines() {
        let replacement = match ferry_core::LabelLine::parse(line) {
            Some(label) if label.name == name => f(line),
            _ => Some(line.to_string()),
        };
        if let Some(line) = replacement {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Lexically join `rel` onto `root`; `..` may not climb above `root`.
pub fn resolve_inside(root: &Path, rel: &str) -> Result<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(p) => parts.push(p),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(outside(rel));
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(outside(rel)),
        }
    }
    let mut full = root.to_path_buf();
    full.extend(parts);
    Ok(full)
}

fn outside(rel: &str) -> FerryError {
    FerryError::validation(format!("{rel} is not inside the checkout directory"))
}

#[cfg(unix)]
fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from_dir.components().collect();
    let to_c: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to_c).take_while(|(a, b)| a == b).count();
    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for c in &to_c[common..] {
        out.push(c.as_os_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jane() -> Author {
        Author::new("Jane", "jane@example.com")
    }

    fn work<'a>(dir: &'a Path, changes: &'a [Change], rev: &'a Revision) -> TransformWork<'a> {
        TransformWork::new(dir, Metadata::new("Title\n\nBody\n", jane()), changes, rev, false)
    }

    #[test]
    fn label_edits_return_new_contexts() {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("r1");
        let w = work(tmp.path(), &[], &rev);
        let w = w
            .add_label("Bug", "1", ": ", false)
            .add_label("Secret", "s", "=", true)
            .add_or_replace_label("Bug", "2", ": ")
            .add_text_before_labels("Extra");
        assert_eq!(w.message(), "Title\n\nBody\nExtra\n\nBug: 2\n");
        assert_eq!(w.find_label("Secret").as_deref(), Some("s"));
        assert!(!w.message().contains("Secret"));

        let w = w.remove_label("Bug", false);
        assert_eq!(w.message(), "Title\n\nBody\nExtra\n");
    }

    #[test]
    fn whole_message_replace() {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("r1");
        let w = work(tmp.path(), &[], &rev).set_message("Title\nBug: 1\n\nBody\n");
        let w = w.replace_label("Bug", "9", "=", true);
        assert_eq!(w.message(), "Title\nBug=9\n\nBody\n");
        let w = w.remove_label("Bug", true);
        assert_eq!(w.message(), "Title\n\nBody\n");
    }

    #[test]
    fn find_label_priority() {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("head").with_label("Origin", "from-rev");
        let changes = vec![Change::new(
            Revision::new("c1").with_label("RevOnly", "r"),
            jane(),
            "Change\n\nOrigin: from-change\n",
            0,
        )];
        let w = work(tmp.path(), &changes, &rev);
        assert_eq!(w.find_label("Origin").as_deref(), Some("from-change"));
        assert_eq!(w.find_label("RevOnly").as_deref(), Some("r"));
        assert_eq!(
            w.find_all_labels("Origin"),
            vec!["from-change".to_string(), "from-rev".to_string()]
        );

        let w = w.add_label("Origin", "from-message", ": ", false);
        assert_eq!(w.find_label("Origin").as_deref(), Some("from-message"));
        assert_eq!(w.find_label("Missing"), None);
    }

    #[test]
    fn core_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("head").with_context_ref("main");
        let w = work(tmp.path(), &[], &rev)
            .with_last_rev(Some(Revision::new("abc 42")))
            .with_current_rev(Revision::new("def"));
        assert_eq!(w.find_label(CONTEXT_REFERENCE_LABEL).as_deref(), Some("main"));
        assert_eq!(w.find_label(LAST_REV_LABEL).as_deref(), Some("abc"));
        assert_eq!(w.find_label(CURRENT_REV_LABEL).as_deref(), Some("def"));
        assert_eq!(w.find_label(CURRENT_MESSAGE_TITLE_LABEL).as_deref(), Some("Title"));
        assert_eq!(
            w.find_label(AUTHOR_LABEL).as_deref(),
            Some("Jane <jane@example.com>")
        );
    }

    #[test]
    fn paths_stay_inside_checkout() {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("r1");
        let w = work(tmp.path(), &[], &rev);
        w.write_path("a/b.txt", "hello").unwrap();
        assert_eq!(w.read_path("a/../a/b.txt").unwrap(), "hello");
        assert!(w.write_path("../escape.txt", "x").is_err());
        assert!(w.read_path("/etc/passwd").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_relative() {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("r1");
        let w = work(tmp.path(), &[], &rev);
        w.write_path("target/file.txt", "x").unwrap();
        w.create_symlink("links/file.txt", "target/file.txt").unwrap();
        let link = fs::read_link(tmp.path().join("links/file.txt")).unwrap();
        assert_eq!(link, PathBuf::from("../target/file.txt"));
        assert!(w.create_symlink("links/file.txt", "target/file.txt").is_err());
    }

    #[test]
    fn run_glob_lists_files() {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("r1");
        let w = work(tmp.path(), &[], &rev);
        w.write_path("src/a.rs", "").unwrap();
        w.write_path("docs/a.md", "").unwrap();
        let glob = Glob::new(["**.rs"], None).unwrap();
        let console = ferry_core::TestingConsole::new();
        let (_, outcome) = w.run(Runnable::Glob(&glob), &console).unwrap();
        assert_eq!(outcome, RunOutcome::Files(vec!["src/a.rs".to_string()]));
    }

    #[test]
    fn run_transform_reports_tree_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("r1");
        let w = work(tmp.path(), &[], &rev);
        w.write_path("src/a.rs", "").unwrap();
        let console = ferry_core::TestingConsole::new();

        let rename = crate::Move::new("src/a.rs", "lib/a.rs").unwrap();
        let (w, outcome) = w.run(Runnable::Transform(&rename), &console).unwrap();
        assert_eq!(outcome, RunOutcome::Transformed { changed: true });
        assert_eq!(w.tree_state().find(&Glob::all_files()).unwrap(), vec!["lib/a.rs"]);

        let author_only = crate::MapAuthor::new(
            [("Foo <foo@example.com>", "Bar <bar@example.com>")],
            false,
            false,
            false,
        )
        .unwrap();
        let (_, outcome) = w.run(Runnable::Transform(&author_only), &console).unwrap();
        assert_eq!(outcome, RunOutcome::Transformed { changed: false });
    }

    #[test]
    fn now_as_string_formats() {
        let tmp = tempfile::tempdir().unwrap();
        let rev = Revision::new("r1");
        let w = work(tmp.path(), &[], &rev);
        let today = w.now_as_string("[year]-[month]-[day]").unwrap();
        assert_eq!(today.len(), 10);
        assert!(w.now_as_string("[nonsense").is_err());
    }
}
