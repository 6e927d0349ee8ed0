use crate::event_log::EventMonitor;
use crate::info::{Info, MigrationReference};
use crate::mode::WorkflowMode;
use crate::options::WorkflowOptions;
use crate::reloading::{ConfigLoader, ConfigValidator, ReloadingRunHelper};
use crate::run_helper::RunHelper;
use ferry_core::fsutil::clear_dir;
use ferry_core::{
    Authoring, ChangesResponse, Console, Destination, FerryError, Glob, Origin, Result, Revision,
};
use ferry_transform::{Sequence, Transformation};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// An immutable migration definition: where to read, where to write, and
/// what to do to the tree in between.
#[derive(Clone)]
pub struct Workflow {
    name: String,
    origin: Arc<dyn Origin>,
    destination: Arc<dyn Destination>,
    authoring: Authoring,
    transformation: Arc<dyn Transformation>,
    reverse: Option<Arc<dyn Transformation>>,
    origin_files: Glob,
    destination_files: Glob,
    mode: WorkflowMode,
    ask_for_confirmation: bool,
    ignore_noop: bool,
    options: WorkflowOptions,
    reloading: Option<Arc<ReloadingRunHelper>>,
}

impl Workflow {
    pub fn new(
        name: impl Into<String>,
        origin: Arc<dyn Origin>,
        destination: Arc<dyn Destination>,
        authoring: Authoring,
    ) -> Self {
        Self {
            name: name.into(),
            origin,
            destination,
            authoring,
            transformation: Arc::from(Sequence::create(Vec::new())),
            reverse: None,
            origin_files: Glob::all_files(),
            destination_files: Glob::all_files(),
            mode: WorkflowMode::Squash,
            ask_for_confirmation: false,
            ignore_noop: false,
            options: WorkflowOptions::default(),
            reloading: None,
        }
    }

    // ── Builders ──

    pub fn with_transformation(mut self, transformation: Box<dyn Transformation>) -> Self {
        self.transformation = Arc::from(transformation);
        self.reverse = None;
        self
    }

    /// Compute the inverse pipeline now so a non-reversible workflow is
    /// rejected before anything runs. Each migrated tree is then checked
    /// against the origin after applying the inverse.
    pub fn with_reversible_check(mut self) -> Result<Self> {
        let reverse = self.transformation.reverse().map_err(|e| {
            FerryError::NonReversible(format!(
                "Workflow '{}' is configured with check_reversible but the \
                 transformations cannot be reversed: {e}",
                self.name
            ))
        })?;
        self.reverse = Some(Arc::from(reverse));
        Ok(self)
    }

    pub fn with_origin_files(mut self, glob: Glob) -> Self {
        self.origin_files = glob;
        self
    }

    pub fn with_destination_files(mut self, glob: Glob) -> Self {
        self.destination_files = glob;
        self
    }

    pub fn with_mode(mut self, mode: WorkflowMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ask_for_confirmation(mut self, ask: bool) -> Self {
        self.ask_for_confirmation = ask;
        self
    }

    pub fn with_ignore_noop(mut self, ignore: bool) -> Self {
        self.ignore_noop = ignore;
        self
    }

    pub fn with_options(mut self, options: WorkflowOptions) -> Self {
        self.options = options;
        self
    }

    /// Re-read the workflow from the origin at every migrated change.
    pub fn with_config_reloading(
        mut self,
        loader: Arc<dyn ConfigLoader>,
        validator: Arc<dyn ConfigValidator>,
    ) -> Self {
        self.reloading = Some(Arc::new(ReloadingRunHelper::new(
            loader,
            validator,
            self.name.clone(),
        )));
        self
    }

    // ── Accessors ──

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &dyn Origin {
        self.origin.as_ref()
    }

    /// Shared handle to the origin, for collaborators that outlive a borrow.
    pub fn shared_origin(&self) -> Arc<dyn Origin> {
        Arc::clone(&self.origin)
    }

    pub fn destination(&self) -> &dyn Destination {
        self.destination.as_ref()
    }

    pub fn authoring(&self) -> &Authoring {
        &self.authoring
    }

    pub fn transformation(&self) -> &dyn Transformation {
        self.transformation.as_ref()
    }

    pub fn reverse_transformation(&self) -> Option<&dyn Transformation> {
        self.reverse.as_deref()
    }

    pub fn origin_files(&self) -> &Glob {
        &self.origin_files
    }

    pub fn destination_files(&self) -> &Glob {
        &self.destination_files
    }

    pub fn mode(&self) -> WorkflowMode {
        self.mode
    }

    pub fn ask_for_confirmation(&self) -> bool {
        self.ask_for_confirmation
    }

    /// Configured or requested on the command line.
    pub fn ignore_noop(&self) -> bool {
        self.ignore_noop || self.options.ignore_noop
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    // ── Operations ──

    /// Migrate `source_ref` (or the origin's default reference) using
    /// `workdir` as scratch space.
    pub fn run(
        &self,
        workdir: &Path,
        source_ref: Option<&str>,
        console: &dyn Console,
        monitor: &dyn EventMonitor,
    ) -> Result<()> {
        console.progress("Cleaning working directory");
        clear_dir(workdir)?;

        console.progress(&format!(
            "Resolving origin reference {}",
            source_ref.unwrap_or("(default)")
        ));
        let resolved = self.origin.resolve(source_ref)?;
        info!(
            workflow = %self.name,
            mode = %self.mode,
            resolved = %resolved,
            dry_run = self.options.dry_run,
            "running workflow"
        );

        let helper = RunHelper::new(
            Arc::new(self.clone()),
            workdir,
            resolved,
            source_ref,
            console,
            monitor,
            None,
            self.reloading.clone(),
        )?;
        self.mode.run(helper)
    }

    /// What has been migrated and what is pending.
    pub fn info(&self) -> Result<Info> {
        let label = self.origin.label_name().to_string();
        let last_migrated = match self.destination.previous_ref(&label)? {
            Some(prev) => Some(self.origin.resolve(Some(&prev))?),
            None => None,
        };
        let head = match self.origin.resolve(None) {
            Ok(head) => head,
            Err(FerryError::CannotResolveRevision(_)) => {
                return Ok(self.info_without_head(label, last_migrated));
            }
            Err(e) => return Err(e),
        };

        let reader = self.origin.new_reader(&self.origin_files, &self.authoring)?;
        let available = match reader.changes(last_migrated.as_ref(), &head)? {
            ChangesResponse::Changes(changes) => changes,
            ChangesResponse::Empty(_) => Vec::new(),
        };
        let next_to_migrate = available.last().map(|c| c.revision.clone());
        Ok(Info {
            migration: self.name.clone(),
            references: vec![MigrationReference {
                label,
                last_migrated,
                next_to_migrate,
                available_to_migrate: available,
            }],
        })
    }

    fn info_without_head(&self, label: String, last_migrated: Option<Revision>) -> Info {
        Info {
            migration: self.name.clone(),
            references: vec![MigrationReference {
                label,
                last_migrated,
                next_to_migrate: None,
                available_to_migrate: Vec::new(),
            }],
        }
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("origin", &self.origin.describe())
            .field("destination", &self.destination.describe())
            .field("mode", &self.mode)
            .field("origin_files", &self.origin_files.to_string())
            .field("destination_files", &self.destination_files.to_string())
            .field("transformation", &self.transformation.describe())
            .field("check_reversible", &self.reverse.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::NoopMonitor;
    use ferry_backends::testing::{DummyOrigin, RecordingDestination};
    use ferry_core::console::MessageType;
    use ferry_core::{Author, ErrorKind, TestingConsole};
    use ferry_transform::{MapAuthor, Replace, TransformWork};

    fn workflow(origin: &DummyOrigin, dest: &RecordingDestination, mode: WorkflowMode) -> Workflow {
        Workflow::new(
            "default",
            Arc::new(origin.clone()),
            Arc::new(dest.clone()),
            Authoring::pass_thru(Author::new("Default", "default@example.com")),
        )
        .with_mode(mode)
    }

    fn run(w: &Workflow, source_ref: Option<&str>) -> Result<()> {
        let tmp = tempfile::tempdir().unwrap();
        w.run(tmp.path(), source_ref, &TestingConsole::new(), &NoopMonitor)
    }

    fn three_commits() -> DummyOrigin {
        let origin = DummyOrigin::new();
        origin.add_commit_by(Author::new("A", "a@x"), "first", &[("f", "1")], &[]);
        origin.add_commit_by(Author::new("B", "b@x"), "second", &[("f", "2")], &[]);
        origin.add_commit_by(Author::new("C", "c@x"), "third", &[("f", "3")], &[]);
        origin
    }

    /// Fails the unit migrating revision `rev`.
    #[derive(Debug)]
    struct FailAt(&'static str);

    impl Transformation for FailAt {
        fn transform<'a>(
            &self,
            work: TransformWork<'a>,
            _console: &dyn Console,
        ) -> Result<TransformWork<'a>> {
            if work.resolved_reference().as_str() == self.0 {
                return Err(FerryError::repo(format!("boom at {}", self.0)));
            }
            Ok(work)
        }

        fn reverse(&self) -> Result<Box<dyn Transformation>> {
            Ok(Box::new(FailAt(self.0)))
        }

        fn describe(&self) -> String {
            "fail".into()
        }
    }

    #[test]
    fn iterative_migrates_each_change_in_order() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let w = workflow(&origin, &dest, WorkflowMode::Iterative);
        let tmp = tempfile::tempdir().unwrap();
        let console = TestingConsole::new();
        w.run(tmp.path(), None, &console, &NoopMonitor).unwrap();

        let writes = dest.writes();
        let summaries: Vec<_> = writes.iter().map(|w| w.summary.as_str()).collect();
        assert_eq!(summaries, ["first", "second", "third"]);
        let authors: Vec<_> = writes.iter().map(|w| w.author.email.as_str()).collect();
        assert_eq!(authors, ["a@x", "b@x", "c@x"]);
        assert_eq!(writes[2].files["f"], "3");
        assert_eq!(dest.previous_ref(origin.label_name()).unwrap().as_deref(), Some("3"));
        assert!(console
            .texts(MessageType::Progress)
            .contains(&"[ 2/3] Migrating change 2: Checking out the change".to_string()));

        origin.add_commit("fourth", &[("f", "4")]);
        run(&w, None).unwrap();
        let writes = dest.writes();
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[3].summary, "fourth");

        let err = run(&w, None).unwrap_err();
        assert!(err.is_empty_change());
    }

    #[test]
    fn iterative_failure_keeps_written_units() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let w = workflow(&origin, &dest, WorkflowMode::Iterative)
            .with_transformation(Box::new(FailAt("2")));
        let err = run(&w, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Repository);
        assert_eq!(dest.writes().len(), 1);
        assert_eq!(dest.previous_ref(origin.label_name()).unwrap().as_deref(), Some("1"));
    }

    /// Reports the unit migrating revision `rev` as empty.
    #[derive(Debug)]
    struct EmptyAt(&'static str);

    impl Transformation for EmptyAt {
        fn transform<'a>(
            &self,
            work: TransformWork<'a>,
            _console: &dyn Console,
        ) -> Result<TransformWork<'a>> {
            if work.resolved_reference().as_str() == self.0 {
                return Err(FerryError::empty_change(format!("nothing at {}", self.0)));
            }
            Ok(work)
        }

        fn reverse(&self) -> Result<Box<dyn Transformation>> {
            Ok(Box::new(EmptyAt(self.0)))
        }

        fn describe(&self) -> String {
            "empty".into()
        }
    }

    #[test]
    fn iterative_warns_and_continues_past_empty_unit() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let w = workflow(&origin, &dest, WorkflowMode::Iterative)
            .with_transformation(Box::new(EmptyAt("2")));
        let tmp = tempfile::tempdir().unwrap();
        let console = TestingConsole::new();
        w.run(tmp.path(), None, &console, &NoopMonitor).unwrap();

        let summaries: Vec<_> = dest.writes().iter().map(|w| w.summary.clone()).collect();
        assert_eq!(summaries, ["first", "third"]);
        let warnings = console.texts(MessageType::Warning);
        assert!(
            warnings
                .iter()
                .any(|t| t.contains("revision '2' resulted in an empty change")),
            "{warnings:?}"
        );
    }

    #[test]
    fn last_rev_flag_overrides_destination_label() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let w = workflow(&origin, &dest, WorkflowMode::Iterative).with_options(WorkflowOptions {
            last_revision: Some("2".into()),
            ..WorkflowOptions::default()
        });
        run(&w, None).unwrap();
        let writes = dest.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].origin_ref.as_str(), "3");
    }

    #[test]
    fn squash_uses_default_author_and_second_run_is_empty() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let w = workflow(&origin, &dest, WorkflowMode::Squash);
        run(&w, None).unwrap();

        let writes = dest.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].author.email, "default@example.com");
        assert!(writes[0].summary.starts_with("Project import generated by Ferry.\n\nIncludes:\n"));
        assert!(writes[0].summary.contains("  - 1 first by A <a@x>"));

        let err = run(&w, None).unwrap_err();
        assert!(err.is_empty_change());
        assert_eq!(dest.writes().len(), 1);
    }

    #[test]
    fn dry_run_leaves_no_previous_ref() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let w = workflow(&origin, &dest, WorkflowMode::Iterative).with_options(WorkflowOptions {
            dry_run: true,
            ..WorkflowOptions::default()
        });
        run(&w, None).unwrap();
        run(&w, None).unwrap();
        assert!(dest.writes().iter().all(|w| w.dry_run));
        assert_eq!(dest.previous_ref(origin.label_name()).unwrap(), None);
    }

    #[test]
    fn change_request_without_baseline_names_flag() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let w = workflow(&origin, &dest, WorkflowMode::ChangeRequest);
        let err = run(&w, None).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("--change-request-parent"));
        assert!(dest.writes().is_empty());
    }

    #[test]
    fn change_request_finds_baseline_in_origin_history() {
        let origin = DummyOrigin::new();
        origin.add_commit("import\n\nDummyOrigin-RevId: 42", &[("f", "1")]);
        origin.add_commit("feature", &[("g", "1")]);
        let dest = RecordingDestination::new();
        let w = workflow(&origin, &dest, WorkflowMode::ChangeRequest);
        run(&w, Some("2")).unwrap();

        let writes = dest.writes();
        assert_eq!(writes[0].baseline.as_deref(), Some("42"));
        assert_eq!(writes[0].summary, "feature");

        let w = w.with_options(WorkflowOptions {
            change_request_parent: Some("99".into()),
            ..WorkflowOptions::default()
        });
        origin.add_commit("another", &[("g", "2")]);
        run(&w, Some("3")).unwrap();
        assert_eq!(dest.writes()[1].baseline.as_deref(), Some("99"));
    }

    #[test]
    fn transformations_apply_to_tree_and_metadata() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let map = MapAuthor::new([("A <a@x>", "Z <z@x>")], false, false, false).unwrap();
        let w = workflow(&origin, &dest, WorkflowMode::Iterative)
            .with_transformation(ferry_transform::Sequence::create(vec![
                Box::new(map) as Box<dyn Transformation>,
                Box::new(Replace::new("1", "one", Glob::all_files(), false).unwrap()),
            ]))
            .with_ignore_noop(true);
        run(&w, None).unwrap();
        let writes = dest.writes();
        assert_eq!(writes[0].author.email, "z@x");
        assert_eq!(writes[0].files["f"], "one");
        assert_eq!(writes[1].author.email, "b@x");
        assert_eq!(writes[1].files["f"], "2");
    }

    #[test]
    fn noop_transformation_fails_unless_ignored() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let replace = || Box::new(Replace::new("zzz", "y", Glob::all_files(), false).unwrap());
        let w = workflow(&origin, &dest, WorkflowMode::Squash).with_transformation(replace());
        let err = run(&w, None).unwrap_err();
        assert!(matches!(err, FerryError::VoidOperation(_)));

        let w = w.with_ignore_noop(true);
        run(&w, None).unwrap();
        assert_eq!(dest.writes().len(), 1);
    }

    #[test]
    fn reversible_check_runs_on_every_unit() {
        let origin = DummyOrigin::new();
        origin.add_commit("clean", &[("a", "foo")]);
        let dest = RecordingDestination::new();
        let w = workflow(&origin, &dest, WorkflowMode::Iterative)
            .with_transformation(Box::new(
                Replace::new("foo", "bar", Glob::all_files(), false).unwrap(),
            ))
            .with_reversible_check()
            .unwrap();
        run(&w, None).unwrap();
        assert_eq!(dest.writes()[0].files["a"], "bar");

        origin.add_commit("lossy", &[("a", "foo bar")]);
        let err = run(&w, None).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("not reversible"));
        assert_eq!(dest.writes().len(), 1);
    }

    #[test]
    fn non_reversible_pipeline_rejected_at_construction() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let err = workflow(&origin, &dest, WorkflowMode::Squash)
            .with_transformation(Box::new(
                Replace::new("foo", "", Glob::all_files(), false).unwrap(),
            ))
            .with_reversible_check()
            .unwrap_err();
        assert!(matches!(err, FerryError::NonReversible(_)));
    }

    #[test]
    fn info_reports_last_migrated_and_pending() {
        let origin = three_commits();
        let dest = RecordingDestination::new();
        let w = workflow(&origin, &dest, WorkflowMode::Squash);

        let info = w.info().unwrap();
        assert_eq!(info.references[0].last_migrated, None);
        assert_eq!(info.references[0].available_to_migrate.len(), 3);

        run(&w, Some("1")).unwrap();
        let info = w.info().unwrap();
        let reference = &info.references[0];
        assert_eq!(reference.available_to_migrate.len(), 2);
        assert_eq!(
            reference.to_string(),
            "'DummyOrigin-RevId': last_migrated 1 - last_available 3."
        );
    }
}
