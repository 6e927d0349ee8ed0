//! Per-run orchestration shared by every mode: resolve the last migrated
//! revision, enumerate changes, and push migration units through the
//! transform pipeline into the destination writer.

use crate::event_log::EventMonitor;
use crate::options::{WorkflowOptions, FORCE_FLAG};
use crate::reloading::ReloadingRunHelper;
use crate::workflow::Workflow;
use ferry_core::fsutil::{clear_dir, copy_tree};
use ferry_core::{
    Author, Authoring, Change, ChangesResponse, Console, DestinationEffect, EffectKind,
    EmptyReason, FerryError, Glob, Reader, Result, Revision, TransformResult, Writer,
    WriterContext, WriterState,
};
use ferry_transform::treestate::diff;
use ferry_transform::{Metadata, TransformWork, Transformation, TreeState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SQUASH_SUMMARY: &str = "Project import generated by Ferry.";

pub struct RunHelper<'c> {
    workflow: Arc<Workflow>,
    workdir: PathBuf,
    resolved: Revision,
    raw_source_ref: Option<String>,
    reader: Box<dyn Reader>,
    writer: Box<dyn Writer>,
    dry_run: bool,
    console: &'c dyn Console,
    monitor: &'c dyn EventMonitor,
    reloading: Option<Arc<ReloadingRunHelper>>,
    /// Resolved once per run.
    last_rev: Option<Option<Revision>>,
}

impl<'c> RunHelper<'c> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workflow: Arc<Workflow>,
        workdir: &Path,
        resolved: Revision,
        raw_source_ref: Option<&str>,
        console: &'c dyn Console,
        monitor: &'c dyn EventMonitor,
        previous_state: Option<WriterState>,
        reloading: Option<Arc<ReloadingRunHelper>>,
    ) -> Result<Self> {
        let dry_run = workflow.is_dry_run();
        let reader = workflow
            .origin()
            .new_reader(workflow.origin_files(), workflow.authoring())?;
        let writer = workflow.destination().new_writer(WriterContext {
            workflow_name: workflow.name().to_string(),
            destination_files: workflow.destination_files().clone(),
            dry_run,
            previous_state,
        })?;
        Ok(Self {
            workflow,
            workdir: workdir.to_path_buf(),
            resolved,
            raw_source_ref: raw_source_ref.map(String::from),
            reader,
            writer,
            dry_run,
            console,
            monitor,
            reloading,
            last_rev: None,
        })
    }

    // ── Accessors ──

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn resolved_ref(&self) -> &Revision {
        &self.resolved
    }

    pub fn reader(&self) -> &dyn Reader {
        self.reader.as_ref()
    }

    pub fn authoring(&self) -> &Authoring {
        self.workflow.authoring()
    }

    pub fn console(&self) -> &'c dyn Console {
        self.console
    }

    pub fn options(&self) -> &WorkflowOptions {
        self.workflow.options()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    // ── Derived helpers ──

    /// The helper that migrates `change`. Without config reloading this is
    /// `self`; otherwise a helper bound to the workflow read at `change`.
    pub fn for_change(self, change: &Change) -> Result<Self> {
        let Some(reloading) = self.reloading.clone() else {
            return Ok(self);
        };
        info!(
            change = %change.revision,
            title = change.first_line(),
            "loading configuration for change"
        );
        let workflow = reloading.workflow_for_change(change, self.console)?;
        let previous_state = if self.dry_run {
            None
        } else {
            Some(self.writer.state())
        };
        let mut helper = RunHelper::new(
            Arc::new(workflow),
            &self.workdir,
            self.resolved,
            self.raw_source_ref.as_deref(),
            self.console,
            self.monitor,
            previous_state,
            Some(reloading),
        )?;
        helper.last_rev = self.last_rev;
        Ok(helper)
    }

    // ── Change enumeration ──

    /// Last origin revision already in the destination: the last-rev
    /// override if given, else the destination's origin label.
    pub fn last_rev(&mut self) -> Result<Option<Revision>> {
        if let Some(cached) = &self.last_rev {
            return Ok(cached.clone());
        }
        let value = self.compute_last_rev()?;
        self.last_rev = Some(value.clone());
        Ok(value)
    }

    fn compute_last_rev(&self) -> Result<Option<Revision>> {
        let origin = self.workflow.origin();
        if let Some(flag) = self.options().last_revision() {
            return origin.resolve(Some(flag)).map(Some);
        }
        let label = origin.label_name();
        let Some(previous) = self.workflow.destination().previous_ref(label)? else {
            debug!(label, "no previous reference in destination");
            return Ok(None);
        };
        origin.resolve(Some(&previous)).map(Some).map_err(|e| match e {
            FerryError::CannotResolveRevision(msg) => FerryError::CannotResolveRevision(format!(
                "Could not resolve previously migrated revision '{previous}' ({label}) \
                 in the origin: {msg}"
            )),
            other => other,
        })
    }

    /// Changes after the last migrated revision up to the resolved one,
    /// oldest first. Empty results become `EmptyChange`, unrelated
    /// histories a `Validation` error unless forced.
    pub fn changes_since_last_import(&mut self) -> Result<Vec<Change>> {
        let last = self.last_rev()?;
        let reason = match self.reader.changes(last.as_ref(), &self.resolved)? {
            ChangesResponse::Changes(changes) => return Ok(changes),
            ChangesResponse::Empty(reason) => reason,
        };
        match reason {
            EmptyReason::NoChanges => Err(FerryError::empty_change(format!(
                "No new changes to import for resolved ref: {}",
                self.resolved
            ))),
            EmptyReason::ToIsAncestor => Err(FerryError::empty_change(format!(
                "'{}' has been already migrated. Nothing to do.",
                self.resolved
            ))),
            EmptyReason::UnrelatedRevisions if self.options().force => {
                warn!(resolved = %self.resolved, "migrating unrelated history (forced)");
                match self.reader.changes(None, &self.resolved)? {
                    ChangesResponse::Changes(changes) => Ok(changes),
                    ChangesResponse::Empty(_) => Err(FerryError::empty_change(format!(
                        "No new changes to import for resolved ref: {}",
                        self.resolved
                    ))),
                }
            }
            EmptyReason::UnrelatedRevisions => Err(FerryError::validation(format!(
                "Last imported revision '{}' is not an ancestor of the revision currently \
                 being migrated ('{}'). Use {FORCE_FLAG} if you really want to migrate it.",
                last.map(|r| r.to_string()).unwrap_or_default(),
                self.resolved
            ))),
        }
    }

    /// Changes folded into a squash unit. Never fails on empty or
    /// unrelated history: the summary just lists nothing.
    pub fn squashed_changes(&mut self) -> Result<Vec<Change>> {
        let last = self.last_rev()?;
        Ok(match self.reader.changes(last.as_ref(), &self.resolved)? {
            ChangesResponse::Changes(changes) => changes,
            ChangesResponse::Empty(_) => Vec::new(),
        })
    }

    // ── Migration ──

    /// Run one migration unit: checkout, transform, write.
    pub fn migrate(
        &mut self,
        rev: &Revision,
        author: Author,
        console: &dyn Console,
        message: &str,
        changes: &[Change],
        baseline: Option<&str>,
    ) -> Result<()> {
        self.monitor.on_change_migration_started(rev);
        let result = self.do_migrate(rev, author, console, message, changes, baseline);
        let effects = match &result {
            Ok(effects) => effects.clone(),
            Err(e) => {
                let kind = if e.is_empty_change() {
                    EffectKind::Noop
                } else {
                    EffectKind::Error
                };
                vec![DestinationEffect::new(kind, e.to_string(), rev)]
            }
        };
        self.monitor.on_change_migration_finished(rev, &effects);
        result.map(|_| ())
    }

    fn do_migrate(
        &mut self,
        rev: &Revision,
        author: Author,
        console: &dyn Console,
        message: &str,
        changes: &[Change],
        baseline: Option<&str>,
    ) -> Result<Vec<DestinationEffect>> {
        let last_rev = self.last_rev()?;
        let checkout = self.workdir.join("checkout");
        console.progress("Checking out the change");
        self.reader.checkout(rev, &checkout)?;

        let workflow = Arc::clone(&self.workflow);
        let work = TransformWork::new(
            &checkout,
            Metadata::new(message, author),
            changes,
            rev,
            workflow.ignore_noop(),
        )
        .with_last_rev(last_rev)
        .with_current_rev(rev.clone());
        let work = workflow.transformation().transform(work, console)?;
        let metadata = work.into_metadata();

        if let Some(reverse) = workflow.reverse_transformation() {
            console.progress("Checking that the transformations can be reverted");
            self.check_reversible(rev, &checkout, reverse, &metadata.author, changes, console)?;
        }

        let mut result = TransformResult::new(
            checkout,
            rev.clone(),
            workflow.origin().label_name(),
            metadata.author,
            metadata.message,
            workflow.destination_files().clone(),
        )
        .with_ask_for_confirmation(workflow.ask_for_confirmation() && !self.dry_run);
        if let Some(baseline) = baseline {
            result = result.with_baseline(baseline);
        }

        let written = self.writer.write(&result, console)?;
        for effect in &written.effects {
            info!(kind = ?effect.kind, origin = %rev, "{}", effect.summary);
        }
        Ok(written.effects)
    }

    /// Apply the inverse pipeline to a copy of the transformed tree and
    /// compare it with a fresh checkout of `rev`.
    fn check_reversible(
        &self,
        rev: &Revision,
        transformed: &Path,
        reverse: &dyn Transformation,
        author: &Author,
        changes: &[Change],
        console: &dyn Console,
    ) -> Result<()> {
        let reversed = self.workdir.join("reverse");
        clear_dir(&reversed)?;
        copy_tree(transformed, &reversed, &Glob::all_files())?;
        let work = TransformWork::new(
            &reversed,
            Metadata::new("reverse", author.clone()),
            changes,
            rev,
            self.workflow.ignore_noop(),
        );
        reverse.transform(work, console)?;

        let original = self.workdir.join("original");
        self.reader.checkout(rev, &original)?;
        let before = TreeState::new(&original);
        let after = TreeState::new(&reversed);
        if before.fingerprint()? != after.fingerprint()? {
            let paths = diff(before.files()?, after.files()?);
            return Err(FerryError::validation(format!(
                "Workflow '{}' is not reversible. Differing paths after reverting: {}",
                self.workflow.name(),
                paths.join(", ")
            )));
        }
        Ok(())
    }

    /// Summary used as the squash commit message.
    pub fn changes_summary_message(changes: &[Change]) -> String {
        if changes.is_empty() {
            return format!("{SQUASH_SUMMARY}\n");
        }
        let mut summary = format!("{SQUASH_SUMMARY}\n\nIncludes:\n");
        for change in changes.iter().rev() {
            summary.push_str(&format!(
                "  - {} {} by {}\n",
                change.revision,
                change.first_line(),
                change.author
            ));
        }
        summary
    }
}
