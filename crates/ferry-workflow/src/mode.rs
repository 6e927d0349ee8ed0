use crate::options::CHANGE_REQUEST_PARENT_FLAG;
use crate::run_helper::RunHelper;
use ferry_core::{Console, FerryError, PrefixConsole, Result, VisitResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// How origin history is cut into migration units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    /// One destination commit with the resolved tree state.
    #[default]
    Squash,
    /// One destination commit per origin change.
    Iterative,
    /// One change applied on top of a baseline in the destination.
    ChangeRequest,
}

impl WorkflowMode {
    pub fn run(self, helper: RunHelper<'_>) -> Result<()> {
        match self {
            WorkflowMode::Squash => run_squash(helper),
            WorkflowMode::Iterative => run_iterative(helper),
            WorkflowMode::ChangeRequest => run_change_request(helper),
        }
    }
}

fn run_squash(mut helper: RunHelper<'_>) -> Result<()> {
    let changes = helper.squashed_changes()?;
    let summary = RunHelper::changes_summary_message(&changes);
    let resolved = helper.resolved_ref().clone();
    // Squash always commits as the default author.
    let author = helper.authoring().default_author().clone();
    let console = helper.console();
    helper.migrate(&resolved, author, console, &summary, &changes, None)
}

fn run_iterative(mut helper: RunHelper<'_>) -> Result<()> {
    let changes = helper.changes_since_last_import()?;
    let total = changes.len();
    let mut migrated = 0;
    let mut last_noop = None;
    for (i, change) in changes.iter().enumerate() {
        let prefix = format!(
            "[{:>2}/{}] Migrating change {}: ",
            i + 1,
            total,
            change.revision
        );
        helper = helper.for_change(change)?;
        let console = PrefixConsole::new(prefix, helper.console());
        let result = helper.migrate(
            &change.revision,
            change.author.clone(),
            &console,
            &change.message,
            std::slice::from_ref(change),
            None,
        );
        match result {
            Ok(()) => migrated += 1,
            Err(e) if e.is_empty_change() => {
                console.warn(&format!(
                    "Migration of origin revision '{}' resulted in an empty change in the \
                     destination: {e}",
                    change.revision
                ));
                last_noop = Some(e);
            }
            Err(e) => {
                helper.console().error(&format!(
                    "Migration of origin revision '{}' failed after {migrated} of {total} \
                     changes were migrated: {e}",
                    change.revision
                ));
                return Err(e);
            }
        }
    }
    info!(migrated, total, "iterative migration finished");
    match last_noop {
        Some(e) if migrated == 0 => Err(e),
        _ => Ok(()),
    }
}

fn run_change_request(helper: RunHelper<'_>) -> Result<()> {
    let resolved = helper.resolved_ref().clone();
    let baseline = match helper.options().change_request_parent() {
        Some(parent) => Some(parent.to_string()),
        None => {
            let label = helper.workflow().destination().label_name_when_origin().to_string();
            let mut found = None;
            helper.reader().visit_changes(&resolved, &mut |change| {
                match change.labels().get(&label).and_then(|v| v.last()) {
                    Some(value) => {
                        found = Some(value.clone());
                        VisitResult::Terminate
                    }
                    None => VisitResult::Continue,
                }
            })?;
            found
        }
    };
    let Some(baseline) = baseline else {
        return Err(FerryError::validation(format!(
            "Cannot find matching parent commit in the destination. Use \
             '{CHANGE_REQUEST_PARENT_FLAG}' flag to force a parent commit to use as baseline \
             in the destination."
        )));
    };
    info!(baseline = %baseline, "using change request baseline");

    let change = helper.reader().change(&resolved)?;
    let mut helper = helper.for_change(&change)?;
    let console = helper.console();
    if change.merge {
        warn!(change = %change.revision, "migrating a merge commit as a change request");
    }
    helper.migrate(
        &resolved,
        change.author.clone(),
        console,
        &change.message,
        std::slice::from_ref(&change),
        Some(&baseline),
    )
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkflowMode::Squash => "SQUASH",
            WorkflowMode::Iterative => "ITERATIVE",
            WorkflowMode::ChangeRequest => "CHANGE_REQUEST",
        })
    }
}

impl FromStr for WorkflowMode {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "squash" => Ok(WorkflowMode::Squash),
            "iterative" => Ok(WorkflowMode::Iterative),
            "change_request" => Ok(WorkflowMode::ChangeRequest),
            _ => Err(FerryError::validation(format!(
                "Unknown workflow mode '{s}'. Valid modes: squash, iterative, change_request"
            ))),
        }
    }
}
