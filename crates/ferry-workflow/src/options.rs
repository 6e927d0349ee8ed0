pub const LAST_REV_FLAG: &str = "--last-rev";
pub const CHANGE_REQUEST_PARENT_FLAG: &str = "--change-request-parent";
pub const FORCE_FLAG: &str = "--force";

/// Per-invocation workflow knobs, usually filled from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowOptions {
    /// Origin revision to treat as already migrated, overriding the
    /// destination label lookup.
    pub last_revision: Option<String>,
    /// Destination revision to use as baseline in change-request mode.
    pub change_request_parent: Option<String>,
    pub dry_run: bool,
    /// Migrate even when the last migrated revision is unrelated.
    pub force: bool,
    pub ignore_noop: bool,
}

impl WorkflowOptions {
    pub fn last_revision(&self) -> Option<&str> {
        self.last_revision.as_deref().filter(|s| !s.is_empty())
    }

    pub fn change_request_parent(&self) -> Option<&str> {
        self.change_request_parent.as_deref().filter(|s| !s.is_empty())
    }
}
