use crate::author::Authoring;
use crate::change::{Change, ChangesResponse, VisitResult};
use crate::error::Result;
use crate::glob::Glob;
use crate::revision::Revision;
use std::path::Path;

/// A repository changes are read from.
pub trait Origin: Send + Sync {
    /// Map a reference (or the configured default when `None`) to a revision.
    ///
    /// Fails with `CannotResolveRevision` when nothing can be resolved.
    fn resolve(&self, reference: Option<&str>) -> Result<Revision>;

    /// Open a read session scoped to `origin_files` and `authoring`.
    fn new_reader(&self, origin_files: &Glob, authoring: &Authoring) -> Result<Box<dyn Reader>>;

    /// Label destinations use to record which origin revision they hold.
    fn label_name(&self) -> &str;

    fn describe(&self) -> String;
}

/// A read session over an origin.
pub trait Reader {
    /// Materialize the tree of `revision` into `workdir`, replacing its
    /// previous contents.
    fn checkout(&self, revision: &Revision, workdir: &Path) -> Result<()>;

    /// Changes after `from` up to and including `to`, oldest first.
    fn changes(&self, from: Option<&Revision>, to: &Revision) -> Result<ChangesResponse>;

    /// The single change at `revision`. `EmptyChange` when it touches no
    /// selected file.
    fn change(&self, revision: &Revision) -> Result<Change>;

    /// Walk history backward from `start` until the visitor terminates or
    /// history runs out.
    fn visit_changes(
        &self,
        start: &Revision,
        visitor: &mut dyn FnMut(&Change) -> VisitResult,
    ) -> Result<()>;
}
