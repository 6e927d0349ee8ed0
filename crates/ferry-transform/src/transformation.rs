use crate::work::TransformWork;
use ferry_core::{Console, Result};
use std::fmt;

/// A step of the pipeline. Receives the per-run context by value and hands
/// back the context for the next step.
pub trait Transformation: Send + Sync + fmt::Debug {
    /// Apply the step to the checkout and/or the metadata carried in `work`.
    ///
    /// Fails with `Validation` on misuse, `VoidOperation` when nothing
    /// changed (unless no-ops are ignored) and `EmptyChange` when the unit
    /// should not be migrated at all.
    fn transform<'a>(&self, work: TransformWork<'a>, console: &dyn Console)
        -> Result<TransformWork<'a>>;

    /// The inverse step, or `NonReversible` explaining why there is none.
    fn reverse(&self) -> Result<Box<dyn Transformation>>;

    /// Short human-readable description used in progress output.
    fn describe(&self) -> String;
}
