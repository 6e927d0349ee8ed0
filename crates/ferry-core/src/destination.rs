use crate::author::Author;
use crate::console::Console;
use crate::error::{FerryError, Result};
use crate::glob::Glob;
use crate::revision::Revision;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// A repository transformed trees are written to.
pub trait Destination: Send + Sync {
    fn new_writer(&self, ctx: WriterContext) -> Result<Box<dyn Writer>>;

    /// Most recent origin revision recorded under `label_name`, walking
    /// destination history. `None` when nothing was migrated yet.
    fn previous_ref(&self, label_name: &str) -> Result<Option<String>>;

    /// Label this repository's revisions carry when it acts as an origin.
    fn label_name_when_origin(&self) -> &str;

    fn describe(&self) -> String;
}

/// A write session.
pub trait Writer {
    /// Commit the transformed tree.
    ///
    /// Fails with `EmptyChange` when the tree equals the destination state
    /// and with `RedundantChange` when the same origin revision was already
    /// written in this session.
    fn write(&mut self, result: &TransformResult, console: &dyn Console) -> Result<WriterResult>;

    /// State to carry into the next writer of the same run.
    fn state(&self) -> WriterState;
}

#[derive(Debug, Clone)]
pub struct WriterContext {
    pub workflow_name: String,
    pub destination_files: Glob,
    pub dry_run: bool,
    pub previous_state: Option<WriterState>,
}

/// Writer-local incremental state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterState {
    /// Origin revisions written during this session.
    pub written: BTreeSet<String>,
    /// Backend scratch location, such as a local clone of the destination.
    pub scratch: Option<PathBuf>,
}

impl WriterState {
    pub fn check_not_written(&self, origin_ref: &Revision) -> Result<()> {
        if self.written.contains(origin_ref.as_str()) {
            return Err(FerryError::RedundantChange(format!(
                "Change {origin_ref} was already written in this session"
            )));
        }
        Ok(())
    }

    pub fn record(&mut self, origin_ref: &Revision) {
        self.written.insert(origin_ref.as_str().to_string());
    }
}

// ── TransformResult ──

/// Everything a writer needs to commit one migration unit.
#[derive(Debug, Clone)]
pub struct TransformResult {
    /// Transformed checkout.
    pub path: PathBuf,
    pub origin_ref: Revision,
    /// Label the destination records `origin_ref` under.
    pub label_name: String,
    pub author: Author,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub summary: String,
    pub destination_files: Glob,
    pub baseline: Option<String>,
    pub ask_for_confirmation: bool,
}

impl TransformResult {
    /// Timestamp defaults to the origin revision time, else now.
    pub fn new(
        path: PathBuf,
        origin_ref: Revision,
        label_name: impl Into<String>,
        author: Author,
        summary: impl Into<String>,
        destination_files: Glob,
    ) -> Self {
        let timestamp = origin_ref
            .timestamp()
            .unwrap_or_else(|| time::OffsetDateTime::now_utc().unix_timestamp());
        Self {
            path,
            origin_ref,
            label_name: label_name.into(),
            author,
            timestamp,
            summary: summary.into(),
            destination_files,
            baseline: None,
            ask_for_confirmation: false,
        }
    }

    pub fn with_baseline(mut self, baseline: impl Into<String>) -> Self {
        self.baseline = Some(baseline.into());
        self
    }

    pub fn with_ask_for_confirmation(mut self, ask: bool) -> Self {
        self.ask_for_confirmation = ask;
        self
    }

    pub fn with_timestamp(mut self, secs: i64) -> Self {
        self.timestamp = secs;
        self
    }
}

// ── Effects ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Created,
    Updated,
    Noop,
    Error,
}

/// Something a writer did (or refused to do) in the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationEffect {
    pub kind: EffectKind,
    pub summary: String,
    pub origin_refs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_ref: Option<String>,
}

impl DestinationEffect {
    pub fn new(kind: EffectKind, summary: impl Into<String>, origin_ref: &Revision) -> Self {
        Self {
            kind,
            summary: summary.into(),
            origin_refs: vec![origin_ref.as_str().to_string()],
            destination_ref: None,
        }
    }

    pub fn with_destination_ref(mut self, destination_ref: impl Into<String>) -> Self {
        self.destination_ref = Some(destination_ref.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterResult {
    pub effects: Vec<DestinationEffect>,
}

impl WriterResult {
    pub fn with_effect(effect: DestinationEffect) -> Self {
        Self {
            effects: vec![effect],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rev: Revision) -> TransformResult {
        TransformResult::new(
            PathBuf::from("/tmp/checkout"),
            rev,
            "Origin-RevId",
            Author::new("Jane", "jane@example.com"),
            "Import",
            Glob::all_files(),
        )
    }

    #[test]
    fn timestamp_prefers_origin_time() {
        let r = result(Revision::new("r1").with_timestamp(42));
        assert_eq!(r.timestamp, 42);
        let r = result(Revision::new("r2"));
        assert!(r.timestamp > 1_600_000_000);
    }

    #[test]
    fn builders() {
        let r = result(Revision::new("r1"))
            .with_baseline("base")
            .with_ask_for_confirmation(true);
        assert_eq!(r.baseline.as_deref(), Some("base"));
        assert!(r.ask_for_confirmation);
    }

    #[test]
    fn writer_state_detects_redundant_writes() {
        let mut state = WriterState::default();
        let rev = Revision::new("abc");
        state.check_not_written(&rev).unwrap();
        state.record(&rev);
        let err = state.check_not_written(&rev).unwrap_err();
        assert!(matches!(err, FerryError::RedundantChange(_)));
        assert!(err.is_empty_change());
    }
}
