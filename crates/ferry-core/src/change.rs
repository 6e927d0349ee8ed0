use crate::author::Author;
use crate::message::ChangeMessage;
use crate::revision::Revision;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One authored delta in an origin's history. Read-only once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub revision: Revision,
    pub author: Author,
    pub message: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub files: BTreeSet<String>,
    #[serde(default)]
    pub merge: bool,
}

impl Change {
    pub fn new(revision: Revision, author: Author, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            revision,
            author,
            message: message.into(),
            timestamp,
            files: BTreeSet::new(),
            merge: false,
        }
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn first_line(&self) -> &str {
        first_line(&self.message)
    }

    /// Labels found in the message's trailing label block.
    pub fn labels(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for label in ChangeMessage::parse(&self.message).labels() {
            out.entry(label.name.clone()).or_default().push(label.value.clone());
        }
        out
    }
}

pub fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}

/// Why a `changes(from, to)` query produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmptyReason {
    /// Already up to date, or no starting point.
    NoChanges,
    /// `to` is `from` or one of its ancestors.
    ToIsAncestor,
    /// The two revisions do not share history.
    UnrelatedRevisions,
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EmptyReason::NoChanges => "NO_CHANGES",
            EmptyReason::ToIsAncestor => "TO_IS_ANCESTOR",
            EmptyReason::UnrelatedRevisions => "UNRELATED_REVISIONS",
        };
        f.write_str(s)
    }
}

/// Result of enumerating changes between two revisions.
#[derive(Debug, Clone)]
pub enum ChangesResponse {
    /// Oldest first.
    Changes(Vec<Change>),
    Empty(EmptyReason),
}

impl ChangesResponse {
    /// Empty lists are normalized to `Empty(NoChanges)`.
    pub fn for_changes(changes: Vec<Change>) -> Self {
        if changes.is_empty() {
            ChangesResponse::Empty(EmptyReason::NoChanges)
        } else {
            ChangesResponse::Changes(changes)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ChangesResponse::Empty(_))
    }

    pub fn empty_reason(&self) -> Option<EmptyReason> {
        match self {
            ChangesResponse::Empty(reason) => Some(*reason),
            ChangesResponse::Changes(_) => None,
        }
    }
}

/// Returned by `visit_changes` visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    Continue,
    Terminate,
}
