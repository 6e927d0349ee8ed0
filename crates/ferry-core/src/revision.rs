use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A point in an origin's history.
///
/// Immutable once created: the same id always names the same tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context_ref: Option<String>,
    /// Seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, Vec<String>>,
}

impl Revision {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context_ref: None,
            timestamp: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_context_ref(mut self, context_ref: impl Into<String>) -> Self {
        self.context_ref = Some(context_ref.into());
        self
    }

    pub fn with_timestamp(mut self, secs: i64) -> Self {
        self.timestamp = Some(secs);
        self
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Stable string form in the origin's addressing scheme.
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Human-facing reference such as a branch name, if known.
    pub fn context_ref(&self) -> Option<&str> {
        self.context_ref.as_deref()
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn labels(&self) -> &BTreeMap<String, Vec<String>> {
        &self.labels
    }

    pub fn label_values(&self, name: &str) -> &[String] {
        self.labels.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
