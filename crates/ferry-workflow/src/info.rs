use ferry_core::{Change, Revision};
use serde::Serialize;
use std::fmt;

/// Migration state for one origin label.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReference {
    pub label: String,
    pub last_migrated: Option<Revision>,
    /// Newest origin revision that a run would migrate.
    pub next_to_migrate: Option<Revision>,
    /// Pending changes, oldest first.
    pub available_to_migrate: Vec<Change>,
}

impl fmt::Display for MigrationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |r: &Option<Revision>| {
            r.as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "None".into())
        };
        write!(
            f,
            "'{}': last_migrated {} - last_available {}.",
            self.label,
            show(&self.last_migrated),
            show(&self.next_to_migrate)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Info {
    pub migration: String,
    pub references: Vec<MigrationReference>,
}
