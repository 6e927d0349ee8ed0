//! Workflows re-read from the origin at each migrated change.

use crate::config::{Config, Migration};
use crate::workflow::Workflow;
use ferry_core::{Change, Console, FerryError, Result, Revision};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Produces configurations, either the one given at startup or the one
/// stored in the origin at a given revision.
pub trait ConfigLoader: Send + Sync {
    /// Where the configuration is read from, for messages.
    fn location(&self) -> String;

    fn load(&self, console: &dyn Console) -> Result<Config>;

    fn load_for_revision(&self, console: &dyn Console, revision: &Revision) -> Result<Config>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationMessage {
    pub level: MessageLevel,
    pub text: String,
}

impl ValidationMessage {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            text: text.into(),
        }
    }

    /// Send to the matching console channel.
    pub fn print_to(&self, console: &dyn Console) {
        match self.level {
            MessageLevel::Error => console.error(&self.text),
            MessageLevel::Warning => console.warn(&self.text),
            MessageLevel::Info => console.info(&self.text),
        }
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.level, self.text)
    }
}

/// Checks a loaded configuration before it is used.
pub trait ConfigValidator: Send + Sync {
    fn validate(&self, config: &Config, migration_name: &str) -> Vec<ValidationMessage>;
}

/// Rebuilds the workflow named `workflow_name` from the configuration
/// stored at each change.
pub struct ReloadingRunHelper {
    loader: Arc<dyn ConfigLoader>,
    validator: Arc<dyn ConfigValidator>,
    workflow_name: String,
}

impl ReloadingRunHelper {
    pub fn new(
        loader: Arc<dyn ConfigLoader>,
        validator: Arc<dyn ConfigValidator>,
        workflow_name: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            validator,
            workflow_name: workflow_name.into(),
        }
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// The validated workflow as configured at `change`.
    pub fn workflow_for_change(&self, change: &Change, console: &dyn Console) -> Result<Workflow> {
        let config = self.loader.load_for_revision(console, &change.revision)?;
        let errors: Vec<String> = self
            .validator
            .validate(&config, &self.workflow_name)
            .into_iter()
            .filter(|m| m.level == MessageLevel::Error)
            .map(|m| m.text)
            .collect();
        if !errors.is_empty() {
            return Err(FerryError::validation(format!(
                "Invalid configuration [ref '{}': {} ]: '{}': \n{}",
                change.revision,
                self.loader.location(),
                self.workflow_name,
                errors.join("\n")
            )));
        }
        match config.migration(&self.workflow_name)? {
            Migration::Workflow(workflow) => Ok(workflow.clone()),
            Migration::Mirror(_) => Err(FerryError::validation(format!(
                "Invalid configuration [ref '{}': {} ]: '{}' is not a workflow",
                change.revision,
                self.loader.location(),
                self.workflow_name
            ))),
        }
    }
}

impl fmt::Debug for ReloadingRunHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadingRunHelper")
            .field("location", &self.loader.location())
            .field("workflow_name", &self.workflow_name)
            .finish()
    }
}
