//! The migration workflow engine: resolves what to migrate, cuts origin
//! history into units according to the workflow mode, runs each unit
//! through the transformation pipeline and hands the result to the
//! destination writer.

pub mod config;
pub mod event_log;
pub mod info;
pub mod mode;
pub mod options;
pub mod reloading;
pub mod run_helper;
pub mod workflow;

pub use config::{Config, Migration};
pub use event_log::{EventMonitor, JsonlEventMonitor, NoopMonitor, Outcome};
pub use info::{Info, MigrationReference};
pub use mode::WorkflowMode;
pub use options::WorkflowOptions;
pub use reloading::{
    ConfigLoader, ConfigValidator, MessageLevel, ReloadingRunHelper, ValidationMessage,
};
pub use run_helper::RunHelper;
pub use workflow::Workflow;

