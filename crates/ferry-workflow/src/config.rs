use crate::event_log::{EventMonitor, Outcome};
use crate::info::Info;
use crate::workflow::Workflow;
use ferry_backends::GitMirror;
use ferry_core::{Console, FerryError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Something a configuration can run by name.
#[derive(Debug, Clone)]
pub enum Migration {
    Workflow(Workflow),
    Mirror(GitMirror),
}

impl Migration {
    pub fn name(&self) -> &str {
        match self {
            Migration::Workflow(w) => w.name(),
            Migration::Mirror(m) => m.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Migration::Workflow(_) => "workflow",
            Migration::Mirror(_) => "mirror",
        }
    }

    /// Run the migration, reporting start and outcome to `monitor`.
    pub fn run(
        &self,
        workdir: &Path,
        source_ref: Option<&str>,
        console: &dyn Console,
        monitor: &dyn EventMonitor,
    ) -> Result<()> {
        monitor.on_migration_started(self.name());
        let result = match self {
            Migration::Workflow(w) => w.run(workdir, source_ref, console, monitor),
            Migration::Mirror(m) => m.run(console),
        };
        let error = result.as_ref().err().map(|e| e.to_string());
        monitor.on_migration_finished(self.name(), Outcome::of(&result), error.as_deref());
        result
    }

    pub fn info(&self) -> Result<Info> {
        match self {
            Migration::Workflow(w) => w.info(),
            Migration::Mirror(m) => Ok(Info {
                migration: m.name().to_string(),
                references: Vec::new(),
            }),
        }
    }
}

/// Migrations declared by one configuration file, by name.
#[derive(Debug, Clone, Default)]
pub struct Config {
    location: String,
    migrations: BTreeMap<String, Migration>,
}

impl Config {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            migrations: BTreeMap::new(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn add(&mut self, migration: Migration) -> Result<()> {
        let name = migration.name().to_string();
        if self.migrations.contains_key(&name) {
            return Err(FerryError::validation(format!(
                "A migration with the name '{name}' is already defined"
            )));
        }
        self.migrations.insert(name, migration);
        Ok(())
    }

    pub fn migration(&self, name: &str) -> Result<&Migration> {
        self.migrations.get(name).ok_or_else(|| {
            FerryError::validation(format!(
                "No migration with name '{name}' exists. Valid migrations: [{}]",
                self.migrations.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::WorkflowMode;
    use ferry_backends::testing::{DummyOrigin, RecordingDestination};
    use ferry_core::{Author, Authoring, DestinationEffect, Revision, TestingConsole};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl EventMonitor for Collect {
        fn on_migration_started(&self, migration: &str) {
            self.0.lock().unwrap().push(format!("start {migration}"));
        }

        fn on_change_migration_started(&self, origin_ref: &Revision) {
            self.0.lock().unwrap().push(format!("change {origin_ref}"));
        }

        fn on_change_migration_finished(&self, origin_ref: &Revision, effects: &[DestinationEffect]) {
            self.0
                .lock()
                .unwrap()
                .push(format!("done {origin_ref} {:?}", effects[0].kind));
        }

        fn on_migration_finished(&self, migration: &str, outcome: Outcome, _error: Option<&str>) {
            self.0
                .lock()
                .unwrap()
                .push(format!("finish {migration} {outcome:?}"));
        }
    }

    fn config(origin: &DummyOrigin, dest: &RecordingDestination) -> Config {
        let workflow = Workflow::new(
            "default",
            Arc::new(origin.clone()),
            Arc::new(dest.clone()),
            Authoring::pass_thru(Author::new("D", "d@x")),
        )
        .with_mode(WorkflowMode::Iterative);
        let mut config = Config::new("ferry.yaml");
        config.add(Migration::Workflow(workflow)).unwrap();
        config
    }

    #[test]
    fn lookup_and_duplicates() {
        let origin = DummyOrigin::new();
        let dest = RecordingDestination::new();
        let mut config = config(&origin, &dest);
        assert_eq!(config.migration("default").unwrap().kind(), "workflow");

        let err = config.migration("nope").unwrap_err();
        assert_eq!(
            err.to_string(),
            "No migration with name 'nope' exists. Valid migrations: [default]"
        );

        let again = config.migration("default").unwrap().clone();
        assert!(config.add(again).is_err());
    }

    #[test]
    fn run_reports_lifecycle_to_monitor() {
        let origin = DummyOrigin::new();
        origin.add_commit("one", &[("f", "1")]);
        origin.add_commit("two", &[("f", "1")]);
        let dest = RecordingDestination::new();
        let config = config(&origin, &dest);
        let monitor = Collect::default();
        let tmp = tempfile::tempdir().unwrap();

        let migration = config.migration("default").unwrap();
        migration
            .run(tmp.path(), None, &TestingConsole::new(), &monitor)
            .unwrap();
        assert_eq!(
            *monitor.0.lock().unwrap(),
            [
                "start default",
                "change 1",
                "done 1 Created",
                "finish default Success",
            ]
        );

        monitor.0.lock().unwrap().clear();
        let err = migration
            .run(tmp.path(), None, &TestingConsole::new(), &monitor)
            .unwrap_err();
        assert!(err.is_empty_change());
        assert_eq!(monitor.0.lock().unwrap().last().unwrap(), "finish default NoOp");
    }
}
