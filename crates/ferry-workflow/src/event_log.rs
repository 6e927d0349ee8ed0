//! Migration lifecycle hooks and a JSONL implementation.
//!
//! [`JsonlEventMonitor`] appends to `{run_dir}/events.jsonl` and keeps
//! `{run_dir}/last-run.json` up to date for external tools to poll.

use ferry_core::{DestinationEffect, EffectKind, ErrorKind, FerryError, Revision};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// ── Outcome ──

/// How a migration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    NoOp,
    Failed,
}

impl Outcome {
    pub fn of<T>(result: &Result<T, FerryError>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) if e.kind() == ErrorKind::NoOp => Outcome::NoOp,
            Err(_) => Outcome::Failed,
        }
    }
}

// ── EventMonitor ──

/// Observer of a migration run. All hooks default to doing nothing.
pub trait EventMonitor: Send + Sync {
    fn on_migration_started(&self, _migration: &str) {}

    fn on_change_migration_started(&self, _origin_ref: &Revision) {}

    fn on_change_migration_finished(&self, _origin_ref: &Revision, _effects: &[DestinationEffect]) {}

    fn on_migration_finished(&self, _migration: &str, _outcome: Outcome, _error: Option<&str>) {}
}

/// Monitor that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl EventMonitor for NoopMonitor {}

// ── Events ──

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MigrationStarted {
        migration: String,
    },
    ChangeMigrationStarted {
        origin_ref: String,
    },
    ChangeMigrationFinished {
        origin_ref: String,
        effects: Vec<DestinationEffect>,
    },
    MigrationFinished {
        migration: String,
        outcome: Outcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct FullEvent {
    pub seq: u32,
    pub ts: String,
    #[serde(flatten)]
    pub event: Event,
}

/// Snapshot written to `last-run.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatus {
    pub migration: String,
    pub status: String,
    pub migrated: Vec<String>,
    pub failed: Option<String>,
    pub updated_at: String,
}

// ── JsonlEventMonitor ──

#[derive(Debug, Default)]
struct MonitorState {
    seq: u32,
    status: RunStatus,
}

/// Append-only JSONL event writer plus status file. Best-effort: write
/// failures never fail the migration.
#[derive(Debug)]
pub struct JsonlEventMonitor {
    jsonl_path: PathBuf,
    status_path: PathBuf,
    state: Mutex<MonitorState>,
}

impl JsonlEventMonitor {
    pub fn new(run_dir: &Path) -> Self {
        Self {
            jsonl_path: run_dir.join("events.jsonl"),
            status_path: run_dir.join("last-run.json"),
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn jsonl_path(&self) -> &Path {
        &self.jsonl_path
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    fn record(&self, event: Event, update: impl FnOnce(&mut RunStatus)) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let full = FullEvent {
            seq: state.seq,
            ts: now_rfc3339(),
            event,
        };
        state.seq += 1;
        if let Ok(line) = serde_json::to_string(&full) {
            let _ = append_line(&self.jsonl_path, &line);
        }

        update(&mut state.status);
        state.status.updated_at = now_rfc3339();
        if let Ok(data) = serde_json::to_string_pretty(&state.status) {
            let _ = ferry_store::write_atomic(&self.status_path, data.as_bytes());
        }
    }
}

impl EventMonitor for JsonlEventMonitor {
    fn on_migration_started(&self, migration: &str) {
        self.record(
            Event::MigrationStarted {
                migration: migration.to_string(),
            },
            |s| {
                *s = RunStatus {
                    migration: migration.to_string(),
                    status: "running".into(),
                    ..RunStatus::default()
                }
            },
        );
    }

    fn on_change_migration_started(&self, origin_ref: &Revision) {
        self.record(
            Event::ChangeMigrationStarted {
                origin_ref: origin_ref.to_string(),
            },
            |_| {},
        );
    }

    fn on_change_migration_finished(&self, origin_ref: &Revision, effects: &[DestinationEffect]) {
        let written = effects
            .iter()
            .any(|e| matches!(e.kind, EffectKind::Created | EffectKind::Updated));
        let failed = effects.iter().any(|e| e.kind == EffectKind::Error);
        self.record(
            Event::ChangeMigrationFinished {
                origin_ref: origin_ref.to_string(),
                effects: effects.to_vec(),
            },
            |s| {
                if written {
                    s.migrated.push(origin_ref.to_string());
                }
                if failed {
                    s.failed = Some(origin_ref.to_string());
                }
            },
        );
    }

    fn on_migration_finished(&self, migration: &str, outcome: Outcome, error: Option<&str>) {
        self.record(
            Event::MigrationFinished {
                migration: migration.to_string(),
                outcome,
                error: error.map(String::from),
            },
            |s| {
                s.status = match outcome {
                    Outcome::Success => "success",
                    Outcome::NoOp => "no_op",
                    Outcome::Failed => "failed",
                }
                .into()
            },
        );
    }
}

/// Append a single line to a file, creating parent dirs if needed.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_is_tagged() {
        let event = Event::MigrationFinished {
            migration: "default".into(),
            outcome: Outcome::NoOp,
            error: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"migration_finished""#));
        assert!(json.contains(r#""outcome":"no_op""#));
        assert!(!json.contains("error"));
    }

    #[test]
    fn outcome_classifies_errors() {
        assert_eq!(Outcome::of(&Ok::<(), FerryError>(())), Outcome::Success);
        assert_eq!(
            Outcome::of::<()>(&Err(FerryError::empty_change("nothing"))),
            Outcome::NoOp
        );
        assert_eq!(
            Outcome::of::<()>(&Err(FerryError::repo("boom"))),
            Outcome::Failed
        );
    }

    #[test]
    fn jsonl_monitor_writes_events_and_status() {
        let tmp = tempfile::tempdir().unwrap();
        let monitor = JsonlEventMonitor::new(&tmp.path().join("run"));
        let rev = Revision::new("abc");

        monitor.on_migration_started("default");
        monitor.on_change_migration_started(&rev);
        monitor.on_change_migration_finished(
            &rev,
            &[DestinationEffect::new(EffectKind::Created, "created", &rev)],
        );
        monitor.on_migration_finished("default", Outcome::Success, None);

        let content = fs::read_to_string(monitor.jsonl_path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["seq"], 0);
        assert_eq!(lines[0]["type"], "migration_started");
        assert_eq!(lines[2]["effects"][0]["kind"], "created");
        assert_eq!(lines[3]["seq"], 3);

        let status: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(monitor.status_path()).unwrap()).unwrap();
        assert_eq!(status["status"], "success");
        assert_eq!(status["migrated"][0], "abc");
    }
}
