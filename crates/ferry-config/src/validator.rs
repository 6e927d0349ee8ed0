use ferry_workflow::{Config, ConfigValidator, Migration, ValidationMessage};

/// Checks that the requested migration exists and flags suspicious
/// workflow settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationValidator;

impl ConfigValidator for MigrationValidator {
    fn validate(&self, config: &Config, migration_name: &str) -> Vec<ValidationMessage> {
        let mut messages = Vec::new();
        match config.migration(migration_name) {
            Err(e) => messages.push(ValidationMessage::error(e.to_string())),
            Ok(Migration::Workflow(workflow)) => {
                if workflow.origin_files().includes().is_empty() {
                    messages.push(ValidationMessage::warning(format!(
                        "Workflow '{}' has origin_files that select nothing",
                        workflow.name()
                    )));
                }
                if workflow.destination_files().includes().is_empty() {
                    messages.push(ValidationMessage::warning(format!(
                        "Workflow '{}' has destination_files that select nothing; \
                         stale destination files are never removed",
                        workflow.name()
                    )));
                }
            }
            Ok(Migration::Mirror(_)) => {}
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_config;
    use crate::options::Options;
    use crate::parser::parse_config;
    use ferry_store::StorePaths;
    use ferry_workflow::MessageLevel;

    fn config(yaml: &str) -> Config {
        let tmp = tempfile::tempdir().unwrap();
        let file = parse_config(yaml).unwrap();
        let options = Options::new(StorePaths::discover(tmp.path()), tmp.path().to_path_buf());
        build_config(&file, "ferry.yaml", &tmp.path().join("ferry.yaml"), &options).unwrap()
    }

    const YAML: &str = r#"
workflows:
  - name: ok
    origin: { folder: ~ }
    destination: { folder: { path: out } }
    authoring: { default: "Bot <bot@example.com>" }
  - name: empty-dest
    origin: { folder: ~ }
    destination: { folder: { path: out } }
    authoring: { default: "Bot <bot@example.com>" }
    destination_files: []
mirrors:
  - name: m
    origin: a
    destination: b
"#;

    #[test]
    fn existing_migrations_pass() {
        let config = config(YAML);
        assert!(MigrationValidator.validate(&config, "ok").is_empty());
        assert!(MigrationValidator.validate(&config, "m").is_empty());
    }

    #[test]
    fn missing_migration_is_an_error() {
        let messages = MigrationValidator.validate(&config(YAML), "nope");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, MessageLevel::Error);
        assert!(messages[0].text.contains("No migration with name 'nope'"));
        assert!(messages[0].text.contains("empty-dest, m, ok"));
    }

    #[test]
    fn empty_destination_files_warn() {
        let messages = MigrationValidator.validate(&config(YAML), "empty-dest");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, MessageLevel::Warning);
    }
}
