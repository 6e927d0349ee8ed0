use crate::args::MainArguments;
use ferry_config::{FileConfigLoader, MigrationValidator, Options};
use ferry_core::{Console, FerryError};
use ferry_workflow::{Config, ConfigLoader, ConfigValidator, MessageLevel};

pub fn execute(args: &MainArguments, options: &Options, console: &dyn Console) -> anyhow::Result<()> {
    let config_path = args.config_file(&options.general.cwd)?;
    let loader = FileConfigLoader::new(&config_path, options.clone());
    let valid = match loader.load(console) {
        Ok(config) => check(&config, &args.workflow_name, console).is_ok(),
        Err(e) if e.is_validation() => {
            console.error(&e.to_string());
            false
        }
        Err(e) => return Err(e.into()),
    };

    if valid {
        console.info(&format!("Configuration '{}' is valid.", loader.location()));
        Ok(())
    } else {
        Err(FerryError::validation(format!("Configuration '{}' is invalid.", loader.location())).into())
    }
}

/// Print every validation message for `migration_name`; fail if any is an error.
pub fn check(config: &Config, migration_name: &str, console: &dyn Console) -> ferry_core::Result<()> {
    let messages = MigrationValidator.validate(config, migration_name);
    for message in &messages {
        message.print_to(console);
    }
    let errors = messages
        .iter()
        .filter(|m| m.level == MessageLevel::Error)
        .count();
    if errors > 0 {
        return Err(FerryError::validation(format!(
            "Configuration '{}' has {errors} error(s) for '{migration_name}'",
            config.location()
        )));
    }
    Ok(())
}
