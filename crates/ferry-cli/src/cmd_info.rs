use crate::args::MainArguments;
use ferry_config::{FileConfigLoader, Options};
use ferry_core::Console;
use ferry_workflow::{ConfigLoader, Info};

pub fn execute(
    args: &MainArguments,
    options: &Options,
    json: bool,
    console: &dyn Console,
) -> anyhow::Result<()> {
    let config_path = args.config_file(&options.general.cwd)?;
    let config = FileConfigLoader::new(&config_path, options.clone()).load(console)?;
    let info = config.migration(&args.workflow_name)?.info()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        for line in render(&info) {
            console.info(&line);
        }
    }
    Ok(())
}

fn render(info: &Info) -> Vec<String> {
    if info.references.is_empty() {
        return vec![format!("'{}': no migration references", info.migration)];
    }
    let mut lines = Vec::new();
    for reference in &info.references {
        lines.push(reference.to_string());
        let pending = &reference.available_to_migrate;
        if pending.is_empty() {
            continue;
        }
        lines.push(format!("Available changes ({}):", pending.len()));
        for (i, change) in pending.iter().enumerate() {
            lines.push(format!(
                "{:>4} - {} {} by {}",
                i + 1,
                short(change.revision.as_str()),
                change.first_line(),
                change.author
            ));
        }
    }
    lines
}

fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
