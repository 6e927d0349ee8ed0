use crate::schema::{ConfigFile, DESTINATION_TYPES, ORIGIN_TYPES, TRANSFORM_TYPES};
use anyhow::{bail, Context, Result};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::path::Path;

/// Load and validate a configuration from a YAML file.
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a configuration from a YAML string.
pub fn parse_config(yaml: &str) -> Result<ConfigFile> {
    let mut raw: Value = serde_yaml::from_str(yaml).context("invalid YAML syntax")?;
    if raw.is_null() {
        raw = Value::Mapping(Mapping::new());
    }

    normalize_workflows(&mut raw)?;
    expand_variables(&mut raw);

    let config: ConfigFile =
        serde_yaml::from_value(raw).context("configuration schema validation failed")?;

    validate_config(&config)?;
    Ok(config)
}

/// Rewrite every short-format tagged object under `workflows:`.
fn normalize_workflows(raw: &mut Value) -> Result<()> {
    let workflows = match raw.get_mut("workflows") {
        Some(Value::Sequence(seq)) => seq,
        _ => return Ok(()),
    };

    for (i, workflow) in workflows.iter_mut().enumerate() {
        if let Some(origin) = workflow.get_mut("origin") {
            normalize_tagged(origin, "origin", ORIGIN_TYPES)
                .with_context(|| format!("workflows[{i}].origin"))?;
        }
        if let Some(destination) = workflow.get_mut("destination") {
            normalize_tagged(destination, "destination", DESTINATION_TYPES)
                .with_context(|| format!("workflows[{i}].destination"))?;
        }
        let steps = match workflow.get_mut("transformations") {
            Some(Value::Sequence(seq)) => seq,
            _ => continue,
        };
        for (j, step) in steps.iter_mut().enumerate() {
            normalize_tagged(step, "transformation", TRANSFORM_TYPES)
                .with_context(|| format!("workflows[{i}].transformations[{j}]"))?;
        }
    }
    Ok(())
}

/// Normalize a short-format object into tagged form, in place.
///
/// Short: `move: { before: a, after: b }`
/// Long:  `{ type: move, before: a, after: b }`
fn normalize_tagged(value: &mut Value, what: &str, valid: &[&str]) -> Result<()> {
    let map = match value.as_mapping() {
        Some(m) => m,
        None => bail!("{what} must be a mapping, got: {value:?}"),
    };

    if map.contains_key(Value::String("type".into())) {
        return Ok(());
    }

    if map.len() != 1 {
        bail!(
            "short-format {what} must have exactly one key, got {}",
            map.len()
        );
    }

    let Some((key, inner)) = map.iter().next() else {
        bail!("short-format {what} must have exactly one key");
    };
    let key_str = key
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("{what} key must be a string"))?;
    if !valid.contains(&key_str) {
        bail!(
            "unknown {what} type: \"{key_str}\". Valid types: {}",
            valid.join(", ")
        );
    }

    let mut out = Mapping::new();
    out.insert(Value::String("type".into()), Value::String(key_str.into()));
    match inner {
        Value::Mapping(fields) => {
            for (k, v) in fields {
                out.insert(k.clone(), v.clone());
            }
        }
        // `folder: ~` or `folder: {}` carry no fields.
        Value::Null => {}
        other => bail!("{key_str} value must be a mapping, got: {other:?}"),
    }

    *value = Value::Mapping(out);
    Ok(())
}

/// Expand `${{ env.VAR_NAME }}` patterns in string values.
fn expand_variables(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains("${{") {
                *s = expand_env_vars(s);
            }
        }
        Value::Mapping(m) => {
            for (_, v) in m.iter_mut() {
                expand_variables(v);
            }
        }
        Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                expand_variables(v);
            }
        }
        _ => {}
    }
}

/// Replace `${{ env.VAR_NAME }}` with the environment variable value.
fn expand_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${{") {
        result.push_str(&rest[..start]);
        let after_start = &rest[start + 3..];
        if let Some(end) = after_start.find("}}") {
            let expr = after_start[..end].trim();
            if let Some(var_name) = expr.strip_prefix("env.") {
                let val = std::env::var(var_name.trim()).unwrap_or_default();
                result.push_str(&val);
            } else {
                result.push_str(&rest[start..start + 3 + end + 2]);
            }
            rest = &after_start[end + 2..];
        } else {
            result.push_str(&rest[start..]);
            rest = "";
        }
    }
    result.push_str(rest);
    result
}

fn validate_config(config: &ConfigFile) -> Result<()> {
    if config.workflows.is_empty() && config.mirrors.is_empty() {
        bail!("configuration defines no workflows or mirrors");
    }

    let mut seen = BTreeSet::new();
    for name in config.migration_names() {
        if name.is_empty() {
            bail!("migration name must not be empty");
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            bail!("migration name \"{name}\" may only contain letters, digits, '-', '_' and '.'");
        }
        if !seen.insert(name) {
            bail!("A migration with the name '{name}' is already defined");
        }
    }

    for mirror in &config.mirrors {
        if mirror.refspecs.is_empty() {
            bail!("mirror \"{}\" needs at least one refspec", mirror.name);
        }
    }
    Ok(())
}
