//! `--setup` (SPEC_FULL.md §2): idempotent merge of the telemetry-enabling
//! environment block into a CLI AI assistant's JSON settings file.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::info;

/// Keys written into the settings file's `env` object, and the value each
/// must hold for telemetry to reach this receiver.
fn required_env(grpc_port: u16) -> Vec<(&'static str, String)> {
    vec![
        ("CLAUDE_CODE_ENABLE_TELEMETRY", "1".to_string()),
        ("OTEL_EXPORTER_OTLP_ENDPOINT", format!("http://localhost:{grpc_port}")),
        ("OTEL_EXPORTER_OTLP_PROTOCOL", "grpc".to_string()),
        ("OTEL_METRICS_EXPORTER", "otlp".to_string()),
        ("OTEL_LOGS_EXPORTER", "otlp".to_string()),
    ]
}

/// Reads `settings_path` (creating an empty object if it doesn't exist yet),
/// merges in the required `env` keys, and rewrites the file only if
/// something actually changed. Returns `true` if the file was modified.
pub fn run(settings_path: &Path, grpc_port: u16) -> Result<bool> {
    let existing = match fs::read_to_string(settings_path) {
        Ok(text) => {
            serde_json::from_str(&text).with_context(|| format!("parsing {}", settings_path.display()))?
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => json!({}),
        Err(err) => return Err(err).with_context(|| format!("reading {}", settings_path.display())),
    };

    let mut settings = existing.clone();
    let env = settings
        .as_object_mut()
        .context("settings file root is not a JSON object")?
        .entry("env")
        .or_insert_with(|| json!({}));
    let env_obj = env.as_object_mut().context("settings \"env\" key is not a JSON object")?;

    let mut changed = false;
    for (key, value) in required_env(grpc_port) {
        if env_obj.get(key) != Some(&Value::String(value.clone())) {
            env_obj.insert(key.to_string(), Value::String(value));
            changed = true;
        }
    }

    if !changed {
        return Ok(false);
    }

    if let Some(parent) = settings_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let rendered = serde_json::to_string_pretty(&settings)?;
    fs::write(settings_path, rendered).with_context(|| format!("writing {}", settings_path.display()))?;
    info!(path = %settings_path.display(), "telemetry settings written");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn creates_settings_file_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let changed = run(&path, 4317).unwrap();
        assert!(changed);
        let contents: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(contents["env"]["CLAUDE_CODE_ENABLE_TELEMETRY"], "1");
        assert_eq!(contents["env"]["OTEL_EXPORTER_OTLP_ENDPOINT"], "http://localhost:4317");
    }

    #[test]
    fn preserves_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{"theme": "dark", "env": {{"SOME_OTHER_VAR": "keep-me"}}}}"#).unwrap();

        run(&path, 4317).unwrap();
        let contents: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(contents["theme"], "dark");
        assert_eq!(contents["env"]["SOME_OTHER_VAR"], "keep-me");
        assert_eq!(contents["env"]["CLAUDE_CODE_ENABLE_TELEMETRY"], "1");
    }

    #[test]
    fn second_run_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert!(run(&path, 4317).unwrap());
        assert!(!run(&path, 4317).unwrap());
    }

    #[test]
    fn different_port_triggers_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        run(&path, 4317).unwrap();
        let changed = run(&path, 9999).unwrap();
        assert!(changed);
        let contents: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(contents["env"]["OTEL_EXPORTER_OTLP_ENDPOINT"], "http://localhost:9999");
    }
}
