//! Settings loading and command-line overrides shared by the commands.

use std::path::Path;

use config_loader::ConfigLoader;
use contracts::DispatcherSettings;
use serde_json::Value;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::{CliError, Result};

/// Load and validate the configuration file
pub fn load_settings(path: &Path) -> Result<DispatcherSettings> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    Ok(ConfigLoader::load_from_path(path)?)
}

/// Apply `--endpoint` / `--threshold` and re-validate
pub fn apply_overrides(settings: &mut DispatcherSettings, args: &RunArgs) -> Result<()> {
    if let Some(ref endpoint) = args.endpoint {
        info!(endpoint = %endpoint, "Overriding endpoint from CLI");
        settings.transport.endpoint = endpoint.clone();
    }
    if let Some(threshold) = args.threshold {
        info!(threshold, "Overriding batch threshold from CLI");
        settings.batch_threshold = threshold;
    }
    ConfigLoader::validate(settings)
        .map_err(|e| CliError::invalid_override("--endpoint/--threshold", e.to_string()))
}

/// Parse `KEY=VALUE` pairs; values that parse as JSON keep their type
pub fn parse_fields(raw: &[String]) -> Result<Vec<(String, Value)>> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CliError::invalid_override("--set", format!("'{pair}' is not KEY=VALUE")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::invalid_override("--set", format!("'{pair}' has an empty key")));
            }
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}
