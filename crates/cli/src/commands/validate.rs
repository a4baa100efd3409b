//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{storage_key_for, DispatcherSettings, StorageKind};
use serde::Serialize;
use tracing::info;

use super::settings::load_settings;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    endpoint: String,
    batch_threshold: usize,
    storage: StorageKind,
    storage_key: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_settings(&args.config) {
        Ok(settings) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(&settings),
            summary: Some(ConfigSummary {
                version: format!("{:?}", settings.version),
                endpoint: settings.transport.endpoint.clone(),
                batch_threshold: settings.batch_threshold,
                storage: settings.storage.kind,
                storage_key: storage_key_for(settings.storage_key_prefix.as_deref()),
            }),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(settings: &DispatcherSettings) -> Vec<String> {
    let mut warnings = Vec::new();

    if settings.batch_threshold == 0 {
        warnings.push(
            "batch_threshold = 0 - every send flushes the previous batch (the first flush is empty)"
                .to_string(),
        );
    }

    match settings.storage.kind {
        StorageKind::None => {
            warnings.push("storage.kind = none - pending events are lost on exit".to_string())
        }
        StorageKind::Memory => warnings
            .push("storage.kind = memory - pending events do not survive the process".to_string()),
        StorageKind::File => {}
    }

    if settings.transport.endpoint.starts_with("http://") {
        warnings.push("transport.endpoint uses plain http".to_string());
    }

    if settings.storage_key_prefix.is_none() && settings.storage.kind == StorageKind::File {
        warnings.push(
            "storage_key_prefix is unset - all dispatchers sharing storage.path share one batch"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Endpoint: {}", summary.endpoint);
            println!("  Batch threshold: {}", summary.batch_threshold);
            println!("  Storage: {:?}", summary.storage);
            println!("  Storage key: {}", summary.storage_key);
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
