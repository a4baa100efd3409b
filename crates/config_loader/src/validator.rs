//! Configuration validation
//!
//! Rules:
//! - transport.endpoint is an absolute http(s) URL
//! - storage_key_prefix is 1..=128 chars of `[A-Za-z0-9_.-]`
//! - storage.path is present when storage.kind = "file"

use ::validator::{Validate, ValidationErrors, ValidationErrorsKind};

use contracts::{ContractError, DispatcherSettings, StorageKind};

/// Validate DispatcherSettings
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(settings: &DispatcherSettings) -> Result<(), ContractError> {
    validate_derived(settings)?;
    validate_endpoint_scheme(settings)?;
    validate_prefix_charset(settings)?;
    validate_storage(settings)?;
    Ok(())
}

/// Run the derive-based field rules
fn validate_derived(settings: &DispatcherSettings) -> Result<(), ContractError> {
    settings.validate().map_err(|errors| {
        let (field, message) = first_error(&errors, "")
            .unwrap_or_else(|| ("settings".to_string(), errors.to_string()));
        ContractError::config_validation(field, message)
    })
}

fn first_error(errors: &ValidationErrors, path: &str) -> Option<(String, String)> {
    for (field, kind) in errors.errors() {
        let field_path = if path.is_empty() {
            field.to_string()
        } else {
            format!("{path}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                if let Some(err) = field_errors.first() {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", err.code));
                    return Some((field_path, message));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_error(inner, &field_path) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_error(inner, &format!("{field_path}[{idx}]")) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

/// The `url` rule accepts any scheme; batches are only ever POSTed over HTTP
fn validate_endpoint_scheme(settings: &DispatcherSettings) -> Result<(), ContractError> {
    let endpoint = settings.transport.endpoint.to_ascii_lowercase();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ContractError::config_validation(
            "transport.endpoint",
            format!(
                "endpoint must use http or https, got '{}'",
                settings.transport.endpoint
            ),
        ));
    }
    Ok(())
}

/// The prefix ends up in file names for file-backed storage
fn validate_prefix_charset(settings: &DispatcherSettings) -> Result<(), ContractError> {
    let Some(prefix) = settings.storage_key_prefix.as_deref() else {
        return Ok(());
    };
    if let Some(bad) = prefix
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(ContractError::config_validation(
            "storage_key_prefix",
            format!("invalid character '{bad}' in prefix '{prefix}'"),
        ));
    }
    Ok(())
}

fn validate_storage(settings: &DispatcherSettings) -> Result<(), ContractError> {
    if settings.storage.kind == StorageKind::File && settings.storage.path.is_none() {
        return Err(ContractError::config_validation(
            "storage.path",
            "storage.path is required when storage.kind = \"file\"",
        ));
    }
    Ok(())
}
