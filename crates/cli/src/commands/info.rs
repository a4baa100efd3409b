//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{decode_batch, storage_key_for, DispatcherSettings, DurableStore};
use dispatcher::open_store;
use serde::Serialize;
use tracing::{info, warn};

use super::settings::load_settings;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    batch_threshold: usize,
    endpoint: String,
    storage: StorageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<PendingInfo>,
}

#[derive(Serialize)]
struct StorageInfo {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    key: String,
}

#[derive(Serialize)]
struct PendingInfo {
    available: bool,
    events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let settings = load_settings(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let pending = if args.pending {
        Some(read_pending(&settings)?)
    } else {
        None
    };

    let info = build_config_info(&settings, pending);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// Peek at the persisted batch without constructing a dispatcher
///
/// A dispatcher would recover (and remove) the batch on construction.
fn read_pending(settings: &DispatcherSettings) -> Result<PendingInfo> {
    let store = open_store(&settings.storage).context("Failed to open storage")?;
    Ok(pending_in(store.as_ref(), &storage_key_for(settings.storage_key_prefix.as_deref())))
}

fn pending_in(store: &dyn DurableStore, key: &str) -> PendingInfo {
    if !store.is_available() {
        return PendingInfo {
            available: false,
            events: 0,
            error: None,
        };
    }

    let decoded = store
        .get(key)
        .and_then(|raw| raw.map(|raw| decode_batch(&raw)).transpose());
    match decoded {
        Ok(events) => PendingInfo {
            available: true,
            events: events.map_or(0, |events| events.len()),
            error: None,
        },
        Err(e) => {
            warn!(key, error = %e, "Failed to read pending batch");
            PendingInfo {
                available: true,
                events: 0,
                error: Some(e.to_string()),
            }
        }
    }
}

fn build_config_info(settings: &DispatcherSettings, pending: Option<PendingInfo>) -> ConfigInfo {
    ConfigInfo {
        version: format!("{:?}", settings.version),
        batch_threshold: settings.batch_threshold,
        endpoint: settings.transport.endpoint.clone(),
        storage: StorageInfo {
            kind: format!("{:?}", settings.storage.kind),
            path: settings
                .storage
                .path
                .as_ref()
                .map(|p| p.display().to_string()),
            key: storage_key_for(settings.storage_key_prefix.as_deref()),
        },
        pending,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Event Batcher Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📤 Dispatch");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Endpoint: {}", info.endpoint);
    println!("   └─ Batch threshold: {}", info.batch_threshold);

    println!("\n💾 Storage");
    println!("   ├─ Kind: {}", info.storage.kind);
    if let Some(ref path) = info.storage.path {
        println!("   ├─ Path: {}", path);
    }
    println!("   └─ Key: {}", info.storage.key);

    if let Some(ref pending) = info.pending {
        println!("\n📦 Pending batch");
        if !pending.available {
            println!("   └─ (storage unavailable)");
        } else if let Some(ref error) = pending.error {
            println!("   └─ Unreadable: {}", error);
        } else {
            println!("   └─ Events: {}", pending.events);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatcher::{MemoryStore, NoopStore};

    #[test]
    fn test_pending_counts_persisted_events() {
        let store = MemoryStore::new();
        store
            .set("shop_dispatcher_", r#"[{"n":1},{"n":2}]"#)
            .unwrap();

        let pending = pending_in(&store, "shop_dispatcher_");
        assert!(pending.available);
        assert_eq!(pending.events, 2);
        assert!(pending.error.is_none());

        assert_eq!(pending_in(&store, "dispatcher_").events, 0);
    }

    #[test]
    fn test_pending_reports_corrupt_batch() {
        let store = MemoryStore::new();
        store.set("dispatcher_", "{oops").unwrap();

        let pending = pending_in(&store, "dispatcher_");
        assert_eq!(pending.events, 0);
        assert!(pending.error.is_some());
    }

    #[test]
    fn test_pending_without_storage() {
        assert!(!pending_in(&NoopStore::new(), "dispatcher_").available);
    }
}
