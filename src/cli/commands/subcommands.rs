use super::build_relay;
use anyhow::Result;
use std::path::Path;

use crate::config::credentials::{CREDENTIAL_ENV_VARS, get_credential_value};
use crate::config::{StorageBackend, load_config};

pub(super) async fn retry_command(config_path: Option<&Path>, limit: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let relay = build_relay(&config)?;

    let report = relay.retry_pending(limit).await?;
    if report.attempted == 0 {
        println!("No media waiting for upload.");
        return Ok(());
    }
    println!(
        "Retried {}: {} uploaded, {} expired at provider, {} still failing",
        report.attempted, report.uploaded, report.expired, report.failed
    );
    Ok(())
}

pub(super) async fn pending_command(config_path: Option<&Path>, limit: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let relay = build_relay(&config)?;

    let pending = relay.store().pending_media(limit).await?;
    if pending.is_empty() {
        println!("No media waiting for upload.");
        return Ok(());
    }

    println!("Media waiting for upload:\n");
    for msg in &pending {
        println!(
            "  {}  {:<8} org={} media={} received={}",
            msg.provider_message_id,
            msg.kind.as_str(),
            msg.organization_id,
            msg.media_id().unwrap_or("-"),
            msg.received_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub(super) async fn status_command(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => crate::config::get_config_path()?,
    };
    let db_path = config.database_path()?;

    println!("sewdle-relay {}\n", crate::VERSION);
    println!("Config: {} {}", path.display(), check(path.exists()));
    println!("Database: {} {}", db_path.display(), check(db_path.exists()));
    println!(
        "Webhook: {}:{}{}",
        config.server.host, config.server.port, config.server.webhook_path
    );
    println!(
        "Provider API: {}/{}",
        config.provider.api_base, config.provider.api_version
    );
    println!("Secrets:");
    for &(name, env) in CREDENTIAL_ENV_VARS {
        let value = get_credential_value(&config, name).unwrap_or_default();
        println!("  {name}: {} (env {env})", set_or_not(value));
    }
    println!(
        "Organizations mapped: {}",
        config.provider.organizations.len()
    );
    match config.storage.backend {
        StorageBackend::Local => println!(
            "Storage: local {} (bucket {})",
            config.storage_root()?.display(),
            config.storage.bucket
        ),
        StorageBackend::Http => println!(
            "Storage: http {} (bucket {}, service key {})",
            config.storage.base_url,
            config.storage.bucket,
            set_or_not(&config.storage.service_key)
        ),
    }

    if db_path.exists() {
        let relay = build_relay(&config)?;
        let stats = relay.store().stats().await?;
        println!(
            "\nMessages: {} total, {} media, {} awaiting upload",
            stats.total, stats.media, stats.pending_upload
        );
    }
    Ok(())
}

fn check(ok: bool) -> &'static str {
    if ok { "\u{2713}" } else { "\u{2717}" }
}

fn set_or_not(secret: &str) -> &'static str {
    if secret.is_empty() { "not set" } else { "\u{2713}" }
}
