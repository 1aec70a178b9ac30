//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use donelog_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "endpoint": config.endpoint,
                    "credential": config.credential.as_deref().map(mask),
                    "auto_sync": config.auto_sync,
                    "sync_interval_minutes": config.sync_interval_minutes,
                    "sync_timeout_secs": config.sync_timeout_secs,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:              {}", config.data_dir.display());
            println!(
                "  endpoint:              {}",
                config.endpoint.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  credential:            {}",
                config
                    .credential
                    .as_deref()
                    .map(mask)
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  auto_sync:             {}", config.auto_sync);
            println!("  sync_interval_minutes: {}", config.sync_interval_minutes);
            println!("  sync_timeout_secs:     {}", config.sync_timeout_secs);
            println!(
                "  log_file:              {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "credential" {
        mask(&value)
    } else {
        value
    };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "endpoint" => {
            config.endpoint = optional(value);
        }
        "credential" => {
            config.credential = optional(value);
        }
        "auto_sync" => {
            config.auto_sync = value
                .parse()
                .context("Invalid value for auto_sync. Use 'true' or 'false'.")?;
        }
        "sync_interval_minutes" => {
            config.sync_interval_minutes = value
                .parse()
                .context("Invalid value for sync_interval_minutes. Use a whole number of minutes.")?;
        }
        "sync_timeout_secs" => {
            let secs: u64 = value
                .parse()
                .context("Invalid value for sync_timeout_secs. Use a whole number of seconds.")?;
            if secs == 0 {
                bail!("sync_timeout_secs must be at least 1");
            }
            config.sync_timeout_secs = secs;
        }
        "log_file" => {
            config.log_file = optional(value).map(PathBuf::from);
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, endpoint, credential, auto_sync, \
                 sync_interval_minutes, sync_timeout_secs, log_file",
                key
            );
        }
    }
    Ok(())
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Hide all but the last four characters of a secret
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
