//! Status command handler

use anyhow::Result;

use donelog_core::Store;

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let config = store.config();
    let remote = config.remote();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "sync": {
                        "configured": remote.is_some(),
                        "endpoint": remote.as_ref().map(|r| r.endpoint.as_str()),
                        "auto_sync": config.auto_sync,
                        "interval_minutes": config.sync_interval_minutes,
                        "timeout_secs": config.sync_timeout_secs
                    },
                    "counts": {
                        "active": store.active().len(),
                        "trash": store.trash().len()
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", store.active().len());
        }
        OutputFormat::Human => {
            println!("donelog status");
            println!("==============");
            println!();
            println!("Sync:");
            match remote {
                Some(ref remote) => {
                    println!("  Endpoint:  {}", remote.endpoint);
                    println!(
                        "  Auto-sync: {}",
                        if config.auto_sync { "on" } else { "off" }
                    );
                    match config.sync_interval() {
                        Some(period) => {
                            println!("  Interval:  every {} minute(s)", period.as_secs() / 60)
                        }
                        None => println!("  Interval:  at startup only"),
                    }
                    println!("  Timeout:   {}s", config.sync_timeout().as_secs());
                }
                None => println!("  Not configured"),
            }
            println!();
            println!("Storage:");
            println!("  Location: {}", config.data_dir.display());
            println!();
            println!("Contents:");
            println!("  Active: {}", store.active().len());
            println!("  Trash:  {}", store.trash().len());
        }
    }

    Ok(())
}
